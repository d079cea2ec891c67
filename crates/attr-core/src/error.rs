//! Error type shared by the value model, the store and the bridge.

use crate::kind::ValueKind;
use crate::path::AttributePath;

/// Errors produced by attribute value operations and attribute store access.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A missing value, a wrong kind, an oversized length or an out-of-bounds value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A buffer could not be allocated, or a string exceeds the attribute's capacity.
    #[error("Out of memory")]
    NoMemory,

    /// No attribute exists at the given path.
    #[error("Attribute not found: {0}")]
    NotFound(AttributePath),

    /// The processing lock could not be acquired within the timeout.
    #[error("Could not acquire the processing lock")]
    LockFailed,

    /// The operation does not support this value kind.
    #[error("Unsupported value kind: {0}")]
    Unsupported(ValueKind),

    /// The store accepted the request but did not change anything.
    ///
    /// Callers of `update` and `report` treat this as success.
    #[error("Operation not finished")]
    NotFinished,

    /// A caller supplied buffer cannot hold the raw value.
    #[error("Buffer too small: required {required}, available {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// Failure reported by an application callback or a storage backend.
    #[error("{0}")]
    Failure(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
