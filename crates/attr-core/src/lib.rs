//! # attr-core
//!
//! Typed attribute values and the attribute store of the device data model.
//!
//! This crate provides:
//! - Value kinds and the `Copy` tagged value type with per-width null sentinels
//! - Type-aware comparison, bounds and diagnostic descriptions
//! - Owning value storage and the raw attribute storage layout
//! - Attribute objects, flags, callbacks and an in-memory store
//! - Bridge configuration and the persistence storage abstraction
//!
//! The crate contains no async code and no wire codec; see `attr-tlv` for the
//! TLV encoding and `attr-bridge` for the synchronized update path.

pub mod bounds;
pub mod buffer;
pub mod config;
pub mod describe;
pub mod error;
pub mod kind;
pub mod path;
pub mod raw;
pub mod store;
pub mod value;

pub use bounds::{Bounds, BoundsCheck};
pub use buffer::ValueBuffer;
pub use config::{BridgeConfig, ConfigError, MemoryStorage, PersistenceStorage};
pub use describe::{describe, Direction};
pub use error::{Error, Result};
pub use kind::ValueKind;
pub use path::{AttributePath, PathPattern, PatternError};
pub use store::{
    callback_fn, Attribute, AttributeCallback, AttributeFlags, AttributeStore, CallbackType,
    MemoryStore, Persistence,
};
pub use value::{compare, AttributeValue, ByteBuf, ValueData};
