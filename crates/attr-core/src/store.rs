//! Attribute objects and the in-memory attribute store.
//!
//! An [`Attribute`] owns its current value and enforces the write rules that
//! depend only on the attribute itself: kind matching, bounds, unchanged-value
//! detection and string capacity. Locking, callbacks and change notification
//! are handled one layer up by the bridge.

use crate::bounds::{BoundsCheck, Bounds};
use crate::buffer::ValueBuffer;
use crate::error::{Error, Result};
use crate::kind::ValueKind;
use crate::path::AttributePath;
use crate::value::{compare, AttributeValue};
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

bitflags! {
    /// Attribute properties.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AttributeFlags: u16 {
        const WRITABLE = 0b0000_0001;
        const NONVOLATILE = 0b0000_0010;
        /// The attribute carries min/max bounds
        const MIN_MAX = 0b0000_0100;
        const NULLABLE = 0b0000_1000;
        /// Reads and writes go to the override callback instead of internal storage
        const OVERRIDE = 0b0001_0000;
        /// Non-volatile writes are batched until the value settles
        const DEFERRED = 0b0010_0000;
    }
}

/// The point in the update protocol at which a callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackType {
    /// Before a new value is stored. An error aborts the update.
    PreUpdate,
    /// After a new value is stored.
    PostUpdate,
    /// An override attribute is being read.
    Read,
    /// An override attribute is being written.
    Write,
}

/// Application hook invoked around attribute updates.
pub trait AttributeCallback: Send + Sync {
    fn call(
        &self,
        callback_type: CallbackType,
        path: &AttributePath,
        value: &mut AttributeValue<'_>,
    ) -> Result<()>;
}

impl<F> AttributeCallback for F
where
    F: Fn(CallbackType, &AttributePath, &mut AttributeValue<'_>) -> Result<()> + Send + Sync,
{
    fn call(
        &self,
        callback_type: CallbackType,
        path: &AttributePath,
        value: &mut AttributeValue<'_>,
    ) -> Result<()> {
        self(callback_type, path, value)
    }
}

/// Wrap a closure as a shareable callback.
pub fn callback_fn<F>(f: F) -> Arc<dyn AttributeCallback>
where
    F: Fn(CallbackType, &AttributePath, &mut AttributeValue<'_>) -> Result<()>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// What the caller must do to persist a committed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// The attribute is volatile.
    None,
    /// Write the value to storage now.
    Now,
    /// Schedule the value for a later batched write.
    Deferred,
}

/// An attribute in the data model.
pub struct Attribute {
    path: AttributePath,
    flags: AttributeFlags,
    value: ValueBuffer,
    bounds: Option<Bounds>,
    override_callback: Option<Arc<dyn AttributeCallback>>,
}

impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("value", &self.value)
            .field("bounds", &self.bounds)
            .field("override_callback", &self.override_callback.is_some())
            .finish()
    }
}

impl Attribute {
    /// Create an attribute holding `value`.
    ///
    /// `max_size` caps the content of string attributes; it is ignored for
    /// fixed-width kinds. A nullable value kind implies [`AttributeFlags::NULLABLE`].
    pub fn new(
        path: AttributePath,
        flags: AttributeFlags,
        value: &AttributeValue<'_>,
        max_size: Option<u16>,
    ) -> Result<Self> {
        let kind = value.kind();
        if kind == ValueKind::Invalid {
            return Err(Error::invalid(format!("attribute {path} has no value kind")));
        }
        let mut buffer = match max_size {
            Some(max) if kind.is_byte_buffer() => ValueBuffer::with_max_size(kind, max),
            _ => ValueBuffer::new(kind),
        };
        buffer.assign(value)?;

        let mut flags = flags;
        if kind.is_nullable() {
            flags |= AttributeFlags::NULLABLE;
        }
        // Bounds and overrides are installed through their own setters
        flags.remove(AttributeFlags::MIN_MAX | AttributeFlags::OVERRIDE);

        Ok(Self {
            path,
            flags,
            value: buffer,
            bounds: None,
            override_callback: None,
        })
    }

    pub fn path(&self) -> &AttributePath {
        &self.path
    }

    pub fn flags(&self) -> AttributeFlags {
        self.flags
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    /// A view of the stored value.
    pub fn value(&self) -> AttributeValue<'_> {
        self.value.value()
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    pub fn max_size(&self) -> Option<u16> {
        self.value.max_size()
    }

    pub fn override_callback(&self) -> Option<Arc<dyn AttributeCallback>> {
        self.override_callback.clone()
    }

    pub fn is_overridden(&self) -> bool {
        self.flags.contains(AttributeFlags::OVERRIDE) && self.override_callback.is_some()
    }

    /// Attach bounds and clamp the current value into range.
    ///
    /// String, array and boolean attributes cannot be bounded.
    pub fn add_bounds(&mut self, min: AttributeValue<'_>, max: AttributeValue<'_>) -> Result<()> {
        let kind = self.kind();
        if !kind.supports_bounds() {
            return Err(Error::invalid(format!(
                "{kind} attribute {} cannot have bounds",
                self.path
            )));
        }
        if min.kind() != kind || max.kind() != kind {
            return Err(Error::invalid(format!(
                "bounds of kind {} do not match {kind} attribute {}",
                min.kind(),
                self.path
            )));
        }
        let bounds = Bounds::new(min, max)?;
        if let Some(clamped) = bounds.clamp(&self.value.value())? {
            debug!("Clamping {} to {}", self.path, clamped);
            self.value.assign(&clamped)?;
        }
        self.bounds = Some(bounds);
        self.flags |= AttributeFlags::MIN_MAX;
        Ok(())
    }

    /// Route reads and writes of this attribute to `callback`.
    ///
    /// Byte-buffer attributes cannot be overridden.
    pub fn set_override(&mut self, callback: Arc<dyn AttributeCallback>) -> Result<()> {
        if self.kind().is_byte_buffer() {
            return Err(Error::Unsupported(self.kind()));
        }
        self.override_callback = Some(callback);
        self.flags |= AttributeFlags::OVERRIDE;
        Ok(())
    }

    /// Batch persistent writes of this attribute. Requires a non-volatile attribute.
    pub fn set_deferred_persistence(&mut self) -> Result<()> {
        if !self.flags.contains(AttributeFlags::NONVOLATILE) {
            return Err(Error::invalid(format!(
                "attribute {} is not non-volatile",
                self.path
            )));
        }
        self.flags |= AttributeFlags::DEFERRED;
        Ok(())
    }

    /// Validate a candidate value without storing it.
    ///
    /// Returns `NotFinished` when the value equals the stored one.
    pub fn check(&self, value: &AttributeValue<'_>) -> Result<()> {
        if value.kind() != self.kind() {
            return Err(Error::invalid(format!(
                "{} value does not match {} attribute {}",
                value.kind(),
                self.kind(),
                self.path
            )));
        }
        if self.flags.contains(AttributeFlags::MIN_MAX) {
            if let Some(bounds) = &self.bounds {
                if bounds.check(value)? != BoundsCheck::Within {
                    warn!("Value {} for {} is out of bounds", value, self.path);
                    return Err(Error::invalid(format!(
                        "value {value} is outside [{}, {}]",
                        bounds.min(),
                        bounds.max()
                    )));
                }
            }
        }
        if let (Some(max), Some(buf)) = (self.value.max_size(), value.as_buf()) {
            if !value.is_null() && buf.size() > max {
                return Err(Error::NoMemory);
            }
        }
        if compare(Some(&self.value.value()), Some(value))? {
            return Err(Error::NotFinished);
        }
        Ok(())
    }

    /// Store `value` and report how it must be persisted.
    pub fn commit(&mut self, value: &AttributeValue<'_>) -> Result<Persistence> {
        self.value.assign(value)?;
        Ok(self.persistence())
    }

    /// Overwrite the stored value without validation or persistence, used
    /// when restoring from storage.
    pub fn restore(&mut self, value: &AttributeValue<'_>) -> Result<()> {
        self.value.assign(value)
    }

    fn persistence(&self) -> Persistence {
        if !self.flags.contains(AttributeFlags::NONVOLATILE) {
            Persistence::None
        } else if self.flags.contains(AttributeFlags::DEFERRED) {
            Persistence::Deferred
        } else {
            Persistence::Now
        }
    }
}

/// Trait for attribute storage implementations.
pub trait AttributeStore: Send + Sync {
    /// Add an attribute. Fails if the path is already taken.
    fn create(&mut self, attribute: Attribute) -> Result<()>;

    /// Look up an attribute.
    fn attribute(&self, path: &AttributePath) -> Option<&Attribute>;

    /// Look up an attribute for modification.
    fn attribute_mut(&mut self, path: &AttributePath) -> Option<&mut Attribute>;

    /// Remove an attribute, returning it.
    fn remove(&mut self, path: &AttributePath) -> Option<Attribute>;

    /// All attribute paths in order.
    fn paths(&self) -> Vec<AttributePath>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory attribute store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    attributes: BTreeMap<AttributePath, Attribute>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttributeStore for MemoryStore {
    fn create(&mut self, attribute: Attribute) -> Result<()> {
        let path = *attribute.path();
        if self.attributes.contains_key(&path) {
            return Err(Error::invalid(format!("attribute {path} already exists")));
        }
        debug!("Created attribute {} ({})", path, attribute.kind());
        self.attributes.insert(path, attribute);
        Ok(())
    }

    fn attribute(&self, path: &AttributePath) -> Option<&Attribute> {
        self.attributes.get(path)
    }

    fn attribute_mut(&mut self, path: &AttributePath) -> Option<&mut Attribute> {
        self.attributes.get_mut(path)
    }

    fn remove(&mut self, path: &AttributePath) -> Option<Attribute> {
        self.attributes.remove(path)
    }

    fn paths(&self) -> Vec<AttributePath> {
        self.attributes.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.attributes.len()
    }
}
