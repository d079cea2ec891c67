//! The attribute store bridge.
//!
//! [`AttributeBridge`] owns the attribute store and serializes every change
//! under one re-entrant processing lock. A change is applied, then reported
//! to the engine, then the lock is released. Application callbacks run with
//! the processing lock held but without the store lock, so they may read
//! attributes through the bridge.

use crate::lock::StackLock;
use crate::notify::ChangeReporter;
use attr_core::describe::{describe, Direction};
use attr_core::{
    Attribute, AttributeCallback, AttributeFlags, AttributePath, AttributeStore, AttributeValue,
    BridgeConfig, CallbackType, Error, MemoryStore, Persistence, PersistenceStorage, Result,
    ValueBuffer, ValueKind,
};
use attr_tlv::{DecodeBuffer, Tag, TlvRead, TlvReader, TlvWrite, TlvWriter};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Synchronized get/set/update/report access to the attribute store.
pub struct AttributeBridge {
    config: BridgeConfig,
    lock: StackLock,
    store: RwLock<Box<dyn AttributeStore>>,
    callback: RwLock<Option<Arc<dyn AttributeCallback>>>,
    reporter: Arc<dyn ChangeReporter>,
    storage: Option<Arc<dyn PersistenceStorage>>,
    /// Deferred attributes waiting to be persisted, with their last change time.
    deferred: Mutex<BTreeMap<AttributePath, Instant>>,
}

impl AttributeBridge {
    /// Create a bridge with an empty in-memory store.
    pub fn new(config: BridgeConfig, reporter: Arc<dyn ChangeReporter>) -> Self {
        Self {
            config,
            lock: StackLock::new(),
            store: RwLock::new(Box::new(MemoryStore::new())),
            callback: RwLock::new(None),
            reporter,
            storage: None,
            deferred: Mutex::new(BTreeMap::new()),
        }
    }

    /// Persist non-volatile attributes to `storage`.
    pub fn with_storage(mut self, storage: Arc<dyn PersistenceStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a custom attribute store.
    pub fn with_store(mut self, store: Box<dyn AttributeStore>) -> Self {
        self.store = RwLock::new(store);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn lock(&self) -> &StackLock {
        &self.lock
    }

    fn read_store(&self) -> Result<RwLockReadGuard<'_, Box<dyn AttributeStore>>> {
        self.store
            .read()
            .map_err(|_| Error::Failure("attribute store lock poisoned".to_string()))
    }

    fn write_store(&self) -> Result<RwLockWriteGuard<'_, Box<dyn AttributeStore>>> {
        self.store
            .write()
            .map_err(|_| Error::Failure("attribute store lock poisoned".to_string()))
    }

    fn deferred(&self) -> std::sync::MutexGuard<'_, BTreeMap<AttributePath, Instant>> {
        self.deferred.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Attribute lifecycle
    // ========================================================================

    /// Create an attribute.
    ///
    /// String attributes without an explicit `max_size` use the configured
    /// default. Non-volatile attributes start from their persisted value when
    /// one is stored.
    pub fn create_attribute(
        &self,
        path: AttributePath,
        flags: AttributeFlags,
        value: &AttributeValue<'_>,
        max_size: Option<u16>,
    ) -> Result<()> {
        let max_size = max_size.or(self.config.max_string_size);
        let mut attribute = Attribute::new(path, flags, value, max_size)?;

        if flags.contains(AttributeFlags::NONVOLATILE) {
            if let Some(storage) = self.storage.as_ref().filter(|s| s.has_value(&path)) {
                match storage.load_value(&path) {
                    Ok(raw) => {
                        let restored = AttributeValue::from_raw(attribute.kind(), &raw)
                            .and_then(|v| attribute.restore(&v));
                        match restored {
                            Ok(()) => debug!("Restored {} from storage", path),
                            Err(e) => warn!("Ignoring stored value for {}: {}", path, e),
                        }
                    }
                    Err(e) => warn!("Failed to load stored value for {}: {}", path, e),
                }
            }
        }

        self.write_store()?.create(attribute)
    }

    /// Remove an attribute, erasing any persisted value.
    ///
    /// The attribute stays in the store when its persisted value cannot be
    /// erased.
    pub fn remove_attribute(&self, path: &AttributePath) -> Result<()> {
        let _guard = self.lock.acquire(self.config.lock_timeout())?;
        let flags = self.flags(path)?;
        if flags.contains(AttributeFlags::NONVOLATILE) {
            if let Some(storage) = &self.storage {
                storage.erase_value(path)?;
            }
        }
        self.deferred().remove(path);
        self.write_store()?
            .remove(path)
            .ok_or(Error::NotFound(*path))?;
        Ok(())
    }

    /// Whether an attribute exists at `path`.
    pub fn contains(&self, path: &AttributePath) -> Result<bool> {
        Ok(self.read_store()?.attribute(path).is_some())
    }

    /// All attribute paths in order.
    pub fn paths(&self) -> Result<Vec<AttributePath>> {
        Ok(self.read_store()?.paths())
    }

    pub fn kind(&self, path: &AttributePath) -> Result<ValueKind> {
        self.with_attribute(path, |a| a.kind())
    }

    pub fn flags(&self, path: &AttributePath) -> Result<AttributeFlags> {
        self.with_attribute(path, |a| a.flags())
    }

    /// Run `f` on an attribute under the store read lock.
    pub fn with_attribute<T>(
        &self,
        path: &AttributePath,
        f: impl FnOnce(&Attribute) -> T,
    ) -> Result<T> {
        let store = self.read_store()?;
        let attribute = store.attribute(path).ok_or(Error::NotFound(*path))?;
        Ok(f(attribute))
    }

    fn with_attribute_mut<T>(
        &self,
        path: &AttributePath,
        f: impl FnOnce(&mut Attribute) -> Result<T>,
    ) -> Result<T> {
        let mut store = self.write_store()?;
        let attribute = store.attribute_mut(path).ok_or(Error::NotFound(*path))?;
        f(attribute)
    }

    /// Attach min/max bounds, clamping the current value.
    pub fn add_bounds(
        &self,
        path: &AttributePath,
        min: AttributeValue<'_>,
        max: AttributeValue<'_>,
    ) -> Result<()> {
        self.with_attribute_mut(path, |a| a.add_bounds(min, max))
    }

    /// Route reads and writes of an attribute to `callback`.
    pub fn set_override_callback(
        &self,
        path: &AttributePath,
        callback: Arc<dyn AttributeCallback>,
    ) -> Result<()> {
        self.with_attribute_mut(path, |a| a.set_override(callback))
    }

    /// Batch persistent writes of a non-volatile attribute.
    pub fn set_deferred_persistence(&self, path: &AttributePath) -> Result<()> {
        self.with_attribute_mut(path, |a| a.set_deferred_persistence())
    }

    /// Install the application callback used for pre/post-update hooks.
    pub fn set_callback(&self, callback: Arc<dyn AttributeCallback>) {
        let mut slot = self.callback.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(callback);
    }

    fn app_callback(&self) -> Option<Arc<dyn AttributeCallback>> {
        self.callback
            .read()
            .map(|slot| (*slot).clone())
            .unwrap_or_else(|e| (*e.into_inner()).clone())
    }

    // ========================================================================
    // Update and report
    // ========================================================================

    /// Apply a new value and notify the engine.
    ///
    /// An identical value is accepted without callbacks or notification.
    pub fn update(
        &self,
        endpoint: u16,
        cluster: u32,
        attribute: u32,
        value: Option<&AttributeValue<'_>>,
    ) -> Result<()> {
        let value = value.ok_or_else(|| Error::InvalidArgument("missing value".to_string()))?;
        let path = AttributePath::new(endpoint, cluster, attribute);
        if !self.contains(&path)? {
            error!("Could not find attribute {}", path);
            return Err(Error::NotFound(path));
        }

        let guard = self.lock.acquire(self.config.lock_timeout())?;
        describe(&path, value, Direction::Write);

        let result = match self.apply(&path, value, true) {
            Ok(()) => {
                self.reporter.report_attribute_changed(&path);
                Ok(())
            }
            Err(Error::NotFinished) => {
                debug!("Attribute {} unchanged", path);
                Ok(())
            }
            Err(e) => {
                error!("Failed to update {}: {}", path, e);
                Err(e)
            }
        };
        drop(guard);
        result
    }

    /// Store a value without pre/post-update callbacks and force a report.
    pub fn report(
        &self,
        endpoint: u16,
        cluster: u32,
        attribute: u32,
        value: Option<&AttributeValue<'_>>,
    ) -> Result<()> {
        let value = value.ok_or_else(|| Error::InvalidArgument("missing value".to_string()))?;
        let path = AttributePath::new(endpoint, cluster, attribute);
        let kind = self.kind(&path)?;

        let guard = self.lock.acquire(self.config.lock_timeout())?;
        if value.kind() != kind {
            error!("Attribute kind mismatch when reporting {}", path);
            return Err(Error::InvalidArgument(format!(
                "{} value reported for {} attribute {}",
                value.kind(),
                kind,
                path
            )));
        }

        match self.apply(&path, value, false) {
            Ok(()) | Err(Error::NotFinished) => {}
            Err(e) => return Err(e),
        }
        self.reporter.reporting_attribute_change(endpoint, cluster, attribute);
        drop(guard);
        Ok(())
    }

    /// Store a value with pre/post-update callbacks but without notifying the engine.
    pub fn set(&self, path: &AttributePath, value: &AttributeValue<'_>) -> Result<()> {
        let _guard = self.lock.acquire(self.config.lock_timeout())?;
        match self.apply(path, value, true) {
            Err(Error::NotFinished) => Ok(()),
            other => other,
        }
    }

    /// Validate, commit and persist `value`. Must be called with the
    /// processing lock held.
    fn apply(
        &self,
        path: &AttributePath,
        value: &AttributeValue<'_>,
        callbacks: bool,
    ) -> Result<()> {
        let override_callback = self.with_attribute(path, |a| {
            if a.is_overridden() {
                Ok(a.override_callback())
            } else {
                a.check(value).map(|()| None)
            }
        })??;

        if let Some(callback) = override_callback {
            let mut copy = *value;
            return callback.call(CallbackType::Write, path, &mut copy);
        }

        let app_callback = if callbacks { self.app_callback() } else { None };
        if let Some(callback) = &app_callback {
            let mut copy = *value;
            if let Err(e) = callback.call(CallbackType::PreUpdate, path, &mut copy) {
                warn!("Pre-update callback rejected {}: {}", path, e);
                return Err(e);
            }
        }

        let persistence = self.with_attribute_mut(path, |a| {
            // A callback may have changed the attribute meanwhile
            match a.check(value) {
                Ok(()) | Err(Error::NotFinished) => a.commit(value),
                Err(e) => Err(e),
            }
        })?;

        if let Some(callback) = &app_callback {
            let mut copy = *value;
            if let Err(e) = callback.call(CallbackType::PostUpdate, path, &mut copy) {
                warn!("Post-update callback failed for {}: {}", path, e);
            }
        }

        match persistence {
            Persistence::None => {}
            Persistence::Now => self.persist(path),
            Persistence::Deferred => {
                self.deferred().insert(*path, Instant::now());
            }
        }
        Ok(())
    }

    fn persist(&self, path: &AttributePath) {
        let Some(storage) = &self.storage else {
            return;
        };
        let raw = self.with_attribute(path, |a| {
            let value = a.value();
            let mut raw = vec![0u8; value.raw_size()?];
            value.write_raw(&mut raw)?;
            Ok::<_, Error>(raw)
        });
        match raw.and_then(|r| r) {
            Ok(raw) => {
                if let Err(e) = storage.store_value(path, &raw) {
                    error!("Failed to persist {}: {}", path, e);
                }
            }
            Err(e) => error!("Failed to serialize {} for storage: {}", path, e),
        }
    }

    // ========================================================================
    // Deferred persistence
    // ========================================================================

    /// Deferred attributes that have not been persisted yet.
    pub fn pending_deferred(&self) -> Vec<AttributePath> {
        self.deferred().keys().copied().collect()
    }

    /// Persist every pending deferred attribute. Returns how many were written.
    pub fn flush_deferred(&self) -> Result<usize> {
        let _guard = self.lock.acquire(self.config.lock_timeout())?;
        let pending: Vec<AttributePath> =
            std::mem::take(&mut *self.deferred()).into_keys().collect();
        for path in &pending {
            self.persist(path);
        }
        Ok(pending.len())
    }

    /// Persist deferred attributes whose last change is older than the
    /// configured quiescence delay.
    pub fn flush_settled(&self, now: Instant) -> Result<usize> {
        let _guard = self.lock.acquire(self.config.lock_timeout())?;
        let delay = self.config.deferred_persistence_delay();
        let settled: Vec<AttributePath> = {
            let mut deferred = self.deferred();
            let settled: Vec<AttributePath> = deferred
                .iter()
                .filter(|(_, changed)| now.saturating_duration_since(**changed) >= delay)
                .map(|(path, _)| *path)
                .collect();
            for path in &settled {
                deferred.remove(path);
            }
            settled
        };
        for path in &settled {
            self.persist(path);
        }
        if !settled.is_empty() {
            info!("Persisted {} deferred attributes", settled.len());
        }
        Ok(settled.len())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read an attribute value through the wire codec.
    ///
    /// Overridden attributes are read through their READ callback. Arrays are
    /// copied directly since the codec does not carry them.
    pub fn get(&self, path: &AttributePath) -> Result<ValueBuffer> {
        let _guard = self.lock.acquire(self.config.lock_timeout())?;
        let kind = self.kind(path)?;
        if kind == ValueKind::Array {
            return self.with_attribute(path, |a| ValueBuffer::from_value(&a.value()))?;
        }

        let mut writer = TlvWriter::new();
        self.encode_value(path, &mut writer, Tag::Anonymous)?;

        let bytes = writer.into_bytes();
        let mut reader = TlvReader::new(&bytes);
        reader.next().map_err(attr_tlv::CodecError::from)?;
        let mut buffer = DecodeBuffer::new(kind);
        buffer.decode(&reader)?;
        Ok(buffer.into_inner())
    }

    /// Copy an attribute value in raw storage layout into `out`.
    ///
    /// Overridden attributes are read through their READ callback.
    pub fn get_raw(&self, path: &AttributePath, out: &mut [u8]) -> Result<usize> {
        let _guard = self.lock.acquire(self.config.lock_timeout())?;
        if let Some(value) = self.read_override(path)? {
            return self.write_raw_value(path, &value, out);
        }
        self.with_attribute(path, |a| self.write_raw_value(path, &a.value(), out))?
    }

    fn write_raw_value(
        &self,
        path: &AttributePath,
        value: &AttributeValue<'_>,
        out: &mut [u8],
    ) -> Result<usize> {
        let largest = self.config.attribute_buffer_largest;
        let required = value.raw_size()?;
        if required > largest {
            error!(
                "Raw value of {} needs {} bytes, attribute buffer holds {}",
                path, required, largest
            );
            return Err(Error::BufferTooSmall {
                required,
                available: largest,
            });
        }
        value.write_raw(out)
    }

    /// Call the override READ callback of `path`, if one is installed.
    ///
    /// Fails with `Failure` when the callback leaves the value invalid.
    fn read_override(&self, path: &AttributePath) -> Result<Option<AttributeValue<'static>>> {
        let override_callback = self.with_attribute(path, |a| {
            a.is_overridden().then(|| a.override_callback()).flatten()
        })?;
        let Some(callback) = override_callback else {
            return Ok(None);
        };

        let mut value = AttributeValue::invalid();
        callback.call(CallbackType::Read, path, &mut value)?;
        if value.kind() == ValueKind::Invalid {
            return Err(Error::Failure(format!(
                "override read of {path} produced no value"
            )));
        }
        describe(path, &value, Direction::Read);
        Ok(Some(value))
    }

    /// Encode the current value of an attribute into `writer`, consulting the
    /// override READ callback when one is installed.
    pub(crate) fn encode_value<W: TlvWrite + ?Sized>(
        &self,
        path: &AttributePath,
        writer: &mut W,
        tag: Tag,
    ) -> Result<()> {
        if let Some(value) = self.read_override(path)? {
            return Ok(attr_tlv::encode(&value, writer, tag)?);
        }

        self.with_attribute(path, |a| {
            let value = a.value();
            describe(path, &value, Direction::Read);
            attr_tlv::encode(&value, writer, tag).map_err(Error::from)
        })?
    }

    /// Decode the reader's current element as a value for `path` and apply it
    /// like [`update`](Self::update).
    pub(crate) fn decode_and_update<R: TlvRead + ?Sized>(
        &self,
        path: &AttributePath,
        reader: &R,
    ) -> Result<()> {
        let kind = self.kind(path)?;
        let mut buffer = DecodeBuffer::new(kind);
        buffer.decode(reader)?;
        let value = buffer.value();
        self.update(path.endpoint, path.cluster, path.attribute, Some(&value))
    }
}
