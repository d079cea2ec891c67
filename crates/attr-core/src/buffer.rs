//! Owning storage for attribute values.
//!
//! [`ValueBuffer`] is the only place besides the wire decoder where value
//! bytes are owned. Byte-buffer kinds keep a heap allocation sized to the
//! current content (plus a terminator for character strings); fixed-width
//! kinds keep the scalar inline. Values handed out by [`ValueBuffer::value`]
//! borrow the buffer and cannot outlive it.

use crate::error::{Error, Result};
use crate::kind::{ValueKind, Width};
use crate::value::{AttributeValue, ValueData};

/// An owned, typed value cell.
#[derive(Debug, Clone)]
pub struct ValueBuffer {
    kind: ValueKind,
    scalar: AttributeValue<'static>,
    bytes: Option<Box<[u8]>>,
    size: u16,
    count: u16,
    max_size: Option<u16>,
}

fn zero(width: Width) -> ValueData<'static> {
    match width {
        Width::Bool => ValueData::Bool(0),
        Width::Int => ValueData::Int(0),
        Width::Float => ValueData::Float(0.0),
        Width::I8 => ValueData::I8(0),
        Width::I16 => ValueData::I16(0),
        Width::I32 => ValueData::I32(0),
        Width::I64 => ValueData::I64(0),
        Width::U8 => ValueData::U8(0),
        Width::U16 => ValueData::U16(0),
        Width::U32 => ValueData::U32(0),
        Width::U64 => ValueData::U64(0),
        Width::None | Width::Bytes => ValueData::Empty,
    }
}

impl ValueBuffer {
    /// A zero (or empty) value of `kind`.
    pub fn new(kind: ValueKind) -> Self {
        let scalar = match kind.width() {
            Width::Bytes | Width::None => AttributeValue::invalid(),
            width => AttributeValue::new(kind, zero(width)).unwrap_or(AttributeValue::invalid()),
        };
        Self {
            kind,
            scalar,
            bytes: None,
            size: 0,
            count: 0,
            max_size: None,
        }
    }

    /// A cell for byte-buffer kinds that refuses content longer than `max_size`.
    pub fn with_max_size(kind: ValueKind, max_size: u16) -> Self {
        let mut buffer = Self::new(kind);
        buffer.max_size = Some(max_size);
        buffer
    }

    /// A cell holding a copy of `value`.
    pub fn from_value(value: &AttributeValue<'_>) -> Result<Self> {
        let mut buffer = Self::new(value.kind());
        buffer.assign(value)?;
        Ok(buffer)
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn max_size(&self) -> Option<u16> {
        self.max_size
    }

    /// Bytes currently allocated for byte-buffer content.
    pub fn capacity(&self) -> usize {
        self.bytes.as_ref().map_or(0, |b| b.len())
    }

    /// A view of the stored value.
    pub fn value(&self) -> AttributeValue<'_> {
        if !self.kind.is_byte_buffer() {
            return self.scalar;
        }
        let data = match &self.bytes {
            Some(bytes) => bytes.get(..self.size as usize),
            None if Some(self.size) == self.kind.null_length() => None,
            None => Some(&[][..]),
        };
        AttributeValue::from_storage(self.kind, data, self.size, self.count)
    }

    pub fn is_null(&self) -> bool {
        self.value().is_null()
    }

    /// Replace the stored value with a copy of `value`.
    ///
    /// The kinds must match exactly. Byte content longer than the configured
    /// maximum size fails with `NoMemory` and leaves the cell untouched.
    pub fn assign(&mut self, value: &AttributeValue<'_>) -> Result<()> {
        if value.kind() != self.kind {
            return Err(Error::invalid(format!(
                "cannot store {} value in {} attribute",
                value.kind(),
                self.kind
            )));
        }

        let Some(buf) = value.as_buf() else {
            self.scalar = value.to_owned_scalar().unwrap_or(AttributeValue::invalid());
            return Ok(());
        };

        if value.is_null() {
            self.bytes = None;
            self.size = self.kind.null_length().unwrap_or(0);
            self.count = 0;
            return Ok(());
        }

        let content = buf.data().unwrap_or_default();
        let len = content.len().min(buf.size() as usize);
        if let Some(max) = self.max_size {
            if len > max as usize {
                return Err(Error::NoMemory);
            }
        }

        if len == 0 {
            self.bytes = None;
        } else {
            let terminator = usize::from(self.kind.is_text());
            let mut storage = Vec::new();
            storage
                .try_reserve_exact(len + terminator)
                .map_err(|_| Error::NoMemory)?;
            storage.extend_from_slice(&content[..len]);
            if terminator == 1 {
                storage.push(0);
            }
            self.bytes = Some(storage.into_boxed_slice());
        }
        self.size = len as u16;
        self.count = buf.count();
        Ok(())
    }

    /// Store the kind's null value.
    pub fn set_null(&mut self) -> Result<()> {
        let null = AttributeValue::null(self.kind)?;
        self.assign(&null)
    }
}
