//! Attribute value codec.
//!
//! [`encode`] writes an [`AttributeValue`] as a single TLV element.
//! [`DecodeBuffer`] reads one element into an owned value of a known kind;
//! string content is copied into a buffer the decode buffer owns and frees on
//! drop, so decoded values borrow the `DecodeBuffer` and cannot outlive it.

use crate::tlv::{ElementType, Tag, TlvError, TlvRead, TlvWrite};
use attr_core::kind::Width;
use attr_core::{AttributeValue, ValueBuffer, ValueData, ValueKind};
use thiserror::Error;
use tracing::{debug, error};

/// Errors that can occur during value encoding/decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// The wire data does not fit the requested kind.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The decode buffer could not be allocated.
    #[error("Out of memory")]
    NoMemory,

    /// The codec does not handle this kind.
    #[error("Unsupported value kind: {0}")]
    Unsupported(ValueKind),

    /// The TLV reader or writer failed.
    #[error(transparent)]
    Tlv(#[from] TlvError),
}

impl From<CodecError> for attr_core::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::InvalidArgument(msg) => attr_core::Error::InvalidArgument(msg),
            CodecError::NoMemory => attr_core::Error::NoMemory,
            CodecError::Unsupported(kind) => attr_core::Error::Unsupported(kind),
            CodecError::Tlv(TlvError::BufferTooSmall {
                required,
                available,
            }) => attr_core::Error::BufferTooSmall {
                required,
                available,
            },
            CodecError::Tlv(other) => attr_core::Error::InvalidArgument(other.to_string()),
        }
    }
}

impl From<attr_core::Error> for CodecError {
    fn from(err: attr_core::Error) -> Self {
        match err {
            attr_core::Error::NoMemory => CodecError::NoMemory,
            attr_core::Error::Unsupported(kind) => CodecError::Unsupported(kind),
            other => CodecError::InvalidArgument(other.to_string()),
        }
    }
}

/// Encode `value` as one TLV element with the given tag.
///
/// Nullable kinds holding their null sentinel encode as the null element.
/// Byte-buffer values are written as exactly `size` bytes; a buffer without
/// data that is not the null sentinel encodes as an empty string. Invalid and
/// array values are rejected with `Unsupported` and nothing is written.
pub fn encode<W: TlvWrite + ?Sized>(
    value: &AttributeValue<'_>,
    writer: &mut W,
    tag: Tag,
) -> Result<(), CodecError> {
    let kind = value.kind();
    if kind.is_nullable() && value.is_null() {
        return Ok(writer.put_null(tag)?);
    }

    match *value.data() {
        ValueData::Empty => return Err(CodecError::Unsupported(kind)),
        ValueData::Bool(v) => writer.put_bool(tag, v != 0)?,
        ValueData::Int(v) | ValueData::I32(v) => writer.put_signed(tag, v as i64)?,
        ValueData::I8(v) => writer.put_signed(tag, v as i64)?,
        ValueData::I16(v) => writer.put_signed(tag, v as i64)?,
        ValueData::I64(v) => writer.put_signed(tag, v)?,
        ValueData::U8(v) => writer.put_unsigned(tag, v as u64)?,
        ValueData::U16(v) => writer.put_unsigned(tag, v as u64)?,
        ValueData::U32(v) => writer.put_unsigned(tag, v as u64)?,
        ValueData::U64(v) => writer.put_unsigned(tag, v)?,
        ValueData::Float(v) => writer.put_float(tag, v)?,
        ValueData::Bytes(buf) => {
            if kind == ValueKind::Array {
                return Err(CodecError::Unsupported(kind));
            }
            if value.is_null() {
                return Ok(writer.put_null(tag)?);
            }
            let content = match buf.data() {
                Some(data) => &data[..data.len().min(buf.size() as usize)],
                None => &[][..],
            };
            if kind.is_text() {
                writer.put_string(tag, content)?;
            } else {
                writer.put_bytes(tag, content)?;
            }
        }
    }
    Ok(())
}

/// Owning destination for a decoded value of a fixed kind.
#[derive(Debug, Clone)]
pub struct DecodeBuffer {
    buffer: ValueBuffer,
}

impl DecodeBuffer {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            buffer: ValueBuffer::new(kind),
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.buffer.kind()
    }

    /// The decoded value, borrowing this buffer.
    pub fn value(&self) -> AttributeValue<'_> {
        self.buffer.value()
    }

    pub fn into_inner(self) -> ValueBuffer {
        self.buffer
    }

    /// Decode the reader's current element into this buffer.
    ///
    /// Integers must fit the kind's width exactly and are never coerced. A
    /// nullable kind rejects a non-null wire value equal to its null sentinel.
    pub fn decode<R: TlvRead + ?Sized>(&mut self, reader: &R) -> Result<(), CodecError> {
        let kind = self.buffer.kind();
        match kind.width() {
            Width::None => {
                return Err(CodecError::InvalidArgument(format!(
                    "cannot decode into {kind}"
                )))
            }
            _ if kind == ValueKind::Array => return Err(CodecError::Unsupported(kind)),
            _ => {}
        }

        if reader.element_type() == Some(ElementType::Null) {
            if !(kind.is_nullable() || kind.is_byte_buffer()) {
                return Err(TlvError::WrongType {
                    expected: "non-null value",
                    found: Some(ElementType::Null),
                }
                .into());
            }
            self.buffer.set_null()?;
            return Ok(());
        }

        if kind.is_byte_buffer() {
            return self.decode_bytes(reader);
        }

        let data = match kind.width() {
            Width::Bool => ValueData::Bool(reader.get_bool()? as u8),
            Width::Int => ValueData::Int(reader.get_i32()?),
            Width::Float => ValueData::Float(reader.get_f32()?),
            Width::I8 => ValueData::I8(reader.get_i8()?),
            Width::I16 => ValueData::I16(reader.get_i16()?),
            Width::I32 => ValueData::I32(reader.get_i32()?),
            Width::I64 => ValueData::I64(reader.get_i64()?),
            Width::U8 => ValueData::U8(reader.get_u8()?),
            Width::U16 => ValueData::U16(reader.get_u16()?),
            Width::U32 => ValueData::U32(reader.get_u32()?),
            Width::U64 => ValueData::U64(reader.get_u64()?),
            Width::None | Width::Bytes => return Err(CodecError::Unsupported(kind)),
        };
        let value = AttributeValue::new(kind, data)?;
        if value.is_null() {
            debug!("Rejecting {} wire value equal to the null sentinel", kind);
            return Err(CodecError::InvalidArgument(format!(
                "{kind} wire value collides with the null sentinel"
            )));
        }
        self.buffer.assign(&value)?;
        Ok(())
    }

    fn decode_bytes<R: TlvRead + ?Sized>(&mut self, reader: &R) -> Result<(), CodecError> {
        let kind = self.buffer.kind();
        let length = reader.length()?;
        let max = kind.max_length().unwrap_or(0) as usize;
        if length > max {
            error!("{} of {} bytes exceeds the {} byte limit", kind, length, max);
            return Err(CodecError::InvalidArgument(format!(
                "{kind} length {length} exceeds {max}"
            )));
        }
        let content = if kind.is_text() {
            reader.get_string()?
        } else {
            reader.get_bytes()?
        };
        let value = AttributeValue::bytes(kind, Some(content))?;
        self.buffer.assign(&value)?;
        Ok(())
    }
}

/// Decode the reader's current element as a value of `kind`.
pub fn decode<R: TlvRead + ?Sized>(
    kind: ValueKind,
    reader: &R,
) -> Result<DecodeBuffer, CodecError> {
    let mut buffer = DecodeBuffer::new(kind);
    buffer.decode(reader)?;
    Ok(buffer)
}
