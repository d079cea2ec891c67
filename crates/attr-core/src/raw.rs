//! Raw attribute storage layout used by the interaction-model engine.
//!
//! Scalars are stored little-endian at their natural width, booleans as one
//! byte. Strings carry a 1 byte (short) or 2 byte (long) length prefix, with
//! an all-ones prefix and no content for null. Arrays carry a 2 byte element
//! count followed by the encoded elements.

use crate::error::{Error, Result};
use crate::kind::{ValueKind, Width};
use crate::value::{AttributeValue, ValueData};

impl<'a> AttributeValue<'a> {
    /// Number of bytes [`write_raw`](Self::write_raw) produces.
    pub fn raw_size(&self) -> Result<usize> {
        let size = match self.data() {
            ValueData::Empty => return Err(Error::Unsupported(self.kind())),
            ValueData::Bool(_) | ValueData::I8(_) | ValueData::U8(_) => 1,
            ValueData::I16(_) | ValueData::U16(_) => 2,
            ValueData::Int(_) | ValueData::Float(_) | ValueData::I32(_) | ValueData::U32(_) => 4,
            ValueData::I64(_) | ValueData::U64(_) => 8,
            ValueData::Bytes(buf) => {
                let prefix = self.kind().prefix_width().unwrap_or(0) as usize;
                match buf.data() {
                    Some(data) => prefix + data.len().min(buf.size() as usize),
                    None => prefix,
                }
            }
        };
        Ok(size)
    }

    /// Copy the value into `out` in raw storage layout, returning the number
    /// of bytes written.
    pub fn write_raw(&self, out: &mut [u8]) -> Result<usize> {
        let required = self.raw_size()?;
        if out.len() < required {
            return Err(Error::BufferTooSmall {
                required,
                available: out.len(),
            });
        }
        match *self.data() {
            ValueData::Empty => return Err(Error::Unsupported(self.kind())),
            ValueData::Bool(v) => out[0] = v,
            ValueData::Int(v) | ValueData::I32(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            ValueData::Float(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            ValueData::I8(v) => out[..1].copy_from_slice(&v.to_le_bytes()),
            ValueData::I16(v) => out[..2].copy_from_slice(&v.to_le_bytes()),
            ValueData::I64(v) => out[..8].copy_from_slice(&v.to_le_bytes()),
            ValueData::U8(v) => out[0] = v,
            ValueData::U16(v) => out[..2].copy_from_slice(&v.to_le_bytes()),
            ValueData::U32(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            ValueData::U64(v) => out[..8].copy_from_slice(&v.to_le_bytes()),
            ValueData::Bytes(buf) => {
                let prefix = if self.kind() == ValueKind::Array {
                    buf.count()
                } else {
                    buf.size()
                };
                let width = self.kind().prefix_width().unwrap_or(0) as usize;
                out[..width].copy_from_slice(&prefix.to_le_bytes()[..width]);
                if let Some(data) = buf.data() {
                    let body = &data[..data.len().min(buf.size() as usize)];
                    out[width..width + body.len()].copy_from_slice(body);
                }
            }
        }
        Ok(required)
    }

    /// Read a value of `kind` from raw storage layout.
    ///
    /// Byte-buffer values borrow `raw`.
    pub fn from_raw(kind: ValueKind, raw: &'a [u8]) -> Result<Self> {
        fn take<const N: usize>(kind: ValueKind, raw: &[u8]) -> Result<[u8; N]> {
            raw.get(..N)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| {
                    Error::invalid(format!(
                        "raw {} value needs {} bytes, got {}",
                        kind,
                        N,
                        raw.len()
                    ))
                })
        }

        let data = match kind.width() {
            Width::None => return Err(Error::Unsupported(kind)),
            Width::Bool => {
                let [b] = take::<1>(kind, raw)?;
                // Non-nullable booleans have no null byte to preserve
                if kind.is_nullable() || b == 0 {
                    ValueData::Bool(b)
                } else {
                    ValueData::Bool(1)
                }
            }
            Width::Int => ValueData::Int(i32::from_le_bytes(take(kind, raw)?)),
            Width::Float => ValueData::Float(f32::from_le_bytes(take(kind, raw)?)),
            Width::I8 => ValueData::I8(i8::from_le_bytes(take(kind, raw)?)),
            Width::I16 => ValueData::I16(i16::from_le_bytes(take(kind, raw)?)),
            Width::I32 => ValueData::I32(i32::from_le_bytes(take(kind, raw)?)),
            Width::I64 => ValueData::I64(i64::from_le_bytes(take(kind, raw)?)),
            Width::U8 => ValueData::U8(u8::from_le_bytes(take(kind, raw)?)),
            Width::U16 => ValueData::U16(u16::from_le_bytes(take(kind, raw)?)),
            Width::U32 => ValueData::U32(u32::from_le_bytes(take(kind, raw)?)),
            Width::U64 => ValueData::U64(u64::from_le_bytes(take(kind, raw)?)),
            Width::Bytes => return Self::bytes_from_raw(kind, raw),
        };
        AttributeValue::new(kind, data)
    }

    fn bytes_from_raw(kind: ValueKind, raw: &'a [u8]) -> Result<Self> {
        let prefix = match kind.prefix_width() {
            Some(1) => raw.first().map(|&b| b as u16),
            Some(_) => raw.get(..2).map(|b| u16::from_le_bytes([b[0], b[1]])),
            None => None,
        }
        .ok_or_else(|| Error::invalid(format!("raw {kind} value is missing its length prefix")))?;
        let width = kind.prefix_width().unwrap_or(0) as usize;
        let body = &raw[width..];

        if kind == ValueKind::Array {
            return Ok(Self::array(body, prefix));
        }
        // A null is the bare all-ones prefix; a full-length value carries its content
        if Some(prefix) == kind.null_length() && body.len() < prefix as usize {
            return Self::bytes(kind, None);
        }
        let content = body.get(..prefix as usize).ok_or_else(|| {
            Error::invalid(format!(
                "raw {kind} value declares {prefix} bytes but holds {}",
                body.len()
            ))
        })?;
        Self::bytes(kind, Some(content))
    }
}
