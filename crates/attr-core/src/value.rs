//! Typed attribute values.
//!
//! [`AttributeValue`] is a small `Copy` value pairing a [`ValueKind`] with its
//! payload. String, octet string and array payloads are [`ByteBuf`] views that
//! borrow caller storage, so a value never owns memory. Owning storage lives in
//! [`crate::buffer::ValueBuffer`].
//!
//! Null is represented in-band with one sentinel per width:
//! - boolean: storage byte `0xFF`
//! - unsigned integers: the maximum value
//! - signed integers and the generic integer: the minimum value
//! - float: NaN
//! - byte buffers: no data and a size of `0xFF` (short) or `0xFFFF` (long)

use crate::error::{Error, Result};
use crate::kind::{ValueKind, Width};
use tracing::warn;

/// Storage byte of a null boolean.
pub const NULL_BOOL: u8 = 0xFF;

/// A borrowed byte buffer used by string, octet string and array values.
#[derive(Debug, Clone, Copy)]
pub struct ByteBuf<'a> {
    data: Option<&'a [u8]>,
    size: u16,
    total: u32,
    count: u16,
}

impl<'a> ByteBuf<'a> {
    /// The bytes of the buffer, `None` for null values.
    pub fn data(&self) -> Option<&'a [u8]> {
        self.data
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Size including the length prefix.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Element count, only meaningful for arrays.
    pub fn count(&self) -> u16 {
        self.count
    }
}

/// Payload of an attribute value.
#[derive(Debug, Clone, Copy)]
pub enum ValueData<'a> {
    Empty,
    Bool(u8),
    Int(i32),
    Float(f32),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bytes(ByteBuf<'a>),
}

impl ValueData<'_> {
    fn width(&self) -> Width {
        match self {
            ValueData::Empty => Width::None,
            ValueData::Bool(_) => Width::Bool,
            ValueData::Int(_) => Width::Int,
            ValueData::Float(_) => Width::Float,
            ValueData::I8(_) => Width::I8,
            ValueData::I16(_) => Width::I16,
            ValueData::I32(_) => Width::I32,
            ValueData::I64(_) => Width::I64,
            ValueData::U8(_) => Width::U8,
            ValueData::U16(_) => Width::U16,
            ValueData::U32(_) => Width::U32,
            ValueData::U64(_) => Width::U64,
            ValueData::Bytes(_) => Width::Bytes,
        }
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, Copy)]
pub struct AttributeValue<'a> {
    kind: ValueKind,
    data: ValueData<'a>,
}

macro_rules! fixed_width {
    ($((
        $plain:ident,
        $nullable:ident,
        $ty:ty,
        $variant:ident,
        $kind:ident,
        $nkind:ident,
        $sentinel:expr
    )),* $(,)?) => {
        $(
            pub fn $plain(value: $ty) -> Self {
                Self { kind: ValueKind::$kind, data: ValueData::$variant(value) }
            }

            pub fn $nullable(value: Option<$ty>) -> Self {
                Self {
                    kind: ValueKind::$nkind,
                    data: ValueData::$variant(value.unwrap_or($sentinel)),
                }
            }
        )*
    };
}

impl<'a> AttributeValue<'a> {
    /// A value of the invalid kind, carrying no payload.
    pub const fn invalid() -> Self {
        Self {
            kind: ValueKind::Invalid,
            data: ValueData::Empty,
        }
    }

    /// Build a value from a kind and a payload of the matching width.
    pub fn new(kind: ValueKind, data: ValueData<'a>) -> Result<Self> {
        if kind.width() != data.width() {
            return Err(Error::invalid(format!(
                "payload does not match kind {kind}"
            )));
        }
        if let ValueData::Bytes(buf) = data {
            let bytes = match buf.data {
                None if Some(buf.size) != kind.null_length() => Some(&[][..]),
                other => other,
            };
            return Self::bytes(kind, bytes).map(|mut value| {
                if let ValueData::Bytes(ref mut own) = value.data {
                    own.count = buf.count;
                }
                value
            });
        }
        Ok(Self { kind, data })
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            kind: ValueKind::Boolean,
            data: ValueData::Bool(value as u8),
        }
    }

    pub fn nullable_boolean(value: Option<bool>) -> Self {
        Self {
            kind: ValueKind::NullableBoolean,
            data: ValueData::Bool(value.map_or(NULL_BOOL, |v| v as u8)),
        }
    }

    fixed_width!(
        (integer, nullable_integer, i32, Int, Integer, NullableInteger, i32::MIN),
        (float, nullable_float, f32, Float, Float, NullableFloat, f32::NAN),
        (int8, nullable_int8, i8, I8, Int8, NullableInt8, i8::MIN),
        (int16, nullable_int16, i16, I16, Int16, NullableInt16, i16::MIN),
        (int32, nullable_int32, i32, I32, Int32, NullableInt32, i32::MIN),
        (int64, nullable_int64, i64, I64, Int64, NullableInt64, i64::MIN),
        (uint8, nullable_uint8, u8, U8, Uint8, NullableUint8, u8::MAX),
        (uint16, nullable_uint16, u16, U16, Uint16, NullableUint16, u16::MAX),
        (uint32, nullable_uint32, u32, U32, Uint32, NullableUint32, u32::MAX),
        (uint64, nullable_uint64, u64, U64, Uint64, NullableUint64, u64::MAX),
        (enum8, nullable_enum8, u8, U8, Enum8, NullableEnum8, u8::MAX),
        (enum16, nullable_enum16, u16, U16, Enum16, NullableEnum16, u16::MAX),
        (bitmap8, nullable_bitmap8, u8, U8, Bitmap8, NullableBitmap8, u8::MAX),
        (bitmap16, nullable_bitmap16, u16, U16, Bitmap16, NullableBitmap16, u16::MAX),
        (bitmap32, nullable_bitmap32, u32, U32, Bitmap32, NullableBitmap32, u32::MAX),
    );

    /// A byte-buffer value of `kind` viewing `data`, or the null value when
    /// `data` is `None`.
    ///
    /// Slices longer than the kind's maximum length are truncated.
    pub fn bytes(kind: ValueKind, data: Option<&'a [u8]>) -> Result<Self> {
        let (Some(prefix), Some(null_length)) = (kind.prefix_width(), kind.null_length()) else {
            return Err(Error::invalid(format!("{kind} is not a byte buffer kind")));
        };
        let buf = match data {
            None => ByteBuf {
                data: None,
                size: null_length,
                total: prefix as u32,
                count: 0,
            },
            Some(bytes) => {
                let bytes = if bytes.len() > null_length as usize {
                    warn!(
                        "Truncating {} value from {} to {} bytes",
                        kind,
                        bytes.len(),
                        null_length
                    );
                    &bytes[..null_length as usize]
                } else {
                    bytes
                };
                let size = bytes.len() as u16;
                ByteBuf {
                    data: Some(bytes),
                    size,
                    total: size as u32 + prefix as u32,
                    count: 0,
                }
            }
        };
        Ok(Self {
            kind,
            data: ValueData::Bytes(buf),
        })
    }

    /// A byte-buffer value over storage owned elsewhere in the crate.
    pub(crate) fn from_storage(
        kind: ValueKind,
        data: Option<&'a [u8]>,
        size: u16,
        count: u16,
    ) -> Self {
        let prefix = kind.prefix_width().unwrap_or(0) as u32;
        let total = match data {
            Some(_) => size as u32 + prefix,
            None => prefix,
        };
        Self {
            kind,
            data: ValueData::Bytes(ByteBuf {
                data,
                size,
                total,
                count,
            }),
        }
    }

    fn bytes_of(kind: ValueKind, data: Option<&'a [u8]>) -> Self {
        // Only called with byte-buffer kinds
        Self::bytes(kind, data).unwrap_or(Self::invalid())
    }

    pub fn char_string(value: &'a str) -> Self {
        Self::bytes_of(ValueKind::CharString, Some(value.as_bytes()))
    }

    pub fn long_char_string(value: &'a str) -> Self {
        Self::bytes_of(ValueKind::LongCharString, Some(value.as_bytes()))
    }

    /// A character string over raw bytes that need not be valid UTF-8.
    pub fn char_string_bytes(value: &'a [u8]) -> Self {
        Self::bytes_of(ValueKind::CharString, Some(value))
    }

    pub fn long_char_string_bytes(value: &'a [u8]) -> Self {
        Self::bytes_of(ValueKind::LongCharString, Some(value))
    }

    pub fn octet_string(value: &'a [u8]) -> Self {
        Self::bytes_of(ValueKind::OctetString, Some(value))
    }

    pub fn long_octet_string(value: &'a [u8]) -> Self {
        Self::bytes_of(ValueKind::LongOctetString, Some(value))
    }

    pub fn null_char_string() -> Self {
        Self::bytes_of(ValueKind::CharString, None)
    }

    pub fn null_long_char_string() -> Self {
        Self::bytes_of(ValueKind::LongCharString, None)
    }

    pub fn null_octet_string() -> Self {
        Self::bytes_of(ValueKind::OctetString, None)
    }

    pub fn null_long_octet_string() -> Self {
        Self::bytes_of(ValueKind::LongOctetString, None)
    }

    /// An array value over `data` holding `count` encoded elements.
    pub fn array(data: &'a [u8], count: u16) -> Self {
        let mut value = Self::bytes_of(ValueKind::Array, Some(data));
        if let ValueData::Bytes(ref mut buf) = value.data {
            buf.count = count;
        }
        value
    }

    /// The null value of `kind`.
    ///
    /// Fails with `Unsupported` for kinds that have no null representation.
    pub fn null(kind: ValueKind) -> Result<Self> {
        if kind.is_byte_buffer() {
            return Self::bytes(kind, None);
        }
        if !kind.is_nullable() {
            return Err(Error::Unsupported(kind));
        }
        let data = match kind.width() {
            Width::Bool => ValueData::Bool(NULL_BOOL),
            Width::Int => ValueData::Int(i32::MIN),
            Width::Float => ValueData::Float(f32::NAN),
            Width::I8 => ValueData::I8(i8::MIN),
            Width::I16 => ValueData::I16(i16::MIN),
            Width::I32 => ValueData::I32(i32::MIN),
            Width::I64 => ValueData::I64(i64::MIN),
            Width::U8 => ValueData::U8(u8::MAX),
            Width::U16 => ValueData::U16(u16::MAX),
            Width::U32 => ValueData::U32(u32::MAX),
            Width::U64 => ValueData::U64(u64::MAX),
            Width::None | Width::Bytes => return Err(Error::Unsupported(kind)),
        };
        Ok(Self { kind, data })
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn data(&self) -> &ValueData<'a> {
        &self.data
    }

    /// Whether the value holds its kind's null sentinel.
    ///
    /// Non-nullable fixed-width kinds are never null.
    pub fn is_null(&self) -> bool {
        match self.data {
            ValueData::Bytes(buf) => {
                buf.data.is_none() && Some(buf.size) == self.kind.null_length()
            }
            _ if !self.kind.is_nullable() => false,
            ValueData::Bool(v) => v == NULL_BOOL,
            ValueData::Int(v) => v == i32::MIN,
            ValueData::Float(v) => v.is_nan(),
            ValueData::I8(v) => v == i8::MIN,
            ValueData::I16(v) => v == i16::MIN,
            ValueData::I32(v) => v == i32::MIN,
            ValueData::I64(v) => v == i64::MIN,
            ValueData::U8(v) => v == u8::MAX,
            ValueData::U16(v) => v == u16::MAX,
            ValueData::U32(v) => v == u32::MAX,
            ValueData::U64(v) => v == u64::MAX,
            ValueData::Empty => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data {
            ValueData::Bool(v) if !self.is_null() => Some(v != 0),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self.data {
            ValueData::Int(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self.data {
            ValueData::Float(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<i8> {
        match self.data {
            ValueData::I8(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self.data {
            ValueData::I16(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self.data {
            ValueData::I32(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.data {
            ValueData::I64(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    /// The 8-bit unsigned payload of uint8, enum8 and bitmap8 values.
    pub fn as_u8(&self) -> Option<u8> {
        match self.data {
            ValueData::U8(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self.data {
            ValueData::U16(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self.data {
            ValueData::U32(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.data {
            ValueData::U64(v) if !self.is_null() => Some(v),
            _ => None,
        }
    }

    /// The byte buffer of string, octet string and array values.
    pub fn as_buf(&self) -> Option<&ByteBuf<'a>> {
        match &self.data {
            ValueData::Bytes(buf) => Some(buf),
            _ => None,
        }
    }

    /// The content bytes of a non-null byte-buffer value.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        self.as_buf().and_then(|buf| buf.data)
    }

    /// The content of a non-null character string value, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        if !self.kind.is_text() {
            return None;
        }
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Copy a fixed-width value out of any borrowed storage.
    ///
    /// Returns `None` for byte-buffer kinds.
    pub fn to_owned_scalar(&self) -> Option<AttributeValue<'static>> {
        let data = match self.data {
            ValueData::Bytes(_) => return None,
            ValueData::Empty => ValueData::Empty,
            ValueData::Bool(v) => ValueData::Bool(v),
            ValueData::Int(v) => ValueData::Int(v),
            ValueData::Float(v) => ValueData::Float(v),
            ValueData::I8(v) => ValueData::I8(v),
            ValueData::I16(v) => ValueData::I16(v),
            ValueData::I32(v) => ValueData::I32(v),
            ValueData::I64(v) => ValueData::I64(v),
            ValueData::U8(v) => ValueData::U8(v),
            ValueData::U16(v) => ValueData::U16(v),
            ValueData::U32(v) => ValueData::U32(v),
            ValueData::U64(v) => ValueData::U64(v),
        };
        Some(AttributeValue {
            kind: self.kind,
            data,
        })
    }

    /// Numeric payload widened for ordering, `None` for null and non-numeric values.
    pub(crate) fn ordinal(&self) -> Option<Ordinal> {
        if self.is_null() {
            return None;
        }
        match self.data {
            ValueData::Int(v) | ValueData::I32(v) => Some(Ordinal::Int(v as i128)),
            ValueData::I8(v) => Some(Ordinal::Int(v as i128)),
            ValueData::I16(v) => Some(Ordinal::Int(v as i128)),
            ValueData::I64(v) => Some(Ordinal::Int(v as i128)),
            ValueData::U8(v) => Some(Ordinal::Int(v as i128)),
            ValueData::U16(v) => Some(Ordinal::Int(v as i128)),
            ValueData::U32(v) => Some(Ordinal::Int(v as i128)),
            ValueData::U64(v) => Some(Ordinal::Int(v as i128)),
            ValueData::Float(v) => Some(Ordinal::Float(v)),
            ValueData::Empty | ValueData::Bool(_) | ValueData::Bytes(_) => None,
        }
    }

    /// Type-aware equality, see [`compare`].
    pub fn equals(&self, other: &AttributeValue<'_>) -> Result<bool> {
        compare(Some(self), Some(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub(crate) enum Ordinal {
    Int(i128),
    Float(f32),
}

/// Compare two optional values.
///
/// Two missing values are equal and exactly one missing value is unequal.
/// Values of different kinds are unequal. Byte buffers compare by size first;
/// two empty buffers are equal, two null buffers are equal and a null buffer
/// never equals a present one. Two nulls of the same fixed-width kind are equal.
///
/// Fails with `Unsupported` when both values have the invalid kind.
pub fn compare(a: Option<&AttributeValue<'_>>, b: Option<&AttributeValue<'_>>) -> Result<bool> {
    let (a, b) = match (a, b) {
        (None, None) => return Ok(true),
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(false),
    };
    if a.kind != b.kind {
        return Ok(false);
    }
    if a.kind == ValueKind::Invalid {
        return Err(Error::Unsupported(a.kind));
    }

    let equal = match (&a.data, &b.data) {
        (ValueData::Bytes(x), ValueData::Bytes(y)) => {
            if x.size != y.size {
                false
            } else if x.size == 0 {
                true
            } else {
                match (x.data, y.data) {
                    (None, None) => true,
                    (Some(p), Some(q)) => {
                        let n = x.size as usize;
                        p.get(..n) == q.get(..n)
                    }
                    _ => false,
                }
            }
        }
        (ValueData::Float(x), ValueData::Float(y)) => (x.is_nan() && y.is_nan()) || x == y,
        (ValueData::Bool(x), ValueData::Bool(y)) => {
            // Any non-zero, non-null byte is true
            a.is_null() == b.is_null() && (a.is_null() || (*x != 0) == (*y != 0))
        }
        (ValueData::Int(x), ValueData::Int(y)) => x == y,
        (ValueData::I8(x), ValueData::I8(y)) => x == y,
        (ValueData::I16(x), ValueData::I16(y)) => x == y,
        (ValueData::I32(x), ValueData::I32(y)) => x == y,
        (ValueData::I64(x), ValueData::I64(y)) => x == y,
        (ValueData::U8(x), ValueData::U8(y)) => x == y,
        (ValueData::U16(x), ValueData::U16(y)) => x == y,
        (ValueData::U32(x), ValueData::U32(y)) => x == y,
        (ValueData::U64(x), ValueData::U64(y)) => x == y,
        _ => return Err(Error::Unsupported(a.kind)),
    };
    Ok(equal)
}

impl std::fmt::Display for AttributeValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind == ValueKind::Invalid {
            return write!(f, "<invalid type: {}>", self.kind.code());
        }
        if self.is_null() {
            return f.write_str("null");
        }
        match self.data {
            ValueData::Empty => write!(f, "<invalid type: {}>", self.kind.code()),
            ValueData::Bool(v) => write!(f, "{}", v != 0),
            ValueData::Int(v) | ValueData::I32(v) => write!(f, "{v}"),
            ValueData::Float(v) => write!(f, "{v}"),
            ValueData::I8(v) => write!(f, "{v}"),
            ValueData::I16(v) => write!(f, "{v}"),
            ValueData::I64(v) => write!(f, "{v}"),
            ValueData::U8(v) => write!(f, "{v}"),
            ValueData::U16(v) => write!(f, "{v}"),
            ValueData::U32(v) => write!(f, "{v}"),
            ValueData::U64(v) => write!(f, "{v}"),
            ValueData::Bytes(buf) => {
                let bytes = buf.data.unwrap_or_default();
                if self.kind.is_text() {
                    write!(f, "{}", String::from_utf8_lossy(bytes))
                } else if self.kind == ValueKind::Array {
                    write!(f, "array of {} elements ({} bytes)", buf.count, buf.size)
                } else {
                    for byte in bytes {
                        write!(f, "{byte:02x}")?;
                    }
                    Ok(())
                }
            }
        }
    }
}
