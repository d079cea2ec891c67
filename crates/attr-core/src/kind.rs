//! Value kinds.
//!
//! Every fixed-width kind has a nullable counterpart. Nullability is kept
//! orthogonal to the base kind: [`ValueKind::base`] strips it and
//! [`ValueKind::is_nullable`] tests it, so the codec and the comparison logic
//! can treat `NullableUint16` and `Uint16` identically once null has been
//! handled.

use serde::{Deserialize, Serialize};

/// The kind of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    Invalid,
    Boolean,
    Integer,
    Float,
    Array,
    CharString,
    OctetString,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Enum8,
    Bitmap8,
    Bitmap16,
    Bitmap32,
    Enum16,
    LongCharString,
    LongOctetString,
    NullableBoolean,
    NullableInteger,
    NullableFloat,
    NullableInt8,
    NullableUint8,
    NullableInt16,
    NullableUint16,
    NullableInt32,
    NullableUint32,
    NullableInt64,
    NullableUint64,
    NullableEnum8,
    NullableBitmap8,
    NullableBitmap16,
    NullableBitmap32,
    NullableEnum16,
}

/// Storage width shared by kinds with the same in-memory representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    None,
    Bool,
    Int,
    Float,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bytes,
}

/// Flag added to the numeric kind code of nullable kinds.
const NULLABLE_CODE: u8 = 0x80;

impl ValueKind {
    /// Every kind, in numeric code order.
    pub const ALL: [ValueKind; 38] = [
        ValueKind::Invalid,
        ValueKind::Boolean,
        ValueKind::Integer,
        ValueKind::Float,
        ValueKind::Array,
        ValueKind::CharString,
        ValueKind::OctetString,
        ValueKind::Int8,
        ValueKind::Uint8,
        ValueKind::Int16,
        ValueKind::Uint16,
        ValueKind::Int32,
        ValueKind::Uint32,
        ValueKind::Int64,
        ValueKind::Uint64,
        ValueKind::Enum8,
        ValueKind::Bitmap8,
        ValueKind::Bitmap16,
        ValueKind::Bitmap32,
        ValueKind::Enum16,
        ValueKind::LongCharString,
        ValueKind::LongOctetString,
        ValueKind::NullableBoolean,
        ValueKind::NullableInteger,
        ValueKind::NullableFloat,
        ValueKind::NullableInt8,
        ValueKind::NullableUint8,
        ValueKind::NullableInt16,
        ValueKind::NullableUint16,
        ValueKind::NullableInt32,
        ValueKind::NullableUint32,
        ValueKind::NullableInt64,
        ValueKind::NullableUint64,
        ValueKind::NullableEnum8,
        ValueKind::NullableBitmap8,
        ValueKind::NullableBitmap16,
        ValueKind::NullableBitmap32,
        ValueKind::NullableEnum16,
    ];

    /// Whether this is the nullable variant of a fixed-width kind.
    pub fn is_nullable(self) -> bool {
        self.base() != self
    }

    /// The kind with nullability stripped.
    pub fn base(self) -> ValueKind {
        use ValueKind::*;
        match self {
            NullableBoolean => Boolean,
            NullableInteger => Integer,
            NullableFloat => Float,
            NullableInt8 => Int8,
            NullableUint8 => Uint8,
            NullableInt16 => Int16,
            NullableUint16 => Uint16,
            NullableInt32 => Int32,
            NullableUint32 => Uint32,
            NullableInt64 => Int64,
            NullableUint64 => Uint64,
            NullableEnum8 => Enum8,
            NullableBitmap8 => Bitmap8,
            NullableBitmap16 => Bitmap16,
            NullableBitmap32 => Bitmap32,
            NullableEnum16 => Enum16,
            other => other,
        }
    }

    /// The nullable variant of this kind, if the kind has one.
    pub fn nullable(self) -> Option<ValueKind> {
        use ValueKind::*;
        let kind = match self.base() {
            Boolean => NullableBoolean,
            Integer => NullableInteger,
            Float => NullableFloat,
            Int8 => NullableInt8,
            Uint8 => NullableUint8,
            Int16 => NullableInt16,
            Uint16 => NullableUint16,
            Int32 => NullableInt32,
            Uint32 => NullableUint32,
            Int64 => NullableInt64,
            Uint64 => NullableUint64,
            Enum8 => NullableEnum8,
            Bitmap8 => NullableBitmap8,
            Bitmap16 => NullableBitmap16,
            Bitmap32 => NullableBitmap32,
            Enum16 => NullableEnum16,
            _ => return None,
        };
        Some(kind)
    }

    /// The in-memory representation used by this kind.
    pub fn width(self) -> Width {
        use ValueKind::*;
        match self.base() {
            Invalid => Width::None,
            Boolean => Width::Bool,
            Integer => Width::Int,
            Float => Width::Float,
            Int8 => Width::I8,
            Int16 => Width::I16,
            Int32 => Width::I32,
            Int64 => Width::I64,
            Uint8 | Enum8 | Bitmap8 => Width::U8,
            Uint16 | Enum16 | Bitmap16 => Width::U16,
            Uint32 | Bitmap32 => Width::U32,
            Uint64 => Width::U64,
            CharString | LongCharString | OctetString | LongOctetString | Array => Width::Bytes,
            // base() never returns a nullable kind
            _ => Width::None,
        }
    }

    /// Strings, octet strings and arrays.
    pub fn is_byte_buffer(self) -> bool {
        self.width() == Width::Bytes
    }

    /// Character string kinds (short and long).
    pub fn is_text(self) -> bool {
        matches!(self, ValueKind::CharString | ValueKind::LongCharString)
    }

    /// Octet string kinds (short and long).
    pub fn is_octets(self) -> bool {
        matches!(self, ValueKind::OctetString | ValueKind::LongOctetString)
    }

    /// Number of bytes used by the length prefix of a byte-buffer kind.
    pub fn prefix_width(self) -> Option<u16> {
        match self {
            ValueKind::CharString | ValueKind::OctetString => Some(1),
            ValueKind::LongCharString | ValueKind::LongOctetString | ValueKind::Array => Some(2),
            _ => None,
        }
    }

    /// The logical size that marks a null string of this kind.
    pub fn null_length(self) -> Option<u16> {
        match self.prefix_width()? {
            1 => Some(u8::MAX as u16),
            _ => Some(u16::MAX),
        }
    }

    /// The largest logical size a byte-buffer kind can carry.
    pub fn max_length(self) -> Option<u16> {
        self.null_length()
    }

    /// Whether min/max bounds may be attached to attributes of this kind.
    pub fn supports_bounds(self) -> bool {
        !matches!(
            self.width(),
            Width::None | Width::Bool | Width::Bytes
        )
    }

    /// Numeric code of the kind, with 0x80 set for nullable kinds.
    pub fn code(self) -> u8 {
        use ValueKind::*;
        let base = match self.base() {
            Invalid => 0,
            Boolean => 1,
            Integer => 2,
            Float => 3,
            Array => 4,
            CharString => 5,
            OctetString => 6,
            Int8 => 7,
            Uint8 => 8,
            Int16 => 9,
            Uint16 => 10,
            Int32 => 11,
            Uint32 => 12,
            Int64 => 13,
            Uint64 => 14,
            Enum8 => 15,
            Bitmap8 => 16,
            Bitmap16 => 17,
            Bitmap32 => 18,
            Enum16 => 19,
            LongCharString => 20,
            LongOctetString => 21,
            _ => 0,
        };
        if self.is_nullable() {
            base | NULLABLE_CODE
        } else {
            base
        }
    }

    /// Map an engine attribute type identifier to a kind.
    ///
    /// Returns [`ValueKind::Invalid`] for identifiers that have no value kind.
    /// `nullable` selects the nullable variant where one exists.
    pub fn from_attribute_type(type_id: u8, nullable: bool) -> ValueKind {
        use ValueKind::*;
        let kind = match type_id {
            0x10 => Boolean,
            0x18 => Bitmap8,
            0x19 => Bitmap16,
            0x1B => Bitmap32,
            0x20 => Uint8,
            0x21 => Uint16,
            0x22 | 0x23 => Uint32,
            0x24..=0x27 => Uint64,
            0x28 => Int8,
            0x29 => Int16,
            0x2A | 0x2B => Int32,
            0x2C..=0x2F => Int64,
            0x30 => Enum8,
            0x31 => Enum16,
            0x39 => Float,
            0x41 => OctetString,
            0x42 => CharString,
            0x43 => LongOctetString,
            0x44 => LongCharString,
            0x48 => Array,
            _ => Invalid,
        };
        if nullable {
            kind.nullable().unwrap_or(kind)
        } else {
            kind
        }
    }

    fn name(self) -> &'static str {
        use ValueKind::*;
        match self.base() {
            Invalid => "invalid",
            Boolean => "boolean",
            Integer => "integer",
            Float => "float",
            Array => "array",
            CharString => "char_string",
            OctetString => "octet_string",
            Int8 => "int8",
            Uint8 => "uint8",
            Int16 => "int16",
            Uint16 => "uint16",
            Int32 => "int32",
            Uint32 => "uint32",
            Int64 => "int64",
            Uint64 => "uint64",
            Enum8 => "enum8",
            Bitmap8 => "bitmap8",
            Bitmap16 => "bitmap16",
            Bitmap32 => "bitmap32",
            Enum16 => "enum16",
            LongCharString => "long_char_string",
            LongOctetString => "long_octet_string",
            _ => "invalid",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_nullable() {
            write!(f, "nullable_{}", self.name())
        } else {
            f.write_str(self.name())
        }
    }
}

impl TryFrom<u8> for ValueKind {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        ValueKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.code() == code)
            .ok_or(code)
    }
}
