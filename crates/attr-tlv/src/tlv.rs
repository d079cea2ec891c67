//! Tag-length-value reader and writer.
//!
//! Every element starts with a control byte: the tag control in bits 7..5 and
//! the element type in bits 4..0. Anonymous tags carry no tag bytes, context
//! tags carry one. Integers are written at the smallest width that holds the
//! value, and all multi-byte fields are little-endian.

use thiserror::Error;

const TAG_ANONYMOUS: u8 = 0x00;
const TAG_CONTEXT: u8 = 0x20;
const TAG_MASK: u8 = 0xE0;
const TYPE_MASK: u8 = 0x1F;

/// Element tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Anonymous,
    Context(u8),
}

impl Tag {
    fn control(self) -> u8 {
        match self {
            Tag::Anonymous => TAG_ANONYMOUS,
            Tag::Context(_) => TAG_CONTEXT,
        }
    }

    fn encoded_len(self) -> usize {
        match self {
            Tag::Anonymous => 0,
            Tag::Context(_) => 1,
        }
    }
}

/// Element type, the low five bits of the control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementType {
    Int8 = 0x00,
    Int16 = 0x01,
    Int32 = 0x02,
    Int64 = 0x03,
    UInt8 = 0x04,
    UInt16 = 0x05,
    UInt32 = 0x06,
    UInt64 = 0x07,
    False = 0x08,
    True = 0x09,
    Float32 = 0x0A,
    Float64 = 0x0B,
    Utf8String1 = 0x0C,
    Utf8String2 = 0x0D,
    Utf8String4 = 0x0E,
    Utf8String8 = 0x0F,
    ByteString1 = 0x10,
    ByteString2 = 0x11,
    ByteString4 = 0x12,
    ByteString8 = 0x13,
    Null = 0x14,
    Structure = 0x15,
    Array = 0x16,
    List = 0x17,
    EndOfContainer = 0x18,
}

impl ElementType {
    pub fn from_u8(code: u8) -> Option<Self> {
        use ElementType::*;
        let element_type = match code {
            0x00 => Int8,
            0x01 => Int16,
            0x02 => Int32,
            0x03 => Int64,
            0x04 => UInt8,
            0x05 => UInt16,
            0x06 => UInt32,
            0x07 => UInt64,
            0x08 => False,
            0x09 => True,
            0x0A => Float32,
            0x0B => Float64,
            0x0C => Utf8String1,
            0x0D => Utf8String2,
            0x0E => Utf8String4,
            0x0F => Utf8String8,
            0x10 => ByteString1,
            0x11 => ByteString2,
            0x12 => ByteString4,
            0x13 => ByteString8,
            0x14 => Null,
            0x15 => Structure,
            0x16 => Array,
            0x17 => List,
            0x18 => EndOfContainer,
            _ => return None,
        };
        Some(element_type)
    }

    /// Width in bytes of the value field for integers and floats, or of the
    /// length field for strings.
    fn field_width(self) -> usize {
        use ElementType::*;
        match self {
            Int8 | UInt8 | Utf8String1 | ByteString1 => 1,
            Int16 | UInt16 | Utf8String2 | ByteString2 => 2,
            Int32 | UInt32 | Float32 | Utf8String4 | ByteString4 => 4,
            Int64 | UInt64 | Float64 | Utf8String8 | ByteString8 => 8,
            False | True | Null | Structure | Array | List | EndOfContainer => 0,
        }
    }

    pub fn is_utf8_string(self) -> bool {
        matches!(
            self,
            ElementType::Utf8String1
                | ElementType::Utf8String2
                | ElementType::Utf8String4
                | ElementType::Utf8String8
        )
    }

    pub fn is_byte_string(self) -> bool {
        matches!(
            self,
            ElementType::ByteString1
                | ElementType::ByteString2
                | ElementType::ByteString4
                | ElementType::ByteString8
        )
    }

    fn string_type(utf8: bool, len: usize) -> Self {
        use ElementType::*;
        match (utf8, len) {
            (true, 0..=0xFF) => Utf8String1,
            (true, 0x100..=0xFFFF) => Utf8String2,
            (true, _) if len as u64 <= u32::MAX as u64 => Utf8String4,
            (true, _) => Utf8String8,
            (false, 0..=0xFF) => ByteString1,
            (false, 0x100..=0xFFFF) => ByteString2,
            (false, _) if len as u64 <= u32::MAX as u64 => ByteString4,
            (false, _) => ByteString8,
        }
    }
}

/// Errors produced while reading or writing TLV data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TlvError {
    /// The writer's buffer cannot hold the element.
    #[error("Buffer too small: required {required}, available {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// The data ended inside an element.
    #[error("Unexpected end of TLV data")]
    EndOfData,

    /// The control byte names an unknown element type.
    #[error("Invalid element type in control byte 0x{0:02X}")]
    InvalidElementType(u8),

    /// The control byte uses a tag form this reader does not handle.
    #[error("Unsupported tag control in control byte 0x{0:02X}")]
    UnsupportedTag(u8),

    /// A getter was called on an element of another type.
    #[error("Wrong element type: expected {expected}, found {found:?}")]
    WrongType {
        expected: &'static str,
        found: Option<ElementType>,
    },

    /// An integer does not fit the requested width.
    #[error("Value out of range")]
    ValueOutOfRange,

    /// No element has been read yet.
    #[error("Reader is not positioned on an element")]
    NoElement,
}

/// Sink for TLV elements.
pub trait TlvWrite {
    fn put_bool(&mut self, tag: Tag, value: bool) -> Result<(), TlvError>;

    /// Write a signed integer at the smallest width that holds it.
    fn put_signed(&mut self, tag: Tag, value: i64) -> Result<(), TlvError>;

    /// Write an unsigned integer at the smallest width that holds it.
    fn put_unsigned(&mut self, tag: Tag, value: u64) -> Result<(), TlvError>;

    fn put_float(&mut self, tag: Tag, value: f32) -> Result<(), TlvError>;

    /// Write a UTF-8 string element. The bytes are written as given.
    fn put_string(&mut self, tag: Tag, value: &[u8]) -> Result<(), TlvError>;

    /// Write a byte string element.
    fn put_bytes(&mut self, tag: Tag, value: &[u8]) -> Result<(), TlvError>;

    fn put_null(&mut self, tag: Tag) -> Result<(), TlvError>;
}

/// Source of TLV elements, positioned on the current element.
pub trait TlvRead {
    /// Type of the current element, `None` before the first element.
    fn element_type(&self) -> Option<ElementType>;

    fn tag(&self) -> Option<Tag>;

    fn get_bool(&self) -> Result<bool, TlvError>;

    fn get_i64(&self) -> Result<i64, TlvError>;

    fn get_u64(&self) -> Result<u64, TlvError>;

    fn get_f32(&self) -> Result<f32, TlvError>;

    /// Length in bytes of the current string element.
    fn length(&self) -> Result<usize, TlvError>;

    fn get_string(&self) -> Result<&[u8], TlvError>;

    fn get_bytes(&self) -> Result<&[u8], TlvError>;

    fn get_i8(&self) -> Result<i8, TlvError> {
        i8::try_from(self.get_i64()?).map_err(|_| TlvError::ValueOutOfRange)
    }

    fn get_i16(&self) -> Result<i16, TlvError> {
        i16::try_from(self.get_i64()?).map_err(|_| TlvError::ValueOutOfRange)
    }

    fn get_i32(&self) -> Result<i32, TlvError> {
        i32::try_from(self.get_i64()?).map_err(|_| TlvError::ValueOutOfRange)
    }

    fn get_u8(&self) -> Result<u8, TlvError> {
        u8::try_from(self.get_u64()?).map_err(|_| TlvError::ValueOutOfRange)
    }

    fn get_u16(&self) -> Result<u16, TlvError> {
        u16::try_from(self.get_u64()?).map_err(|_| TlvError::ValueOutOfRange)
    }

    fn get_u32(&self) -> Result<u32, TlvError> {
        u32::try_from(self.get_u64()?).map_err(|_| TlvError::ValueOutOfRange)
    }
}

/// A TLV writer appending to an owned buffer, optionally bounded.
#[derive(Debug, Clone, Default)]
pub struct TlvWriter {
    buf: Vec<u8>,
    limit: Option<usize>,
}

impl TlvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer that refuses to grow past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            limit: Some(limit),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Write one element: control byte, tag, then `field` and `body`.
    fn element(
        &mut self,
        tag: Tag,
        element_type: ElementType,
        field: &[u8],
        body: &[u8],
    ) -> Result<(), TlvError> {
        let required = 1 + tag.encoded_len() + field.len() + body.len();
        if let Some(limit) = self.limit {
            let available = limit.saturating_sub(self.buf.len());
            if required > available {
                return Err(TlvError::BufferTooSmall {
                    required,
                    available,
                });
            }
        }
        self.buf.push(tag.control() | element_type as u8);
        if let Tag::Context(id) = tag {
            self.buf.push(id);
        }
        self.buf.extend_from_slice(field);
        self.buf.extend_from_slice(body);
        Ok(())
    }

    fn string_element(&mut self, tag: Tag, utf8: bool, value: &[u8]) -> Result<(), TlvError> {
        let element_type = ElementType::string_type(utf8, value.len());
        let len = (value.len() as u64).to_le_bytes();
        self.element(tag, element_type, &len[..element_type.field_width()], value)
    }
}

impl TlvWrite for TlvWriter {
    fn put_bool(&mut self, tag: Tag, value: bool) -> Result<(), TlvError> {
        let element_type = if value {
            ElementType::True
        } else {
            ElementType::False
        };
        self.element(tag, element_type, &[], &[])
    }

    fn put_signed(&mut self, tag: Tag, value: i64) -> Result<(), TlvError> {
        let bytes = value.to_le_bytes();
        if let Ok(v) = i8::try_from(value) {
            self.element(tag, ElementType::Int8, &v.to_le_bytes(), &[])
        } else if i16::try_from(value).is_ok() {
            self.element(tag, ElementType::Int16, &bytes[..2], &[])
        } else if i32::try_from(value).is_ok() {
            self.element(tag, ElementType::Int32, &bytes[..4], &[])
        } else {
            self.element(tag, ElementType::Int64, &bytes, &[])
        }
    }

    fn put_unsigned(&mut self, tag: Tag, value: u64) -> Result<(), TlvError> {
        let bytes = value.to_le_bytes();
        let (element_type, width) = match value {
            0..=0xFF => (ElementType::UInt8, 1),
            0x100..=0xFFFF => (ElementType::UInt16, 2),
            0x1_0000..=0xFFFF_FFFF => (ElementType::UInt32, 4),
            _ => (ElementType::UInt64, 8),
        };
        self.element(tag, element_type, &bytes[..width], &[])
    }

    fn put_float(&mut self, tag: Tag, value: f32) -> Result<(), TlvError> {
        self.element(tag, ElementType::Float32, &value.to_le_bytes(), &[])
    }

    fn put_string(&mut self, tag: Tag, value: &[u8]) -> Result<(), TlvError> {
        self.string_element(tag, true, value)
    }

    fn put_bytes(&mut self, tag: Tag, value: &[u8]) -> Result<(), TlvError> {
        self.string_element(tag, false, value)
    }

    fn put_null(&mut self, tag: Tag) -> Result<(), TlvError> {
        self.element(tag, ElementType::Null, &[], &[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Payload<'a> {
    None,
    Signed(i64),
    Unsigned(u64),
    Bool(bool),
    Float(f32),
    Double(f64),
    Str(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Element<'a> {
    tag: Tag,
    element_type: ElementType,
    payload: Payload<'a>,
}

/// A TLV reader over a borrowed byte slice.
///
/// Containers are not entered or skipped; their start and end markers are
/// returned as elements in stream order.
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    data: &'a [u8],
    pos: usize,
    current: Option<Element<'a>>,
}

impl<'a> TlvReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            current: None,
        }
    }

    /// Advance to the next element. Returns `None` at the end of the data.
    pub fn next(&mut self) -> Result<Option<ElementType>, TlvError> {
        if self.pos >= self.data.len() {
            self.current = None;
            return Ok(None);
        }
        let control = self.take(1)?[0];
        let element_type =
            ElementType::from_u8(control & TYPE_MASK).ok_or(TlvError::InvalidElementType(control))?;
        let tag = match control & TAG_MASK {
            TAG_ANONYMOUS => Tag::Anonymous,
            TAG_CONTEXT => Tag::Context(self.take(1)?[0]),
            _ => return Err(TlvError::UnsupportedTag(control)),
        };

        let width = element_type.field_width();
        let payload = match element_type {
            ElementType::Int8 | ElementType::Int16 | ElementType::Int32 | ElementType::Int64 => {
                let field = self.take(width)?;
                // Sign-extend from the field width
                let mut bytes = if field[width - 1] & 0x80 != 0 { [0xFF; 8] } else { [0; 8] };
                bytes[..width].copy_from_slice(field);
                Payload::Signed(i64::from_le_bytes(bytes))
            }
            ElementType::UInt8
            | ElementType::UInt16
            | ElementType::UInt32
            | ElementType::UInt64 => Payload::Unsigned(self.take_le(width)?),
            ElementType::False => Payload::Bool(false),
            ElementType::True => Payload::Bool(true),
            ElementType::Float32 => {
                let bits = self.take_le(4)? as u32;
                Payload::Float(f32::from_bits(bits))
            }
            ElementType::Float64 => Payload::Double(f64::from_bits(self.take_le(8)?)),
            t if t.is_utf8_string() || t.is_byte_string() => {
                let len = usize::try_from(self.take_le(width)?).map_err(|_| TlvError::EndOfData)?;
                Payload::Str(self.take(len)?)
            }
            _ => Payload::None,
        };

        self.current = Some(Element {
            tag,
            element_type,
            payload,
        });
        Ok(Some(element_type))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TlvError> {
        let end = self.pos.checked_add(n).ok_or(TlvError::EndOfData)?;
        let bytes = self.data.get(self.pos..end).ok_or(TlvError::EndOfData)?;
        self.pos = end;
        Ok(bytes)
    }

    fn take_le(&mut self, n: usize) -> Result<u64, TlvError> {
        let field = self.take(n)?;
        let mut bytes = [0u8; 8];
        bytes[..n].copy_from_slice(field);
        Ok(u64::from_le_bytes(bytes))
    }

    fn current(&self) -> Result<&Element<'a>, TlvError> {
        self.current.as_ref().ok_or(TlvError::NoElement)
    }

    fn wrong_type(&self, expected: &'static str) -> TlvError {
        TlvError::WrongType {
            expected,
            found: self.element_type(),
        }
    }
}

impl TlvRead for TlvReader<'_> {
    fn element_type(&self) -> Option<ElementType> {
        self.current.map(|e| e.element_type)
    }

    fn tag(&self) -> Option<Tag> {
        self.current.map(|e| e.tag)
    }

    fn get_bool(&self) -> Result<bool, TlvError> {
        match self.current()?.payload {
            Payload::Bool(v) => Ok(v),
            _ => Err(self.wrong_type("boolean")),
        }
    }

    fn get_i64(&self) -> Result<i64, TlvError> {
        match self.current()?.payload {
            Payload::Signed(v) => Ok(v),
            _ => Err(self.wrong_type("signed integer")),
        }
    }

    fn get_u64(&self) -> Result<u64, TlvError> {
        match self.current()?.payload {
            Payload::Unsigned(v) => Ok(v),
            _ => Err(self.wrong_type("unsigned integer")),
        }
    }

    fn get_f32(&self) -> Result<f32, TlvError> {
        match self.current()?.payload {
            Payload::Float(v) => Ok(v),
            Payload::Double(v) => {
                let narrowed = v as f32;
                if narrowed as f64 == v || v.is_nan() {
                    Ok(narrowed)
                } else {
                    Err(TlvError::ValueOutOfRange)
                }
            }
            _ => Err(self.wrong_type("float")),
        }
    }

    fn length(&self) -> Result<usize, TlvError> {
        match self.current()?.payload {
            Payload::Str(bytes) => Ok(bytes.len()),
            _ => Err(self.wrong_type("string")),
        }
    }

    fn get_string(&self) -> Result<&[u8], TlvError> {
        let element = self.current()?;
        match element.payload {
            Payload::Str(bytes) if element.element_type.is_utf8_string() => Ok(bytes),
            _ => Err(self.wrong_type("UTF-8 string")),
        }
    }

    fn get_bytes(&self) -> Result<&[u8], TlvError> {
        let element = self.current()?;
        match element.payload {
            Payload::Str(bytes) if element.element_type.is_byte_string() => Ok(bytes),
            _ => Err(self.wrong_type("byte string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_integer_widths() {
        let mut writer = TlvWriter::new();
        writer.put_unsigned(Tag::Anonymous, 300).unwrap();
        writer.put_unsigned(Tag::Anonymous, 7).unwrap();
        writer.put_signed(Tag::Anonymous, -2).unwrap();
        writer.put_signed(Tag::Anonymous, -40000).unwrap();
        assert_eq!(
            writer.as_bytes(),
            &[0x05, 0x2C, 0x01, 0x04, 0x07, 0x00, 0xFE, 0x02, 0xC0, 0x63, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_context_tag_and_null() {
        let mut writer = TlvWriter::new();
        writer.put_null(Tag::Anonymous).unwrap();
        writer.put_null(Tag::Context(1)).unwrap();
        writer.put_bool(Tag::Context(2), true).unwrap();
        assert_eq!(writer.as_bytes(), &[0x14, 0x34, 0x01, 0x29, 0x02]);
    }

    #[test]
    fn test_strings() {
        let mut writer = TlvWriter::new();
        writer.put_string(Tag::Anonymous, b"abc").unwrap();
        writer.put_bytes(Tag::Anonymous, &[]).unwrap();
        assert_eq!(writer.as_bytes(), &[0x0C, 0x03, b'a', b'b', b'c', 0x10, 0x00]);

        let long = vec![0u8; 256];
        let mut writer = TlvWriter::new();
        writer.put_bytes(Tag::Anonymous, &long).unwrap();
        assert_eq!(&writer.as_bytes()[..3], &[0x11, 0x00, 0x01]);
    }

    #[test]
    fn test_read_back() {
        let mut writer = TlvWriter::new();
        writer.put_signed(Tag::Context(0), -40000).unwrap();
        writer.put_unsigned(Tag::Anonymous, u64::MAX).unwrap();
        writer.put_float(Tag::Anonymous, 1.5).unwrap();
        writer.put_string(Tag::Anonymous, b"hi").unwrap();

        let bytes = writer.into_bytes();
        let mut reader = TlvReader::new(&bytes);
        assert_eq!(reader.next().unwrap(), Some(ElementType::Int32));
        assert_eq!(reader.tag(), Some(Tag::Context(0)));
        assert_eq!(reader.get_i32().unwrap(), -40000);
        assert_eq!(reader.get_i16(), Err(TlvError::ValueOutOfRange));

        assert_eq!(reader.next().unwrap(), Some(ElementType::UInt64));
        assert_eq!(reader.get_u64().unwrap(), u64::MAX);
        assert!(matches!(reader.get_i64(), Err(TlvError::WrongType { .. })));

        reader.next().unwrap();
        assert_eq!(reader.get_f32().unwrap(), 1.5);

        reader.next().unwrap();
        assert_eq!(reader.length().unwrap(), 2);
        assert_eq!(reader.get_string().unwrap(), b"hi");
        assert!(reader.get_bytes().is_err());

        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn test_writer_limit() {
        let mut writer = TlvWriter::with_limit(4);
        writer.put_unsigned(Tag::Anonymous, 300).unwrap();
        assert_eq!(
            writer.put_unsigned(Tag::Anonymous, 300),
            Err(TlvError::BufferTooSmall {
                required: 3,
                available: 1
            })
        );
        assert_eq!(writer.len(), 3);
    }

    #[test]
    fn test_truncated_input() {
        let mut reader = TlvReader::new(&[0x0C, 0x05, b'a']);
        assert_eq!(reader.next(), Err(TlvError::EndOfData));

        let mut reader = TlvReader::new(&[0x1F]);
        assert_eq!(reader.next(), Err(TlvError::InvalidElementType(0x1F)));

        let mut reader = TlvReader::new(&[0x44, 0x00]);
        assert_eq!(reader.next(), Err(TlvError::UnsupportedTag(0x44)));

        let reader = TlvReader::new(&[]);
        assert_eq!(reader.get_bool(), Err(TlvError::NoElement));
    }
}
