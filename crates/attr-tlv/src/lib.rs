//! # attr-tlv
//!
//! TLV wire format for attribute values.
//!
//! This crate provides:
//! - A bounded TLV writer and a borrowing TLV reader ([`tlv`])
//! - The value codec: [`encode`] and the owning [`DecodeBuffer`] ([`codec`])

pub mod codec;
pub mod tlv;

pub use codec::{decode, encode, CodecError, DecodeBuffer};
pub use tlv::{ElementType, Tag, TlvError, TlvRead, TlvReader, TlvWrite, TlvWriter};
