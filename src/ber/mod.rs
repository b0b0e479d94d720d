//! BER (Basic Encoding Rules) codec for SNMPv1.
//!
//! Decoding reads forward over untrusted bytes with bounds checks
//! throughout; encoding writes backwards so each wrapper length is known
//! when it is prepended. Parsing is permissive where net-snmp is (oversized
//! integers truncate, non-minimal lengths accepted) and strict where the
//! input cannot be trusted (indefinite lengths, runaway length fields).

mod decode;
mod encode;
mod length;
pub mod tag;

pub use decode::Decoder;
pub use encode::EncodeBuf;
pub use length::{MAX_LENGTH, decode_length, encode_length};
