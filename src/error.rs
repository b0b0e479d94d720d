//! Error types for minisnmpd.
//!
//! One crate-wide [`Error`] enum covers the failure modes of the agent:
//! malformed wire input, database conflicts, configuration problems, and
//! I/O. Decode failures carry a [`DecodeErrorKind`] with the byte offset so
//! rejected packets can be diagnosed from the logs.

use crate::oid::Oid;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// BER decode error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Expected different tag.
    UnexpectedTag { expected: u8, actual: u8 },
    /// Data truncated unexpectedly.
    TruncatedData,
    /// Invalid BER length encoding.
    InvalidLength,
    /// Indefinite length not supported.
    IndefiniteLength,
    /// Length field too long.
    LengthTooLong { octets: usize },
    /// Length exceeds maximum.
    LengthExceedsMax { length: usize, max: usize },
    /// Zero-length integer.
    ZeroLengthInteger,
    /// Integer64 too long.
    Integer64TooLong { length: usize },
    /// Subidentifier overflowed 32 bits.
    IntegerOverflow,
    /// NULL with non-zero length.
    InvalidNull,
    /// Too many arcs in an OID.
    OidTooLong { count: usize, max: usize },
    /// Invalid IP address length.
    InvalidIpAddressLength { length: usize },
    /// PDU tag is not GetRequest or GetNextRequest.
    UnknownPduType(u8),
    /// Value tag not recognized.
    UnknownValueType(u8),
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{:02X}, got 0x{:02X}", expected, actual)
            }
            Self::TruncatedData => write!(f, "unexpected end of data"),
            Self::InvalidLength => write!(f, "invalid length encoding"),
            Self::IndefiniteLength => write!(f, "indefinite length encoding not supported"),
            Self::LengthTooLong { octets } => {
                write!(f, "length encoding too long ({} octets)", octets)
            }
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {} exceeds maximum {}", length, max)
            }
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::Integer64TooLong { length } => {
                write!(f, "integer64 too long: {} bytes", length)
            }
            Self::IntegerOverflow => write!(f, "subidentifier overflow"),
            Self::InvalidNull => write!(f, "NULL with non-zero length"),
            Self::OidTooLong { count, max } => {
                write!(f, "OID has {} arcs, maximum is {}", count, max)
            }
            Self::InvalidIpAddressLength { length } => {
                write!(f, "IP address must be 4 bytes, got {}", length)
            }
            Self::UnknownPduType(t) => write!(f, "unknown PDU type: 0x{:02X}", t),
            Self::UnknownValueType(t) => write!(f, "unknown value type: 0x{:02X}", t),
        }
    }
}

/// The main error type for all minisnmpd operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed BER in an incoming datagram.
    #[error("decode error at offset {offset}: {kind}")]
    Decode { offset: usize, kind: DecodeErrorKind },

    /// Message version field is not SNMPv1.
    #[error("unsupported snmp version {0}")]
    UnsupportedVersion(i32),

    /// A request PDU carried a non-zero error-status or error-index.
    #[error("non-zero {field} field ({value}) in request pdu")]
    NonZeroErrorField { field: &'static str, value: i32 },

    /// GetRequest with no varbinds.
    #[error("empty get-request pdu")]
    EmptyRequest,

    /// Bytes left over after a complete message was parsed.
    #[error("garbage ({0} bytes) at end of packet")]
    TrailingBytes(usize),

    /// ODB insert conflict: the OID, a prefix of it, or an extension of it
    /// is already mapped.
    #[error("object identifier {0} (or a superset of it) already exists")]
    ObjectExists(Oid),

    /// Encoded response does not fit in a UDP datagram.
    #[error("encoded response ({size} bytes) exceeds datagram limit ({max})")]
    ResponseTooBig { size: usize, max: usize },

    /// GetNextRequest without varbinds against an empty object tree. There
    /// is no well-defined SNMPv1 response for this; the datagram is dropped.
    #[error("object tree is empty")]
    EmptyTree,

    /// Module registration or update failure.
    #[error("module {name}: {reason}")]
    Module { name: String, reason: String },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid OID text format.
    #[error("invalid OID: {0}")]
    InvalidOid(String),

    /// Socket or file I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Construct a decode error at the given buffer offset.
    pub(crate) fn decode(offset: usize, kind: DecodeErrorKind) -> Self {
        Error::Decode { offset, kind }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn module(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Module {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// SNMPv1 protocol error status codes (RFC 1157 Section 4.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    /// Operation completed successfully (status = 0).
    NoError,
    /// Response would be too large for transport (status = 1).
    TooBig,
    /// Requested OID not found (status = 2).
    NoSuchName,
    /// Invalid value provided in SET request (status = 3).
    BadValue,
    /// Attempted to SET a read-only object (status = 4).
    ReadOnly,
    /// Unspecified error (status = 5).
    GenErr,
}

impl ErrorStatus {
    /// Create from raw status code.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::NoError),
            1 => Some(Self::TooBig),
            2 => Some(Self::NoSuchName),
            3 => Some(Self::BadValue),
            4 => Some(Self::ReadOnly),
            5 => Some(Self::GenErr),
            _ => None,
        }
    }

    /// Convert to raw status code.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "noError"),
            Self::TooBig => write!(f, "tooBig"),
            Self::NoSuchName => write!(f, "noSuchName"),
            Self::BadValue => write!(f, "badValue"),
            Self::ReadOnly => write!(f, "readOnly"),
            Self::GenErr => write!(f, "genErr"),
        }
    }
}
