//! Protocol-level error definitions.

use thiserror::Error;

/// Errors produced while encoding or decoding TDS protocol structures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A field extends past the end of the available bytes.
    ///
    /// Recoverable when the caller can supply more bytes; fatal when the
    /// buffer already holds a complete message.
    #[error("truncated field: need {expected} bytes, have {actual}")]
    TruncatedField {
        /// Bytes required to decode the field.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// A column or parameter carried a type code this client does not speak.
    ///
    /// Fatal: indicates a protocol-dialect mismatch with the server.
    #[error("unsupported data type 0x{0:02X}")]
    UnsupportedType(u8),

    /// An unrecognized, non-skippable token type appeared in the stream.
    ///
    /// Fatal: the stream position can no longer be trusted.
    #[error("unknown token type 0x{0:02X}")]
    UnknownToken(u8),

    /// Packet header carried an unknown packet type.
    #[error("invalid packet type 0x{0:02X}")]
    InvalidPacketType(u8),

    /// Packet header carried undefined status bits.
    #[error("invalid packet status 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// A pre-login response contained an unknown option token.
    #[error("invalid pre-login option 0x{0:02X}")]
    InvalidPreloginOption(u8),

    /// A UTF-16 string field was not valid UTF-16.
    #[error("invalid UTF-16 in {0}")]
    InvalidUtf16(&'static str),

    /// A token field held a value outside its defined range.
    #[error("malformed token field: {0}")]
    MalformedToken(&'static str),
}

impl ProtocolError {
    /// Build a truncation error from a requirement and a remaining count.
    #[must_use]
    pub const fn truncated(expected: usize, actual: usize) -> Self {
        Self::TruncatedField { expected, actual }
    }

    /// Whether this error can be recovered by reading more bytes.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::TruncatedField { .. })
    }
}
