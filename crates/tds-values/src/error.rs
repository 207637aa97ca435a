//! Value conversion error types.

use thiserror::Error;

/// Errors from decoding or converting SQL values.
#[derive(Debug, Error)]
pub enum TypeError {
    /// Value is NULL where a non-null value was expected.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// Requested Rust type does not match the SQL value.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual value type name.
        actual: &'static str,
    },

    /// The buffer ended before the value did.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// The column carried a type code with no decoder.
    #[error("unsupported data type 0x{0:02X}")]
    UnsupportedType(u8),

    /// A length or discriminator byte held an impossible value.
    #[error("invalid binary data: {0}")]
    InvalidBinary(String),

    /// A date/time value was out of its representable range.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// A decimal value could not be represented.
    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),
}

impl TypeError {
    pub(crate) fn short(needed: usize, available: usize) -> Self {
        Self::BufferTooSmall {
            needed,
            available,
        }
    }
}
