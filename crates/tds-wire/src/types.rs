//! TDS data type identifiers.
//!
//! These are the type bytes carried in column metadata and parameter
//! definitions. Types this client does not decode (XML, UDT, sql_variant,
//! table types) are deliberately absent: their bytes fail
//! [`TypeId::from_u8`] and surface as an unsupported-type error.

/// TDS data type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    // Fixed-length types (no length prefix in row data)
    /// Null type.
    Null = 0x1F,
    /// 8-bit unsigned integer (TINYINT).
    Int1 = 0x30,
    /// Bit (boolean).
    Bit = 0x32,
    /// 16-bit signed integer (SMALLINT).
    Int2 = 0x34,
    /// 32-bit signed integer (INT).
    Int4 = 0x38,
    /// 64-bit signed integer (BIGINT).
    Int8 = 0x7F,
    /// 32-bit floating point (REAL).
    Float4 = 0x3B,
    /// 64-bit floating point (FLOAT).
    Float8 = 0x3E,
    /// 8-byte money.
    Money = 0x3C,
    /// 4-byte money.
    Money4 = 0x7A,
    /// 8-byte datetime.
    DateTime = 0x3D,
    /// 4-byte small datetime.
    DateTime4 = 0x3A,

    // Nullable variable-length scalars (1-byte length prefix)
    /// GUID (UNIQUEIDENTIFIER).
    Guid = 0x24,
    /// Nullable integer of 1/2/4/8 bytes.
    IntN = 0x26,
    /// Nullable bit.
    BitN = 0x68,
    /// Nullable decimal.
    DecimalN = 0x6A,
    /// Nullable numeric.
    NumericN = 0x6C,
    /// Nullable float of 4/8 bytes.
    FloatN = 0x6D,
    /// Nullable money of 4/8 bytes.
    MoneyN = 0x6E,
    /// Nullable datetime of 4/8 bytes.
    DateTimeN = 0x6F,

    // Character/binary types with 2-byte length prefix
    /// Variable-length character.
    BigVarChar = 0xA7,
    /// Fixed-length character.
    BigChar = 0xAF,
    /// Variable-length binary.
    BigVarBinary = 0xA5,
    /// Fixed-length binary.
    BigBinary = 0xAD,
    /// Variable-length Unicode character.
    NVarChar = 0xE7,
    /// Fixed-length Unicode character.
    NChar = 0xEF,

    // Legacy LOB types (textptr format, normalized to PLP on capture)
    /// Text (deprecated, use varchar(max)).
    Text = 0x23,
    /// Image (deprecated, use varbinary(max)).
    Image = 0x22,
    /// NText (deprecated, use nvarchar(max)).
    NText = 0x63,

    // Date/time types (TDS 7.3+)
    /// Date (3 bytes).
    Date = 0x28,
    /// Time with variable precision.
    Time = 0x29,
    /// DateTime2 with variable precision.
    DateTime2 = 0x2A,
    /// DateTimeOffset with variable precision.
    DateTimeOffset = 0x2B,
}

impl TypeId {
    /// Create a type ID from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x1F => Some(Self::Null),
            0x30 => Some(Self::Int1),
            0x32 => Some(Self::Bit),
            0x34 => Some(Self::Int2),
            0x38 => Some(Self::Int4),
            0x7F => Some(Self::Int8),
            0x3B => Some(Self::Float4),
            0x3E => Some(Self::Float8),
            0x3C => Some(Self::Money),
            0x7A => Some(Self::Money4),
            0x3D => Some(Self::DateTime),
            0x3A => Some(Self::DateTime4),
            0x24 => Some(Self::Guid),
            0x26 => Some(Self::IntN),
            0x68 => Some(Self::BitN),
            0x6A => Some(Self::DecimalN),
            0x6C => Some(Self::NumericN),
            0x6D => Some(Self::FloatN),
            0x6E => Some(Self::MoneyN),
            0x6F => Some(Self::DateTimeN),
            0xA7 => Some(Self::BigVarChar),
            0xAF => Some(Self::BigChar),
            0xA5 => Some(Self::BigVarBinary),
            0xAD => Some(Self::BigBinary),
            0xE7 => Some(Self::NVarChar),
            0xEF => Some(Self::NChar),
            0x23 => Some(Self::Text),
            0x22 => Some(Self::Image),
            0x63 => Some(Self::NText),
            0x28 => Some(Self::Date),
            0x29 => Some(Self::Time),
            0x2A => Some(Self::DateTime2),
            0x2B => Some(Self::DateTimeOffset),
            _ => None,
        }
    }

    /// Get the fixed size of this type in bytes, if it has one.
    #[must_use]
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Null => Some(0),
            Self::Int1 | Self::Bit => Some(1),
            Self::Int2 => Some(2),
            Self::Int4 | Self::Float4 | Self::Money4 | Self::DateTime4 => Some(4),
            Self::Int8 | Self::Float8 | Self::Money | Self::DateTime => Some(8),
            _ => None,
        }
    }

    /// Check if this is a fixed-length type.
    #[must_use]
    pub const fn is_fixed_length(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Check if this is a Unicode (UTF-16) string type.
    #[must_use]
    pub const fn is_unicode(&self) -> bool {
        matches!(self, Self::NChar | Self::NVarChar | Self::NText)
    }

    /// Check if this is one of the legacy textptr LOB types.
    #[must_use]
    pub const fn is_legacy_lob(&self) -> bool {
        matches!(self, Self::Text | Self::NText | Self::Image)
    }

    /// SQL-ish display name, used in column metadata.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Int1 => "TINYINT",
            Self::Bit | Self::BitN => "BIT",
            Self::Int2 => "SMALLINT",
            Self::Int4 => "INT",
            Self::Int8 => "BIGINT",
            Self::Float4 => "REAL",
            Self::Float8 => "FLOAT",
            Self::Money | Self::MoneyN => "MONEY",
            Self::Money4 => "SMALLMONEY",
            Self::DateTime | Self::DateTimeN => "DATETIME",
            Self::DateTime4 => "SMALLDATETIME",
            Self::Guid => "UNIQUEIDENTIFIER",
            Self::IntN => "INT",
            Self::DecimalN => "DECIMAL",
            Self::NumericN => "NUMERIC",
            Self::FloatN => "FLOAT",
            Self::BigVarChar => "VARCHAR",
            Self::BigChar => "CHAR",
            Self::BigVarBinary => "VARBINARY",
            Self::BigBinary => "BINARY",
            Self::NVarChar => "NVARCHAR",
            Self::NChar => "NCHAR",
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::NText => "NTEXT",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::DateTime2 => "DATETIME2",
            Self::DateTimeOffset => "DATETIMEOFFSET",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_u8_known_and_unknown() {
        assert_eq!(TypeId::from_u8(0x38), Some(TypeId::Int4));
        assert_eq!(TypeId::from_u8(0xE7), Some(TypeId::NVarChar));
        // XML (0xF1) is deliberately unsupported
        assert_eq!(TypeId::from_u8(0xF1), None);
    }

    #[test]
    fn fixed_size_classification() {
        assert_eq!(TypeId::Int8.fixed_size(), Some(8));
        assert!(TypeId::Float4.is_fixed_length());
        assert!(!TypeId::NVarChar.is_fixed_length());
        assert!(TypeId::NText.is_legacy_lob());
    }
}
