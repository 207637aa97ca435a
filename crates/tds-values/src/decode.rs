//! Decoding of captured column bytes into [`SqlValue`]s.
//!
//! The token layer captures each column with its length prefix intact
//! (legacy LOBs normalized to PLP), so decoding needs only the column's
//! type metadata: type byte, max length, precision/scale, and the text
//! encoding for non-Unicode character data.

use bytes::{Buf, Bytes};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::error::TypeError;
use crate::value::SqlValue;

/// Type metadata needed to decode one column value.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    /// TDS type byte.
    pub type_id: u8,
    /// Maximum length for variable-length types (`0xFFFF` marks MAX/PLP).
    pub max_length: Option<u32>,
    /// Precision for decimal types.
    pub precision: Option<u8>,
    /// Scale for decimal and time types.
    pub scale: Option<u8>,
    /// Encoding for non-Unicode character data, resolved from the column
    /// collation or the connection's configured fallback charset.
    pub encoding: Option<&'static encoding_rs::Encoding>,
}

impl TypeInfo {
    /// Metadata for a type with no extra parameters.
    #[must_use]
    pub fn plain(type_id: u8) -> Self {
        Self {
            type_id,
            ..Default::default()
        }
    }

    /// Metadata for a decimal column.
    #[must_use]
    pub fn decimal(precision: u8, scale: u8) -> Self {
        Self {
            type_id: 0x6C,
            precision: Some(precision),
            scale: Some(scale),
            ..Default::default()
        }
    }

    /// Metadata for a scaled time-family column.
    #[must_use]
    pub fn with_scale(type_id: u8, scale: u8) -> Self {
        Self {
            type_id,
            scale: Some(scale),
            ..Default::default()
        }
    }
}

/// The UTF-8 collation flag bit in an LCID (SQL Server 2019+).
const UTF8_COLLATION_FLAG: u32 = 0x0800_0000;

/// Resolve the text encoding for a collation LCID.
///
/// Returns `None` when the LCID is unknown; callers fall back to the
/// configured charset or a lossy conversion.
#[must_use]
pub fn encoding_for_lcid(lcid: u32) -> Option<&'static encoding_rs::Encoding> {
    if (lcid & UTF8_COLLATION_FLAG) != 0 {
        return Some(encoding_rs::UTF_8);
    }

    // Primary language id lives in the low bits of the LCID.
    let primary = lcid & 0xFFFF;
    match primary {
        0x0411 => Some(encoding_rs::SHIFT_JIS),
        0x0804 | 0x1004 => Some(encoding_rs::GB18030),
        0x0404 | 0x0C04 | 0x1404 => Some(encoding_rs::BIG5),
        0x0412 => Some(encoding_rs::EUC_KR),
        0x041E => Some(encoding_rs::WINDOWS_874),
        0x042A => Some(encoding_rs::WINDOWS_1258),
        // Central European
        0x0405 | 0x040E | 0x0415 | 0x0418 | 0x041A | 0x041B | 0x041C | 0x0424 => {
            Some(encoding_rs::WINDOWS_1250)
        }
        // Cyrillic
        0x0402 | 0x0419 | 0x0422 | 0x0423 | 0x042F => Some(encoding_rs::WINDOWS_1251),
        0x0408 => Some(encoding_rs::WINDOWS_1253),
        0x041F | 0x042C => Some(encoding_rs::WINDOWS_1254),
        0x040D => Some(encoding_rs::WINDOWS_1255),
        0x0401 | 0x0420 | 0x0429 => Some(encoding_rs::WINDOWS_1256),
        0x0425..=0x0427 => Some(encoding_rs::WINDOWS_1257),
        _ => None,
    }
}

fn need(buf: &impl Buf, n: usize) -> Result<(), TypeError> {
    if buf.remaining() < n {
        Err(TypeError::short(n, buf.remaining()))
    } else {
        Ok(())
    }
}

/// Decode one captured column value.
pub fn decode_value(buf: &mut Bytes, type_info: &TypeInfo) -> Result<SqlValue, TypeError> {
    match type_info.type_id {
        // Fixed-length scalars, captured without a length prefix.
        0x1F => Ok(SqlValue::Null),
        0x32 => {
            need(buf, 1)?;
            Ok(SqlValue::Bool(buf.get_u8() != 0))
        }
        0x30 => {
            need(buf, 1)?;
            Ok(SqlValue::TinyInt(buf.get_u8()))
        }
        0x34 => {
            need(buf, 2)?;
            Ok(SqlValue::SmallInt(buf.get_i16_le()))
        }
        0x38 => {
            need(buf, 4)?;
            Ok(SqlValue::Int(buf.get_i32_le()))
        }
        0x7F => {
            need(buf, 8)?;
            Ok(SqlValue::BigInt(buf.get_i64_le()))
        }
        0x3B => {
            need(buf, 4)?;
            Ok(SqlValue::Float(buf.get_f32_le()))
        }
        0x3E => {
            need(buf, 8)?;
            Ok(SqlValue::Double(buf.get_f64_le()))
        }
        0x3C => {
            need(buf, 8)?;
            decode_money8(buf)
        }
        0x7A => {
            need(buf, 4)?;
            Ok(SqlValue::Decimal(Decimal::new(
                i64::from(buf.get_i32_le()),
                4,
            )))
        }
        0x3D => {
            need(buf, 8)?;
            decode_datetime8(buf)
        }
        0x3A => {
            need(buf, 4)?;
            decode_smalldatetime(buf)
        }

        // Nullable scalars with a 1-byte length prefix.
        0x26 => decode_intn(buf),
        0x68 => with_bytelen(buf, |b, _| Ok(SqlValue::Bool(b.get_u8() != 0))),
        0x6D => with_bytelen(buf, |b, len| match len {
            4 => Ok(SqlValue::Float(b.get_f32_le())),
            8 => Ok(SqlValue::Double(b.get_f64_le())),
            _ => Err(TypeError::InvalidBinary(format!(
                "invalid FLTN length: {len}"
            ))),
        }),
        0x6E => with_bytelen(buf, |b, len| match len {
            4 => Ok(SqlValue::Decimal(Decimal::new(i64::from(b.get_i32_le()), 4))),
            8 => decode_money8(b),
            _ => Err(TypeError::InvalidBinary(format!(
                "invalid MONEYN length: {len}"
            ))),
        }),
        0x6F => with_bytelen(buf, |b, len| match len {
            4 => decode_smalldatetime(b),
            8 => decode_datetime8(b),
            _ => Err(TypeError::InvalidBinary(format!(
                "invalid DATETIMN length: {len}"
            ))),
        }),
        0x24 => with_bytelen(buf, |b, len| {
            if len != 16 {
                return Err(TypeError::InvalidBinary(format!(
                    "invalid GUID length: {len}"
                )));
            }
            Ok(SqlValue::Binary(b.copy_to_bytes(16)))
        }),
        0x6A | 0x6C => {
            let scale = type_info.scale.unwrap_or(0);
            with_bytelen(buf, |b, len| decode_decimal(b, len, scale))
        }

        // Date/time family (TDS 7.3+), 1-byte length prefix.
        0x28 => with_bytelen(buf, |b, len| {
            if len != 3 {
                return Err(TypeError::InvalidDateTime(format!(
                    "invalid DATE length: {len}"
                )));
            }
            Ok(SqlValue::Date(decode_date3(b)?))
        }),
        0x29 => {
            let scale = type_info.scale.unwrap_or(7);
            with_bytelen(buf, |b, len| {
                Ok(SqlValue::Time(decode_time_units(b, len, scale)?))
            })
        }
        0x2A => {
            let scale = type_info.scale.unwrap_or(7);
            with_bytelen(buf, |b, len| {
                let time_len = len.checked_sub(3).ok_or_else(|| {
                    TypeError::InvalidDateTime(format!("invalid DATETIME2 length: {len}"))
                })?;
                let time = decode_time_units(b, time_len, scale)?;
                let date = decode_date3(b)?;
                Ok(SqlValue::DateTime(date.and_time(time)))
            })
        }
        0x2B => {
            let scale = type_info.scale.unwrap_or(7);
            with_bytelen(buf, |b, len| {
                let time_len = len.checked_sub(5).ok_or_else(|| {
                    TypeError::InvalidDateTime(format!("invalid DATETIMEOFFSET length: {len}"))
                })?;
                let time = decode_time_units(b, time_len, scale)?;
                let date = decode_date3(b)?;
                let offset_minutes = b.get_i16_le();
                let offset = chrono::FixedOffset::east_opt(i32::from(offset_minutes) * 60)
                    .ok_or_else(|| {
                        TypeError::InvalidDateTime(format!(
                            "invalid timezone offset: {offset_minutes}"
                        ))
                    })?;
                // The wire carries UTC; the offset is for display.
                let utc = date.and_time(time).and_utc();
                Ok(SqlValue::DateTimeOffset(utc.with_timezone(&offset)))
            })
        }

        // Character and binary types with a 2-byte length prefix
        // (PLP for the MAX variants).
        0xE7 | 0xEF => {
            if type_info.max_length == Some(0xFFFF) {
                decode_plp(buf)?.map_or(Ok(SqlValue::Null), |data| {
                    Ok(SqlValue::String(decode_utf16_le(&data)?))
                })
            } else {
                match decode_ushortlen(buf)? {
                    None => Ok(SqlValue::Null),
                    Some(data) => Ok(SqlValue::String(decode_utf16_le(&data)?)),
                }
            }
        }
        0xA7 | 0xAF => {
            if type_info.max_length == Some(0xFFFF) {
                decode_plp(buf)?.map_or(Ok(SqlValue::Null), |data| {
                    Ok(SqlValue::String(decode_charset(&data, type_info.encoding)))
                })
            } else {
                match decode_ushortlen(buf)? {
                    None => Ok(SqlValue::Null),
                    Some(data) => Ok(SqlValue::String(decode_charset(&data, type_info.encoding))),
                }
            }
        }
        0xA5 | 0xAD => {
            if type_info.max_length == Some(0xFFFF) {
                decode_plp(buf)?.map_or(Ok(SqlValue::Null), |data| Ok(SqlValue::Binary(data)))
            } else {
                match decode_ushortlen(buf)? {
                    None => Ok(SqlValue::Null),
                    Some(data) => Ok(SqlValue::Binary(data)),
                }
            }
        }

        // Legacy LOBs, normalized to PLP at capture time.
        0x63 => decode_plp(buf)?.map_or(Ok(SqlValue::Null), |data| {
            Ok(SqlValue::String(decode_utf16_le(&data)?))
        }),
        0x23 => decode_plp(buf)?.map_or(Ok(SqlValue::Null), |data| {
            Ok(SqlValue::String(decode_charset(&data, type_info.encoding)))
        }),
        0x22 => decode_plp(buf)?.map_or(Ok(SqlValue::Null), |data| Ok(SqlValue::Binary(data))),

        other => Err(TypeError::UnsupportedType(other)),
    }
}

/// Run a decoder against a 1-byte length-prefixed value (0 = NULL).
fn with_bytelen<F>(buf: &mut Bytes, decode: F) -> Result<SqlValue, TypeError>
where
    F: FnOnce(&mut Bytes, usize) -> Result<SqlValue, TypeError>,
{
    need(buf, 1)?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(SqlValue::Null);
    }
    need(buf, len)?;
    decode(buf, len)
}

fn decode_intn(buf: &mut Bytes) -> Result<SqlValue, TypeError> {
    with_bytelen(buf, |b, len| match len {
        1 => Ok(SqlValue::TinyInt(b.get_u8())),
        2 => Ok(SqlValue::SmallInt(b.get_i16_le())),
        4 => Ok(SqlValue::Int(b.get_i32_le())),
        8 => Ok(SqlValue::BigInt(b.get_i64_le())),
        _ => Err(TypeError::InvalidBinary(format!(
            "invalid INTN length: {len}"
        ))),
    })
}

/// Decode a 2-byte length-prefixed blob. `None` is the NULL sentinel.
fn decode_ushortlen(buf: &mut Bytes) -> Result<Option<Bytes>, TypeError> {
    need(buf, 2)?;
    let len = buf.get_u16_le();
    if len == 0xFFFF {
        return Ok(None);
    }
    let len = len as usize;
    need(buf, len)?;
    Ok(Some(buf.copy_to_bytes(len)))
}

/// Decode a PLP value into its concatenated chunk data.
fn decode_plp(buf: &mut Bytes) -> Result<Option<Bytes>, TypeError> {
    need(buf, 8)?;
    let total_len = buf.get_u64_le();
    if total_len == 0xFFFF_FFFF_FFFF_FFFF {
        return Ok(None);
    }

    // 0xFFFFFFFFFFFFFFFE means the total is unknown up front.
    let mut data = if total_len == 0xFFFF_FFFF_FFFF_FFFE {
        Vec::new()
    } else {
        Vec::with_capacity(total_len as usize)
    };

    loop {
        need(buf, 4)?;
        let chunk_len = buf.get_u32_le() as usize;
        if chunk_len == 0 {
            return Ok(Some(Bytes::from(data)));
        }
        need(buf, chunk_len)?;
        data.extend_from_slice(&buf.copy_to_bytes(chunk_len));
    }
}

fn decode_utf16_le(data: &[u8]) -> Result<String, TypeError> {
    if data.len() % 2 != 0 {
        return Err(TypeError::InvalidBinary(
            "odd byte count in UTF-16 data".to_string(),
        ));
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|_| TypeError::InvalidBinary("invalid UTF-16 data".to_string()))
}

/// Decode single-byte character data: UTF-8 fast path, then the resolved
/// collation/charset encoding, then lossy conversion.
fn decode_charset(data: &[u8], encoding: Option<&'static encoding_rs::Encoding>) -> String {
    if let Ok(s) = std::str::from_utf8(data) {
        return s.to_owned();
    }

    if let Some(encoding) = encoding {
        let (decoded, _, had_errors) = encoding.decode(data);
        if !had_errors {
            return decoded.into_owned();
        }
    }

    String::from_utf8_lossy(data).into_owned()
}

/// Packed decimal: sign byte (0 = negative) then a little-endian magnitude.
fn decode_decimal(buf: &mut Bytes, len: usize, scale: u8) -> Result<SqlValue, TypeError> {
    let sign = buf.get_u8();
    let magnitude_len = len - 1;

    if magnitude_len > 16 {
        return Err(TypeError::InvalidDecimal(format!(
            "magnitude of {magnitude_len} bytes"
        )));
    }

    let mut magnitude = [0u8; 16];
    for byte in magnitude.iter_mut().take(magnitude_len) {
        *byte = buf.get_u8();
    }

    let mantissa = u128::from_le_bytes(magnitude);
    if mantissa > i128::MAX as u128 {
        return Err(TypeError::InvalidDecimal("magnitude overflow".to_string()));
    }

    let mut decimal = Decimal::from_i128_with_scale(mantissa as i128, u32::from(scale));
    if sign == 0 {
        decimal.set_sign_negative(true);
    }
    Ok(SqlValue::Decimal(decimal))
}

/// MONEY: high 32 bits then low 32 bits of a 10⁻⁴-scaled integer.
fn decode_money8(buf: &mut impl Buf) -> Result<SqlValue, TypeError> {
    let high = buf.get_i32_le();
    let low = buf.get_u32_le();
    let raw = (i64::from(high) << 32) | i64::from(low);
    Ok(SqlValue::Decimal(Decimal::new(raw, 4)))
}

/// DATETIME: days since 1900-01-01 and 1/300-second ticks since midnight.
fn decode_datetime8(buf: &mut impl Buf) -> Result<SqlValue, TypeError> {
    let days = buf.get_i32_le();
    let ticks = buf.get_u32_le();

    let date = epoch_1900()
        .checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| TypeError::InvalidDateTime(format!("day offset {days}")))?;
    let nanos = (i64::from(ticks) * 10_000_000) / 3;
    let time = NaiveTime::MIN + Duration::nanoseconds(nanos);
    Ok(SqlValue::DateTime(NaiveDateTime::new(date, time)))
}

/// SMALLDATETIME: days since 1900-01-01 and minutes since midnight.
fn decode_smalldatetime(buf: &mut impl Buf) -> Result<SqlValue, TypeError> {
    let days = buf.get_u16_le();
    let minutes = buf.get_u16_le();

    let date = epoch_1900()
        .checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| TypeError::InvalidDateTime(format!("day offset {days}")))?;
    let time = NaiveTime::MIN + Duration::minutes(i64::from(minutes));
    Ok(SqlValue::DateTime(NaiveDateTime::new(date, time)))
}

/// DATE: 3-byte little-endian day count since 0001-01-01.
fn decode_date3(buf: &mut impl Buf) -> Result<NaiveDate, TypeError> {
    let days = u32::from(buf.get_u8())
        | (u32::from(buf.get_u8()) << 8)
        | (u32::from(buf.get_u8()) << 16);

    epoch_0001()
        .checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| TypeError::InvalidDateTime(format!("day offset {days}")))
}

/// TIME: little-endian count of 10⁻ˢ-second intervals since midnight,
/// stored in 3 to 5 bytes depending on scale.
fn decode_time_units(buf: &mut Bytes, len: usize, scale: u8) -> Result<NaiveTime, TypeError> {
    if len > 8 || len < 3 {
        return Err(TypeError::InvalidDateTime(format!(
            "invalid TIME length: {len}"
        )));
    }

    let mut raw = [0u8; 8];
    for byte in raw.iter_mut().take(len) {
        *byte = buf.get_u8();
    }
    let intervals = u64::from_le_bytes(raw);

    let scale = u32::from(scale.min(7));
    let nanos = intervals as i64 * 10i64.pow(9 - scale);
    Ok(NaiveTime::MIN + Duration::nanoseconds(nanos))
}

fn epoch_1900() -> NaiveDate {
    // Constant date; cannot fail.
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn epoch_0001() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn bytes(raw: &[u8]) -> Bytes {
        Bytes::copy_from_slice(raw)
    }

    #[test]
    fn fixed_int() {
        let mut buf = bytes(&7i32.to_le_bytes());
        let value = decode_value(&mut buf, &TypeInfo::plain(0x38)).unwrap();
        assert_eq!(value, SqlValue::Int(7));
    }

    #[test]
    fn intn_widths_and_null() {
        let mut buf = bytes(&[8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(
            decode_value(&mut buf, &TypeInfo::plain(0x26)).unwrap(),
            SqlValue::BigInt(i64::MAX)
        );

        let mut buf = bytes(&[0]);
        assert_eq!(
            decode_value(&mut buf, &TypeInfo::plain(0x26)).unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn nvarchar_utf16() {
        let mut raw = vec![8, 0];
        for unit in "höla".encode_utf16() {
            raw.extend_from_slice(&unit.to_le_bytes());
        }
        let mut buf = bytes(&raw);
        let info = TypeInfo {
            type_id: 0xE7,
            max_length: Some(100),
            ..Default::default()
        };
        assert_eq!(
            decode_value(&mut buf, &info).unwrap(),
            SqlValue::String("höla".to_string())
        );
    }

    #[test]
    fn nvarchar_null_sentinel() {
        let mut buf = bytes(&[0xFF, 0xFF]);
        let info = TypeInfo {
            type_id: 0xE7,
            max_length: Some(100),
            ..Default::default()
        };
        assert_eq!(decode_value(&mut buf, &info).unwrap(), SqlValue::Null);
    }

    #[test]
    fn varchar_code_page() {
        // "café" in windows-1252: é = 0xE9, not valid UTF-8 on its own.
        let mut buf = bytes(&[4, 0, b'c', b'a', b'f', 0xE9]);
        let info = TypeInfo {
            type_id: 0xA7,
            max_length: Some(100),
            encoding: Some(encoding_rs::WINDOWS_1252),
            ..Default::default()
        };
        assert_eq!(
            decode_value(&mut buf, &info).unwrap(),
            SqlValue::String("café".to_string())
        );
    }

    #[test]
    fn empty_varchar() {
        let mut buf = bytes(&[0, 0]);
        let info = TypeInfo {
            type_id: 0xA7,
            max_length: Some(100),
            ..Default::default()
        };
        assert_eq!(
            decode_value(&mut buf, &info).unwrap(),
            SqlValue::String(String::new())
        );
    }

    #[test]
    fn decimal_sign_and_scale() {
        // -123.45 as decimal(10,2): sign 0, magnitude 12345
        let mut raw = vec![5, 0];
        raw.extend_from_slice(&12345u32.to_le_bytes());
        let mut buf = bytes(&raw);
        let value = decode_value(&mut buf, &TypeInfo::decimal(10, 2)).unwrap();
        assert_eq!(value, SqlValue::Decimal(Decimal::from_str("-123.45").unwrap()));
    }

    #[test]
    fn max_precision_decimal() {
        // Largest magnitude rust_decimal represents: 2^96 - 1, scale 0.
        let mantissa: u128 = (1u128 << 96) - 1;
        let mut raw = vec![17, 1];
        raw.extend_from_slice(&mantissa.to_le_bytes());
        let mut buf = bytes(&raw);
        let value = decode_value(&mut buf, &TypeInfo::decimal(38, 0)).unwrap();
        assert_eq!(
            value,
            SqlValue::Decimal(Decimal::from_i128_with_scale(mantissa as i128, 0))
        );
    }

    #[test]
    fn money_is_scaled_by_ten_thousand() {
        let raw_value: i64 = 12_3456; // 12.3456
        let mut raw = Vec::new();
        raw.extend_from_slice(&((raw_value >> 32) as i32).to_le_bytes());
        raw.extend_from_slice(&(raw_value as u32).to_le_bytes());
        let mut buf = bytes(&raw);
        let value = decode_value(&mut buf, &TypeInfo::plain(0x3C)).unwrap();
        assert_eq!(
            value,
            SqlValue::Decimal(Decimal::from_str("12.3456").unwrap())
        );
    }

    #[test]
    fn datetime_epoch() {
        // 1900-01-01 00:00:00
        let mut buf = bytes(&[0, 0, 0, 0, 0, 0, 0, 0]);
        let value = decode_value(&mut buf, &TypeInfo::plain(0x3D)).unwrap();
        assert_eq!(
            value,
            SqlValue::DateTime(
                NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_time(NaiveTime::MIN)
            )
        );
    }

    #[test]
    fn date3_roundtrip() {
        // 2000-01-01 is 730119 days after 0001-01-01.
        let days = 730_119u32;
        let mut raw = vec![3];
        raw.extend_from_slice(&days.to_le_bytes()[..3]);
        let mut buf = bytes(&raw);
        let value = decode_value(&mut buf, &TypeInfo::plain(0x28)).unwrap();
        assert_eq!(
            value,
            SqlValue::Date(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
        );
    }

    #[test]
    fn time_scale_seven() {
        // 01:02:03 at scale 7: intervals of 100ns
        let intervals: u64 = ((3600 + 2 * 60 + 3) as u64) * 10_000_000;
        let mut raw = vec![5];
        raw.extend_from_slice(&intervals.to_le_bytes()[..5]);
        let mut buf = bytes(&raw);
        let value = decode_value(&mut buf, &TypeInfo::with_scale(0x29, 7)).unwrap();
        assert_eq!(
            value,
            SqlValue::Time(NaiveTime::from_hms_opt(1, 2, 3).unwrap())
        );
    }

    #[test]
    fn plp_nvarchar_max() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&8u64.to_le_bytes());
        raw.extend_from_slice(&4u32.to_le_bytes());
        raw.extend_from_slice(&[b'a', 0, b'b', 0]);
        raw.extend_from_slice(&4u32.to_le_bytes());
        raw.extend_from_slice(&[b'c', 0, b'd', 0]);
        raw.extend_from_slice(&0u32.to_le_bytes());

        let mut buf = bytes(&raw);
        let info = TypeInfo {
            type_id: 0xE7,
            max_length: Some(0xFFFF),
            ..Default::default()
        };
        assert_eq!(
            decode_value(&mut buf, &info).unwrap(),
            SqlValue::String("abcd".to_string())
        );
    }

    #[test]
    fn plp_null() {
        let mut buf = bytes(&0xFFFF_FFFF_FFFF_FFFFu64.to_le_bytes());
        let info = TypeInfo {
            type_id: 0xA5,
            max_length: Some(0xFFFF),
            ..Default::default()
        };
        assert_eq!(decode_value(&mut buf, &info).unwrap(), SqlValue::Null);
    }

    #[test]
    fn unsupported_type_is_fatal() {
        let mut buf = bytes(&[0x00]);
        assert!(matches!(
            decode_value(&mut buf, &TypeInfo::plain(0xF1)),
            Err(TypeError::UnsupportedType(0xF1))
        ));
    }

    #[test]
    fn truncated_fixed_value() {
        let mut buf = bytes(&[0x01, 0x02]);
        assert!(matches!(
            decode_value(&mut buf, &TypeInfo::plain(0x38)),
            Err(TypeError::BufferTooSmall {
                needed: 4,
                available: 2
            })
        ));
    }
}
