//! Encoding of [`SqlValue`]s into TDS parameter value bytes.
//!
//! These are the raw value bytes only; the RPC layer wraps them with the
//! parameter's name, flags, type descriptor and length prefix.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{NaiveDate, Timelike};

use crate::error::TypeError;
use crate::value::SqlValue;

/// Encode a value's raw parameter bytes. NULL encodes to no bytes (the RPC
/// layer writes the NULL sentinel instead).
pub fn encode_value(value: &SqlValue) -> Result<Bytes, TypeError> {
    let mut buf = BytesMut::new();

    match value {
        SqlValue::Null => {}
        SqlValue::Bool(v) => buf.put_u8(u8::from(*v)),
        SqlValue::TinyInt(v) => buf.put_u8(*v),
        SqlValue::SmallInt(v) => buf.put_i16_le(*v),
        SqlValue::Int(v) => buf.put_i32_le(*v),
        SqlValue::BigInt(v) => buf.put_i64_le(*v),
        SqlValue::Float(v) => buf.put_f32_le(*v),
        SqlValue::Double(v) => buf.put_f64_le(*v),
        SqlValue::String(v) => {
            for unit in v.encode_utf16() {
                buf.put_u16_le(unit);
            }
        }
        SqlValue::Binary(v) => buf.put_slice(v),
        SqlValue::Decimal(v) => encode_decimal(v, &mut buf),
        SqlValue::Date(v) => encode_date3(*v, &mut buf)?,
        SqlValue::Time(v) => {
            // Scale 7: 100ns intervals in 5 bytes.
            let intervals = u64::from(v.num_seconds_from_midnight()) * 10_000_000
                + u64::from(v.nanosecond()) / 100;
            buf.put_slice(&intervals.to_le_bytes()[..5]);
        }
        SqlValue::DateTime(v) => {
            // DATETIMEN(8): days since 1900-01-01 + 1/300s ticks.
            let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
            let days = v.date().signed_duration_since(epoch).num_days();
            let days = i32::try_from(days).map_err(|_| {
                TypeError::InvalidDateTime(format!("date out of DATETIME range: {}", v.date()))
            })?;
            let seconds = u64::from(v.time().num_seconds_from_midnight());
            let sub_ticks = u64::from(v.time().nanosecond()) * 3 / 1_000_000_000;
            let ticks = seconds * 300 + sub_ticks;
            buf.put_i32_le(days);
            buf.put_u32_le(ticks as u32);
        }
        SqlValue::DateTimeOffset(v) => {
            // Scale 7 time + 3-byte date, both in UTC, + offset minutes.
            let utc = v.naive_utc();
            let intervals = u64::from(utc.time().num_seconds_from_midnight()) * 10_000_000
                + u64::from(utc.time().nanosecond()) / 100;
            buf.put_slice(&intervals.to_le_bytes()[..5]);
            encode_date3(utc.date(), &mut buf)?;
            let offset_minutes = v.offset().local_minus_utc() / 60;
            buf.put_i16_le(offset_minutes as i16);
        }
    }

    Ok(buf.freeze())
}

/// Packed decimal: sign byte (1 = positive) + 16-byte LE magnitude.
fn encode_decimal(value: &rust_decimal::Decimal, buf: &mut BytesMut) {
    let sign: u8 = if value.is_sign_negative() { 0 } else { 1 };
    let mantissa = value.abs().mantissa().unsigned_abs();

    buf.put_u8(sign);
    buf.put_slice(&mantissa.to_le_bytes());
}

/// DATE: 3-byte little-endian day count since 0001-01-01.
fn encode_date3(date: NaiveDate, buf: &mut BytesMut) -> Result<(), TypeError> {
    let epoch = NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN);
    let days = date.signed_duration_since(epoch).num_days();
    if !(0..=0x00FF_FFFF).contains(&days) {
        return Err(TypeError::InvalidDateTime(format!(
            "date out of DATE range: {date}"
        )));
    }
    let days = days as u32;
    buf.put_slice(&days.to_le_bytes()[..3]);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decode::{TypeInfo, decode_value};
    use std::str::FromStr;

    #[test]
    fn int_little_endian() {
        let encoded = encode_value(&SqlValue::Int(0x01020304)).unwrap();
        assert_eq!(&encoded[..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn string_is_utf16_le() {
        let encoded = encode_value(&SqlValue::String("ab".to_string())).unwrap();
        assert_eq!(&encoded[..], &[b'a', 0, b'b', 0]);
    }

    #[test]
    fn null_is_empty() {
        assert!(encode_value(&SqlValue::Null).unwrap().is_empty());
    }

    #[test]
    fn decimal_roundtrip_through_decoder() {
        let original = rust_decimal::Decimal::from_str("-98765.4321").unwrap();
        let encoded = encode_value(&SqlValue::Decimal(original)).unwrap();

        // Reframe as a row value: 1-byte length prefix + payload.
        let mut framed = bytes::BytesMut::new();
        framed.put_u8(encoded.len() as u8);
        framed.put_slice(&encoded);

        let mut buf = framed.freeze();
        let decoded = decode_value(&mut buf, &TypeInfo::decimal(18, 4)).unwrap();
        assert_eq!(decoded, SqlValue::Decimal(original));
    }

    #[test]
    fn date_roundtrip_through_decoder() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let encoded = encode_value(&SqlValue::Date(date)).unwrap();
        assert_eq!(encoded.len(), 3);

        let mut framed = bytes::BytesMut::new();
        framed.put_u8(3);
        framed.put_slice(&encoded);

        let mut buf = framed.freeze();
        let decoded = decode_value(&mut buf, &TypeInfo::plain(0x28)).unwrap();
        assert_eq!(decoded, SqlValue::Date(date));
    }

    #[test]
    fn datetime_epoch_is_zero() {
        let dt = chrono::NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let encoded = encode_value(&SqlValue::DateTime(dt)).unwrap();
        assert_eq!(&encoded[..], &[0u8; 8]);
    }

    #[test]
    fn ancient_date_rejected() {
        let date = chrono::NaiveDate::MIN;
        assert!(encode_value(&SqlValue::Date(date)).is_err());
    }
}
