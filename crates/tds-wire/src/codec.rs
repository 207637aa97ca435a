//! Low-level field codec helpers shared by the protocol structures.
//!
//! Token fields and login strings use length-prefixed UTF-16LE: B_VARCHAR
//! carries a 1-byte length in characters, US_VARCHAR a 2-byte length.

use bytes::{Buf, BufMut};

/// Read a length-prefixed UTF-16LE string (1-byte length in characters).
pub fn read_b_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 1 {
        return None;
    }
    let len = src.get_u8() as usize;
    read_utf16_string(src, len)
}

/// Read a length-prefixed UTF-16LE string (2-byte length in characters).
pub fn read_us_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 2 {
        return None;
    }
    let len = src.get_u16_le() as usize;
    read_utf16_string(src, len)
}

/// Read a UTF-16LE string of the given character length.
pub fn read_utf16_string(src: &mut impl Buf, char_count: usize) -> Option<String> {
    if src.remaining() < char_count * 2 {
        return None;
    }

    let mut units = Vec::with_capacity(char_count);
    for _ in 0..char_count {
        units.push(src.get_u16_le());
    }

    String::from_utf16(&units).ok()
}

/// Write a length-prefixed UTF-16LE string (1-byte length).
///
/// Strings longer than 255 characters are truncated to fit the prefix.
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(255) as u8;
    dst.put_u8(len);
    for &u in &units[..len as usize] {
        dst.put_u16_le(u);
    }
}

/// Write a length-prefixed UTF-16LE string (2-byte length).
pub fn write_us_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(65535) as u16;
    dst.put_u16_le(len);
    for &u in &units[..len as usize] {
        dst.put_u16_le(u);
    }
}

/// Write a UTF-16LE string without a length prefix.
pub fn write_utf16_string(dst: &mut impl BufMut, s: &str) {
    for u in s.encode_utf16() {
        dst.put_u16_le(u);
    }
}

/// Byte length of a string once UTF-16 encoded.
#[must_use]
pub fn utf16_byte_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    #[test]
    fn b_varchar_roundtrip() {
        let original = "master..sysdatabases";
        let mut buf = BytesMut::new();
        write_b_varchar(&mut buf, original);

        let mut cursor = buf.freeze();
        assert_eq!(read_b_varchar(&mut cursor).unwrap(), original);
    }

    #[test]
    fn us_varchar_roundtrip_non_ascii() {
        let original = "sälje — 販売";
        let mut buf = BytesMut::new();
        write_us_varchar(&mut buf, original);

        let mut cursor = buf.freeze();
        assert_eq!(read_us_varchar(&mut cursor).unwrap(), original);
    }

    #[test]
    fn empty_string_roundtrip() {
        let mut buf = BytesMut::new();
        write_b_varchar(&mut buf, "");
        let mut cursor = buf.freeze();
        assert_eq!(read_b_varchar(&mut cursor).unwrap(), "");
    }

    #[test]
    fn short_buffer_returns_none() {
        let mut cursor = &[0x05u8, b'x', 0x00][..];
        assert!(read_b_varchar(&mut cursor).is_none());
    }

    #[test]
    fn utf16_byte_len_counts_units() {
        assert_eq!(utf16_byte_len("SELECT"), 12);
        assert_eq!(utf16_byte_len("𐐷"), 4); // surrogate pair
    }

    proptest! {
        #[test]
        fn us_varchar_roundtrip_any(s in "\\PC{0,64}") {
            let mut buf = BytesMut::new();
            write_us_varchar(&mut buf, &s);
            let mut cursor = buf.freeze();
            prop_assert_eq!(read_us_varchar(&mut cursor).unwrap(), s);
        }
    }
}
