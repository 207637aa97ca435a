//! SQL batch request encoding.
//!
//! A SQL batch payload (packet type 0x01) is the ALL_HEADERS section
//! required by TDS 7.2+ followed by the statement text in UTF-16LE.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::write_utf16_string;

/// Write the ALL_HEADERS section: total length, then a single transaction
/// descriptor header (descriptor 0 = auto-commit, outstanding requests 1).
pub(crate) fn write_all_headers(buf: &mut BytesMut) {
    const ALL_HEADERS_LEN: u32 = 4 + 18;

    buf.put_u32_le(ALL_HEADERS_LEN);
    buf.put_u32_le(18); // header length
    buf.put_u16_le(0x0002); // header type: transaction descriptor
    buf.put_u64_le(0); // transaction descriptor (auto-commit)
    buf.put_u32_le(1); // outstanding request count
}

/// Encode a SQL batch request payload (without the packet header).
#[must_use]
pub fn encode_sql_batch(sql: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(22 + sql.len() * 2);
    write_all_headers(&mut buf);
    write_utf16_string(&mut buf, sql);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_layout() {
        let payload = encode_sql_batch("SELECT 1");

        // ALL_HEADERS (22) + "SELECT 1" in UTF-16LE (16)
        assert_eq!(payload.len(), 38);
        assert_eq!(&payload[0..4], &[22, 0, 0, 0]);
        assert_eq!(&payload[4..8], &[18, 0, 0, 0]);
        assert_eq!(&payload[8..10], &[0x02, 0x00]);

        // SQL text starts at offset 22
        assert_eq!(payload[22], b'S');
        assert_eq!(payload[23], 0);
    }

    #[test]
    fn empty_batch_is_headers_only() {
        assert_eq!(encode_sql_batch("").len(), 22);
    }
}
