//! TDS pre-login message handling.
//!
//! The pre-login message is the first exchange of a TDS 7.x session. It is
//! an option table — token, 2-byte big-endian offset, 2-byte big-endian
//! length per entry, 0xFF terminator — followed by the option payloads.
//! This client negotiates version and encryption (always off; encrypted
//! channels are outside this crate's scope) plus thread id and MARS (off).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Pre-login option tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum OptionToken {
    Version = 0x00,
    Encryption = 0x01,
    Instance = 0x02,
    ThreadId = 0x03,
    Mars = 0x04,
    Terminator = 0xFF,
}

/// Encryption level negotiated at pre-login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncryptionLevel {
    /// Encryption is off (login packet still obfuscates the password).
    #[default]
    Off = 0x00,
    /// Encryption is on.
    On = 0x01,
    /// Encryption is not supported by this peer.
    NotSupported = 0x02,
    /// Encryption is required by this peer.
    Required = 0x03,
}

impl EncryptionLevel {
    /// Create from a raw byte value. Unknown values map to `Off`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::On,
            0x02 => Self::NotSupported,
            0x03 => Self::Required,
            _ => Self::Off,
        }
    }

    /// Whether the peer insists on an encrypted channel.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self, Self::On | Self::Required)
    }
}

/// Pre-login message, used for both the client request and the server's
/// mirrored response.
#[derive(Debug, Clone)]
pub struct PreLogin {
    /// Version field. The client sends its library version; the server
    /// answers with the database product version. Neither is the TDS
    /// protocol version — that is negotiated by LOGINACK.
    pub version: u32,
    /// Sub-build number paired with `version`.
    pub sub_build: u16,
    /// Encryption negotiation byte.
    pub encryption: EncryptionLevel,
    /// Client thread id, echoed for server-side diagnostics.
    pub thread_id: u32,
    /// Multiple Active Result Sets. Always requested off.
    pub mars: bool,
}

impl Default for PreLogin {
    fn default() -> Self {
        Self {
            version: 0,
            sub_build: 0,
            encryption: EncryptionLevel::NotSupported,
            thread_id: 0,
            mars: false,
        }
    }
}

impl PreLogin {
    /// Create a client pre-login request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client thread id.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: u32) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// Encode the pre-login message payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        // Option table: 4 entries of 5 bytes each + terminator.
        const TABLE_LEN: u16 = 4 * 5 + 1;

        let mut buf = BytesMut::with_capacity(TABLE_LEN as usize + 12);
        let mut offset = TABLE_LEN;

        // VERSION: 6 bytes
        buf.put_u8(OptionToken::Version as u8);
        buf.put_u16(offset);
        buf.put_u16(6);
        offset += 6;

        // ENCRYPTION: 1 byte
        buf.put_u8(OptionToken::Encryption as u8);
        buf.put_u16(offset);
        buf.put_u16(1);
        offset += 1;

        // THREADID: 4 bytes
        buf.put_u8(OptionToken::ThreadId as u8);
        buf.put_u16(offset);
        buf.put_u16(4);
        offset += 4;

        // MARS: 1 byte
        buf.put_u8(OptionToken::Mars as u8);
        buf.put_u16(offset);
        buf.put_u16(1);

        buf.put_u8(OptionToken::Terminator as u8);

        // Option payloads, in table order.
        buf.put_u32(self.version);
        buf.put_u16(self.sub_build);
        buf.put_u8(self.encryption as u8);
        buf.put_u32_le(self.thread_id);
        buf.put_u8(u8::from(self.mars));

        buf.freeze()
    }

    /// Decode a pre-login message payload (typically a server response).
    pub fn decode(payload: &Bytes) -> Result<Self, ProtocolError> {
        let mut prelogin = Self::default();
        let mut table = payload.clone();

        loop {
            if !table.has_remaining() {
                return Err(ProtocolError::truncated(1, 0));
            }
            let token = table.get_u8();
            if token == OptionToken::Terminator as u8 {
                break;
            }

            if table.remaining() < 4 {
                return Err(ProtocolError::truncated(4, table.remaining()));
            }
            let offset = table.get_u16() as usize;
            let length = table.get_u16() as usize;

            if offset + length > payload.len() {
                return Err(ProtocolError::truncated(offset + length, payload.len()));
            }
            let mut data = payload.slice(offset..offset + length);

            match token {
                t if t == OptionToken::Version as u8 => {
                    if data.remaining() >= 6 {
                        prelogin.version = data.get_u32();
                        prelogin.sub_build = data.get_u16();
                    }
                }
                t if t == OptionToken::Encryption as u8 => {
                    if data.remaining() >= 1 {
                        prelogin.encryption = EncryptionLevel::from_u8(data.get_u8());
                    }
                }
                t if t == OptionToken::ThreadId as u8 => {
                    if data.remaining() >= 4 {
                        prelogin.thread_id = data.get_u32_le();
                    }
                }
                t if t == OptionToken::Mars as u8 => {
                    if data.remaining() >= 1 {
                        prelogin.mars = data.get_u8() != 0;
                    }
                }
                t if t == OptionToken::Instance as u8 => {
                    // Named-instance validation byte; nothing to record.
                }
                other => return Err(ProtocolError::InvalidPreloginOption(other)),
            }
        }

        Ok(prelogin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let request = PreLogin::new().with_thread_id(0xC0FFEE);
        let encoded = request.encode();

        let decoded = PreLogin::decode(&encoded).unwrap();
        assert_eq!(decoded.encryption, EncryptionLevel::NotSupported);
        assert_eq!(decoded.thread_id, 0xC0FFEE);
        assert!(!decoded.mars);
    }

    #[test]
    fn table_offsets_are_big_endian() {
        let encoded = PreLogin::new().encode();
        // First entry: VERSION at offset 21 (4 entries * 5 + terminator).
        assert_eq!(encoded[0], 0x00);
        assert_eq!(u16::from_be_bytes([encoded[1], encoded[2]]), 21);
        assert_eq!(u16::from_be_bytes([encoded[3], encoded[4]]), 6);
    }

    #[test]
    fn unknown_option_rejected() {
        let mut raw = BytesMut::new();
        raw.put_u8(0x77); // bogus token
        raw.put_u16(6);
        raw.put_u16(1);
        raw.put_u8(0xFF);
        raw.put_u8(0x00);
        let err = PreLogin::decode(&raw.freeze()).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidPreloginOption(0x77));
    }

    #[test]
    fn truncated_table_rejected() {
        let raw = Bytes::from_static(&[0x00, 0x00]);
        assert!(PreLogin::decode(&raw).is_err());
    }
}
