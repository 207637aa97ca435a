//! LOGIN7 packet construction.
//!
//! The LOGIN7 packet authenticates the client: a 94-byte fixed header, an
//! offset/length table pointing into a UTF-16LE variable section, and a
//! password obfuscated by nibble swap + XOR 0xA5. The obfuscation is not
//! encryption; it only keeps the password out of casual packet dumps.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::write_utf16_string;
use crate::version::TdsVersion;

/// LOGIN7 fixed header size.
pub const LOGIN7_HEADER_SIZE: usize = 94;

/// LOGIN7 option flags 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionFlags1 {
    /// Use database change notification.
    pub use_db_notify: bool,
    /// Fail login if the initial database is unavailable.
    pub database_fatal: bool,
    /// Warn on language change.
    pub set_lang_warn: bool,
}

impl OptionFlags1 {
    /// Convert to the wire byte.
    #[must_use]
    pub fn to_byte(&self) -> u8 {
        let mut flags = 0u8;
        if self.use_db_notify {
            flags |= 0x20;
        }
        if self.database_fatal {
            flags |= 0x40;
        }
        if self.set_lang_warn {
            flags |= 0x80;
        }
        flags
    }
}

/// LOGIN7 option flags 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionFlags2 {
    /// Fail login if the requested language is unavailable.
    pub language_fatal: bool,
    /// Client behaves like an ODBC driver.
    pub odbc: bool,
}

impl OptionFlags2 {
    /// Convert to the wire byte.
    #[must_use]
    pub fn to_byte(&self) -> u8 {
        let mut flags = 0u8;
        if self.language_fatal {
            flags |= 0x01;
        }
        if self.odbc {
            flags |= 0x02;
        }
        flags
    }
}

/// LOGIN7 option flags 3.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionFlags3 {
    /// Tolerate unknown collations.
    pub unknown_collation_handling: bool,
}

impl OptionFlags3 {
    /// Convert to the wire byte.
    #[must_use]
    pub fn to_byte(&self) -> u8 {
        if self.unknown_collation_handling { 0x08 } else { 0x00 }
    }
}

/// LOGIN7 packet builder.
#[derive(Debug, Clone)]
pub struct Login7 {
    /// TDS version to request.
    pub tds_version: TdsVersion,
    /// Requested packet size. The server may answer with a smaller value
    /// via an EnvChange token; the answered value wins.
    pub packet_size: u32,
    /// Client program version.
    pub client_prog_version: u32,
    /// Client process ID.
    pub client_pid: u32,
    /// Option flags 1.
    pub option_flags1: OptionFlags1,
    /// Option flags 2.
    pub option_flags2: OptionFlags2,
    /// Option flags 3.
    pub option_flags3: OptionFlags3,
    /// Client timezone offset in minutes.
    pub client_timezone: i32,
    /// Client locale ID.
    pub client_lcid: u32,
    /// Client machine name.
    pub hostname: String,
    /// Username for SQL authentication.
    pub username: String,
    /// Password for SQL authentication.
    pub password: String,
    /// Application name.
    pub app_name: String,
    /// Server name as addressed by the client.
    pub server_name: String,
    /// Client library name.
    pub library_name: String,
    /// Initial language.
    pub language: String,
    /// Initial database.
    pub database: String,
    /// Client ID (nominally a MAC address; zeros are accepted).
    pub client_id: [u8; 6],
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            tds_version: TdsVersion::V7_4,
            packet_size: crate::packet::DEFAULT_PACKET_SIZE as u32,
            client_prog_version: 0,
            client_pid: std::process::id(),
            option_flags1: OptionFlags1 {
                use_db_notify: true,
                database_fatal: true,
                set_lang_warn: true,
            },
            option_flags2: OptionFlags2 {
                language_fatal: true,
                odbc: true,
            },
            option_flags3: OptionFlags3 {
                unknown_collation_handling: true,
            },
            client_timezone: 0,
            client_lcid: 0x0409, // English (US)
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            app_name: String::from("rust-tds"),
            server_name: String::new(),
            library_name: String::from("rust-tds"),
            language: String::new(),
            database: String::new(),
            client_id: [0u8; 6],
        }
    }
}

impl Login7 {
    /// Create a new LOGIN7 builder with default flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TDS version to request.
    #[must_use]
    pub fn with_tds_version(mut self, version: TdsVersion) -> Self {
        self.tds_version = version;
        self
    }

    /// Set SQL authentication credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the client machine name.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the server name.
    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    /// Set the requested packet size.
    #[must_use]
    pub fn with_packet_size(mut self, packet_size: u32) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Encode the LOGIN7 packet payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        // Append a variable field, returning its (offset, char length) pair
        // for the header table.
        fn push_str(var_data: &mut BytesMut, offset: &mut u16, s: &str) -> (u16, u16) {
            let start = *offset;
            let len = s.encode_utf16().count() as u16;
            write_utf16_string(var_data, s);
            *offset += len * 2;
            (start, len)
        }

        let mut offset = LOGIN7_HEADER_SIZE as u16;
        let mut var_data = BytesMut::new();

        let hostname = push_str(&mut var_data, &mut offset, &self.hostname);
        let username = push_str(&mut var_data, &mut offset, &self.username);

        let password_start = offset;
        let password_len = self.password.encode_utf16().count() as u16;
        Self::write_obfuscated_password(&mut var_data, &self.password);
        offset += password_len * 2;
        let password = (password_start, password_len);

        let app_name = push_str(&mut var_data, &mut offset, &self.app_name);
        let server_name = push_str(&mut var_data, &mut offset, &self.server_name);
        let unused = (offset, 0u16);
        let library_name = push_str(&mut var_data, &mut offset, &self.library_name);
        let language = push_str(&mut var_data, &mut offset, &self.language);
        let database = push_str(&mut var_data, &mut offset, &self.database);
        // SSPI, attach-DB and change-password sections are not used; their
        // table entries point at the end of the buffer with zero length.
        let empty_tail = (offset, 0u16);

        let total_length = LOGIN7_HEADER_SIZE + var_data.len();
        let mut buf = BytesMut::with_capacity(total_length);

        buf.put_u32_le(total_length as u32);
        buf.put_u32_le(self.tds_version.raw());
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(self.client_prog_version);
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(0); // connection id

        buf.put_u8(self.option_flags1.to_byte());
        buf.put_u8(self.option_flags2.to_byte());
        buf.put_u8(0); // type flags (default SQL type)
        buf.put_u8(self.option_flags3.to_byte());

        buf.put_i32_le(self.client_timezone);
        buf.put_u32_le(self.client_lcid);

        for (off, len) in [
            hostname,
            username,
            password,
            app_name,
            server_name,
            unused,
            library_name,
            language,
            database,
        ] {
            buf.put_u16_le(off);
            buf.put_u16_le(len);
        }

        buf.put_slice(&self.client_id);

        // SSPI, attach-DB file, change-password offset pairs.
        for _ in 0..3 {
            buf.put_u16_le(empty_tail.0);
            buf.put_u16_le(empty_tail.1);
        }

        buf.put_u32_le(0); // SSPI long length

        buf.put_slice(&var_data);
        buf.freeze()
    }

    /// Write a password with TDS obfuscation: for every byte, swap the two
    /// nibbles, then XOR with 0xA5.
    fn write_obfuscated_password(dst: &mut impl BufMut, password: &str) {
        for unit in password.encode_utf16() {
            let low = (unit & 0xFF) as u8;
            let high = (unit >> 8) as u8;
            dst.put_u8(low.rotate_right(4) ^ 0xA5);
            dst.put_u8(high.rotate_right(4) ^ 0xA5);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_flags() {
        let login = Login7::new();
        assert_eq!(login.tds_version, TdsVersion::V7_4);
        assert_eq!(login.packet_size, 4096);
        assert!(login.option_flags2.odbc);
    }

    #[test]
    fn encode_header_layout() {
        let login = Login7::new()
            .with_hostname("CLIENTBOX")
            .with_credentials("sa", "secret")
            .with_database("pubs");

        let encoded = login.encode();
        assert!(encoded.len() >= LOGIN7_HEADER_SIZE);

        // Total length at offset 0
        let total = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(total as usize, encoded.len());

        // TDS version at offset 4
        let version = u32::from_le_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(version, TdsVersion::V7_4.raw());

        // Hostname offset points at the start of the variable section
        let host_off = u16::from_le_bytes([encoded[36], encoded[37]]);
        let host_len = u16::from_le_bytes([encoded[38], encoded[39]]);
        assert_eq!(host_off as usize, LOGIN7_HEADER_SIZE);
        assert_eq!(host_len, 9);
    }

    #[test]
    fn password_obfuscation() {
        // 'a' = 0x0061 UTF-16LE. Low byte 0x61: nibble swap 0x16, XOR 0xA5
        // = 0xB3. High byte 0x00: nibble swap 0x00, XOR 0xA5 = 0xA5.
        let mut buf = BytesMut::new();
        Login7::write_obfuscated_password(&mut buf, "a");
        assert_eq!(&buf[..], &[0xB3, 0xA5]);
    }

    #[test]
    fn empty_password_writes_nothing() {
        let mut buf = BytesMut::new();
        Login7::write_obfuscated_password(&mut buf, "");
        assert!(buf.is_empty());
    }
}
