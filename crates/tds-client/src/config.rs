//! Client configuration.

use std::time::Duration;

use tds_wire::packet::DEFAULT_PACKET_SIZE;

/// Timeouts for the connection phases.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Time to establish the TCP connection (default: 15s).
    pub connect_timeout: Duration,
    /// Time to complete the pre-login/login sequence (default: 30s).
    pub login_timeout: Duration,
    /// Time for a statement's response to arrive (default: 30s).
    pub command_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            login_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    /// Create a timeout configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the login sequence timeout.
    #[must_use]
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Set the statement response timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Connection configuration.
///
/// ```rust
/// use tds_client::Config;
/// use std::time::Duration;
///
/// let config = Config::new("db.example.com")
///     .port(1433)
///     .credentials("sa", "secret")
///     .database("inventory")
///     .packet_size(8192);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host name or address.
    pub host: String,
    /// Server TCP port (default: 1433).
    pub port: u16,
    /// Username for SQL authentication.
    pub username: String,
    /// Password for SQL authentication.
    pub password: String,
    /// Initial database, if any.
    pub database: Option<String>,
    /// Application name reported at login.
    pub app_name: String,
    /// Client machine name reported at login; defaults to the OS hostname.
    pub client_hostname: String,
    /// Packet size to request at login. The server may negotiate it down;
    /// the server's answer wins.
    pub packet_size: u32,
    /// Fallback charset label for non-Unicode columns whose collation is
    /// absent or unknown (default: `windows-1252`).
    pub encoding: String,
    /// Phase timeouts.
    pub timeouts: TimeoutConfig,
}

impl Config {
    /// Smallest packet size the protocol permits.
    pub const MIN_PACKET_SIZE: u32 = 512;

    /// Create a configuration for the given host with defaults.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 1433,
            username: String::new(),
            password: String::new(),
            database: None,
            app_name: String::from("rust-tds"),
            client_hostname: hostname(),
            packet_size: DEFAULT_PACKET_SIZE as u32,
            encoding: String::from("windows-1252"),
            timeouts: TimeoutConfig::default(),
        }
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set SQL authentication credentials.
    #[must_use]
    pub fn credentials(
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
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name reported at login.
    #[must_use]
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the packet size requested at login, clamped to the protocol
    /// bounds.
    #[must_use]
    pub fn packet_size(mut self, size: u32) -> Self {
        self.packet_size = size.clamp(
            Self::MIN_PACKET_SIZE,
            tds_wire::packet::MAX_PACKET_SIZE as u32,
        );
        self
    }

    /// Set the fallback charset label for non-Unicode columns.
    #[must_use]
    pub fn encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }

    /// Set the phase timeouts.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Resolve the configured fallback encoding label.
    #[must_use]
    pub fn fallback_encoding(&self) -> Option<&'static encoding_rs::Encoding> {
        encoding_rs::Encoding::for_label(self.encoding.as_bytes())
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| String::from("localhost"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new("srv");
        assert_eq!(config.port, 1433);
        assert_eq!(config.packet_size, 4096);
        assert_eq!(config.encoding, "windows-1252");
        assert!(config.fallback_encoding().is_some());
    }

    #[test]
    fn packet_size_clamped() {
        assert_eq!(Config::new("srv").packet_size(100).packet_size, 512);
        assert_eq!(
            Config::new("srv").packet_size(1_000_000).packet_size,
            65535
        );
    }

    #[test]
    fn builder_chain() {
        let config = Config::new("srv")
            .credentials("user", "pw")
            .database("db")
            .app_name("app");
        assert_eq!(config.username, "user");
        assert_eq!(config.database.as_deref(), Some("db"));
        assert_eq!(config.app_name, "app");
    }

    #[test]
    fn unknown_encoding_label_resolves_to_none() {
        let config = Config::new("srv").encoding("no-such-charset");
        assert!(config.fallback_encoding().is_none());
    }
}
