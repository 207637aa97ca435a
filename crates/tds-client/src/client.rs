//! The TDS client: connect, log in, run statements.

use std::time::Duration;

use bytes::Bytes;
use tds_frame::{CancelHandle, Connection, Message};
use tds_wire::login::Login7;
use tds_wire::packet::PacketType;
use tds_wire::prelogin::PreLogin;
use tds_wire::rpc::RpcRequest;
use tds_wire::sql_batch::encode_sql_batch;
use tds_wire::token::{EnvChange, Token, TokenParser};
use tds_wire::version::TdsVersion;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::cursor::QueryStream;
use crate::error::{Error, Result, ServerMessage};
use crate::params::to_rpc_params;
use crate::state::SessionState;
use crate::SqlValue;

/// A logged-in TDS client over one connection.
///
/// Generic over the transport so any byte stream can carry the protocol;
/// [`Client::connect`] instantiates it over TCP. Exactly one statement is
/// in flight at a time, enforced by the session state machine.
pub struct Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) connection: Connection<T>,
    pub(crate) state: SessionState,
    pub(crate) packet_size: usize,
    tds_version: TdsVersion,
    database: Option<String>,
    pub(crate) fallback_encoding: Option<&'static encoding_rs::Encoding>,
    command_timeout: Duration,
}

impl Client<TcpStream> {
    /// Connect to the configured server and perform the login handshake.
    pub async fn connect(config: Config) -> Result<Self> {
        let address = (config.host.as_str(), config.port);

        let stream = tokio::time::timeout(
            config.timeouts.connect_timeout,
            TcpStream::connect(address),
        )
        .await
        .map_err(|_| Error::ConnectTimeout)??;

        // Small request/response messages; coalescing only adds latency.
        let _ = stream.set_nodelay(true);

        tracing::debug!(host = %config.host, port = config.port, "tcp connected");

        Self::handshake(stream, &config).await
    }
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform the pre-login and LOGIN7 handshake over an established
    /// transport.
    pub async fn handshake(transport: T, config: &Config) -> Result<Self> {
        if config.username.is_empty() {
            return Err(Error::Config("username is required".to_string()));
        }

        let mut client = Self {
            connection: Connection::new(transport),
            state: SessionState::Negotiating,
            packet_size: config.packet_size as usize,
            tds_version: TdsVersion::default(),
            database: config.database.clone(),
            fallback_encoding: config.fallback_encoding(),
            command_timeout: config.timeouts.command_timeout,
        };

        client.prelogin_exchange(config).await?;
        client.login_exchange(config).await?;

        let negotiated = client.packet_size;
        client.connection.set_packet_size(negotiated).await;
        client.state = SessionState::Idle;

        Ok(client)
    }

    async fn prelogin_exchange(&mut self, config: &Config) -> Result<()> {
        let prelogin = PreLogin::new().with_thread_id(std::process::id());

        self.connection
            .send_message(PacketType::PreLogin, prelogin.encode(), self.packet_size)
            .await?;

        let message = self
            .read_response(config.timeouts.login_timeout)
            .await?
            .ok_or(Error::ConnectionClosed)?;

        let response = PreLogin::decode(&message.payload)?;
        if response.encryption.is_required() {
            return Err(Error::ProtocolMismatch(
                "server requires an encrypted channel".to_string(),
            ));
        }

        tracing::debug!(server_version = response.version, "pre-login complete");
        Ok(())
    }

    async fn login_exchange(&mut self, config: &Config) -> Result<()> {
        let mut login = Login7::new()
            .with_credentials(&config.username, &config.password)
            .with_hostname(&config.client_hostname)
            .with_app_name(&config.app_name)
            .with_server_name(&config.host)
            .with_packet_size(config.packet_size);
        if let Some(database) = &config.database {
            login = login.with_database(database);
        }

        self.connection
            .send_message(PacketType::Login7, login.encode(), self.packet_size)
            .await?;

        let message = self
            .read_response(config.timeouts.login_timeout)
            .await?
            .ok_or(Error::ConnectionClosed)?;

        let mut parser = TokenParser::new(message.payload);
        let mut acknowledged = false;

        while let Some(token) = parser.next_token()? {
            match token {
                Token::LoginAck(ack) => {
                    self.tds_version = ack.version();
                    acknowledged = true;
                    tracing::info!(
                        version = %self.tds_version,
                        server = %ack.prog_name,
                        "login acknowledged"
                    );
                }
                Token::EnvChange(env) => self.apply_env_change(&env),
                Token::Info(info) => {
                    tracing::debug!(number = info.number, message = %info.message, "server info");
                }
                Token::Error(err) => {
                    return Err(classify_login_error(ServerMessage::from(err)));
                }
                Token::Done(done) => {
                    if done.status.error && !acknowledged {
                        return Err(Error::ProtocolMismatch(
                            "login rejected without error detail".to_string(),
                        ));
                    }
                    break;
                }
                _ => {}
            }
        }

        if !acknowledged {
            return Err(Error::ProtocolMismatch(
                "login response carried no acknowledgment".to_string(),
            ));
        }

        Ok(())
    }

    /// Submit a SQL batch and return a cursor over its results.
    ///
    /// Fails with [`Error::Busy`] while another statement is in flight
    /// (nothing is sent), and with [`Error::NotConnected`] once the session
    /// has failed or closed.
    pub async fn query(&mut self, sql: &str) -> Result<QueryStream<'_, T>> {
        self.ensure_idle()?;
        let payload = encode_sql_batch(sql);
        self.submit(PacketType::SqlBatch, payload).await
    }

    /// Submit a parameterized statement through `sp_executesql`.
    ///
    /// Placeholders are named `@p1..@pN` in parameter order. With no
    /// parameters this is a plain batch.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryStream<'_, T>> {
        if params.is_empty() {
            return self.query(sql).await;
        }

        self.ensure_idle()?;
        let request = RpcRequest::execute_sql(sql, to_rpc_params(params)?);
        self.submit(PacketType::Rpc, request.encode()).await
    }

    async fn submit(&mut self, packet_type: PacketType, payload: Bytes) -> Result<QueryStream<'_, T>> {
        self.state = SessionState::Busy;

        if let Err(e) = self
            .connection
            .send_message(packet_type, payload, self.packet_size)
            .await
        {
            self.state = SessionState::Failed;
            return Err(e.into());
        }

        let message = match self.read_response(self.command_timeout).await? {
            Some(message) => message,
            None => {
                // Cancel draining also ends in None; anything else means
                // the server went away.
                if self.connection.take_cancel_ack() {
                    self.state = SessionState::Idle;
                    return Err(Error::Cancelled);
                }
                self.state = SessionState::Failed;
                return Err(Error::ConnectionClosed);
            }
        };

        QueryStream::start(self, TokenParser::new(message.payload)).await
    }

    /// Read one response message under a timeout.
    ///
    /// A timeout or transport failure poisons the session: mid-message
    /// resumption would desynchronize the token stream.
    async fn read_response(&mut self, timeout: Duration) -> Result<Option<Message>> {
        match tokio::time::timeout(timeout, self.connection.read_message()).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(e)) => {
                self.state = SessionState::Failed;
                Err(e.into())
            }
            Err(_) => {
                self.state = SessionState::Failed;
                Err(Error::ReadTimeout)
            }
        }
    }

    /// Get a handle for cancelling an in-flight statement from another
    /// task, via the out-of-band attention signal.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle<T> {
        self.connection.cancel_handle()
    }

    /// Close the connection.
    pub async fn close(mut self) {
        self.state = SessionState::Disconnected;
        tracing::debug!("connection closed");
        // Dropping the connection closes the transport; TDS has no
        // logout message.
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session can still run statements.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_usable()
    }

    /// The negotiated packet size.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// The negotiated protocol version.
    #[must_use]
    pub fn tds_version(&self) -> TdsVersion {
        self.tds_version
    }

    /// The current database, as last reported by the server.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub(crate) fn apply_env_change(&mut self, env: &EnvChange) {
        if let Some(size) = env.new_packet_size() {
            tracing::debug!(packet_size = size, "server adjusted packet size");
            self.packet_size = size as usize;
        }
        if let Some(database) = env.new_database() {
            tracing::debug!(database, "database changed");
            self.database = Some(database.to_string());
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::Busy | SessionState::Draining => Err(Error::Busy),
            SessionState::Disconnected | SessionState::Failed | SessionState::Negotiating => {
                Err(Error::NotConnected)
            }
        }
    }
}

impl<T> std::fmt::Debug for Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("packet_size", &self.packet_size)
            .field("tds_version", &self.tds_version)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Sort a login-time server error into the negotiation taxonomy: credential
/// and database-access failures are authentication errors; everything else
/// is a dialect disagreement.
fn classify_login_error(message: ServerMessage) -> Error {
    match message.number {
        4060 | 18450..=18499 => Error::AuthenticationFailed(message.message),
        _ => Error::ProtocolMismatch(message.message),
    }
}

impl<T> Drop for Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn drop(&mut self) {
        if self.state.is_busy() {
            tracing::debug!("client dropped with a statement in flight");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_client(
        transport: tokio::io::DuplexStream,
        state: SessionState,
    ) -> Client<tokio::io::DuplexStream> {
        Client {
            connection: Connection::new(transport),
            state,
            packet_size: 4096,
            tds_version: TdsVersion::V7_4,
            database: None,
            fallback_encoding: None,
            command_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn busy_rejects_without_sending() {
        use tokio::io::AsyncReadExt;

        let (near, mut far) = tokio::io::duplex(1024);
        let mut client = stub_client(near, SessionState::Busy);

        assert!(matches!(client.query("SELECT 1").await, Err(Error::Busy)));

        drop(client);
        let mut sent = Vec::new();
        far.read_to_end(&mut sent).await.ok();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn failed_session_rejects_immediately() {
        let (near, _far) = tokio::io::duplex(1024);
        let mut client = stub_client(near, SessionState::Failed);

        assert!(matches!(
            client.query("SELECT 1").await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            client.execute("SELECT @p1", &[SqlValue::Int(1)]).await,
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn login_error_classification() {
        let auth = ServerMessage {
            number: 18456,
            severity: 14,
            state: 1,
            message: "Login failed for user 'sa'.".to_string(),
            server: None,
            procedure: None,
            line: 1,
        };
        assert!(matches!(
            classify_login_error(auth),
            Error::AuthenticationFailed(_)
        ));

        let version = ServerMessage {
            number: 1734,
            severity: 16,
            state: 1,
            message: "unsupported client".to_string(),
            server: None,
            procedure: None,
            line: 1,
        };
        assert!(matches!(
            classify_login_error(version),
            Error::ProtocolMismatch(_)
        ));
    }
}
