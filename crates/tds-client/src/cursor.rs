//! Streaming result cursor.

use std::sync::Arc;

use bytes::Bytes;
use tds_values::{SqlValue, decode::decode_value, decode::encoding_for_lcid};
use tds_wire::token::{ColMetaData, NbcRow, RawRow, Token, TokenParser};
use tds_wire::types::TypeId;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::client::Client;
use crate::error::{Error, Result, ServerMessage};
use crate::row::{Column, Row};
use crate::state::SessionState;

/// Cursor over one statement's response.
///
/// Rows stream lazily in server-transmission order. Informational messages
/// accumulate as [`warnings`](QueryStream::warnings); a server error drains
/// the remainder of the response, returns the session to idle, and is
/// surfaced once — rows already consumed stay valid. After exhaustion,
/// [`next_row`](QueryStream::next_row) keeps returning `Ok(None)`.
pub struct QueryStream<'a, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    client: &'a mut Client<T>,
    parser: TokenParser,
    metadata: Option<ColMetaData>,
    columns: Arc<[Column]>,
    decode_infos: Vec<tds_values::TypeInfo>,
    warnings: Vec<ServerMessage>,
    return_status: Option<i32>,
    rows_affected: u64,
    current_set_done: bool,
    more_results: bool,
    finished: bool,
}

impl<'a, T> QueryStream<'a, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Build the cursor and advance to the first result set's metadata
    /// (or to completion, for statements that return no rows).
    pub(crate) async fn start(
        client: &'a mut Client<T>,
        parser: TokenParser,
    ) -> Result<Self> {
        let mut stream = Self {
            client,
            parser,
            metadata: None,
            columns: Arc::from(Vec::new()),
            decode_infos: Vec::new(),
            warnings: Vec::new(),
            return_status: None,
            rows_affected: 0,
            current_set_done: false,
            more_results: false,
            finished: false,
        };

        stream.advance_to_metadata()?;
        Ok(stream)
    }

    /// Column metadata of the current result set. Empty for statements
    /// that return no rows.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Warnings (informational server messages) collected so far.
    #[must_use]
    pub fn warnings(&self) -> &[ServerMessage] {
        &self.warnings
    }

    /// Stored-procedure return status, once observed.
    #[must_use]
    pub fn return_status(&self) -> Option<i32> {
        self.return_status
    }

    /// Rows affected, as reported by the most recent completion token.
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Fetch the next row of the current result set.
    ///
    /// Returns `Ok(None)` when the set is exhausted — also on every
    /// subsequent call; exhaustion is a state, not an error.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.finished || self.current_set_done {
            return Ok(None);
        }

        loop {
            let token = match self.parser.next_token_with_metadata(self.metadata.as_ref()) {
                Ok(token) => token,
                Err(e) => return Err(self.poison(e.into())),
            };

            let Some(token) = token else {
                // Response ended without a final completion token.
                self.finish_mut();
                return Ok(None);
            };

            match token {
                Token::Row(row) => return Ok(Some(self.decode_raw_row(&row)?)),
                Token::NbcRow(row) => return Ok(Some(self.decode_nbc_row(&row)?)),
                Token::Info(info) => self.warnings.push(ServerMessage::from(info)),
                Token::EnvChange(env) => self.client.apply_env_change(&env),
                Token::ReturnStatus(status) => self.return_status = Some(status),
                Token::Error(err) => {
                    return Err(self.fail_statement(ServerMessage::from(err)));
                }
                Token::Done(done) | Token::DoneProc(done) | Token::DoneInProc(done) => {
                    if done.status.attention {
                        self.client.connection.acknowledge_cancel();
                        self.finish_mut();
                        return Err(Error::Cancelled);
                    }
                    if done.status.count {
                        self.rows_affected = done.row_count;
                    }
                    self.current_set_done = true;
                    self.more_results = done.status.more;
                    if !done.status.more {
                        self.finish_mut();
                    }
                    return Ok(None);
                }
                Token::ColMetaData(_)
                | Token::Order(_)
                | Token::ReturnValue(_)
                | Token::LoginAck(_) => {
                    // Order and output values carry nothing a row consumer
                    // needs; metadata only follows a completion token.
                }
            }
        }
    }

    /// Advance to the next result set, if the previous completion token
    /// announced one. Returns `true` when new column metadata is ready.
    pub async fn next_result(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        if !self.current_set_done {
            // Drain the rest of the current set first.
            while self.next_row().await?.is_some() {}
        }
        if self.finished || !self.more_results {
            return Ok(false);
        }

        self.metadata = None;
        self.current_set_done = false;
        self.advance_to_metadata()?;
        Ok(!self.finished && self.metadata.is_some())
    }

    /// Consume everything that remains, returning the session to idle.
    pub async fn finish(mut self) -> Result<u64> {
        loop {
            while self.next_row().await?.is_some() {}
            if !self.next_result().await? {
                break;
            }
        }
        Ok(self.rows_affected)
    }

    /// Parse forward until the next result set's metadata, or completion.
    fn advance_to_metadata(&mut self) -> Result<()> {
        loop {
            let token = match self.parser.next_token_with_metadata(None) {
                Ok(token) => token,
                Err(e) => return Err(self.poison(e.into())),
            };

            let Some(token) = token else {
                self.finish_mut();
                return Ok(());
            };

            match token {
                Token::ColMetaData(meta) => {
                    self.install_metadata(meta);
                    return Ok(());
                }
                Token::Info(info) => self.warnings.push(ServerMessage::from(info)),
                Token::EnvChange(env) => self.client.apply_env_change(&env),
                Token::ReturnStatus(status) => self.return_status = Some(status),
                Token::Error(err) => {
                    return Err(self.fail_statement(ServerMessage::from(err)));
                }
                Token::Done(done) | Token::DoneProc(done) | Token::DoneInProc(done) => {
                    if done.status.attention {
                        self.client.connection.acknowledge_cancel();
                        self.finish_mut();
                        return Err(Error::Cancelled);
                    }
                    if done.status.count {
                        self.rows_affected = done.row_count;
                    }
                    if !done.status.more {
                        self.finish_mut();
                        return Ok(());
                    }
                    // More results follow; keep scanning for metadata.
                }
                _ => {}
            }
        }
    }

    fn install_metadata(&mut self, meta: ColMetaData) {
        let columns: Vec<Column> = meta
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| Column::from_wire(i, col))
            .collect();

        self.decode_infos = meta
            .columns
            .iter()
            .map(|col| {
                let encoding = match col.type_id {
                    TypeId::BigVarChar | TypeId::BigChar | TypeId::Text => col
                        .type_info
                        .collation
                        .and_then(|c| encoding_for_lcid(c.lcid))
                        .or(self.client.fallback_encoding),
                    _ => None,
                };
                tds_values::TypeInfo {
                    type_id: col.type_id as u8,
                    max_length: col.type_info.max_length,
                    precision: col.type_info.precision,
                    scale: col.type_info.scale,
                    encoding,
                }
            })
            .collect();

        tracing::debug!(columns = columns.len(), "result set metadata");

        self.columns = Arc::from(columns);
        self.metadata = Some(meta);
        self.current_set_done = false;
    }

    fn decode_raw_row(&mut self, row: &RawRow) -> Result<Row> {
        let mut cursor = row.data.clone();
        let mut values = Vec::with_capacity(self.decode_infos.len());

        for info in &self.decode_infos {
            match decode_value(&mut cursor, info) {
                Ok(value) => values.push(value),
                Err(e) => return Err(self.poison(e.into())),
            }
        }

        Ok(Row::new(Arc::clone(&self.columns), values))
    }

    fn decode_nbc_row(&mut self, row: &NbcRow) -> Result<Row> {
        let mut cursor: Bytes = row.data.clone();
        let mut values = Vec::with_capacity(self.decode_infos.len());

        for (i, info) in self.decode_infos.iter().enumerate() {
            if row.is_null(i) {
                values.push(SqlValue::Null);
                continue;
            }
            match decode_value(&mut cursor, info) {
                Ok(value) => values.push(value),
                Err(e) => return Err(self.poison(e.into())),
            }
        }

        Ok(Row::new(Arc::clone(&self.columns), values))
    }

    /// A server error aborts the statement only: drain the rest of the
    /// response so the session comes back idle, then surface the error.
    fn fail_statement(&mut self, message: ServerMessage) -> Error {
        if message.is_fatal() {
            tracing::warn!(number = message.number, severity = message.severity,
                "fatal server error");
        }

        // Everything is already buffered; drain tokens locally. Further
        // errors or parse failures are subsumed by the one being surfaced.
        loop {
            match self.parser.next_token_with_metadata(self.metadata.as_ref()) {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => break,
            }
        }

        self.finish_mut();
        Error::server(message)
    }

    /// Token or value decode failure: the stream position can no longer be
    /// trusted, so the session is poisoned.
    fn poison(&mut self, error: Error) -> Error {
        self.finished = true;
        self.client.state = SessionState::Failed;
        error
    }

    fn finish_mut(&mut self) {
        if !self.finished {
            self.finished = true;
            if self.client.state == SessionState::Busy {
                self.client.state = SessionState::Idle;
            }
        }
    }
}

impl<T> Drop for QueryStream<'_, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        // The whole response is buffered locally; dropping the cursor
        // must not leave the session stuck busy.
        loop {
            match self.parser.next_token_with_metadata(self.metadata.as_ref()) {
                Ok(Some(Token::ColMetaData(meta))) => self.install_metadata(meta),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    self.poison(Error::NotConnected);
                    return;
                }
            }
        }

        self.finish_mut();
    }
}

impl<T> std::fmt::Debug for QueryStream<'_, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream")
            .field("columns", &self.columns.len())
            .field("finished", &self.finished)
            .field("more_results", &self.more_results)
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}
