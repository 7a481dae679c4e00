//! MySQL connection: handshake, command dispatch and session state.
//!
//! A connection owns one transport and runs strictly one exchange at a
//! time. Every command starts a new exchange at sequence 0; the first
//! response is classified once into [`Response`] and dispatched to OK
//! handling, server errors, LOCAL INFILE upload or a row stream.
//!
//! Immutable data negotiated in the handshake lives in [`ServerInfo`];
//! per-command state is the [`ConnectionState`] flag and the last server
//! status flags.

#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use mywire_core::Value;
use mywire_core::error::{Error, QueryError, QueryErrorKind};

use crate::auth;
use crate::config::MySqlConfig;
use crate::infile;
use crate::protocol::writer::build_command_payload;
use crate::protocol::{
    Command, ErrPacket, OkPacket, Packet, Response, auth_error, build_long_data_packets,
    build_login_packet, build_ssl_request, build_stmt_close_packet, build_stmt_execute_packet,
    disconnected_error, is_eof_packet, parse_greeting, parse_stmt_prepare_ok, protocol_error,
    protocol_error_with_data, read_packet_limited, server_status, write_packet,
};
use crate::result::{ResultSet, RowFormat, WriteResult};
use crate::statement::Statement;
use crate::stream::{MySqlStream, Transport};
use crate::tls::validate_ssl_mode;
use crate::types::ColumnDef;

/// Connection state in the command state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Ready for a new command
    Ready,
    /// A result set is open; its rows must be consumed first
    Streaming,
    /// A transport or protocol failure left the stream out of sync
    Broken,
    /// Connection has been closed
    Closed,
}

/// Data negotiated during the handshake. Never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// Server capability flags from the greeting
    pub capabilities: u32,
    /// Server default charset id
    pub charset: u8,
    /// Auth plugin the server proposed, if any
    pub auth_plugin: Option<String>,
    /// Whether the session runs over TLS
    pub tls: bool,
}

/// A MySQL connection.
///
/// Generic over the [`Transport`] so the protocol engine can run over any
/// blocking byte stream; [`MySqlConnection::connect`] uses [`MySqlStream`].
pub struct MySqlConnection<S: Transport = MySqlStream> {
    stream: S,
    config: MySqlConfig,
    server: ServerInfo,
    state: ConnectionState,
    status_flags: u16,
}

impl<S: Transport> std::fmt::Debug for MySqlConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("state", &self.state)
            .field("connection_id", &self.server.connection_id)
            .field("server_version", &self.server.server_version)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .field("tls", &self.server.tls)
            .finish_non_exhaustive()
    }
}

impl MySqlConnection<MySqlStream> {
    /// Open a socket to the configured server and authenticate.
    #[allow(clippy::result_large_err)]
    pub fn connect(config: MySqlConfig) -> Result<Self, Error> {
        config.validate()?;
        let stream = MySqlStream::connect(&config)?;
        Self::handshake(stream, config)
    }
}

impl<S: Transport> MySqlConnection<S> {
    /// Run the handshake over an already connected transport.
    ///
    /// 1. Read the greeting
    /// 2. Optionally send the SSL request and upgrade the transport
    /// 3. Send the login packet with the scrambled password
    /// 4. Expect OK (or ERR, reported as an authentication failure)
    #[allow(clippy::result_large_err)]
    pub fn handshake(mut stream: S, config: MySqlConfig) -> Result<Self, Error> {
        config.validate()?;

        let max_len = config.max_packet_size as usize;
        let greeting_packet = read_packet_limited(&mut stream, 0, max_len)?;
        let greeting = parse_greeting(&greeting_packet.payload)?;
        tracing::debug!(
            connection_id = greeting.connection_id,
            server_version = %greeting.server_version,
            "Received server greeting"
        );

        if let Some(plugin) = greeting.auth_plugin.as_deref() {
            if plugin != auth::plugins::MYSQL_NATIVE_PASSWORD {
                tracing::debug!(
                    plugin,
                    "Server proposed a different auth plugin; answering with mysql_native_password"
                );
            }
        }

        let mut use_tls = validate_ssl_mode(config.ssl_mode, greeting.capabilities)?;
        if use_tls && !config.ssl_mode.is_required() && !stream.supports_tls() {
            tracing::debug!("TLS not available on this transport, continuing in plaintext");
            use_tls = false;
        }

        let mut seq = greeting_packet.next_seq;
        if use_tls {
            seq = write_packet(&mut stream, seq, &build_ssl_request(&config))?;
            stream.upgrade_to_tls(&config)?;
        }

        let login = build_login_packet(&config, &greeting.challenge, use_tls);
        seq = write_packet(&mut stream, seq, &login)?;

        let reply = read_packet_limited(&mut stream, seq, max_len)?;
        let ok = match reply.first_byte() {
            Some(0x00) => reply
                .reader()
                .parse_ok_packet()
                .ok_or_else(|| protocol_error("Malformed OK packet after login"))?,
            Some(0xFF) => {
                let err = reply
                    .reader()
                    .parse_err_packet()
                    .ok_or_else(|| protocol_error("Malformed ERR packet after login"))?;
                return Err(auth_error(format!(
                    "Authentication failed for user '{}': {}",
                    config.user,
                    err.into_query_error(None)
                )));
            }
            other => {
                return Err(protocol_error_with_data(
                    format!("Expected OK or ERR after login, got {:?}", other),
                    &reply.payload,
                ));
            }
        };

        let server = ServerInfo {
            protocol_version: greeting.protocol_version,
            server_version: greeting.server_version,
            connection_id: greeting.connection_id,
            capabilities: greeting.capabilities,
            charset: greeting.charset,
            auth_plugin: greeting.auth_plugin,
            tls: use_tls,
        };

        tracing::debug!(
            connection_id = server.connection_id,
            server_version = %server.server_version,
            tls = use_tls,
            "Connection established"
        );

        let conn = Self {
            stream,
            config,
            server,
            state: ConnectionState::Ready,
            status_flags: ok.status_flags,
        };
        conn.log_warnings(ok.warnings);
        Ok(conn)
    }

    /// Data negotiated during the handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// Get the connection ID.
    pub fn connection_id(&self) -> u32 {
        self.server.connection_id
    }

    /// Configuration the connection was opened with.
    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection is ready for a command.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Server status flags from the last OK or EOF packet.
    pub fn status_flags(&self) -> u16 {
        self.status_flags
    }

    /// Whether the server reports an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_IN_TRANS != 0
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Run a statement with the text protocol and discard any rows.
    #[allow(clippy::result_large_err)]
    pub fn execute(&mut self, sql: &str) -> Result<WriteResult, Error> {
        self.query(sql)?.close()
    }

    /// Run a statement with the text protocol.
    ///
    /// The returned result set borrows the connection until it is closed or
    /// dropped.
    #[allow(clippy::result_large_err)]
    pub fn query(&mut self, sql: &str) -> Result<ResultSet<'_, S>, Error> {
        self.ensure_ready()?;
        tracing::debug!(sql, "Executing query");

        let seq = self.send_command(&build_command_payload(Command::Query, sql.as_bytes()))?;
        self.read_response(seq, Some(sql), RowFormat::Text)
    }

    /// Prepare a statement on the server.
    #[allow(clippy::result_large_err)]
    pub fn prepare(&mut self, sql: &str) -> Result<Statement, Error> {
        self.ensure_ready()?;
        tracing::debug!(sql, "Preparing statement");

        let seq =
            self.send_command(&build_command_payload(Command::StmtPrepare, sql.as_bytes()))?;
        let packet = self.read_packet(seq)?;

        match packet.first_byte() {
            Some(0x00) => {}
            Some(0xFF) => return Err(self.error_packet(&packet.payload, Some(sql))),
            other => {
                return Err(self.fail(protocol_error_with_data(
                    format!("Expected OK or ERR after prepare, got {:?}", other),
                    &packet.payload,
                )));
            }
        }

        let header = parse_stmt_prepare_ok(&packet.payload).map_err(|e| self.fail(e))?;
        let mut seq = packet.next_seq;

        let params = if header.num_params > 0 {
            let (defs, next) = self.read_column_defs(u64::from(header.num_params), seq)?;
            seq = next;
            defs
        } else {
            Vec::new()
        };

        let columns = if header.num_columns > 0 {
            self.read_column_defs(u64::from(header.num_columns), seq)?.0
        } else {
            Vec::new()
        };

        tracing::trace!(
            statement_id = header.statement_id,
            params = params.len(),
            columns = columns.len(),
            "Statement prepared"
        );
        self.log_warnings(header.warnings);

        Ok(Statement {
            id: header.statement_id,
            connection_id: self.server.connection_id,
            sql: sql.to_string(),
            params,
            columns: Arc::new(columns),
            warnings: header.warnings,
        })
    }

    /// Execute a prepared statement; rows come back in binary format.
    #[allow(clippy::result_large_err)]
    pub fn query_statement(
        &mut self,
        stmt: &Statement,
        params: &[Value],
    ) -> Result<ResultSet<'_, S>, Error> {
        self.ensure_ready()?;
        self.check_statement(stmt, Some(params))?;

        // Encode first so an unencodable value fails before anything is sent
        let execute = build_stmt_execute_packet(stmt.id, params)?;

        for payload in build_long_data_packets(stmt.id, params) {
            tracing::trace!(
                statement_id = stmt.id,
                bytes = payload.len() - 7,
                "Sending long data chunk"
            );
            self.send_command(&payload)?;
        }

        tracing::debug!(
            statement_id = stmt.id,
            sql = %stmt.sql,
            params = params.len(),
            "Executing prepared statement"
        );
        let seq = self.send_command(&execute)?;
        self.read_response(seq, Some(stmt.sql.as_str()), RowFormat::Binary)
    }

    /// Execute a prepared statement and discard any rows.
    #[allow(clippy::result_large_err)]
    pub fn execute_statement(
        &mut self,
        stmt: &Statement,
        params: &[Value],
    ) -> Result<WriteResult, Error> {
        self.query_statement(stmt, params)?.close()
    }

    /// Release a prepared statement. The server sends no response.
    #[allow(clippy::result_large_err)]
    pub fn close_statement(&mut self, stmt: Statement) -> Result<(), Error> {
        self.ensure_ready()?;
        self.check_statement(&stmt, None)?;

        tracing::trace!(statement_id = stmt.id, "Closing statement");
        self.send_command(&build_stmt_close_packet(stmt.id))?;
        Ok(())
    }

    /// Ping the server.
    #[allow(clippy::result_large_err)]
    pub fn ping(&mut self) -> Result<(), Error> {
        self.ensure_ready()?;
        let seq = self.send_command(&[Command::Ping as u8])?;
        self.read_ok_or_err(seq, None, "ping").map(|_| ())
    }

    /// Start a transaction.
    #[allow(clippy::result_large_err)]
    pub fn begin(&mut self) -> Result<(), Error> {
        self.execute("BEGIN").map(|_| ())
    }

    /// Commit the current transaction.
    #[allow(clippy::result_large_err)]
    pub fn commit(&mut self) -> Result<(), Error> {
        self.execute("COMMIT").map(|_| ())
    }

    /// Roll back the current transaction.
    #[allow(clippy::result_large_err)]
    pub fn rollback(&mut self) -> Result<(), Error> {
        self.execute("ROLLBACK").map(|_| ())
    }

    /// Close the connection gracefully.
    ///
    /// Sends COM_QUIT, reads at most one reply and ignores whatever it is,
    /// then shuts the transport down.
    #[allow(clippy::result_large_err)]
    pub fn close(mut self) -> Result<(), Error> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }

        if self.state != ConnectionState::Broken
            && write_packet(&mut self.stream, 0, &[Command::Quit as u8]).is_ok()
        {
            // Servers usually just hang up; some send OK or ERR first
            let max_len = self.config.max_packet_size as usize;
            let _ = read_packet_limited(&mut self.stream, 1, max_len);
        }

        self.stream.shutdown();
        self.state = ConnectionState::Closed;
        tracing::debug!(connection_id = self.server.connection_id, "Connection closed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Exchange plumbing shared with the result set
    // ------------------------------------------------------------------

    #[allow(clippy::result_large_err)]
    fn ensure_ready(&self) -> Result<(), Error> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Streaming => Err(protocol_error(
                "A result set is still open on this connection",
            )),
            ConnectionState::Broken => Err(disconnected_error(
                "Connection is unusable after a transport or protocol failure",
            )),
            ConnectionState::Closed => Err(disconnected_error("Connection is closed")),
        }
    }

    /// Record a failure; transport and protocol failures break the connection.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        if matches!(
            err,
            Error::Connection(_) | Error::Protocol(_) | Error::Io(_) | Error::Timeout
        ) {
            tracing::debug!(error = %err, "Connection marked broken");
            self.state = ConnectionState::Broken;
        }
        err
    }

    #[allow(clippy::result_large_err)]
    fn send_command(&mut self, payload: &[u8]) -> Result<u8, Error> {
        write_packet(&mut self.stream, 0, payload).map_err(|e| self.fail(e))
    }

    #[allow(clippy::result_large_err)]
    pub(crate) fn read_packet(&mut self, seq: u8) -> Result<Packet, Error> {
        let max_len = self.config.max_packet_size as usize;
        read_packet_limited(&mut self.stream, seq, max_len).map_err(|e| self.fail(e))
    }

    /// Turn an ERR payload into the server error it reports.
    pub(crate) fn error_packet(&mut self, payload: &[u8], sql: Option<&str>) -> Error {
        match crate::protocol::PacketReader::new(payload).parse_err_packet() {
            Some(err) => server_error(err, sql),
            None => self.fail(protocol_error_with_data("Malformed ERR packet", payload)),
        }
    }

    pub(crate) fn apply_ok(&mut self, ok: &OkPacket) -> WriteResult {
        self.status_flags = ok.status_flags;
        self.log_warnings(ok.warnings);
        if !ok.info.is_empty() {
            tracing::debug!(info = %ok.info, "Server info");
        }
        WriteResult::from(ok)
    }

    pub(crate) fn begin_streaming(&mut self) {
        self.state = ConnectionState::Streaming;
    }

    /// The row stream reached its end (EOF or ERR).
    pub(crate) fn end_streaming(&mut self, status_flags: Option<u16>) {
        if let Some(flags) = status_flags {
            self.status_flags = flags;
        }
        if self.state == ConnectionState::Streaming {
            self.state = ConnectionState::Ready;
        }
    }

    pub(crate) fn log_warnings(&self, warnings: u16) {
        if warnings > 0 {
            tracing::debug!(warnings, "Server reported warnings");
        }
    }

    /// Read the first response of a query or execute and dispatch on it.
    #[allow(clippy::result_large_err)]
    fn read_response(
        &mut self,
        seq: u8,
        sql: Option<&str>,
        format: RowFormat,
    ) -> Result<ResultSet<'_, S>, Error> {
        let packet = self.read_packet(seq)?;
        let response = Response::parse(&packet.payload).map_err(|e| self.fail(e))?;

        match response {
            Response::Ok(ok) => {
                let summary = self.apply_ok(&ok);
                Ok(ResultSet::completed(self, summary))
            }
            Response::Error(err) => Err(server_error(err, sql)),
            Response::LocalInfile(filename) => {
                if format == RowFormat::Binary {
                    return Err(self.fail(protocol_error(
                        "Unexpected LOCAL INFILE request for a prepared statement",
                    )));
                }
                let summary = self.local_infile(&filename, packet.next_seq, sql)?;
                Ok(ResultSet::completed(self, summary))
            }
            Response::ColumnCount(count) => {
                let (columns, next_seq) = self.read_column_defs(count, packet.next_seq)?;
                Ok(ResultSet::streaming(
                    self,
                    Arc::new(columns),
                    format,
                    next_seq,
                ))
            }
        }
    }

    /// Read `count` column definitions followed by their EOF packet.
    #[allow(clippy::result_large_err)]
    fn read_column_defs(&mut self, count: u64, seq: u8) -> Result<(Vec<ColumnDef>, u8), Error> {
        let mut columns = Vec::with_capacity(count.min(4096) as usize);
        let mut seq = seq;

        for _ in 0..count {
            let packet = self.read_packet(seq)?;
            seq = packet.next_seq;
            columns.push(ColumnDef::parse(&packet.payload).map_err(|e| self.fail(e))?);
        }

        let eof = self.read_packet(seq)?;
        if !is_eof_packet(&eof.payload) {
            return Err(self.fail(protocol_error_with_data(
                "Expected EOF after column definitions",
                &eof.payload,
            )));
        }

        Ok((columns, eof.next_seq))
    }

    /// Serve a LOAD DATA LOCAL INFILE request and read the final reply.
    #[allow(clippy::result_large_err)]
    fn local_infile(
        &mut self,
        filename: &str,
        seq: u8,
        sql: Option<&str>,
    ) -> Result<WriteResult, Error> {
        let upload = infile::send_local_file(
            &mut self.stream,
            filename,
            self.config.local_infile,
            seq,
        )
        .map_err(|e| self.fail(e))?;

        let outcome = self.read_ok_or_err(upload.next_seq, sql, "LOCAL INFILE data");

        // The server's reply has been consumed either way; a local failure
        // takes precedence over what the server made of the empty upload.
        match upload.local_error {
            Some(err) => Err(err),
            None => outcome,
        }
    }

    /// Read a reply that must be OK or ERR.
    #[allow(clippy::result_large_err)]
    fn read_ok_or_err(
        &mut self,
        seq: u8,
        sql: Option<&str>,
        after: &str,
    ) -> Result<WriteResult, Error> {
        let packet = self.read_packet(seq)?;
        match packet.first_byte() {
            Some(0x00) => match packet.reader().parse_ok_packet() {
                Some(ok) => Ok(self.apply_ok(&ok)),
                None => Err(self.fail(protocol_error_with_data(
                    "Malformed OK packet",
                    &packet.payload,
                ))),
            },
            Some(0xFF) => Err(self.error_packet(&packet.payload, sql)),
            other => Err(self.fail(protocol_error_with_data(
                format!("Expected OK or ERR after {}, got {:?}", after, other),
                &packet.payload,
            ))),
        }
    }

    #[allow(clippy::result_large_err)]
    fn check_statement(&self, stmt: &Statement, params: Option<&[Value]>) -> Result<(), Error> {
        if stmt.connection_id != self.server.connection_id {
            return Err(client_error(
                format!(
                    "Statement {} was prepared on connection {}, not {}",
                    stmt.id, stmt.connection_id, self.server.connection_id
                ),
                &stmt.sql,
            ));
        }
        if let Some(params) = params {
            if params.len() != stmt.param_count() {
                return Err(client_error(
                    format!(
                        "Statement expects {} parameters, got {}",
                        stmt.param_count(),
                        params.len()
                    ),
                    &stmt.sql,
                ));
            }
        }
        Ok(())
    }
}

fn server_error(err: ErrPacket, sql: Option<&str>) -> Error {
    tracing::debug!(
        code = err.error_code,
        sqlstate = %err.sql_state,
        message = %err.error_message,
        "Server returned error"
    );
    Error::Query(err.into_query_error(sql))
}

/// A misuse caught before anything was sent.
fn client_error(message: String, sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        code: None,
        sqlstate: None,
        message,
        sql: Some(sql.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketWriter;
    use crate::protocol::capabilities::*;
    use crate::protocol::packet::frame_payload;
    use mywire_core::ConnectionErrorKind;
    use std::io::{self, Cursor, Read, Write};

    /// Replays canned server bytes and records what the client wrote.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Scripted {}

    fn greeting(caps: u32) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_u8(10);
        w.write_null_string("8.0.36");
        w.write_u32_le(7);
        w.write_bytes(&[1; 8]);
        w.write_u8(0);
        w.write_u16_le((caps & 0xFFFF) as u16);
        w.write_u8(33);
        w.write_u16_le(0x0002);
        w.write_u16_le((caps >> 16) as u16);
        w.write_u8(21);
        w.write_zeros(10);
        w.write_bytes(&[2; 12]);
        w.write_u8(0);
        w.into_bytes()
    }

    fn script(frames: &[(&[u8], u8)]) -> Scripted {
        let mut input = Vec::new();
        for (payload, seq) in frames {
            input.extend(frame_payload(payload, *seq).0);
        }
        Scripted {
            input: Cursor::new(input),
            output: Vec::new(),
        }
    }

    const OK: &[u8] = &[0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];

    fn connected(extra: &[(&[u8], u8)]) -> MySqlConnection<Scripted> {
        let hello = greeting(CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION);
        let mut frames: Vec<(&[u8], u8)> = vec![(hello.as_slice(), 0), (OK, 2)];
        frames.extend_from_slice(extra);
        MySqlConnection::handshake(script(&frames), MySqlConfig::new()).unwrap()
    }

    #[test]
    fn test_handshake_populates_server_info() {
        let conn = connected(&[]);
        let info = conn.server_info();
        assert_eq!(info.connection_id, 7);
        assert_eq!(info.server_version, "8.0.36");
        assert!(!info.tls);
        assert!(conn.is_ready());
        assert_eq!(conn.status_flags(), 0x0002);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_preferred_falls_back_without_tls_transport() {
        let hello = greeting(CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION | CLIENT_SSL);
        let config = MySqlConfig::new().ssl_mode(crate::SslMode::Preferred);
        let conn =
            MySqlConnection::handshake(script(&[(hello.as_slice(), 0), (OK, 2)]), config).unwrap();
        assert!(!conn.server_info().tls);
    }

    #[test]
    fn test_required_ssl_without_server_support() {
        let hello = greeting(CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION);
        let config = MySqlConfig::new().ssl_mode(crate::SslMode::Required);
        let mut transport = script(&[(hello.as_slice(), 0)]);
        let err = MySqlConnection::handshake(&mut transport, config).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ref c) if c.kind == ConnectionErrorKind::Ssl
        ));
        // Nothing was sent before the mismatch was detected
        assert!(transport.output.is_empty());
    }

    #[test]
    fn test_login_rejected_is_auth_error() {
        let hello = greeting(CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION);
        let mut denied = vec![0xFF, 0x15, 0x04, b'#'];
        denied.extend_from_slice(b"28000Access denied for user 'root'");
        let err = MySqlConnection::handshake(
            script(&[(hello.as_slice(), 0), (denied.as_slice(), 2)]),
            MySqlConfig::new(),
        )
        .unwrap_err();
        match err {
            Error::Connection(c) => {
                assert_eq!(c.kind, ConnectionErrorKind::Authentication);
                assert!(c.message.contains("1045"));
                assert!(c.message.contains("Access denied"));
            }
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn test_auth_switch_is_protocol_error() {
        let hello = greeting(CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION);
        let mut switch = vec![0xFE];
        switch.extend_from_slice(b"caching_sha2_password\0");
        let err = MySqlConnection::handshake(
            script(&[(hello.as_slice(), 0), (switch.as_slice(), 2)]),
            MySqlConfig::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_server_error_keeps_connection_ready() {
        let mut err = vec![0xFF, 0x28, 0x04, b'#'];
        err.extend_from_slice(b"42000You have an error in your SQL syntax");
        let mut conn = connected(&[(err.as_slice(), 1), (OK, 1)]);

        match conn.execute("SELEC 1") {
            Err(Error::Query(q)) => {
                assert_eq!(q.code, Some(1064));
                assert_eq!(q.kind, QueryErrorKind::Syntax);
                assert_eq!(q.sql.as_deref(), Some("SELEC 1"));
            }
            other => panic!("expected server error, got {:?}", other),
        }
        assert!(conn.is_ready());
        conn.ping().unwrap();
    }

    #[test]
    fn test_protocol_failure_breaks_connection() {
        // Reply arrives with the wrong sequence number
        let mut conn = connected(&[(OK, 5)]);
        assert!(matches!(conn.ping(), Err(Error::Protocol(_))));
        assert_eq!(conn.state(), ConnectionState::Broken);
        assert!(matches!(
            conn.ping(),
            Err(Error::Connection(ref c)) if c.kind == ConnectionErrorKind::Disconnected
        ));
    }

    #[test]
    fn test_transaction_status_tracking() {
        let in_trans = [0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00];
        let mut conn = connected(&[(&in_trans[..], 1), (OK, 1)]);
        conn.begin().unwrap();
        assert!(conn.in_transaction());
        conn.commit().unwrap();
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_close_sends_quit() {
        let conn = connected(&[]);
        conn.close().unwrap();
    }

    #[test]
    fn test_statement_from_other_connection() {
        let mut conn = connected(&[]);
        let stmt = Statement {
            id: 1,
            connection_id: 99,
            sql: "SELECT 1".to_string(),
            params: Vec::new(),
            columns: Arc::new(Vec::new()),
            warnings: 0,
        };
        assert!(matches!(
            conn.execute_statement(&stmt, &[]),
            Err(Error::Query(ref q)) if q.code.is_none()
        ));
        assert!(conn.is_ready());
    }
}
