//! Initial handshake packets: the server greeting and the client login.
//!
//! ```text
//! server -> client   greeting (seq 0)
//! client -> server   [SSL request (seq 1), TLS handshake]
//! client -> server   login (seq 1, or 2 after an SSL request)
//! server -> client   OK or ERR
//! ```

#![allow(clippy::cast_possible_truncation)]

use mywire_core::Error;

use super::{PacketReader, PacketWriter, capabilities, protocol_error};
use crate::auth::{self, SCRAMBLE_LENGTH};
use crate::config::MySqlConfig;

/// The only handshake protocol version this client speaks.
pub const PROTOCOL_VERSION: u8 = 10;

/// Length of the SSL request payload.
pub const SSL_REQUEST_LENGTH: usize = 32;

/// Parsed server greeting (HandshakeV10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// 20-byte scramble used for the password token
    pub challenge: Vec<u8>,
    /// Full 32-bit server capability flags
    pub capabilities: u32,
    /// Server default charset id
    pub charset: u8,
    pub status_flags: u16,
    /// Authentication plugin the server proposed, if it sent one
    pub auth_plugin: Option<String>,
}

impl Greeting {
    /// Whether the server advertises `CLIENT_SSL`.
    pub const fn supports_ssl(&self) -> bool {
        self.capabilities & capabilities::CLIENT_SSL != 0
    }
}

/// Parse the server greeting.
#[allow(clippy::result_large_err)]
pub fn parse_greeting(payload: &[u8]) -> Result<Greeting, Error> {
    let mut reader = PacketReader::new(payload);

    if reader.peek() == Some(0xFF) {
        // Servers refuse some clients (host not allowed, too many
        // connections) before greeting them.
        let err = reader
            .parse_err_packet()
            .ok_or_else(|| protocol_error("Malformed ERR packet in greeting"))?;
        return Err(Error::Query(err.into_query_error(None)));
    }

    let protocol_version = reader
        .read_u8()
        .ok_or_else(|| protocol_error("Missing protocol version"))?;

    if protocol_version != PROTOCOL_VERSION {
        return Err(protocol_error(format!(
            "Unsupported protocol version: {}",
            protocol_version
        )));
    }

    let server_version = reader
        .read_null_string()
        .ok_or_else(|| protocol_error("Missing server version"))?;

    let connection_id = reader
        .read_u32_le()
        .ok_or_else(|| protocol_error("Missing connection ID"))?;

    let challenge_1 = reader
        .read_bytes(8)
        .ok_or_else(|| protocol_error("Missing auth data"))?;

    // Filler
    reader.skip(1);

    let caps_lower = reader
        .read_u16_le()
        .ok_or_else(|| protocol_error("Missing capability flags"))?;

    let charset = reader
        .read_u8()
        .ok_or_else(|| protocol_error("Missing character set"))?;

    let status_flags = reader
        .read_u16_le()
        .ok_or_else(|| protocol_error("Missing status flags"))?;

    let caps_upper = reader
        .read_u16_le()
        .ok_or_else(|| protocol_error("Missing upper capability flags"))?;
    let capabilities = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

    // Auth data length, then 10 reserved bytes
    if !reader.skip(11) {
        return Err(protocol_error("Truncated greeting"));
    }

    let challenge_2 = reader
        .read_bytes(SCRAMBLE_LENGTH - 8)
        .ok_or_else(|| protocol_error("Missing auth data part 2"))?;

    if reader.peek() == Some(0) {
        reader.skip(1);
    }

    let auth_plugin = if capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 && !reader.is_empty()
    {
        reader.read_null_string().filter(|name| !name.is_empty())
    } else {
        None
    };

    let mut challenge = Vec::with_capacity(SCRAMBLE_LENGTH);
    challenge.extend_from_slice(challenge_1);
    challenge.extend_from_slice(challenge_2);

    Ok(Greeting {
        protocol_version,
        server_version,
        connection_id,
        challenge,
        capabilities,
        charset,
        status_flags,
        auth_plugin,
    })
}

fn write_login_prefix(writer: &mut PacketWriter, config: &MySqlConfig, tls: bool) {
    let mut flags = config.capability_flags();
    if tls {
        flags |= capabilities::CLIENT_SSL;
    }

    writer.write_u32_le(flags);
    writer.write_u32_le(config.max_packet_size);
    writer.write_u8(config.charset);
    writer.write_zeros(23);
}

/// Build the 32-byte SSL request sent before the TLS handshake.
pub fn build_ssl_request(config: &MySqlConfig) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(SSL_REQUEST_LENGTH);
    write_login_prefix(&mut writer, config, true);
    writer.into_bytes()
}

/// Build the login packet answering `challenge`.
///
/// `tls` sets `CLIENT_SSL`, matching the SSL request that preceded it.
pub fn build_login_packet(config: &MySqlConfig, challenge: &[u8], tls: bool) -> Vec<u8> {
    let token = auth::scramble_native_password(config.password.as_deref(), challenge);

    let mut writer = PacketWriter::with_capacity(SSL_REQUEST_LENGTH + 64);
    write_login_prefix(&mut writer, config, tls);

    writer.write_null_string(&config.user);
    // Native password tokens are 0 or 20 bytes
    writer.write_u8(token.len() as u8);
    writer.write_bytes(&token);

    if let Some(db) = config.database.as_deref().filter(|db| !db.is_empty()) {
        writer.write_null_string(db);
    }

    writer.into_bytes()
}
