//! Frame codec: the length-prefixed packet envelope.
//!
//! A logical payload is carried by one or more frames. Every frame but the
//! last has the maximum length of 2^24 - 1, so a payload whose length is an
//! exact multiple of the maximum is terminated by one empty frame. Sequence
//! numbers increase by one per frame (mod 256) within an exchange.

#![allow(clippy::cast_possible_truncation)]

use std::io::{self, Read, Write};

use mywire_core::Error;
use mywire_core::error::{ConnectionError, ConnectionErrorKind};

use super::{MAX_PACKET_SIZE, PacketHeader, PacketReader, protocol_error};

/// A reassembled payload and the sequence number that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Concatenated frame payloads
    pub payload: Vec<u8>,
    /// Sequence number the next frame of this exchange carries
    pub next_seq: u8,
}

impl Packet {
    /// First payload byte, if any.
    pub fn first_byte(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// A cursor over the payload.
    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader::new(&self.payload)
    }
}

/// Read one logical packet, checking that frames arrive in sequence starting
/// at `expected_seq`.
#[allow(clippy::result_large_err)]
pub fn read_packet<R: Read + ?Sized>(stream: &mut R, expected_seq: u8) -> Result<Packet, Error> {
    read_packet_limited(stream, expected_seq, usize::MAX)
}

/// Like [`read_packet`], but rejects a reassembled payload longer than
/// `max_len` before reading the frame that would exceed it.
#[allow(clippy::result_large_err)]
pub fn read_packet_limited<R: Read + ?Sized>(
    stream: &mut R,
    expected_seq: u8,
    max_len: usize,
) -> Result<Packet, Error> {
    let mut payload = Vec::new();
    let mut seq = expected_seq;
    let mut first = true;

    loop {
        let mut header_buf = [0u8; PacketHeader::SIZE];
        stream
            .read_exact(&mut header_buf)
            .map_err(|e| io_error("Failed to read packet header", e))?;

        let header = PacketHeader::from_bytes(&header_buf);
        if header.sequence_id != seq {
            return Err(protocol_error(format!(
                "Packet out of order: expected sequence {}, got {}",
                seq, header.sequence_id
            )));
        }
        seq = seq.wrapping_add(1);

        // 24-bit lengths cannot exceed MAX_PACKET_SIZE; only the empty
        // leading frame needs rejecting.
        let len = header.payload_length as usize;
        if first && len == 0 {
            return Err(protocol_error("Received empty packet"));
        }
        first = false;

        if payload.len().saturating_add(len) > max_len {
            return Err(protocol_error(format!(
                "Packet exceeds the maximum size of {} bytes",
                max_len
            )));
        }

        if len > 0 {
            let start = payload.len();
            payload.resize(start + len, 0);
            stream
                .read_exact(&mut payload[start..])
                .map_err(|e| io_error("Failed to read packet payload", e))?;
        }

        if len < MAX_PACKET_SIZE {
            break;
        }
    }

    Ok(Packet {
        payload,
        next_seq: seq,
    })
}

/// Frame and send `payload` starting at sequence `seq`.
///
/// Returns the sequence number for the next outbound frame.
#[allow(clippy::result_large_err)]
pub fn write_packet<W: Write + ?Sized>(stream: &mut W, seq: u8, payload: &[u8]) -> Result<u8, Error> {
    let (frames, next_seq) = frame_payload(payload, seq);

    stream
        .write_all(&frames)
        .map_err(|e| io_error("Failed to write packet", e))?;
    stream
        .flush()
        .map_err(|e| io_error("Failed to flush stream", e))?;

    Ok(next_seq)
}

/// Split `payload` into frames, appending an empty frame when the final
/// chunk is exactly the maximum size.
pub fn frame_payload(payload: &[u8], mut seq: u8) -> (Vec<u8>, u8) {
    let frame_count = payload.len() / MAX_PACKET_SIZE + 1;
    let mut out = Vec::with_capacity(payload.len() + frame_count * PacketHeader::SIZE);
    let mut offset = 0;

    loop {
        let chunk_len = (payload.len() - offset).min(MAX_PACKET_SIZE);
        let header = PacketHeader {
            payload_length: chunk_len as u32,
            sequence_id: seq,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&payload[offset..offset + chunk_len]);
        offset += chunk_len;
        seq = seq.wrapping_add(1);

        if chunk_len < MAX_PACKET_SIZE {
            break;
        }
    }

    (out, seq)
}

pub(crate) fn io_error(context: &str, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
        _ => Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: format!("{}: {}", context, e),
            source: Some(Box::new(e)),
        }),
    }
}
