//! Cursor over a received payload.
//!
//! Reads the protocol's primitive encodings: fixed-width little-endian
//! integers, length-encoded integers and strings, and nul-terminated
//! strings. Every read returns `None` when the payload is too short, and
//! callers turn that into a protocol error naming the missing field.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{EofPacket, ErrPacket, OkPacket};

/// Marker byte for a NULL column in a text row.
pub const NULL_MARKER: u8 = 0xFB;

/// A reader for MySQL protocol data.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Create a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get remaining bytes in the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if we've reached the end of the data.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Peek at the next byte without advancing.
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes: [u8; N] = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    /// Read a u16 (little-endian).
    pub fn read_u16_le(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    /// Read a u24 (little-endian, 3 bytes).
    pub fn read_u24_le(&mut self) -> Option<u32> {
        self.take::<3>()
            .map(|[a, b, c]| u32::from_le_bytes([a, b, c, 0]))
    }

    /// Read a u32 (little-endian).
    pub fn read_u32_le(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    /// Read a u64 (little-endian).
    pub fn read_u64_le(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    /// Read a length-encoded integer.
    ///
    /// - 0x00-0xFA: 1-byte value
    /// - 0xFC: 2-byte value follows
    /// - 0xFD: 3-byte value follows
    /// - 0xFE: 8-byte value follows
    ///
    /// 0xFB (NULL in rows) and 0xFF (error marker) are not integers and
    /// yield `None`; callers that can see them check the prefix first.
    pub fn read_lenenc_int(&mut self) -> Option<u64> {
        let first = self.read_u8()?;
        match first {
            0x00..=0xFA => Some(u64::from(first)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => self.read_u24_le().map(u64::from),
            0xFE => self.read_u64_le(),
            0xFB | 0xFF => None,
        }
    }

    /// Read a length-encoded byte string borrowed from the payload.
    pub fn read_lenenc_slice(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.read_lenenc_int()?).ok()?;
        self.read_bytes(len)
    }

    /// Read one text-row column: `Some(None)` for NULL, `Some(Some(bytes))`
    /// for a value, `None` when the payload is truncated.
    pub fn read_lenenc_or_null(&mut self) -> Option<Option<&'a [u8]>> {
        if self.peek()? == NULL_MARKER {
            self.pos += 1;
            return Some(None);
        }
        self.read_lenenc_slice().map(Some)
    }

    /// Read a length-encoded string.
    pub fn read_lenenc_string(&mut self) -> Option<String> {
        self.read_lenenc_slice()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read a length-encoded byte vector.
    pub fn read_lenenc_bytes(&mut self) -> Option<Vec<u8>> {
        self.read_lenenc_slice().map(<[u8]>::to_vec)
    }

    /// Read a null-terminated string.
    ///
    /// A missing terminator consumes the rest of the payload.
    pub fn read_null_string(&mut self) -> Option<String> {
        let rest = self.data.get(self.pos..)?;
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += (end + 1).min(rest.len());
        Some(s)
    }

    /// Read a fixed-length string.
    pub fn read_string(&mut self, len: usize) -> Option<String> {
        let bytes = self.read_bytes(len)?;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read remaining data as a string.
    pub fn read_rest_string(&mut self) -> String {
        String::from_utf8_lossy(self.read_rest()).into_owned()
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(bytes)
    }

    /// Read remaining bytes.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        self.pos = self.data.len();
        rest
    }

    /// Skip a number of bytes.
    pub fn skip(&mut self, n: usize) -> bool {
        if self.remaining() >= n {
            self.pos += n;
            true
        } else {
            false
        }
    }

    /// Parse an OK packet from the current position.
    ///
    /// OK packet format (protocol 4.1+):
    /// - 0x00 header
    /// - affected_rows: lenenc int
    /// - last_insert_id: lenenc int
    /// - status_flags: 2 bytes
    /// - warnings: 2 bytes
    /// - info: rest of packet (optional)
    pub fn parse_ok_packet(&mut self) -> Option<OkPacket> {
        if self.peek() == Some(0x00) {
            self.skip(1);
        }

        let affected_rows = self.read_lenenc_int()?;
        let last_insert_id = self.read_lenenc_int()?;
        let status_flags = self.read_u16_le()?;
        let warnings = self.read_u16_le()?;
        let info = self.read_rest_string();

        Some(OkPacket {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }

    /// Parse an Error packet from the current position.
    ///
    /// ERR packet format (protocol 4.1+):
    /// - 0xFF header
    /// - error_code: 2 bytes
    /// - '#' marker
    /// - sql_state: 5 bytes
    /// - error_message: rest of packet
    pub fn parse_err_packet(&mut self) -> Option<ErrPacket> {
        if self.peek() == Some(0xFF) {
            self.skip(1);
        }

        let error_code = self.read_u16_le()?;

        let sql_state = if self.peek() == Some(b'#') {
            self.skip(1);
            self.read_string(5)?
        } else {
            String::new()
        };

        let error_message = self.read_rest_string();

        Some(ErrPacket {
            error_code,
            sql_state,
            error_message,
        })
    }

    /// Parse an EOF packet from the current position.
    ///
    /// EOF packet format:
    /// - 0xFE header
    /// - warnings: 2 bytes
    /// - status_flags: 2 bytes
    ///
    /// Pre-4.1 servers send the bare marker, read as zero counters.
    pub fn parse_eof_packet(&mut self) -> Option<EofPacket> {
        if self.read_u8()? != 0xFE {
            return None;
        }
        if self.is_empty() {
            return Some(EofPacket::default());
        }

        let warnings = self.read_u16_le()?;
        let status_flags = self.read_u16_le()?;

        Some(EofPacket {
            warnings,
            status_flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_integers() {
        let data = [
            0x42, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0x01, 0x02, 0x03, 0x04,
            0x05, 0x06, 0x07, 0x08,
        ];
        let mut reader = PacketReader::new(&data);
        assert_eq!(reader.read_u8(), Some(0x42));
        assert_eq!(reader.read_u16_le(), Some(0x1234));
        assert_eq!(reader.read_u24_le(), Some(0x0012_3456));
        assert_eq!(reader.read_u32_le(), Some(0x1234_5678));
        assert_eq!(reader.read_u64_le(), Some(0x0807_0605_0403_0201));
        assert!(reader.is_empty());
        assert_eq!(reader.read_u8(), None);
    }

    #[test]
    fn test_short_reads_do_not_advance() {
        let mut reader = PacketReader::new(&[0x01, 0x02, 0x03]);
        assert_eq!(reader.read_u32_le(), None);
        assert_eq!(reader.remaining(), 3);
        assert_eq!(reader.read_bytes(4), None);
        assert_eq!(reader.read_u24_le(), Some(0x0003_0201));
    }

    #[test]
    fn test_read_lenenc_int() {
        let mut reader = PacketReader::new(&[0xFA]);
        assert_eq!(reader.read_lenenc_int(), Some(250));

        let mut reader = PacketReader::new(&[0xFC, 0x34, 0x12]);
        assert_eq!(reader.read_lenenc_int(), Some(0x1234));

        let mut reader = PacketReader::new(&[0xFD, 0x56, 0x34, 0x12]);
        assert_eq!(reader.read_lenenc_int(), Some(0x0012_3456));

        let mut reader = PacketReader::new(&[0xFE, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(reader.read_lenenc_int(), Some(0x0807_0605_0403_0201));

        assert_eq!(PacketReader::new(&[0xFB]).read_lenenc_int(), None);
        assert_eq!(PacketReader::new(&[0xFF]).read_lenenc_int(), None);
    }

    #[test]
    fn test_read_lenenc_or_null() {
        let data = [0xFB, 0x02, b'h', b'i', 0x00, 0x05, b'x'];
        let mut reader = PacketReader::new(&data);
        assert_eq!(reader.read_lenenc_or_null(), Some(None));
        assert_eq!(reader.read_lenenc_or_null(), Some(Some(&b"hi"[..])));
        assert_eq!(reader.read_lenenc_or_null(), Some(Some(&b""[..])));
        // Declared 5 bytes, only 1 present
        assert_eq!(reader.read_lenenc_or_null(), None);
    }

    #[test]
    fn test_read_null_string() {
        let mut reader = PacketReader::new(b"hello\0world");
        assert_eq!(reader.read_null_string(), Some("hello".to_string()));
        assert_eq!(reader.read_null_string(), Some("world".to_string()));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_lenenc_string() {
        let mut reader = PacketReader::new(&[0x05, b'h', b'e', b'l', b'l', b'o', 0x01, 0xFF]);
        assert_eq!(reader.read_lenenc_string(), Some("hello".to_string()));
        assert_eq!(reader.read_lenenc_bytes(), Some(vec![0xFF]));
    }

    #[test]
    fn test_parse_ok_packet() {
        // affected_rows=1, last_insert_id=42, status=2, warnings=0
        let data = [0x00, 0x01, 0x2A, 0x02, 0x00, 0x00, 0x00];
        let ok = PacketReader::new(&data).parse_ok_packet().unwrap();
        assert_eq!(ok.affected_rows, 1);
        assert_eq!(ok.last_insert_id, 42);
        assert_eq!(ok.status_flags, 2);
        assert_eq!(ok.warnings, 0);
        assert!(ok.info.is_empty());
    }

    #[test]
    fn test_parse_err_packet() {
        let mut data = vec![0xFF, 0x15, 0x04, b'#'];
        data.extend_from_slice(b"28000");
        data.extend_from_slice(b"Access denied");
        let err = PacketReader::new(&data).parse_err_packet().unwrap();
        assert_eq!(err.error_code, 1045);
        assert_eq!(err.sql_state, "28000");
        assert_eq!(err.error_message, "Access denied");
    }

    #[test]
    fn test_parse_eof_packet() {
        let eof = PacketReader::new(&[0xFE, 0x01, 0x00, 0x02, 0x00])
            .parse_eof_packet()
            .unwrap();
        assert_eq!(eof.warnings, 1);
        assert_eq!(eof.status_flags, 2);

        let bare = PacketReader::new(&[0xFE]).parse_eof_packet().unwrap();
        assert_eq!(bare, EofPacket::default());

        assert!(PacketReader::new(&[0x00, 0, 0, 0, 0]).parse_eof_packet().is_none());
    }
}
