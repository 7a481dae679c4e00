//! Query results: write acknowledgments and row streams.
//!
//! A [`ResultSet`] mutably borrows its connection for as long as it is
//! open, so no other command can be issued until the rows are consumed.
//! Dropping an open result set drains the remaining rows.

use std::sync::Arc;

use mywire_core::error::Error;
use mywire_core::{ColumnInfo, Row, Value};

use crate::connection::{ConnectionState, MySqlConnection};
use crate::protocol::{OkPacket, Packet, PacketReader, is_eof_packet, protocol_error_with_data};
use crate::stream::{MySqlStream, Transport};
use crate::types::{
    ColumnDef, decode_binary_value, decode_text_value, is_null_in_bitmap, null_bitmap_len,
};

/// Null bitmap offset in binary protocol rows.
const BINARY_ROW_NULL_OFFSET: usize = 2;

/// Outcome of a statement that produced no rows, or the tail of a row stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteResult {
    pub rows_affected: u64,
    pub last_insert_id: u64,
    pub warnings: u16,
    pub status_flags: u16,
}

impl From<&OkPacket> for WriteResult {
    fn from(ok: &OkPacket) -> Self {
        Self {
            rows_affected: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            status_flags: ok.status_flags,
        }
    }
}

/// Wire format of the rows in a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// COM_QUERY: every value is a length-encoded string
    Text,
    /// COM_STMT_EXECUTE: null bitmap plus typed values
    Binary,
}

/// Result of a query or statement execution.
///
/// Either already complete (the server answered with OK) or an open stream
/// of rows read on demand. Once the end-of-rows marker has been seen,
/// further reads return `Ok(false)` / `None`.
pub struct ResultSet<'a, S: Transport = MySqlStream> {
    conn: &'a mut MySqlConnection<S>,
    columns: Arc<Vec<ColumnDef>>,
    column_info: Arc<ColumnInfo>,
    format: RowFormat,
    next_seq: u8,
    closed: bool,
    summary: WriteResult,
}

impl<S: Transport> std::fmt::Debug for ResultSet<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.column_info.names())
            .field("format", &self.format)
            .field("closed", &self.closed)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl<'a, S: Transport> ResultSet<'a, S> {
    pub(crate) fn completed(conn: &'a mut MySqlConnection<S>, summary: WriteResult) -> Self {
        Self {
            conn,
            columns: Arc::new(Vec::new()),
            column_info: Arc::new(ColumnInfo::default()),
            format: RowFormat::Text,
            next_seq: 0,
            closed: true,
            summary,
        }
    }

    pub(crate) fn streaming(
        conn: &'a mut MySqlConnection<S>,
        columns: Arc<Vec<ColumnDef>>,
        format: RowFormat,
        next_seq: u8,
    ) -> Self {
        conn.begin_streaming();
        let column_info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));
        Self {
            conn,
            columns,
            column_info,
            format,
            next_seq,
            closed: false,
            summary: WriteResult::default(),
        }
    }

    /// Column definitions; empty when the statement returned no rows.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Column names in order.
    pub fn column_names(&self) -> &[String] {
        self.column_info.names()
    }

    /// Text or binary rows.
    pub fn format(&self) -> RowFormat {
        self.format
    }

    /// Whether the end of the result has been reached.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn rows_affected(&self) -> u64 {
        self.summary.rows_affected
    }

    pub fn last_insert_id(&self) -> u64 {
        self.summary.last_insert_id
    }

    /// Warning count from the OK packet, or from the EOF once rows are exhausted.
    pub fn warnings(&self) -> u16 {
        self.summary.warnings
    }

    /// Read the next row into `values`, replacing its contents.
    ///
    /// Returns `Ok(false)` at the end of the rows. A value that cannot be
    /// decoded fails this call only; the stream stays positioned on the
    /// next row.
    #[allow(clippy::result_large_err)]
    pub fn next_into(&mut self, values: &mut Vec<Value>) -> Result<bool, Error> {
        values.clear();

        let Some(packet) = self.read_row_packet()? else {
            return Ok(false);
        };

        let decoded = match self.format {
            RowFormat::Text => decode_text_row(&self.columns, &packet.payload, values),
            RowFormat::Binary => decode_binary_row(&self.columns, &packet.payload, values),
        };

        if let Err(e) = decoded {
            values.clear();
            let e = self.conn.fail(e);
            if self.conn.state() == ConnectionState::Broken {
                self.closed = true;
            }
            return Err(e);
        }

        Ok(true)
    }

    /// Read the next row.
    #[allow(clippy::result_large_err)]
    pub fn next_row(&mut self) -> Result<Option<Row>, Error> {
        let mut values = Vec::with_capacity(self.columns.len());
        if self.next_into(&mut values)? {
            Ok(Some(Row::with_columns(Arc::clone(&self.column_info), values)))
        } else {
            Ok(None)
        }
    }

    /// Skip any unread rows and return the final counters.
    #[allow(clippy::result_large_err)]
    pub fn close(mut self) -> Result<WriteResult, Error> {
        self.drain()?;
        Ok(self.summary)
    }

    /// Read one packet of the row stream.
    ///
    /// Returns `None` once EOF has been seen; an ERR packet ends the stream
    /// with the server's error.
    #[allow(clippy::result_large_err)]
    fn read_row_packet(&mut self) -> Result<Option<Packet>, Error> {
        if self.closed {
            return Ok(None);
        }

        let packet = match self.conn.read_packet(self.next_seq) {
            Ok(packet) => packet,
            Err(e) => {
                self.closed = true;
                return Err(e);
            }
        };
        self.next_seq = packet.next_seq;

        if is_eof_packet(&packet.payload) {
            let eof = packet.reader().parse_eof_packet().unwrap_or_default();
            self.summary.warnings = eof.warnings;
            self.summary.status_flags = eof.status_flags;
            self.closed = true;
            self.conn.end_streaming(Some(eof.status_flags));
            self.conn.log_warnings(eof.warnings);
            return Ok(None);
        }

        if packet.first_byte() == Some(0xFF) {
            self.closed = true;
            self.conn.end_streaming(None);
            return Err(self.conn.error_packet(&packet.payload, None));
        }

        Ok(Some(packet))
    }

    #[allow(clippy::result_large_err)]
    fn drain(&mut self) -> Result<(), Error> {
        let mut skipped = 0u64;
        while self.read_row_packet()?.is_some() {
            skipped += 1;
        }
        if skipped > 0 {
            tracing::trace!(rows = skipped, "Drained unread rows");
        }
        Ok(())
    }
}

impl<S: Transport> Iterator for ResultSet<'_, S> {
    type Item = Result<Row, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl<S: Transport> Drop for ResultSet<'_, S> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.drain() {
                tracing::warn!(error = %e, "Failed to drain result set on drop");
            }
        }
    }
}

/// Decode a text protocol row: one length-encoded string or NULL per column.
#[allow(clippy::result_large_err)]
fn decode_text_row(
    columns: &[ColumnDef],
    payload: &[u8],
    values: &mut Vec<Value>,
) -> Result<(), Error> {
    let mut reader = PacketReader::new(payload);
    for column in columns {
        let value = match reader.read_lenenc_or_null() {
            Some(None) => Value::Null,
            Some(Some(data)) => decode_text_value(column, data)?,
            None => {
                return Err(protocol_error_with_data(
                    format!("Truncated text row at column '{}'", column.name),
                    payload,
                ));
            }
        };
        values.push(value);
    }
    Ok(())
}

/// Decode a binary protocol row: 0x00 header, null bitmap, typed values.
#[allow(clippy::result_large_err)]
fn decode_binary_row(
    columns: &[ColumnDef],
    payload: &[u8],
    values: &mut Vec<Value>,
) -> Result<(), Error> {
    let mut reader = PacketReader::new(payload);
    if reader.read_u8() != Some(0x00) {
        return Err(protocol_error_with_data(
            "Binary row does not start with 0x00",
            payload,
        ));
    }

    let bitmap = reader
        .read_bytes(null_bitmap_len(columns.len(), BINARY_ROW_NULL_OFFSET))
        .ok_or_else(|| protocol_error_with_data("Truncated binary row null bitmap", payload))?;

    for (i, column) in columns.iter().enumerate() {
        if is_null_in_bitmap(bitmap, i, BINARY_ROW_NULL_OFFSET) {
            values.push(Value::Null);
        } else {
            values.push(decode_binary_value(column, &mut reader)?);
        }
    }
    Ok(())
}
