//! LOAD DATA LOCAL INFILE upload.
//!
//! When a query answers with 0xFB the server is asking for a client-side
//! file. The client streams its contents as data frames continuing the
//! exchange (seq 2 onwards), terminates with an empty frame, and then reads
//! the final OK or ERR.
//!
//! A refused or unreadable file is still answered with the empty terminator
//! so the server can finish the statement and the connection stays usable.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use mywire_core::Error;
use mywire_core::error::PolicyError;

use crate::protocol::{MAX_DATA_CHUNK, write_packet};

/// What happened on the client side of an upload.
#[derive(Debug)]
pub(crate) struct Upload {
    /// Sequence number of the server's final response
    pub next_seq: u8,
    /// Bytes of file content sent
    pub bytes: u64,
    /// Local failure (policy refusal, unreadable file) to report once the
    /// server's response has been consumed
    pub local_error: Option<Error>,
}

/// Stream `filename` to the server, starting at `seq`.
///
/// Transport failures are returned as `Err`; local failures end the upload
/// early and are carried in [`Upload::local_error`].
#[allow(clippy::result_large_err)]
pub(crate) fn send_local_file<W: Write + ?Sized>(
    stream: &mut W,
    filename: &str,
    allowed: bool,
    seq: u8,
) -> Result<Upload, Error> {
    if !allowed {
        tracing::warn!(file = filename, "Refusing LOAD DATA LOCAL INFILE request");
        let next_seq = write_packet(stream, seq, &[])?;
        return Ok(Upload {
            next_seq,
            bytes: 0,
            local_error: Some(Error::Policy(PolicyError {
                message: format!(
                    "LOAD DATA LOCAL INFILE is not allowed (requested '{}'); \
                     enable it with MySqlConfig::local_infile(true)",
                    filename
                ),
            })),
        });
    }

    let mut seq = seq;
    let mut bytes = 0u64;
    let local_error = match File::open(Path::new(filename)) {
        Ok(mut file) => {
            let mut buf = vec![0u8; MAX_DATA_CHUNK];
            loop {
                let n = match file.read(&mut buf) {
                    Ok(0) => break None,
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => break Some(Error::Io(e)),
                };
                seq = write_packet(stream, seq, &buf[..n])?;
                bytes += n as u64;
            }
        }
        Err(e) => Some(Error::Io(e)),
    };

    let next_seq = write_packet(stream, seq, &[])?;

    match &local_error {
        None => tracing::info!(file = filename, bytes, "Uploaded local infile"),
        Some(e) => tracing::warn!(file = filename, bytes, error = %e, "Local infile upload aborted"),
    }

    Ok(Upload {
        next_seq,
        bytes,
        local_error,
    })
}
