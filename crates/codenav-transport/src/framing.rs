//! Message framing for the LSP Base Protocol.

use codenav_protocol::IncomingMessage;
use serde_json::Value;
use std::io::{self, BufRead, Read, Write};
use tracing::warn;

/// Upper bound on a declared `Content-Length`.
///
/// A corrupt header must not make the reader allocate gigabytes or consume
/// the stream forever; anything above this is treated as an unrecoverable
/// framing error.
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Result of one framed read.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete, well-formed message.
    Message(IncomingMessage),
    /// The frame was consumed but its body was not valid JSON-RPC.
    /// The stream is still in sync; the caller may continue reading.
    Malformed,
    /// End of stream.
    Eof,
}

/// Read one LSP message from a buffered reader.
///
/// Header lines are read up to the blank separator; only `Content-Length`
/// is honored (case-insensitively), other headers are ignored. Exactly the
/// declared number of body bytes is then read, handling partial reads.
///
/// Returns `Err` for I/O failures and for framing that cannot be recovered
/// (missing or absurd `Content-Length`); after such an error the connection
/// should be closed.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<ReadOutcome> {
    let mut content_length: Option<usize> = None;

    // Read headers
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(ReadOutcome::Eof);
        }

        let line = line.trim_end();
        if line.is_empty() {
            break; // End of headers
        }

        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("content-length") {
                match value.trim().parse::<usize>() {
                    Ok(n) if n <= MAX_CONTENT_LENGTH => content_length = Some(n),
                    Ok(n) => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Content-Length {} exceeds limit", n),
                        ));
                    }
                    Err(_) => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Invalid Content-Length header: {:?}", value.trim()),
                        ));
                    }
                }
            }
            // Other headers (Content-Type, ...) are read and ignored.
        }
    }

    let length = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "Header block without Content-Length")
    })?;

    // Read content in chunks to handle partial reads
    let mut content = vec![0u8; length];
    let mut bytes_read = 0;
    while bytes_read < length {
        match reader.read(&mut content[bytes_read..])? {
            0 => return Ok(ReadOutcome::Eof), // Unexpected EOF mid-body
            n => bytes_read += n,
        }
    }

    match serde_json::from_slice::<IncomingMessage>(&content) {
        Ok(message) => Ok(ReadOutcome::Message(message)),
        Err(e) => {
            let text = String::from_utf8_lossy(&content);
            let preview: &str = match text.char_indices().nth(100) {
                Some((index, _)) => &text[..index],
                None => &text,
            };
            warn!("malformed frame ({}): {}", e, preview);
            Ok(ReadOutcome::Malformed)
        }
    }
}

/// Write one LSP message to a writer with proper framing.
///
/// Emits only the `Content-Length` header and flushes after the body so the
/// child process sees the complete frame immediately.
pub fn write_message<W: Write>(writer: &mut W, message: &Value) -> io::Result<()> {
    let content = serde_json::to_string(message)?;
    write!(writer, "Content-Length: {}\r\n\r\n{}", content.len(), content)?;
    writer.flush()
}
