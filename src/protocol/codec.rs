/*!
 * Line Codec
 * Newline-delimited JSON framing over any Read/Write pair
 */

use super::message::Message;
use std::io::{BufRead, Write};
use thiserror::Error;

/// Protocol operation result
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("channel closed")]
    Closed,

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unexpected message kind '{0}'")]
    Unexpected(&'static str),

    #[error("aborted by peer: {0}")]
    Aborted(String),

    #[error("channel i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the next message from the channel.
///
/// Blank lines are skipped; `Ok(None)` means end-of-channel. An unknown
/// `kind` discriminator fails as `Malformed`.
pub fn read_message<R: BufRead>(reader: &mut R) -> ProtocolResult<Option<Message>> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return Ok(Some(serde_json::from_str(trimmed)?));
    }
}

/// Write one message as a single line and flush it.
pub fn write_message<W: Write>(writer: &mut W, msg: &Message) -> ProtocolResult<()> {
    let line = serde_json::to_string(msg)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
