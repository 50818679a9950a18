//! Length-prefixed message framing.
//!
//! Every message is a 4-byte big-endian unsigned length followed by that many payload
//! bytes. The length prefix is the only delimiter, so a stream that closes before a
//! full prefix or a full payload has arrived is end-of-stream, not corruption.

use anyhow::{anyhow, Result};
use std::io::{ErrorKind, Read, Write};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Largest payload a reader will allocate for.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Write one framed message.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow!("payload of {} bytes exceeds frame limit", payload.len()))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one framed message. Returns `Ok(None)` at end-of-stream.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
    if !read_exact_or_eof(reader, &mut prefix)? {
        return Ok(None);
    }
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_PAYLOAD_BYTES {
        log::warn!("frame length {} exceeds {} bytes; closing stream", len, MAX_PAYLOAD_BYTES);
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_exact_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    Ok(Some(payload))
}

/// Fill `buf` completely. `Ok(false)` when the stream ends first.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}
