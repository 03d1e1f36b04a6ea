//! Wire protocol between [`super::SessionStorage`] and [`super::FsaServer`].
//!
//! Each message is a little-endian `u32` length followed by that many bytes
//! of `bincode`-encoded payload.

use super::{FileHandle, OpenMode};
use crate::config::MAX_FRAME_LEN;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{BufWriter, Read, Write};

/// A filesystem operation sent to the service.
///
/// Write payloads borrow from the caller when sending and are owned once
/// decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsaRequest<'a> {
    MakeDir { path: String },
    OpenFile { path: String, mode: OpenMode },
    ReadFile { handle: FileHandle, len: u32 },
    WriteFile { handle: FileHandle, data: Cow<'a, [u8]> },
    CloseFile { handle: FileHandle },
    Remove { path: String },
    Unlink { path: String },
}

/// The service's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsaResponse {
    /// Operation finished with a raw status (`0` success, negative failure).
    Status(i32),
    Opened(FileHandle),
    Written(u32),
    Data(Vec<u8>),
}

/// Payload length of `message` once framed.
///
/// Fails with [`Error::Protocol`] when the payload exceeds the frame limit.
pub fn frame_len<T: Serialize>(message: &T) -> Result<u32> {
    let size = bincode::serialized_size(message)?;
    u32::try_from(size)
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| Error::Protocol(format!("frame too large: {} bytes", size)))
}

/// Write one framed message.
///
/// The size is checked before any byte reaches `writer`.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let len = frame_len(message)?;

    let mut out = BufWriter::new(writer);
    out.write_all(&len.to_le_bytes())?;
    bincode::serialize_into(&mut out, message)?;
    out.flush()?;
    Ok(())
}

/// Read one framed message. Returns `Ok(None)` on a clean end of stream.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!("frame too large: {} bytes", len)));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(Some(bincode::deserialize(&payload)?))
}
