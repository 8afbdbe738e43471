// Length-delimited JSON frames over a byte stream.
//
// Frame layout: 4-byte big-endian payload length, then that many bytes of
// JSON. `write_frame`/`read_frame` deal in typed messages directly, so both
// the hub and its clients share one serialization path.
//
// `MAX_FRAME_LEN` bounds the allocation a bogus length prefix can cause.
// Dashboard events are tiny; the largest realistic frame is a
// `chargeNowMultiple` for an entire fleet.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Upper bound on a single frame's payload (1 MiB).
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame i/o: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {len} bytes (max {MAX_FRAME_LEN})")]
    TooLarge { len: usize },

    #[error("frame json: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameError {
    /// True when the peer closed the stream (clean EOF between or inside a
    /// frame). Readers treat this as a disconnect rather than an error.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Serialize `msg` and write it as one frame, then flush.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<(), FrameError> {
    let body = serde_json::to_vec(msg)?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or(FrameError::TooLarge { len: body.len() })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and deserialize it.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, FrameError> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len: len as usize });
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}
