//! Length-prefixed record framing for heartbeat streams.
//!
//! A heartbeat stream is long-lived and carries many records back to back.
//! Each record is a 4-byte LE length followed by the CBOR body, so a reader
//! can pull exactly one record per call without any other framing.

use std::io;

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    constants::{FRAME_HEADER_LEN, MAX_HEARTBEAT_SIZE},
    error::CodecError,
    message::Heartbeat,
};

/// Encode one complete record (length prefix + body).
pub fn encode_frame(hb: &Heartbeat) -> Result<Vec<u8>, CodecError> {
    let body = hb.to_cbor()?;
    let too_large = || CodecError::FrameTooLarge { size: body.len(), limit: MAX_HEARTBEAT_SIZE };
    if body.len() > MAX_HEARTBEAT_SIZE {
        return Err(too_large());
    }
    let len = u32::try_from(body.len()).map_err(|_| too_large())?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write one record and flush it.
pub async fn write_heartbeat<W: AsyncWrite + Unpin>(
    io: &mut W,
    hb: &Heartbeat,
) -> Result<(), CodecError> {
    let frame = encode_frame(hb)?;
    io.write_all(&frame).await?;
    io.flush().await?;
    Ok(())
}

/// Read the next record.
///
/// Returns `Ok(None)` when the stream ends cleanly on a record boundary.
pub async fn read_heartbeat<R: AsyncRead + Unpin>(
    io: &mut R,
) -> Result<Option<Heartbeat>, CodecError> {
    let mut len_buf = [0u8; FRAME_HEADER_LEN];
    let filled = read_full(io, &mut len_buf).await?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < FRAME_HEADER_LEN {
        return Err(CodecError::Truncated { read: filled, expected: FRAME_HEADER_LEN });
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_HEARTBEAT_SIZE {
        return Err(CodecError::FrameTooLarge { size: len, limit: MAX_HEARTBEAT_SIZE });
    }

    let mut body = vec![0u8; len];
    let filled = read_full(io, &mut body).await?;
    if filled < len {
        return Err(CodecError::Truncated { read: filled, expected: len });
    }
    Heartbeat::from_cbor(&body).map(Some)
}

/// Like `read_exact`, but reports how much was read before EOF instead of
/// failing, so callers can tell a clean end from a cut record.
async fn read_full<R: AsyncRead + Unpin>(io: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match io.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
