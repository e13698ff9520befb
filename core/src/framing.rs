//! Length-prefixed JSON framing shared by the control and tunnel-open
//! channels: a 4-byte big-endian length followed by a UTF-8 JSON payload,
//! capped at 16 MiB.

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {0} bytes exceeds cap of {1} bytes")]
    TooLarge(u32, u32),
    #[error("invalid frame payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    let len = u32::try_from(payload.len()).map_err(|_| FramingError::TooLarge(u32::MAX, MAX_FRAME_BYTES))?;
    if len > MAX_FRAME_BYTES {
        return Err(FramingError::TooLarge(len, MAX_FRAME_BYTES));
    }
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame, returning `Ok(None)` if the peer closed the
/// connection before sending any bytes of a new frame (a normal way for
/// a control or tunnel connection to end).
pub async fn read_frame_opt<R, T>(reader: &mut R) -> Result<Option<T>, FramingError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(FramingError::TooLarge(len, MAX_FRAME_BYTES));
    }
    let mut buf = BytesMut::zeroed(len as usize);
    reader.read_exact(&mut buf).await?;
    let value = serde_json::from_slice(&buf)?;
    Ok(Some(value))
}

/// Reads one frame, treating peer close as an error. Use at points where
/// a frame is mandatory (e.g. the tunnel-open reply).
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, FramingError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame_opt(reader).await? {
        Some(value) => Ok(value),
        None => Err(FramingError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "peer closed before sending a frame",
        ))),
    }
}
