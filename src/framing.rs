//! Length-prefixed JSON framing
//!
//! Shared by the TCP edge transport and the ML agent socket endpoint.
//!
//! Wire format:  [4-byte big-endian length][JSON payload]

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024; // 64 MB

/// Read one frame, rejecting anything larger than `max_size`
pub async fn read_frame<T, R>(reader: &mut R, max_size: u32) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::connection_lost("peer closed the stream"));
        }
        Err(e) => return Err(Error::connection_lost(e.to_string())),
    };
    if len > max_size {
        return Err(Error::protocol(format!(
            "frame too large: {} bytes (max {})",
            len, max_size
        )));
    }

    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| Error::connection_lost(format!("truncated frame: {}", e)))?;

    Ok(serde_json::from_slice(&buf)?)
}

/// Write one frame and flush
pub async fn write_frame<T, W>(writer: &mut W, msg: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(msg)?;
    let len = u32::try_from(json.len())
        .map_err(|_| Error::protocol(format!("frame too large: {} bytes", json.len())))?;

    writer.write_u32(len).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;

    Ok(())
}
