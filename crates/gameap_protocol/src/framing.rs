use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::binn::{self, Value};
use crate::error::{ProtocolError, Result};

pub const END_BYTES: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Consumes the end marker that follows every message. EOF counts as a clean end.
pub async fn read_end_bytes<R>(reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    if buf != END_BYTES {
        return Err(ProtocolError::InvalidEndBytes);
    }

    Ok(())
}

/// Reads one message without its end marker.
pub async fn read_message<R>(reader: &mut R) -> Result<Value>
where
    R: AsyncRead + Unpin,
{
    binn::read_value(reader).await
}

/// Reads one message without its end marker, refusing bodies above `limit` bytes.
pub async fn read_message_limited<R>(reader: &mut R, limit: usize) -> Result<Value>
where
    R: AsyncRead + Unpin,
{
    binn::read_value_limited(reader, limit).await
}

/// Writes `value` followed by the end marker.
pub async fn write_message<W>(writer: &mut W, value: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = binn::encode(value);
    bytes.extend_from_slice(&END_BYTES);

    writer.write_all(&bytes).await?;
    writer.flush().await?;

    Ok(())
}
