use tokio::io::{AsyncRead, AsyncReadExt};

use super::*;
use crate::error::{ProtocolError, Result};

/// Decodes a single value from the start of `bytes`, returning it with the number of bytes used.
pub fn decode(bytes: &[u8]) -> Result<(Value, usize)> {
    let mut reader = SliceReader { bytes, pos: 0 };
    let value = reader.read_value(0)?;
    Ok((value, reader.pos))
}

struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(ProtocolError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(ProtocolError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_size(&mut self) -> Result<usize> {
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }

        let rest = self.take_array::<3>()?;
        let size = u32::from_be_bytes([first & 0x7F, rest[0], rest[1], rest[2]]) as usize;
        Ok(size)
    }

    fn read_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    fn read_value(&mut self, depth: usize) -> Result<Value> {
        let start = self.pos;
        let value_type = self.read_u8()?;

        let value = match value_type {
            NULL => Value::Null,
            TRUE => Value::Bool(true),
            FALSE => Value::Bool(false),
            UINT8 => Value::UInt(self.read_u8()? as u64),
            INT8 => Value::Int(i8::from_be_bytes(self.take_array()?) as i64),
            UINT16 => Value::UInt(u16::from_be_bytes(self.take_array()?) as u64),
            INT16 => Value::Int(i16::from_be_bytes(self.take_array()?) as i64),
            UINT32 => Value::UInt(u32::from_be_bytes(self.take_array()?) as u64),
            INT32 => Value::Int(i32::from_be_bytes(self.take_array()?) as i64),
            FLOAT32 => Value::Float(f32::from_be_bytes(self.take_array()?) as f64),
            UINT64 => Value::UInt(u64::from_be_bytes(self.take_array()?)),
            INT64 => Value::Int(i64::from_be_bytes(self.take_array()?)),
            FLOAT64 => Value::Float(f64::from_be_bytes(self.take_array()?)),
            STRING => {
                let len = self.read_size()?;
                let s = self.read_string(len)?;
                self.take(1)?;
                Value::Str(s)
            }
            BLOB => {
                let len = u32::from_be_bytes(self.take_array()?) as usize;
                Value::Blob(self.take(len)?.to_vec())
            }
            LIST | MAP | OBJECT => {
                if depth >= MAX_DEPTH {
                    return Err(ProtocolError::NestingTooDeep(MAX_DEPTH));
                }

                let size = self.read_size()?;
                let count = self.read_size()?;
                let end = start.checked_add(size).ok_or(ProtocolError::InvalidSize(size))?;
                if end > self.bytes.len() || end < self.pos {
                    return Err(ProtocolError::InvalidSize(size));
                }

                let value = match value_type {
                    LIST => {
                        let mut items = Vec::with_capacity(count.min(1024));
                        for _ in 0..count {
                            items.push(self.read_value(depth + 1)?);
                        }
                        Value::List(items)
                    }
                    MAP => {
                        let mut entries = Vec::with_capacity(count.min(1024));
                        for _ in 0..count {
                            let key = i32::from_be_bytes(self.take_array()?);
                            entries.push((key, self.read_value(depth + 1)?));
                        }
                        Value::Map(entries)
                    }
                    _ => {
                        let mut entries = Vec::with_capacity(count.min(1024));
                        for _ in 0..count {
                            let key_len = self.read_u8()? as usize;
                            let key = self.read_string(key_len)?;
                            entries.push((key, self.read_value(depth + 1)?));
                        }
                        Value::Object(entries)
                    }
                };

                if self.pos != end {
                    return Err(ProtocolError::InvalidSize(size));
                }

                value
            }
            other => return Err(ProtocolError::UnknownType(other)),
        };

        Ok(value)
    }
}

async fn read_size<R>(reader: &mut R, raw: &mut Vec<u8>) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let first = reader.read_u8().await?;
    raw.push(first);
    if first & 0x80 == 0 {
        return Ok(first as usize);
    }

    let mut rest = [0u8; 3];
    reader.read_exact(&mut rest).await?;
    raw.extend_from_slice(&rest);
    Ok(u32::from_be_bytes([first & 0x7F, rest[0], rest[1], rest[2]]) as usize)
}

/// Reads exactly one value from the stream.
///
/// The raw bytes of the value are collected first using the size prefixes, then decoded.
pub async fn read_value<R>(reader: &mut R) -> Result<Value>
where
    R: AsyncRead + Unpin,
{
    read_value_limited(reader, MAX_VALUE_SIZE).await
}

/// Like [`read_value`], refusing values whose body is larger than `limit` bytes.
///
/// The body buffer grows with the bytes actually received, not with the declared size.
pub async fn read_value_limited<R>(reader: &mut R, limit: usize) -> Result<Value>
where
    R: AsyncRead + Unpin,
{
    let value_type = reader.read_u8().await?;
    let mut raw = vec![value_type];

    let remaining = match value_type {
        NULL | TRUE | FALSE => 0,
        UINT8 | INT8 => 1,
        UINT16 | INT16 => 2,
        UINT32 | INT32 | FLOAT32 => 4,
        UINT64 | INT64 | FLOAT64 => 8,
        STRING => read_size(reader, &mut raw).await? + 1,
        BLOB => {
            let mut size = [0u8; 4];
            reader.read_exact(&mut size).await?;
            raw.extend_from_slice(&size);
            u32::from_be_bytes(size) as usize
        }
        LIST | MAP | OBJECT => {
            let size = read_size(reader, &mut raw).await?;
            size.checked_sub(raw.len())
                .ok_or(ProtocolError::InvalidSize(size))?
        }
        other => return Err(ProtocolError::UnknownType(other)),
    };

    if remaining > limit.min(MAX_VALUE_SIZE) {
        return Err(ProtocolError::TooLarge(remaining));
    }

    let received = (&mut *reader)
        .take(remaining as u64)
        .read_to_end(&mut raw)
        .await?;
    if received != remaining {
        return Err(ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("value body ended after {} of {} bytes", received, remaining),
        )));
    }

    let (value, _) = decode(&raw)?;
    Ok(value)
}
