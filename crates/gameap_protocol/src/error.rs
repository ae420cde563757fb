use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown binn type: {0:#04x}")]
    UnknownType(u8),

    #[error("invalid binn size: {0}")]
    InvalidSize(usize),

    #[error("value too large: {0} bytes")]
    TooLarge(usize),

    #[error("containers nested deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("invalid utf-8 string")]
    InvalidUtf8,

    #[error("unexpected end of buffer")]
    Truncated,

    #[error("invalid message end bytes")]
    InvalidEndBytes,

    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("invalid operation")]
    InvalidOperation,
}

impl ProtocolError {
    /// True when the peer closed the stream.
    pub fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
