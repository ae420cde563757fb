//! Typed views over the list messages sent by clients.

use crate::binn::Value;
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    NoAuth,
    Auth,
    Commands,
    Files,
    Status,
    Unknown,
}

impl Mode {
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Mode::NoAuth,
            1 => Mode::Auth,
            2 => Mode::Commands,
            3 => Mode::Files,
            4 => Mode::Status,
            _ => Mode::Unknown,
        }
    }
}

fn list(value: &Value) -> Result<&[Value]> {
    value
        .as_list()
        .ok_or(ProtocolError::InvalidMessage("message is not a list"))
}

fn string_at(items: &[Value], index: usize) -> Result<String> {
    items
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProtocolError::InvalidMessage("expected a string"))
}

fn uint_at(items: &[Value], index: usize) -> Result<u64> {
    items
        .get(index)
        .and_then(Value::as_u64)
        .ok_or(ProtocolError::InvalidMessage("expected an unsigned integer"))
}

fn bool_at(items: &[Value], index: usize) -> Result<bool> {
    items
        .get(index)
        .and_then(Value::as_bool)
        .ok_or(ProtocolError::InvalidMessage("expected a boolean"))
}

/// `(0, login, password, mode)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMessage {
    pub login: String,
    pub password: String,
    pub mode: Mode,
}

impl AuthMessage {
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = list(value)?;
        if items.len() < 4 {
            return Err(ProtocolError::InvalidMessage("auth message is too short"));
        }

        Ok(Self {
            login: string_at(items, 1)?,
            password: string_at(items, 2)?,
            mode: Mode::from_code(uint_at(items, 3)?),
        })
    }
}

/// `(kind, command, workdir)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub kind: u8,
    pub command: String,
    pub work_dir: String,
}

impl CommandMessage {
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = list(value)?;
        if items.len() < 3 {
            return Err(ProtocolError::InvalidMessage("command message is too short"));
        }

        let kind = u8::try_from(uint_at(items, 0)?)
            .map_err(|_| ProtocolError::InvalidMessage("command kind out of range"))?;

        Ok(Self {
            kind,
            command: string_at(items, 1)?,
            work_dir: string_at(items, 2)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileOperation {
    Send = 3,
    ReadDir = 4,
    MakeDir = 5,
    Move = 6,
    Remove = 7,
    Info = 8,
    Chmod = 9,
}

impl FileOperation {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            3 => Some(FileOperation::Send),
            4 => Some(FileOperation::ReadDir),
            5 => Some(FileOperation::MakeDir),
            6 => Some(FileOperation::Move),
            7 => Some(FileOperation::Remove),
            8 => Some(FileOperation::Info),
            9 => Some(FileOperation::Chmod),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileSendOperation {
    GetFileFromClient = 1,
    SendFileToClient = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRequest {
    ReadDir {
        path: String,
        details: bool,
    },
    MakeDir {
        path: String,
    },
    Move {
        source: String,
        destination: String,
        copy: bool,
    },
    SendToClient {
        path: String,
    },
    GetFromClient {
        path: String,
        size: u64,
        make_dirs: bool,
        perms: u32,
    },
    /// A send request with an unknown direction.
    UnknownSend,
    Remove {
        path: String,
        recursive: bool,
    },
    Info {
        path: String,
    },
    Chmod {
        path: String,
        perm: u32,
    },
}

impl FileRequest {
    /// Parses a files message. An unknown `op` yields [`ProtocolError::InvalidOperation`].
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = list(value)?;
        let op = uint_at(items, 0)?;
        let op = FileOperation::from_code(op).ok_or(ProtocolError::InvalidOperation)?;

        let request = match op {
            FileOperation::ReadDir => FileRequest::ReadDir {
                path: string_at(items, 1)?,
                details: uint_at(items, 2)? != 0,
            },
            FileOperation::MakeDir => FileRequest::MakeDir {
                path: string_at(items, 1)?,
            },
            FileOperation::Move => FileRequest::Move {
                source: string_at(items, 1)?,
                destination: string_at(items, 2)?,
                copy: bool_at(items, 3)?,
            },
            FileOperation::Send => match uint_at(items, 1)? {
                1 => FileRequest::GetFromClient {
                    path: string_at(items, 2)?,
                    size: uint_at(items, 3)?,
                    make_dirs: bool_at(items, 4)?,
                    perms: uint_at(items, 5)? as u32,
                },
                2 => FileRequest::SendToClient {
                    path: string_at(items, 2)?,
                },
                _ => FileRequest::UnknownSend,
            },
            FileOperation::Remove => FileRequest::Remove {
                path: string_at(items, 1)?,
                recursive: bool_at(items, 2)?,
            },
            FileOperation::Info => FileRequest::Info {
                path: string_at(items, 1)?,
            },
            FileOperation::Chmod => FileRequest::Chmod {
                path: string_at(items, 1)?,
                perm: uint_at(items, 2)? as u32,
            },
        };

        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusOperation {
    Version = 1,
    Base = 2,
    Details = 3,
}

impl StatusOperation {
    /// `(op,)`
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = list(value)?;
        match uint_at(items, 0)? {
            1 => Ok(StatusOperation::Version),
            2 => Ok(StatusOperation::Base),
            3 => Ok(StatusOperation::Details),
            _ => Err(ProtocolError::InvalidOperation),
        }
    }
}
