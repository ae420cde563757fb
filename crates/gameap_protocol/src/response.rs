use crate::binn::Value;
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Error = 1,
    CriticalError = 2,
    UnknownCommand = 3,
    Ok = 100,
    ReadyToTransfer = 101,
}

impl StatusCode {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(StatusCode::Error),
            2 => Some(StatusCode::CriticalError),
            3 => Some(StatusCode::UnknownCommand),
            100 => Some(StatusCode::Ok),
            101 => Some(StatusCode::ReadyToTransfer),
            _ => None,
        }
    }
}

impl From<StatusCode> for Value {
    fn from(code: StatusCode) -> Self {
        Value::UInt(code as u8 as u64)
    }
}

/// `(code, info[, data])`
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub code: StatusCode,
    pub info: String,
    pub data: Option<Value>,
}

impl Response {
    pub fn new(code: StatusCode, info: impl Into<String>) -> Self {
        Self {
            code,
            info: info.into(),
            data: None,
        }
    }

    pub fn ok(info: impl Into<String>) -> Self {
        Self::new(StatusCode::Ok, info)
    }

    pub fn error(info: impl Into<String>) -> Self {
        Self::new(StatusCode::Error, info)
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn to_value(&self) -> Value {
        let mut items = vec![Value::from(self.code), Value::from(self.info.as_str())];
        if let Some(data) = &self.data {
            items.push(data.clone());
        }
        Value::List(items)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let items = value
            .as_list()
            .ok_or(ProtocolError::InvalidMessage("response is not a list"))?;

        if items.len() < 2 {
            return Err(ProtocolError::InvalidMessage("response is too short"));
        }

        let code = items[0]
            .as_u64()
            .and_then(StatusCode::from_code)
            .ok_or(ProtocolError::InvalidMessage("unknown response code"))?;

        let info = items[1]
            .as_str()
            .ok_or(ProtocolError::InvalidMessage("response info is not a string"))?;

        Ok(Self {
            code,
            info: info.to_string(),
            data: items.get(2).cloned(),
        })
    }
}

impl From<Response> for Value {
    fn from(response: Response) -> Self {
        response.to_value()
    }
}
