//! A subset of the BINN binary serialization format.
//!
//! Integers are big-endian. Sizes and counts take one byte below 128 and four
//! bytes with the high bit set otherwise.

mod decode;
mod encode;

pub use decode::{decode, read_value, read_value_limited};
pub use encode::encode;

pub(crate) const NULL: u8 = 0x00;
pub(crate) const TRUE: u8 = 0x01;
pub(crate) const FALSE: u8 = 0x02;

pub(crate) const UINT8: u8 = 0x20;
pub(crate) const INT8: u8 = 0x21;
pub(crate) const UINT16: u8 = 0x40;
pub(crate) const INT16: u8 = 0x41;
pub(crate) const UINT32: u8 = 0x60;
pub(crate) const INT32: u8 = 0x61;
pub(crate) const FLOAT32: u8 = 0x62;
pub(crate) const UINT64: u8 = 0x80;
pub(crate) const INT64: u8 = 0x81;
pub(crate) const FLOAT64: u8 = 0x82;

pub(crate) const STRING: u8 = 0xA0;
pub(crate) const BLOB: u8 = 0xC0;

pub(crate) const LIST: u8 = 0xE0;
pub(crate) const MAP: u8 = 0xE1;
pub(crate) const OBJECT: u8 = 0xE2;

/// Upper bound for a single framed value.
pub const MAX_VALUE_SIZE: usize = 64 * 1024 * 1024;

/// Deepest container nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Blob(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(i32, Value)>),
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(v) => Some(v),
            Value::Int(v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::UInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Booleans, or the integers 0 and 1.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            Value::UInt(0) | Value::Int(0) => Some(false),
            Value::UInt(1) | Value::Int(1) => Some(true),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self)
    }
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::UInt(v as u64)
            }
        })*
    };
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

impl_from_unsigned!(u8, u16, u32, u64);
impl_from_signed!(i8, i16, i32, i64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}
