use bytes::{BufMut, BytesMut};

use super::*;

pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_value(&mut buf, value);
    buf.to_vec()
}

fn write_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::Null => buf.put_u8(NULL),
        Value::Bool(true) => buf.put_u8(TRUE),
        Value::Bool(false) => buf.put_u8(FALSE),
        Value::UInt(v) => write_unsigned(buf, *v),
        Value::Int(v) => write_signed(buf, *v),
        Value::Float(v) => {
            buf.put_u8(FLOAT64);
            buf.put_f64(*v);
        }
        Value::Str(s) => {
            buf.put_u8(STRING);
            write_size(buf, s.len());
            buf.put_slice(s.as_bytes());
            buf.put_u8(0);
        }
        Value::Blob(data) => {
            buf.put_u8(BLOB);
            buf.put_u32(data.len() as u32);
            buf.put_slice(data);
        }
        Value::List(items) => {
            let mut body = BytesMut::new();
            for item in items {
                write_value(&mut body, item);
            }
            write_container(buf, LIST, items.len(), &body);
        }
        Value::Map(entries) => {
            let mut body = BytesMut::new();
            for (key, item) in entries {
                body.put_i32(*key);
                write_value(&mut body, item);
            }
            write_container(buf, MAP, entries.len(), &body);
        }
        Value::Object(entries) => {
            let mut body = BytesMut::new();
            for (key, item) in entries {
                let key = &key.as_bytes()[..key.len().min(u8::MAX as usize)];
                body.put_u8(key.len() as u8);
                body.put_slice(key);
                write_value(&mut body, item);
            }
            write_container(buf, OBJECT, entries.len(), &body);
        }
    }
}

fn write_unsigned(buf: &mut BytesMut, v: u64) {
    if v <= u8::MAX as u64 {
        buf.put_u8(UINT8);
        buf.put_u8(v as u8);
    } else if v <= u16::MAX as u64 {
        buf.put_u8(UINT16);
        buf.put_u16(v as u16);
    } else if v <= u32::MAX as u64 {
        buf.put_u8(UINT32);
        buf.put_u32(v as u32);
    } else {
        buf.put_u8(UINT64);
        buf.put_u64(v);
    }
}

fn write_signed(buf: &mut BytesMut, v: i64) {
    if v >= 0 {
        return write_unsigned(buf, v as u64);
    }

    if v >= i8::MIN as i64 {
        buf.put_u8(INT8);
        buf.put_i8(v as i8);
    } else if v >= i16::MIN as i64 {
        buf.put_u8(INT16);
        buf.put_i16(v as i16);
    } else if v >= i32::MIN as i64 {
        buf.put_u8(INT32);
        buf.put_i32(v as i32);
    } else {
        buf.put_u8(INT64);
        buf.put_i64(v);
    }
}

fn size_len(size: usize) -> usize {
    if size < 0x80 { 1 } else { 4 }
}

fn write_size(buf: &mut BytesMut, size: usize) {
    if size < 0x80 {
        buf.put_u8(size as u8);
    } else {
        buf.put_u32(size as u32 | 0x8000_0000);
    }
}

/// `[type][total size][count][items]`, the total size counts the header too.
fn write_container(buf: &mut BytesMut, container_type: u8, count: usize, body: &[u8]) {
    let mut total = 1 + 1 + size_len(count) + body.len();
    if total >= 0x80 {
        total += 3;
    }

    buf.put_u8(container_type);
    write_size(buf, total);
    write_size(buf, count);
    buf.put_slice(body);
}
