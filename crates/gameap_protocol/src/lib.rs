//! Wire protocol of the GameAP daemon.
//!
//! Messages are BINN encoded values followed by the four byte end marker
//! `FF FF FF FF`. File transfers are the only payloads that are not framed
//! this way, their length is announced in a preceding message.

pub mod binn;
pub mod error;
pub mod framing;
pub mod messages;
pub mod response;

pub use binn::Value;
pub use error::{ProtocolError, Result};
pub use framing::{END_BYTES, read_end_bytes, read_message, read_message_limited, write_message};
pub use messages::{
    AuthMessage, CommandMessage, FileOperation, FileRequest, FileSendOperation, Mode,
    StatusOperation,
};
pub use response::{Response, StatusCode};
