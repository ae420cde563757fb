use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};

use gameap_core::StatsReader;
use gameap_protocol::{
    ProtocolError, Response, StatusCode, StatusOperation, Value, write_message,
};

use super::{read_request, write_response};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_DATE: &str = match option_env!("GAMEAP_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

/// `1h2m3s`, `4m0s`, `5s`
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub(crate) async fn handle<S>(
    stats: &dyn StatsReader,
    started_at: Instant,
    stream: &mut S,
) -> gameap_protocol::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let Some(value) = read_request(stream).await? else {
        return Ok(());
    };

    let operation = match StatusOperation::from_value(&value) {
        Ok(operation) => operation,
        Err(ProtocolError::InvalidOperation) => {
            return write_response(stream, Response::error("Invalid operation")).await;
        }
        Err(_) => {
            return write_response(stream, Response::error("Failed to decode message")).await;
        }
    };

    match operation {
        StatusOperation::Version => {
            let reply = Value::List(vec![
                StatusCode::Ok.into(),
                Value::from(VERSION),
                Value::from(BUILD_DATE),
            ]);
            write_message(stream, &reply).await
        }
        StatusOperation::Base => {
            let counts = stats.stats();
            let reply = Value::List(vec![
                StatusCode::Ok.into(),
                Value::from(format_uptime(started_at.elapsed())),
                Value::from(counts.working_count.to_string()),
                Value::from(counts.waiting_count.to_string()),
                Value::from("-"),
            ]);
            write_message(stream, &reply).await
        }
        StatusOperation::Details => {
            write_response(stream, Response::error("Not implemented")).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_truncated_to_seconds() {
        assert_eq!(format_uptime(Duration::from_millis(5_900)), "5s");
        assert_eq!(format_uptime(Duration::from_secs(240)), "4m0s");
        assert_eq!(format_uptime(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(format_uptime(Duration::ZERO), "0s");
    }
}
