use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use gameap_core::{Executor, ExecutorOptions};
use gameap_protocol::{CommandMessage, Response, StatusCode, Value, write_message};

use super::{read_request, write_response};

/// `(kind, command, workdir)` answered with `(100, exit code, output)`.
pub(crate) async fn handle<S>(executor: &dyn Executor, stream: &mut S) -> gameap_protocol::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let Some(value) = read_request(stream).await? else {
        return Ok(());
    };

    let Ok(message) = CommandMessage::from_value(&value) else {
        return write_response(stream, Response::error("Failed to decode message")).await;
    };

    debug!(
        log_type = "wire_server",
        "Executing command: {}", message.command
    );

    let options = ExecutorOptions::in_dir(&message.work_dir);
    match executor.exec(&message.command, &options).await {
        Ok((output, exit_code)) => {
            let reply = Value::List(vec![
                StatusCode::Ok.into(),
                Value::from(exit_code),
                Value::from(String::from_utf8_lossy(&output).into_owned()),
            ]);
            write_message(stream, &reply).await
        }
        Err(e) => {
            warn!(log_type = "wire_server", "Command failed: {}", e);
            write_response(stream, Response::error(e.to_string())).await
        }
    }
}
