//! Helpers shared by the service based process managers.

use std::io::SeekFrom;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use gameap_config::DaemonConfig;
use gameap_core::{OutputWriter, Server, make_full_command};

use super::{ProcessManagerError, template_or_command};
use crate::executor::split_command;

/// Size of the log tail returned as console output.
pub(crate) const OUTPUT_SIZE_LIMIT: u64 = 30000;

const BASE64_PREFIX: &str = "base64:";

/// Writes the last `limit` bytes of `path` to `out`.
pub(crate) async fn tail_file(
    path: &Path,
    limit: u64,
    out: &dyn OutputWriter,
) -> Result<(), ProcessManagerError> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();

    if size > limit {
        file.seek(SeekFrom::End(-(limit as i64))).await?;
    }

    let mut buf = Vec::with_capacity(size.min(limit) as usize);
    file.read_to_end(&mut buf).await?;
    out.write(&buf);

    Ok(())
}

/// The server's expanded start command. Fails when it expands to nothing.
pub(crate) fn full_start_command(
    cfg: &DaemonConfig,
    server: &Server,
) -> Result<String, ProcessManagerError> {
    let command = make_full_command(
        cfg,
        server,
        template_or_command(&cfg.scripts.start),
        server.start_command(),
    );

    if command.trim().is_empty() {
        return Err(ProcessManagerError::EmptyCommand);
    }

    Ok(command)
}

/// Splits a start command into the program and its arguments.
/// Batch files cannot be started directly and run through `cmd.exe /c`.
pub(crate) fn service_executable(command: &str) -> Result<(String, Vec<String>), ProcessManagerError> {
    let args = split_command(command)?;
    let (program, rest) = args.split_first().ok_or(ProcessManagerError::EmptyCommand)?;

    let is_batch = Path::new(program)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bat"));

    if is_batch {
        let mut arguments = vec!["/c".to_string(), program.clone()];
        arguments.extend(rest.iter().cloned());
        return Ok(("cmd.exe".to_string(), arguments));
    }

    Ok((program.clone(), rest.to_vec()))
}

/// Password of a service account from the `users` config map.
pub(crate) fn service_password(
    cfg: &DaemonConfig,
    user: &str,
) -> Result<String, ProcessManagerError> {
    let raw = cfg
        .users
        .get(user)
        .ok_or_else(|| ProcessManagerError::UserNotFound(user.to_string()))?;

    if raw.is_empty() {
        return Err(ProcessManagerError::InvalidUserPassword);
    }

    match raw.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => {
            let decoded = STANDARD.decode(encoded).map_err(|e| {
                ProcessManagerError::ServiceConfig(format!("failed to decode base64 password: {}", e))
            })?;
            String::from_utf8(decoded).map_err(|_| ProcessManagerError::InvalidUserPassword)
        }
        None => Ok(raw.clone()),
    }
}

/// Quotes a single argument for the Windows command line parser.
pub(crate) fn windows_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '"']) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');

    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.push_str(&"\\".repeat(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.push_str(&"\\".repeat(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    quoted.push_str(&"\\".repeat(backslashes * 2));
    quoted.push('"');

    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use gameap_core::SafeBuffer;
    use tempfile::TempDir;

    #[tokio::test]
    async fn tail_returns_only_the_last_bytes() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("server.log");
        std::fs::write(&log, "0123456789").unwrap();

        let out = SafeBuffer::new();
        tail_file(&log, 4, &out).await.unwrap();
        assert_eq!(out.to_string_lossy(), "6789");

        let out = SafeBuffer::new();
        tail_file(&log, 100, &out).await.unwrap();
        assert_eq!(out.to_string_lossy(), "0123456789");
    }

    #[test]
    fn batch_files_run_through_cmd() {
        let (program, args) = service_executable("start.bat -port 27015").unwrap();
        assert_eq!(program, "cmd.exe");
        assert_eq!(args, vec!["/c", "start.bat", "-port", "27015"]);

        let (program, args) = service_executable("srcds.exe -game cstrike").unwrap();
        assert_eq!(program, "srcds.exe");
        assert_eq!(args, vec!["-game", "cstrike"]);
    }

    #[test]
    fn passwords_may_be_base64() {
        let mut cfg = DaemonConfig::default();
        cfg.users.insert("plain".to_string(), "secret".to_string());
        cfg.users
            .insert("encoded".to_string(), "base64:c2VjcmV0".to_string());
        cfg.users.insert("empty".to_string(), String::new());

        assert_eq!(service_password(&cfg, "plain").unwrap(), "secret");
        assert_eq!(service_password(&cfg, "encoded").unwrap(), "secret");
        assert!(matches!(
            service_password(&cfg, "empty"),
            Err(ProcessManagerError::InvalidUserPassword)
        ));
        assert!(matches!(
            service_password(&cfg, "missing"),
            Err(ProcessManagerError::UserNotFound(_))
        ));
    }

    #[test]
    fn windows_args_are_quoted_when_needed() {
        assert_eq!(windows_arg("shawl.exe"), "shawl.exe");
        assert_eq!(
            windows_arg(r"C:\Program Files\shawl.exe"),
            r#""C:\Program Files\shawl.exe""#
        );
        assert_eq!(windows_arg(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(windows_arg(""), r#""""#);
    }
}
