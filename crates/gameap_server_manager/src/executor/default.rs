use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use gameap_core::{CommandResult, Executor, ExecutorError, ExecutorOptions, OutputWriter, UNKNOWN_RESULT};

use super::lookup::{resolve_executable, resolve_work_dir, split_command};

const READ_CHUNK: usize = 8 * 1024;

/// Spawns the command as a child process. Dropping the future kills the child.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExecutor;

impl DefaultExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for DefaultExecutor {
    async fn exec_with_writer(
        &self,
        command: &str,
        out: &dyn OutputWriter,
        options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError> {
        if command.trim().is_empty() {
            return Err(ExecutorError::EmptyCommand);
        }

        let args = split_command(command)?;
        let (program, rest) = args.split_first().ok_or(ExecutorError::EmptyCommand)?;

        let work_dir = resolve_work_dir(options)?;
        let executable = resolve_executable(program, &work_dir)?;

        debug!(
            log_type = "executor",
            "Executing {} in {}",
            command,
            work_dir.display()
        );

        let mut cmd = Command::new(&executable);
        cmd.args(rest)
            .current_dir(&work_dir)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        apply_credentials(&mut cmd, options);

        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, _, _) = tokio::try_join!(child.wait(), pump(stdout, out), pump(stderr, out))?;

        Ok(status.code().unwrap_or(UNKNOWN_RESULT))
    }
}

async fn pump<R>(reader: Option<R>, out: &dyn OutputWriter) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };

    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        out.write(&buf[..n]);
    }
}

#[cfg(unix)]
fn apply_credentials(cmd: &mut Command, options: &ExecutorOptions) {
    if !gameap_core::fs::is_root() {
        return;
    }

    if let Some(uid) = options.uid {
        cmd.uid(uid);
    }

    if let Some(gid) = options.gid {
        cmd.gid(gid);
    }

    if let Some(home) = &options.home_dir {
        cmd.env("HOME", home);
    }
}

#[cfg(not(unix))]
fn apply_credentials(_cmd: &mut Command, _options: &ExecutorOptions) {}
