use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::buffer::{OutputWriter, SafeBuffer};
use crate::domain::CommandResult;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("empty command")]
    EmptyCommand,

    #[error("invalid command")]
    InvalidCommand,

    #[error("failed to parse command: {0}")]
    InvalidQuoting(String),

    #[error("invalid work directory: {0}")]
    InvalidWorkDirectory(PathBuf),

    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("failed to run command: {0}")]
    Io(#[from] io::Error),

    /// Raised by in-process command handlers.
    #[error("{0}")]
    Handler(String),
}

impl ExecutorError {
    pub fn handler(message: impl Into<String>) -> Self {
        ExecutorError::Handler(message.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub work_dir: PathBuf,
    /// Used when `work_dir` does not exist.
    pub fallback_work_dir: Option<PathBuf>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub username: String,
    pub home_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl ExecutorOptions {
    pub fn in_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Default::default()
        }
    }
}

/// Runs shell-quoted commands.
///
/// A non-zero exit code is a result, not an error. Errors mean the command
/// could not be run at all.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn exec_with_writer(
        &self,
        command: &str,
        out: &dyn OutputWriter,
        options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError>;

    async fn exec(
        &self,
        command: &str,
        options: &ExecutorOptions,
    ) -> Result<(Vec<u8>, CommandResult), ExecutorError> {
        let buffer = SafeBuffer::new();
        let code = self.exec_with_writer(command, &buffer, options).await?;
        Ok((buffer.read_output(), code))
    }
}
