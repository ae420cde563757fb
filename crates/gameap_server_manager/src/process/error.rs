use std::io;

use thiserror::Error;

use gameap_core::ExecutorError;

#[derive(Error, Debug)]
pub enum ProcessManagerError {
    #[error("empty user")]
    EmptyUser,

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("invalid user password")]
    InvalidUserPassword,

    #[error("unknown process manager {0}")]
    UnknownProcessManager(String),

    #[error("empty command")]
    EmptyCommand,

    #[error("input is not supported")]
    InputNotSupported,

    #[error("unknown exit code {0}")]
    UnknownExitCode(i32),

    #[error("timeout waiting for service to stop")]
    StopTimeout,

    #[error("failed to {action}")]
    Failed { action: &'static str },

    #[error("failed to build service config: {0}")]
    ServiceConfig(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProcessManagerError {
    pub(crate) fn failed(action: &'static str) -> Self {
        ProcessManagerError::Failed { action }
    }
}
