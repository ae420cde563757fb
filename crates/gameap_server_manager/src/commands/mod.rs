//! Game server commands run on behalf of panel tasks and scheduled jobs.
//!
//! A command is executed once by a worker while another task polls
//! [`ServerCommand::is_complete`] and drains [`ServerCommand::read_output`].

mod delete;
mod install;
mod lifecycle;
mod restart;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, ERROR_RESULT, Executor, ExecutorError, ExecutorOptions, GDTaskKind,
    OutputWriter, RepositoryError, SUCCESS_RESULT, SafeBuffer, Server, ServerRepository,
    ServerTaskCommand, UNKNOWN_RESULT, make_full_command,
};

pub use delete::DeleteServer;
pub use install::InstallServer;
pub use lifecycle::{Lifecycle, LifecycleCommand};
pub use restart::RestartServer;

use crate::download::Downloader;
use crate::installer::{InstallError, InstallMode};
use crate::process::{ProcessManager, ProcessManagerError};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    ProcessManager(#[from] ProcessManagerError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("failed to save server: {0}")]
    Repository(#[from] RepositoryError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait ServerCommand: Send + Sync {
    /// Runs the command to completion. Errors are also written to the output.
    async fn execute(&self, server: &Server) -> Result<(), CommandError>;

    fn is_complete(&self) -> bool;

    /// [`UNKNOWN_RESULT`] until the command completes.
    fn result(&self) -> CommandResult;

    /// Drains the output produced since the previous call.
    fn read_output(&self) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Start,
    Pause,
    Unpause,
    Stop,
    Kill,
    Restart,
    Status,
    Install,
    Update,
    Reinstall,
    Delete,
    Move,
}

impl CommandKind {
    /// `None` for tasks that do not map to a server command (`cmdexec`).
    pub fn from_task_kind(kind: GDTaskKind) -> Option<Self> {
        match kind {
            GDTaskKind::Start => Some(CommandKind::Start),
            GDTaskKind::Pause => Some(CommandKind::Pause),
            GDTaskKind::Stop => Some(CommandKind::Stop),
            GDTaskKind::Kill => Some(CommandKind::Kill),
            GDTaskKind::Restart => Some(CommandKind::Restart),
            GDTaskKind::Install => Some(CommandKind::Install),
            GDTaskKind::Reinstall => Some(CommandKind::Reinstall),
            GDTaskKind::Update => Some(CommandKind::Update),
            GDTaskKind::Delete => Some(CommandKind::Delete),
            GDTaskKind::Move => Some(CommandKind::Move),
            GDTaskKind::CommandExecute => None,
        }
    }
}

impl From<ServerTaskCommand> for CommandKind {
    fn from(command: ServerTaskCommand) -> Self {
        match command {
            ServerTaskCommand::Start => CommandKind::Start,
            ServerTaskCommand::Stop => CommandKind::Stop,
            ServerTaskCommand::Restart => CommandKind::Restart,
            ServerTaskCommand::Update => CommandKind::Update,
            ServerTaskCommand::Reinstall => CommandKind::Reinstall,
        }
    }
}

/// Completion flag, result code and output shared by every command.
pub(crate) struct CommandState {
    status: Mutex<(bool, CommandResult)>,
    output: SafeBuffer,
}

impl Default for CommandState {
    fn default() -> Self {
        Self {
            status: Mutex::new((false, UNKNOWN_RESULT)),
            output: SafeBuffer::new(),
        }
    }
}

impl CommandState {
    pub(crate) fn output(&self) -> &SafeBuffer {
        &self.output
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.status.lock().0
    }

    pub(crate) fn result(&self) -> CommandResult {
        self.status.lock().1
    }

    pub(crate) fn read_output(&self) -> Vec<u8> {
        self.output.read_output()
    }

    pub(crate) fn complete(&self, result: CommandResult) {
        *self.status.lock() = (true, result);
    }

    /// Completes with the outcome of a run; a failed run completes with [`ERROR_RESULT`].
    pub(crate) fn settle(
        &self,
        outcome: Result<CommandResult, CommandError>,
    ) -> Result<(), CommandError> {
        match outcome {
            Ok(result) => {
                self.complete(result);
                Ok(())
            }
            Err(e) => {
                self.output.write_line(&e.to_string());
                self.complete(ERROR_RESULT);
                Err(e)
            }
        }
    }
}

/// Shared dependencies of the commands built by [`ServerCommandFactory`].
pub(crate) struct CommandContext {
    pub cfg: Arc<DaemonConfig>,
    pub executor: Arc<dyn Executor>,
    pub process_manager: Arc<dyn ProcessManager>,
    pub servers: Arc<dyn ServerRepository>,
    pub downloader: Downloader,
}

impl CommandContext {
    /// Runs a node script template in the server directory.
    pub(crate) async fn run_script(
        &self,
        server: &Server,
        template: &str,
        server_command: &str,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, CommandError> {
        let command = make_full_command(&self.cfg, server, template, server_command);
        let options = ExecutorOptions {
            work_dir: server.work_dir(&self.cfg),
            fallback_work_dir: Some(self.cfg.work_path().to_path_buf()),
            ..Default::default()
        };

        debug!(
            log_type = "server_command",
            "Running script for server {}: {}",
            server.id(),
            command
        );

        Ok(self.executor.exec_with_writer(&command, out, &options).await?)
    }
}

/// Builds server commands over one process manager and executor.
pub struct ServerCommandFactory {
    context: Arc<CommandContext>,
}

impl ServerCommandFactory {
    pub fn new(
        cfg: Arc<DaemonConfig>,
        executor: Arc<dyn Executor>,
        process_manager: Arc<dyn ProcessManager>,
        servers: Arc<dyn ServerRepository>,
        downloader: Downloader,
    ) -> Self {
        Self {
            context: Arc::new(CommandContext {
                cfg,
                executor,
                process_manager,
                servers,
                downloader,
            }),
        }
    }

    /// A fresh, not yet executed command of the given kind.
    pub fn load_server_command(&self, kind: CommandKind) -> Arc<dyn ServerCommand> {
        let context = self.context.clone();

        match kind {
            CommandKind::Start => Arc::new(LifecycleCommand::new(context, Lifecycle::Start)),
            CommandKind::Stop => Arc::new(LifecycleCommand::new(context, Lifecycle::Stop)),
            CommandKind::Kill => Arc::new(LifecycleCommand::new(context, Lifecycle::Kill)),
            CommandKind::Status => Arc::new(LifecycleCommand::new(context, Lifecycle::Status)),
            CommandKind::Restart => Arc::new(RestartServer::new(context)),
            CommandKind::Install => Arc::new(InstallServer::new(context, InstallMode::Install)),
            CommandKind::Update => Arc::new(InstallServer::new(context, InstallMode::Update)),
            CommandKind::Reinstall => Arc::new(ReinstallServer::new(context)),
            CommandKind::Delete => Arc::new(DeleteServer::new(context)),
            CommandKind::Pause | CommandKind::Unpause | CommandKind::Move => {
                Arc::new(NotImplemented::default())
            }
        }
    }
}

/// Runs `children` in order and collects their output; the first non-success result
/// short-circuits.
pub(crate) async fn run_sequence(
    children: &[Arc<dyn ServerCommand>],
    server: &Server,
    out: &dyn OutputWriter,
) -> Result<CommandResult, CommandError> {
    let mut result = SUCCESS_RESULT;

    for child in children {
        let executed = child.execute(server).await;
        out.write(&child.read_output());
        executed?;

        result = child.result();
        if result != SUCCESS_RESULT {
            break;
        }
    }

    Ok(result)
}

/// Deletes the server files, then installs them again unless a reinstall script is set.
pub struct ReinstallServer {
    context: Arc<CommandContext>,
    state: CommandState,
}

impl ReinstallServer {
    pub(crate) fn new(context: Arc<CommandContext>) -> Self {
        Self {
            context,
            state: CommandState::default(),
        }
    }

    async fn run(&self, server: &Server) -> Result<CommandResult, CommandError> {
        let script = &self.context.cfg.scripts.reinstall;
        if !script.is_empty() {
            return self
                .context
                .run_script(server, script, "", self.state.output())
                .await;
        }

        let children: [Arc<dyn ServerCommand>; 2] = [
            Arc::new(DeleteServer::new(self.context.clone())),
            Arc::new(InstallServer::new(self.context.clone(), InstallMode::Install)),
        ];

        run_sequence(&children, server, self.state.output()).await
    }
}

#[async_trait]
impl ServerCommand for ReinstallServer {
    async fn execute(&self, server: &Server) -> Result<(), CommandError> {
        let outcome = self.run(server).await;
        self.state.settle(outcome)
    }

    fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    fn result(&self) -> CommandResult {
        self.state.result()
    }

    fn read_output(&self) -> Vec<u8> {
        self.state.read_output()
    }
}

#[derive(Default)]
pub struct NotImplemented {
    state: CommandState,
}

#[async_trait]
impl ServerCommand for NotImplemented {
    async fn execute(&self, _server: &Server) -> Result<(), CommandError> {
        self.state.output().write_line("Command is not implemented");
        self.state.complete(ERROR_RESULT);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    fn result(&self) -> CommandResult {
        self.state.result()
    }

    fn read_output(&self) -> Vec<u8> {
        self.state.read_output()
    }
}
