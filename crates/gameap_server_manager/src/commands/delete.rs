use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use gameap_core::{CommandResult, OutputWriter, SUCCESS_RESULT, Server};

use super::{CommandContext, CommandError, CommandState, ServerCommand};

/// Unregisters the server from the process manager and removes its files.
pub struct DeleteServer {
    context: Arc<CommandContext>,
    state: CommandState,
}

impl DeleteServer {
    pub(crate) fn new(context: Arc<CommandContext>) -> Self {
        Self {
            context,
            state: CommandState::default(),
        }
    }

    async fn run(&self, server: &Server) -> Result<CommandResult, CommandError> {
        let out = self.state.output();

        if let Err(e) = self.context.process_manager.uninstall(server, out).await {
            warn!(
                log_type = "server_command",
                "Failed to uninstall server {} from process manager: {}",
                server.id(),
                e
            );
            out.write_line(&format!("Failed to uninstall service: {}", e));
        }

        let script = &self.context.cfg.scripts.delete;
        if !script.is_empty() {
            return self.context.run_script(server, script, "", out).await;
        }

        let work_dir = server.work_dir(&self.context.cfg);
        match tokio::fs::remove_dir_all(&work_dir).await {
            Ok(()) => {
                info!(
                    log_type = "server_command",
                    "Removed {} of server {}",
                    work_dir.display(),
                    server.id()
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(SUCCESS_RESULT)
    }
}

#[async_trait]
impl ServerCommand for DeleteServer {
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
