use std::sync::Arc;

use async_trait::async_trait;

use gameap_core::{CommandResult, Server};

use super::{CommandContext, CommandError, CommandState, ServerCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Start,
    Stop,
    Kill,
    Status,
}

/// Runs the node script for the action when one is configured, the process manager otherwise.
pub struct LifecycleCommand {
    context: Arc<CommandContext>,
    action: Lifecycle,
    state: CommandState,
}

impl LifecycleCommand {
    pub(crate) fn new(context: Arc<CommandContext>, action: Lifecycle) -> Self {
        Self {
            context,
            action,
            state: CommandState::default(),
        }
    }

    fn script(&self) -> &str {
        let scripts = &self.context.cfg.scripts;
        match self.action {
            Lifecycle::Start => scripts.start.as_str(),
            Lifecycle::Stop => scripts.stop.as_str(),
            Lifecycle::Kill => scripts.kill.as_str(),
            Lifecycle::Status => scripts.status.as_str(),
        }
    }

    async fn run(&self, server: &Server) -> Result<CommandResult, CommandError> {
        let out = self.state.output();

        let script = self.script();
        if !script.is_empty() {
            let server_command = match self.action {
                Lifecycle::Start => server.start_command(),
                Lifecycle::Stop => server.stop_command(),
                Lifecycle::Kill => server.info().force_stop_command.as_str(),
                Lifecycle::Status => "",
            };
            return self
                .context
                .run_script(server, script, server_command, out)
                .await;
        }

        let pm = &self.context.process_manager;
        let result = match self.action {
            Lifecycle::Start => pm.start(server, out).await?,
            Lifecycle::Stop | Lifecycle::Kill => pm.stop(server, out).await?,
            Lifecycle::Status => pm.status(server, out).await?,
        };

        Ok(result)
    }
}

#[async_trait]
impl ServerCommand for LifecycleCommand {
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
