use std::sync::Arc;

use async_trait::async_trait;

use gameap_core::{CommandResult, SUCCESS_RESULT, Server};

use super::{
    CommandContext, CommandError, CommandState, Lifecycle, LifecycleCommand, ServerCommand,
    run_sequence,
};

/// Runs the restart script, or stops a running server and starts it again.
pub struct RestartServer {
    context: Arc<CommandContext>,
    state: CommandState,
}

impl RestartServer {
    pub(crate) fn new(context: Arc<CommandContext>) -> Self {
        Self {
            context,
            state: CommandState::default(),
        }
    }

    async fn run(&self, server: &Server) -> Result<CommandResult, CommandError> {
        let out = self.state.output();

        let script = &self.context.cfg.scripts.restart;
        if !script.is_empty() {
            return self
                .context
                .run_script(server, script, server.restart_command(), out)
                .await;
        }

        let status: Arc<dyn ServerCommand> =
            Arc::new(LifecycleCommand::new(self.context.clone(), Lifecycle::Status));
        run_sequence(std::slice::from_ref(&status), server, out).await?;

        let mut children: Vec<Arc<dyn ServerCommand>> = Vec::with_capacity(2);
        if status.result() == SUCCESS_RESULT {
            children.push(Arc::new(LifecycleCommand::new(
                self.context.clone(),
                Lifecycle::Stop,
            )));
        }
        children.push(Arc::new(LifecycleCommand::new(
            self.context.clone(),
            Lifecycle::Start,
        )));

        run_sequence(&children, server, out).await
    }
}

#[async_trait]
impl ServerCommand for RestartServer {
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
