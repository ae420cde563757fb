use std::sync::Arc;

use async_trait::async_trait;

use gameap_core::{
    CommandResult, ExecutorError, ExecutorOptions, OutputWriter, Server, ServerRepository,
};

use crate::executor::CommandHandler;
use crate::process::ProcessManager;

async fn find_server(
    servers: &dyn ServerRepository,
    id: &str,
) -> Result<Arc<Server>, ExecutorError> {
    let id: u64 = id
        .parse()
        .map_err(|_| ExecutorError::handler("invalid server id, should be integer"))?;

    servers
        .find_by_id(id)
        .await
        .map_err(|e| ExecutorError::handler(format!("failed to get server: {}", e)))?
        .ok_or_else(|| ExecutorError::handler("server not found"))
}

/// `server-console-output <id>`: prints the console of a running server.
pub struct ServerConsoleOutput {
    servers: Arc<dyn ServerRepository>,
    process_manager: Arc<dyn ProcessManager>,
}

impl ServerConsoleOutput {
    pub fn new(servers: Arc<dyn ServerRepository>, process_manager: Arc<dyn ProcessManager>) -> Self {
        Self {
            servers,
            process_manager,
        }
    }
}

#[async_trait]
impl CommandHandler for ServerConsoleOutput {
    async fn handle(
        &self,
        args: &[String],
        out: &dyn OutputWriter,
        _options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError> {
        let Some(id) = args.first() else {
            return Err(ExecutorError::handler("no server id provided"));
        };

        let server = find_server(self.servers.as_ref(), id).await?;

        self.process_manager
            .get_output(&server, out)
            .await
            .map_err(|e| ExecutorError::handler(format!("failed to get output: {}", e)))
    }
}

/// `server-command <id> <input...>`: writes a line to the console of a running server.
pub struct SendServerCommand {
    servers: Arc<dyn ServerRepository>,
    process_manager: Arc<dyn ProcessManager>,
}

impl SendServerCommand {
    pub fn new(servers: Arc<dyn ServerRepository>, process_manager: Arc<dyn ProcessManager>) -> Self {
        Self {
            servers,
            process_manager,
        }
    }
}

#[async_trait]
impl CommandHandler for SendServerCommand {
    async fn handle(
        &self,
        args: &[String],
        out: &dyn OutputWriter,
        _options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError> {
        let [id, input @ ..] = args else {
            return Err(ExecutorError::handler("not enough arguments"));
        };
        if input.is_empty() {
            return Err(ExecutorError::handler("not enough arguments"));
        }

        let server = find_server(self.servers.as_ref(), id).await?;

        let mut line = String::with_capacity(args.len() * 10);
        for word in input {
            line.push_str(word);
            line.push(' ');
        }

        self.process_manager
            .send_input(&line, &server, out)
            .await
            .map_err(|e| ExecutorError::handler(format!("failed to send input: {}", e)))
    }
}
