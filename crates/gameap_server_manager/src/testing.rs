//! Test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, Executor, ExecutorError, ExecutorOptions, OutputWriter, SUCCESS_RESULT, Server,
    ServerInfo, ServerState,
};

use crate::process::{ProcessManager, ProcessManagerError};

/// Records every command and answers from a list of `(prefix, exit code, output)` rules.
/// The first matching rule wins; unmatched commands succeed silently.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<(String, CommandResult, String)>>,
    commands: Mutex<Vec<(String, ExecutorOptions)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, prefix: &str, code: CommandResult, output: &str) {
        self.rules
            .lock()
            .push((prefix.to_string(), code, output.to_string()));
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn options(&self) -> Vec<ExecutorOptions> {
        self.commands.lock().iter().map(|(_, o)| o.clone()).collect()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn exec_with_writer(
        &self,
        command: &str,
        out: &dyn OutputWriter,
        options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError> {
        self.commands
            .lock()
            .push((command.to_string(), options.clone()));

        let rule = self
            .rules
            .lock()
            .iter()
            .find(|(prefix, _, _)| command.starts_with(prefix.as_str()))
            .map(|(_, code, output)| (*code, output.clone()));

        match rule {
            Some((code, output)) => {
                out.write_str(&output);
                Ok(code)
            }
            None => Ok(SUCCESS_RESULT),
        }
    }
}

pub fn config(work_path: &Path) -> DaemonConfig {
    DaemonConfig {
        node_id: 1,
        api_host: "localhost".to_string(),
        api_key: "key".to_string(),
        work_path: work_path.to_string_lossy().into_owned(),
        ..Default::default()
    }
}

pub fn server(user: &str) -> Server {
    Server::new(
        ServerInfo {
            id: 1337,
            uuid: "759b875e-d910-11eb-aff7-d796d7fcf7ef".to_string(),
            uuid_short: "759b875e".to_string(),
            ip: "127.0.0.1".to_string(),
            connect_port: 27015,
            dir: "servers/1337".to_string(),
            user: user.to_string(),
            start_command: "./hlds_run -game cstrike +map de_dust2".to_string(),
            ..Default::default()
        },
        ServerState::default(),
    )
}

/// Process manager double: records each call, echoes its name to the output
/// and returns the configured result (success by default).
#[derive(Default)]
pub struct FakeProcessManager {
    results: Mutex<HashMap<&'static str, CommandResult>>,
    failing: Mutex<Vec<&'static str>>,
    calls: Mutex<Vec<String>>,
}

impl FakeProcessManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn returns(&self, operation: &'static str, result: CommandResult) {
        self.results.lock().insert(operation, result);
    }

    /// Makes `operation` return [`ProcessManagerError::Failed`].
    pub fn fails(&self, operation: &'static str) {
        self.failing.lock().push(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn call(
        &self,
        operation: &'static str,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.calls.lock().push(operation.to_string());
        if self.failing.lock().contains(&operation) {
            return Err(ProcessManagerError::Failed { action: operation });
        }

        out.write_line(operation);
        Ok(self
            .results
            .lock()
            .get(operation)
            .copied()
            .unwrap_or(SUCCESS_RESULT))
    }
}

#[async_trait]
impl ProcessManager for FakeProcessManager {
    async fn install(
        &self,
        _server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.call("install", out)
    }

    async fn uninstall(
        &self,
        _server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.call("uninstall", out)
    }

    async fn start(
        &self,
        _server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.call("start", out)
    }

    async fn stop(
        &self,
        _server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.call("stop", out)
    }

    async fn restart(
        &self,
        _server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.call("restart", out)
    }

    async fn status(
        &self,
        _server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.call("status", out)
    }

    async fn get_output(
        &self,
        _server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.call("get_output", out)
    }

    async fn send_input(
        &self,
        input: &str,
        _server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.calls.lock().push(format!("send_input:{}", input));
        out.write_line(input);
        Ok(self
            .results
            .lock()
            .get("send_input")
            .copied()
            .unwrap_or(SUCCESS_RESULT))
    }
}
