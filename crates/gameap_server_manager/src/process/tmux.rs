use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, Executor, ExecutorOptions, NullOutput, OutputWriter, SUCCESS_RESULT, Server,
    make_full_command,
};

use super::{ProcessManager, ProcessManagerError, template_or_command};
use crate::users::lookup_user;

const DEFAULT_WIDTH: u32 = 200;
const DEFAULT_HISTORY_LIMIT: u32 = 1000;

/// Keeps each server in a detached tmux session named by its UUID.
pub struct Tmux {
    cfg: Arc<DaemonConfig>,
    executor: Arc<dyn Executor>,
    detailed_executor: Arc<dyn Executor>,
}

impl Tmux {
    pub fn new(
        cfg: Arc<DaemonConfig>,
        executor: Arc<dyn Executor>,
        detailed_executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            cfg,
            executor,
            detailed_executor,
        }
    }

    fn options(&self, server: &Server) -> Result<ExecutorOptions, ProcessManagerError> {
        if server.user().is_empty() {
            return Err(ProcessManagerError::EmptyUser);
        }

        let user = lookup_user(server.user())?
            .ok_or_else(|| ProcessManagerError::UserNotFound(server.user().to_string()))?;

        Ok(user.executor_options(server.work_dir(&self.cfg)))
    }

    fn start_command(&self, server: &Server) -> Result<String, ProcessManagerError> {
        let command = make_full_command(
            &self.cfg,
            server,
            template_or_command(&self.cfg.scripts.start),
            server.start_command(),
        );

        if command.trim().is_empty() {
            return Err(ProcessManagerError::EmptyCommand);
        }

        Ok(new_session_command(server.uuid(), &command))
    }
}

#[async_trait]
impl ProcessManager for Tmux {
    async fn install(
        &self,
        _server: &Server,
        _out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        Ok(SUCCESS_RESULT)
    }

    async fn uninstall(
        &self,
        _server: &Server,
        _out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        Ok(SUCCESS_RESULT)
    }

    async fn start(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let options = self.options(server)?;
        let command = self.start_command(server)?;

        let result = self
            .detailed_executor
            .exec_with_writer(&command, out, &options)
            .await?;

        if result != SUCCESS_RESULT {
            return Ok(result);
        }

        let history = format!("tmux set-option -g history-limit {}", DEFAULT_HISTORY_LIMIT);
        match self.executor.exec_with_writer(&history, &NullOutput, &options).await {
            Ok(SUCCESS_RESULT) => {}
            Ok(code) => warn!(
                log_type = "process_manager",
                "Failed to set tmux history limit for server {}, exit code {}",
                server.id(),
                code
            ),
            Err(e) => warn!(
                log_type = "process_manager",
                "Failed to set tmux history limit for server {}: {}",
                server.id(),
                e
            ),
        }

        Ok(result)
    }

    async fn stop(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let options = self.options(server)?;

        Ok(self
            .detailed_executor
            .exec_with_writer(
                &format!("tmux kill-session -t {}", server.uuid()),
                out,
                &options,
            )
            .await?)
    }

    async fn restart(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let active = self.status(server, &NullOutput).await? == SUCCESS_RESULT;

        if active {
            let result = self.stop(server, out).await?;
            if result != SUCCESS_RESULT {
                return Ok(result);
            }
        }

        self.start(server, out).await
    }

    async fn status(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let options = self.options(server)?;

        Ok(self
            .executor
            .exec_with_writer(
                &format!("tmux has-session -t {}", server.uuid()),
                out,
                &options,
            )
            .await?)
    }

    async fn get_output(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let options = self.options(server)?;

        Ok(self
            .executor
            .exec_with_writer(
                &format!("tmux capture-pane -t {} -p", server.uuid()),
                out,
                &options,
            )
            .await?)
    }

    async fn send_input(
        &self,
        input: &str,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let options = self.options(server)?;
        let command = format!(
            "tmux send-keys -t {} {} ENTER",
            server.uuid(),
            double_quote(input)
        );

        Ok(self
            .executor
            .exec_with_writer(&command, out, &options)
            .await?)
    }
}

fn new_session_command(session: &str, command: &str) -> String {
    format!(
        "tmux new-session -d -s {} -x {} {}",
        session,
        DEFAULT_WIDTH,
        double_quote(command)
    )
}

/// Wraps `value` in double quotes, escaping what the shell splitter would otherwise interpret.
/// Already escaped quotes are taken as plain quotes first.
fn double_quote(value: &str) -> String {
    let value = value.replace("\\\"", "\"");

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '$' => quoted.push_str("\\$"),
            '`' => quoted.push_str("\\`"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');

    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::split_command;
    use crate::testing::{ScriptedExecutor, config, server};
    use gameap_core::SafeBuffer;

    #[cfg(unix)]
    #[test]
    fn session_command_survives_splitting() {
        let command = new_session_command(
            "759b875e",
            r#"./hlds_run -game cstrike +hostname "My \"best\" server" +rcon_password pa$$"#,
        );

        let args = split_command(&command).unwrap();

        assert_eq!(
            args,
            vec![
                "tmux",
                "new-session",
                "-d",
                "-s",
                "759b875e",
                "-x",
                "200",
                r#"./hlds_run -game cstrike +hostname "My "best" server" +rcon_password pa$$"#,
            ]
        );
    }

    #[tokio::test]
    async fn empty_user_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let executor = ScriptedExecutor::new();
        let pm = Tmux::new(
            Arc::new(config(temp.path())),
            executor.clone(),
            executor.clone(),
        );

        assert!(matches!(
            pm.start(&server(""), &SafeBuffer::new()).await,
            Err(ProcessManagerError::EmptyUser)
        ));
        assert!(executor.commands().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let executor = ScriptedExecutor::new();
        let pm = Tmux::new(
            Arc::new(config(temp.path())),
            executor.clone(),
            executor.clone(),
        );

        assert!(matches!(
            pm.status(&server("gameap-no-such-user-42"), &SafeBuffer::new())
                .await,
            Err(ProcessManagerError::UserNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_stops_an_active_session_first() {
        let temp = tempfile::TempDir::new().unwrap();
        let executor = ScriptedExecutor::new();
        let pm = Tmux::new(
            Arc::new(config(temp.path())),
            executor.clone(),
            executor.clone(),
        );

        let result = pm.restart(&server("root"), &SafeBuffer::new()).await.unwrap();

        assert_eq!(result, SUCCESS_RESULT);
        let commands = executor.commands();
        assert_eq!(
            commands[0],
            "tmux has-session -t 759b875e-d910-11eb-aff7-d796d7fcf7ef"
        );
        assert_eq!(
            commands[1],
            "tmux kill-session -t 759b875e-d910-11eb-aff7-d796d7fcf7ef"
        );
        assert!(commands[2].starts_with(
            "tmux new-session -d -s 759b875e-d910-11eb-aff7-d796d7fcf7ef -x 200 \"./hlds_run"
        ));
        assert_eq!(commands[3], "tmux set-option -g history-limit 1000");

        let options = executor.options();
        assert_eq!(options[0].uid, Some(0));
        assert!(options[0].work_dir.ends_with("servers/1337"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn inactive_session_is_only_started() {
        let temp = tempfile::TempDir::new().unwrap();
        let executor = ScriptedExecutor::new();
        executor.on("tmux has-session", 1, "can't find session");
        let pm = Tmux::new(
            Arc::new(config(temp.path())),
            executor.clone(),
            executor.clone(),
        );

        pm.restart(&server("root"), &SafeBuffer::new()).await.unwrap();

        let commands = executor.commands();
        assert_eq!(commands.len(), 3);
        assert!(commands[1].starts_with("tmux new-session"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn send_input_quotes_the_keys() {
        let temp = tempfile::TempDir::new().unwrap();
        let executor = ScriptedExecutor::new();
        let pm = Tmux::new(
            Arc::new(config(temp.path())),
            executor.clone(),
            executor.clone(),
        );

        pm.send_input("say hello world", &server("root"), &SafeBuffer::new())
            .await
            .unwrap();

        assert_eq!(
            executor.commands(),
            vec!["tmux send-keys -t 759b875e-d910-11eb-aff7-d796d7fcf7ef \"say hello world\" ENTER"]
        );
    }
}
