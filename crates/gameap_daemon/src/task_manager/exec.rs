use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, ERROR_RESULT, Executor, ExecutorError, ExecutorOptions, OutputWriter,
    SafeBuffer, Server, UNKNOWN_RESULT, replace_short_codes,
};

/// Runs the raw command of a `cmdexec` task.
pub struct ExecCommand {
    cfg: Arc<DaemonConfig>,
    executor: Arc<dyn Executor>,
    command: String,
    status: Mutex<(bool, CommandResult)>,
    output: SafeBuffer,
}

impl ExecCommand {
    pub fn new(cfg: Arc<DaemonConfig>, executor: Arc<dyn Executor>, command: &str) -> Self {
        Self {
            cfg,
            executor,
            command: command.to_string(),
            status: Mutex::new((false, UNKNOWN_RESULT)),
            output: SafeBuffer::new(),
        }
    }

    /// Inside the server directory with its short codes expanded when the task names a
    /// server, in the work path otherwise.
    pub async fn execute(&self, server: Option<&Server>) -> Result<(), ExecutorError> {
        let (command, work_dir) = match server {
            Some(server) => (
                replace_short_codes(&self.command, &self.cfg, server),
                server.work_dir(&self.cfg),
            ),
            None => (self.command.clone(), self.cfg.work_path().to_path_buf()),
        };

        let options = ExecutorOptions {
            work_dir,
            fallback_work_dir: Some(self.cfg.work_path().to_path_buf()),
            ..Default::default()
        };

        debug!(log_type = "task_manager", "Executing command: {}", command);

        match self
            .executor
            .exec_with_writer(&command, &self.output, &options)
            .await
        {
            Ok(result) => {
                *self.status.lock() = (true, result);
                Ok(())
            }
            Err(e) => {
                self.output.write_line(&e.to_string());
                *self.status.lock() = (true, ERROR_RESULT);
                Err(e)
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.lock().0
    }

    pub fn result(&self) -> CommandResult {
        self.status.lock().1
    }

    pub fn read_output(&self) -> Vec<u8> {
        self.output.read_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedExecutor, config, installed_server};
    use gameap_core::SUCCESS_RESULT;

    #[tokio::test]
    async fn server_short_codes_are_expanded() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Arc::new(config(dir.path()));
        let executor = ScriptedExecutor::new();
        executor.on("./backup.sh", SUCCESS_RESULT, "saved\n");

        let command = ExecCommand::new(cfg.clone(), executor.clone(), "./backup.sh {id} {dir}");
        let server = installed_server(3);
        command.execute(Some(&server)).await.unwrap();

        let work_dir = server.work_dir(&cfg);
        assert_eq!(
            executor.commands(),
            vec![format!("./backup.sh 3 {}", work_dir.display())]
        );
        assert_eq!(executor.options()[0].work_dir, work_dir);
        assert!(command.is_complete());
        assert_eq!(command.result(), SUCCESS_RESULT);
        assert_eq!(command.read_output(), b"saved\n");
    }

    #[tokio::test]
    async fn without_server_runs_in_work_path() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ScriptedExecutor::new();

        let command = ExecCommand::new(Arc::new(config(dir.path())), executor.clone(), "ls {id}");
        command.execute(None).await.unwrap();

        assert_eq!(executor.commands(), vec!["ls {id}"]);
        assert_eq!(executor.options()[0].work_dir, dir.path());
    }

    #[tokio::test]
    async fn executor_error_completes_with_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ScriptedExecutor::new();
        executor.fails("missing-binary");

        let command = ExecCommand::new(
            Arc::new(config(dir.path())),
            executor,
            "missing-binary --flag",
        );

        assert!(command.execute(None).await.is_err());
        assert!(command.is_complete());
        assert_eq!(command.result(), ERROR_RESULT);
        assert!(!command.read_output().is_empty());
    }
}
