use std::sync::Arc;

use async_trait::async_trait;

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, Executor, ExecutorOptions, OutputWriter, SUCCESS_RESULT, Server,
    make_full_command,
};

use super::{ProcessManager, ProcessManagerError, template_or_command};

/// Runs the node's script templates for every operation.
pub struct Simple {
    cfg: Arc<DaemonConfig>,
    executor: Arc<dyn Executor>,
    detailed_executor: Arc<dyn Executor>,
}

impl Simple {
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

    fn options(&self, server: &Server) -> ExecutorOptions {
        ExecutorOptions {
            work_dir: server.work_dir(&self.cfg),
            fallback_work_dir: Some(self.cfg.work_path().to_path_buf()),
            ..Default::default()
        }
    }

    async fn exec(
        &self,
        executor: &dyn Executor,
        template: &str,
        server_command: &str,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let command = make_full_command(
            &self.cfg,
            server,
            template_or_command(template),
            server_command,
        );

        if command.trim().is_empty() {
            return Err(ProcessManagerError::EmptyCommand);
        }

        Ok(executor
            .exec_with_writer(&command, out, &self.options(server))
            .await?)
    }
}

#[async_trait]
impl ProcessManager for Simple {
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
        let scripts = &self.cfg.scripts;
        self.exec(
            self.detailed_executor.as_ref(),
            &scripts.start,
            server.start_command(),
            server,
            out,
        )
        .await
    }

    async fn stop(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let scripts = &self.cfg.scripts;
        self.exec(
            self.detailed_executor.as_ref(),
            &scripts.stop,
            server.stop_command(),
            server,
            out,
        )
        .await
    }

    async fn restart(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let scripts = &self.cfg.scripts;
        self.exec(
            self.detailed_executor.as_ref(),
            &scripts.restart,
            server.restart_command(),
            server,
            out,
        )
        .await
    }

    async fn status(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let scripts = &self.cfg.scripts;
        self.exec(self.detailed_executor.as_ref(), &scripts.status, "", server, out)
            .await
    }

    async fn get_output(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let scripts = &self.cfg.scripts;
        self.exec(self.executor.as_ref(), &scripts.get_console, "", server, out)
            .await
    }

    async fn send_input(
        &self,
        input: &str,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let scripts = &self.cfg.scripts;
        self.exec(
            self.detailed_executor.as_ref(),
            &scripts.send_command,
            input,
            server,
            out,
        )
        .await
    }
}
