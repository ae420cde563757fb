use std::sync::Arc;

use async_trait::async_trait;

use gameap_core::{CommandResult, Executor, ExecutorError, ExecutorOptions, OutputWriter};

/// Frames the inner executor's output with the command line and its exit code,
/// so task logs show what was run.
#[derive(Clone)]
pub struct DetailedExecutor {
    inner: Arc<dyn Executor>,
}

impl DetailedExecutor {
    pub fn new(inner: Arc<dyn Executor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Executor for DetailedExecutor {
    async fn exec_with_writer(
        &self,
        command: &str,
        out: &dyn OutputWriter,
        options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError> {
        out.write_str(&format!("{}# {}\n\n", options.work_dir.display(), command));

        let result = self.inner.exec_with_writer(command, out, options).await?;

        out.write_str(&format!("\nExited with {}\n", result));

        Ok(result)
    }
}
