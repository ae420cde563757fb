use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use gameap_core::{CommandResult, Executor, ExecutorError, ExecutorOptions, OutputWriter};

use super::lookup::split_command;

/// In-process implementation of a pseudo command. Receives the arguments after the command name.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        args: &[String],
        out: &dyn OutputWriter,
        options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError>;
}

/// Routes commands whose first word has a registered handler to that handler.
/// Everything else goes to the inner executor untouched.
pub struct ExtendableExecutor {
    inner: Arc<dyn Executor>,
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl ExtendableExecutor {
    pub fn new(inner: Arc<dyn Executor>) -> Self {
        Self {
            inner,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_handler(&self, command: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.handlers.write().insert(command.into(), handler);
    }

    fn handler(&self, command: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.read().get(command).cloned()
    }
}

#[async_trait]
impl Executor for ExtendableExecutor {
    async fn exec_with_writer(
        &self,
        command: &str,
        out: &dyn OutputWriter,
        options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError> {
        if command.is_empty() {
            return Err(ExecutorError::EmptyCommand);
        }

        let args = split_command(command)?;
        let Some((name, rest)) = args.split_first() else {
            return Err(ExecutorError::InvalidCommand);
        };

        match self.handler(name) {
            Some(handler) => {
                debug!(log_type = "executor", "Dispatching {} to a command handler", name);
                handler.handle(rest, out, options).await
            }
            None => self.inner.exec_with_writer(command, out, options).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gameap_core::{SUCCESS_RESULT, SafeBuffer};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn exec_with_writer(
            &self,
            command: &str,
            out: &dyn OutputWriter,
            _options: &ExecutorOptions,
        ) -> Result<CommandResult, ExecutorError> {
            self.commands.lock().push(command.to_string());
            out.write_str("inner");
            Ok(SUCCESS_RESULT)
        }
    }

    struct EchoArgs;

    #[async_trait]
    impl CommandHandler for EchoArgs {
        async fn handle(
            &self,
            args: &[String],
            out: &dyn OutputWriter,
            _options: &ExecutorOptions,
        ) -> Result<CommandResult, ExecutorError> {
            out.write_str(&args.join(","));
            Ok(7)
        }
    }

    #[tokio::test]
    async fn registered_handler_receives_remaining_args() {
        let inner = Arc::new(RecordingExecutor::default());
        let executor = ExtendableExecutor::new(inner.clone());
        executor.register_handler("echo-args", Arc::new(EchoArgs));

        let buffer = SafeBuffer::new();
        let code = executor
            .exec_with_writer("echo-args a 'b c'", &buffer, &ExecutorOptions::default())
            .await
            .unwrap();

        assert_eq!(code, 7);
        assert_eq!(buffer.to_string_lossy(), "a,b c");
        assert!(inner.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_commands_fall_through_verbatim() {
        let inner = Arc::new(RecordingExecutor::default());
        let executor = ExtendableExecutor::new(inner.clone());

        let (output, code) = executor
            .exec("./hlds_run -game cstrike", &ExecutorOptions::default())
            .await
            .unwrap();

        assert_eq!(code, SUCCESS_RESULT);
        assert_eq!(output, b"inner");
        assert_eq!(*inner.commands.lock(), vec!["./hlds_run -game cstrike"]);
    }

    #[tokio::test]
    async fn empty_commands_are_rejected() {
        let executor = ExtendableExecutor::new(Arc::new(RecordingExecutor::default()));

        assert!(matches!(
            executor.exec("", &ExecutorOptions::default()).await,
            Err(ExecutorError::EmptyCommand)
        ));
        assert!(matches!(
            executor.exec("   ", &ExecutorOptions::default()).await,
            Err(ExecutorError::InvalidCommand)
        ));
    }
}
