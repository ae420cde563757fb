use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, ExecutorError, ExecutorOptions, OutputWriter, SUCCESS_RESULT,
};

use crate::download::Downloader;
use crate::executor::CommandHandler;

/// `get-tool <url>`: downloads a helper binary into the node tools directory.
pub struct GetTool {
    cfg: Arc<DaemonConfig>,
    downloader: Downloader,
}

impl GetTool {
    pub fn new(cfg: Arc<DaemonConfig>, downloader: Downloader) -> Self {
        Self { cfg, downloader }
    }
}

#[async_trait]
impl CommandHandler for GetTool {
    async fn handle(
        &self,
        args: &[String],
        out: &dyn OutputWriter,
        _options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError> {
        let Some(source) = args.first() else {
            return Err(ExecutorError::handler("no source provided"));
        };

        let file_name = source
            .rsplit('/')
            .find(|part| !part.is_empty())
            .unwrap_or(source.as_str());
        let destination = self.cfg.tools_path().join(file_name);

        out.write_line(&format!(
            "Getting tool from {} to {} ...",
            source,
            destination.display()
        ));

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.downloader
            .download(source, &destination, out)
            .await
            .map_err(|e| ExecutorError::handler(format!("failed to get tool: {}", e)))?;

        if let Err(e) = make_private_executable(&destination).await {
            out.write_str("Failed to chmod tool");
            return Err(ExecutorError::handler(format!("failed to chmod tool: {}", e)));
        }

        Ok(SUCCESS_RESULT)
    }
}

#[cfg(unix)]
async fn make_private_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await
}

#[cfg(not(unix))]
async fn make_private_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gameap_core::NullOutput;

    #[tokio::test]
    async fn source_is_required() {
        let handler = GetTool::new(Arc::new(DaemonConfig::default()), Downloader::default());

        let result = handler
            .handle(&[], &NullOutput, &ExecutorOptions::default())
            .await;

        assert!(matches!(result, Err(ExecutorError::Handler(msg)) if msg == "no source provided"));
    }
}
