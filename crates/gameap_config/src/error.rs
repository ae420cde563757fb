use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("empty node ID")]
    EmptyNodeId,

    #[error("empty API Host")]
    EmptyApiHost,

    #[error("empty API Key")]
    EmptyApiKey,

    #[error("configuration file not found")]
    NotFound,

    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("{message}: {source}")]
    InvalidFile {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ConfigError {
    pub fn invalid_file(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ConfigError::InvalidFile {
            message: message.into(),
            source: source.into(),
        }
    }
}
