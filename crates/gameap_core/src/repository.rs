use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::ApiError;
use crate::domain::{GDTask, GDTaskStatus, Server, ServerTask};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid server id {0}")]
    InvalidServerId(u64),

    #[error("invalid value of {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

#[async_trait]
pub trait ServerRepository: Send + Sync {
    async fn ids(&self) -> Result<Vec<u64>, RepositoryError>;

    /// `Ok(None)` when the panel does not know the server.
    async fn find_by_id(&self, id: u64) -> Result<Option<Arc<Server>>, RepositoryError>;

    async fn save(&self, server: &Server) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait GDTaskRepository: Send + Sync {
    async fn find_by_status(&self, status: GDTaskStatus)
    -> Result<Vec<Arc<GDTask>>, RepositoryError>;

    async fn save(&self, task: &GDTask) -> Result<(), RepositoryError>;

    async fn append_output(&self, task: &GDTask, output: &[u8]) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ServerTaskRepository: Send + Sync {
    async fn find(&self) -> Result<Vec<ServerTask>, RepositoryError>;

    async fn save(&self, task: &ServerTask) -> Result<(), RepositoryError>;

    async fn fail(&self, task: &ServerTask, output: &[u8]) -> Result<(), RepositoryError>;
}
