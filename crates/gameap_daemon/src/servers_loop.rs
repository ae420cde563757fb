//! Periodic status probe of every installed server, with auto start of the ones
//! that should be running.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use gameap_core::{RepositoryError, SUCCESS_RESULT, Server, ServerRepository};
use gameap_server_manager::{CommandError, CommandKind, ServerCommandFactory};

use crate::cli::shutdown::ShutdownController;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ServerLoopError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

pub struct ServersLoop {
    servers: Arc<dyn ServerRepository>,
    factory: Arc<ServerCommandFactory>,
    interval: Duration,
    command_timeout: Duration,
}

impl ServersLoop {
    pub fn new(servers: Arc<dyn ServerRepository>, factory: Arc<ServerCommandFactory>) -> Self {
        Self {
            servers,
            factory,
            interval: DEFAULT_INTERVAL,
            command_timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(self: Arc<Self>, shutdown: Arc<ShutdownController>) -> anyhow::Result<()> {
        let mut shutdown_rx = shutdown.subscribe().await;

        loop {
            self.check_all().await;

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(log_type = "server_loop", "Server loop stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One pass over all servers. A failing server is logged and skipped.
    pub async fn check_all(&self) {
        let ids = match self.servers.ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(log_type = "server_loop", "Failed to list servers: {}", e);
                return;
            }
        };

        for id in ids {
            if let Err(e) = self.process(id).await {
                warn!(
                    log_type = "server_loop",
                    "Failed to process server {}: {}", id, e
                );
            }
        }
    }

    async fn process(&self, id: u64) -> Result<(), ServerLoopError> {
        let Some(server) = self.servers.find_by_id(id).await? else {
            debug!(log_type = "server_loop", "Server {} not found", id);
            return Ok(());
        };

        self.check_status(&server).await?;
        self.start_if_needed(&server).await?;
        self.save(&server).await
    }

    async fn check_status(&self, server: &Server) -> Result<(), ServerLoopError> {
        if !server.is_installed() {
            return Ok(());
        }

        let command = self.factory.load_server_command(CommandKind::Status);
        tokio::time::timeout(self.command_timeout, command.execute(server))
            .await
            .map_err(|_| ServerLoopError::Timeout("status check"))??;

        server.mark_status_checked(command.result() == SUCCESS_RESULT);
        Ok(())
    }

    async fn start_if_needed(&self, server: &Server) -> Result<(), ServerLoopError> {
        if !server.is_installed() || server.is_active() || !server.auto_start() {
            return Ok(());
        }

        info!(
            log_type = "server_loop",
            "Starting server {} (auto start)",
            server.id()
        );

        let command = self.factory.load_server_command(CommandKind::Start);
        tokio::time::timeout(self.command_timeout, command.execute(server))
            .await
            .map_err(|_| ServerLoopError::Timeout("server start"))??;

        self.check_status(server).await
    }

    async fn save(&self, server: &Server) -> Result<(), ServerLoopError> {
        if !server.is_installed() {
            return Ok(());
        }

        tokio::time::timeout(self.command_timeout, self.servers.save(server))
            .await
            .map_err(|_| ServerLoopError::Timeout("server save"))??;
        Ok(())
    }
}
