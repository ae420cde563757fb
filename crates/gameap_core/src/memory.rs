//! In-memory repositories. They keep everything the services write so tests can inspect it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{GDTask, GDTaskStatus, Server, ServerState, ServerTask};
use crate::repository::{
    GDTaskRepository, RepositoryError, ServerRepository, ServerTaskRepository,
};

#[derive(Debug, Default)]
pub struct InMemoryServerRepository {
    servers: Mutex<BTreeMap<u64, Arc<Server>>>,
    saved: Mutex<Vec<(u64, ServerState)>>,
}

impl InMemoryServerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(servers: impl IntoIterator<Item = Arc<Server>>) -> Self {
        let repository = Self::new();
        for server in servers {
            repository.insert(server);
        }
        repository
    }

    pub fn insert(&self, server: Arc<Server>) {
        self.servers.lock().insert(server.id(), server);
    }

    /// Every state passed to `save`, oldest first.
    pub fn saved(&self) -> Vec<(u64, ServerState)> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl ServerRepository for InMemoryServerRepository {
    async fn ids(&self) -> Result<Vec<u64>, RepositoryError> {
        Ok(self.servers.lock().keys().copied().collect())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Arc<Server>>, RepositoryError> {
        Ok(self.servers.lock().get(&id).cloned())
    }

    async fn save(&self, server: &Server) -> Result<(), RepositoryError> {
        self.saved.lock().push((server.id(), server.state()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGDTaskRepository {
    tasks: Mutex<BTreeMap<u64, Arc<GDTask>>>,
    statuses: Mutex<HashMap<u64, Vec<GDTaskStatus>>>,
    outputs: Mutex<HashMap<u64, Vec<u8>>>,
}

impl InMemoryGDTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: Arc<GDTask>) {
        self.tasks.lock().insert(task.id(), task);
    }

    pub fn task(&self, id: u64) -> Option<Arc<GDTask>> {
        self.tasks.lock().get(&id).cloned()
    }

    /// Statuses saved for the task, oldest first.
    pub fn saved_statuses(&self, id: u64) -> Vec<GDTaskStatus> {
        self.statuses.lock().get(&id).cloned().unwrap_or_default()
    }

    pub fn output(&self, id: u64) -> String {
        self.outputs
            .lock()
            .get(&id)
            .map(|o| String::from_utf8_lossy(o).into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GDTaskRepository for InMemoryGDTaskRepository {
    async fn find_by_status(
        &self,
        status: GDTaskStatus,
    ) -> Result<Vec<Arc<GDTask>>, RepositoryError> {
        Ok(self
            .tasks
            .lock()
            .values()
            .filter(|task| task.status() == status)
            .cloned()
            .collect())
    }

    async fn save(&self, task: &GDTask) -> Result<(), RepositoryError> {
        self.statuses
            .lock()
            .entry(task.id())
            .or_default()
            .push(task.status());
        Ok(())
    }

    async fn append_output(&self, task: &GDTask, output: &[u8]) -> Result<(), RepositoryError> {
        self.outputs
            .lock()
            .entry(task.id())
            .or_default()
            .extend_from_slice(output);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryServerTaskRepository {
    tasks: Mutex<Vec<ServerTask>>,
    saved: Mutex<Vec<ServerTask>>,
    failed: Mutex<Vec<(u64, Vec<u8>)>>,
}

impl InMemoryServerTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: ServerTask) {
        self.tasks.lock().push(task);
    }

    pub fn saved(&self) -> Vec<ServerTask> {
        self.saved.lock().clone()
    }

    pub fn failed(&self) -> Vec<(u64, Vec<u8>)> {
        self.failed.lock().clone()
    }
}

#[async_trait]
impl ServerTaskRepository for InMemoryServerTaskRepository {
    async fn find(&self) -> Result<Vec<ServerTask>, RepositoryError> {
        Ok(self.tasks.lock().clone())
    }

    /// Saved tasks also replace the stored copy, as the panel would.
    async fn save(&self, task: &ServerTask) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.lock();
        if let Some(stored) = tasks.iter_mut().find(|t| t.id == task.id) {
            *stored = task.clone();
        }
        self.saved.lock().push(task.clone());
        Ok(())
    }

    async fn fail(&self, task: &ServerTask, output: &[u8]) -> Result<(), RepositoryError> {
        self.failed.lock().push((task.id, output.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GDTaskKind, ServerInfo};

    #[tokio::test]
    async fn gdtask_repository_filters_by_status() {
        let repository = InMemoryGDTaskRepository::new();
        repository.insert(Arc::new(GDTask::new(
            1,
            0,
            None,
            GDTaskKind::CommandExecute,
            "echo",
            GDTaskStatus::Waiting,
        )));
        repository.insert(Arc::new(GDTask::new(
            2,
            0,
            None,
            GDTaskKind::CommandExecute,
            "echo",
            GDTaskStatus::Working,
        )));

        let working = repository
            .find_by_status(GDTaskStatus::Working)
            .await
            .unwrap();

        assert_eq!(working.len(), 1);
        assert_eq!(working[0].id(), 2);
    }

    #[tokio::test]
    async fn server_repository_records_saves() {
        let server = Arc::new(Server::new(
            ServerInfo {
                id: 5,
                ..Default::default()
            },
            ServerState::default(),
        ));
        let repository = InMemoryServerRepository::with_servers([server.clone()]);

        assert_eq!(repository.ids().await.unwrap(), vec![5]);
        assert!(repository.find_by_id(6).await.unwrap().is_none());

        server.mark_status_checked(true);
        repository.save(&server).await.unwrap();

        let saved = repository.saved();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].1.process_active);
    }
}
