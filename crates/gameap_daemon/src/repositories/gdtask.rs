use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use gameap_core::{
    ApiRequest, ApiRequestMaker, GDTask, GDTaskKind, GDTaskRepository, GDTaskStatus,
    RepositoryError, ServerRepository,
};

#[derive(Debug, Deserialize)]
struct TaskPayload {
    id: u64,
    #[serde(default)]
    run_after_id: Option<u64>,
    #[serde(default)]
    server_id: Option<u64>,
    task: String,
    #[serde(default)]
    cmd: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_num: Option<u64>,
}

impl TaskPayload {
    fn status(&self) -> Option<GDTaskStatus> {
        self.status
            .as_deref()
            .and_then(GDTaskStatus::parse)
            .or_else(|| self.status_num.and_then(GDTaskStatus::from_num))
    }
}

#[derive(Serialize)]
struct StatusPayload {
    status: u8,
}

#[derive(Serialize)]
struct OutputPayload<'a> {
    output: &'a str,
}

/// Daemon tasks of this node, joined with their servers.
pub struct ApiGDTaskRepository {
    client: Arc<dyn ApiRequestMaker>,
    servers: Arc<dyn ServerRepository>,
}

impl ApiGDTaskRepository {
    pub fn new(client: Arc<dyn ApiRequestMaker>, servers: Arc<dyn ServerRepository>) -> Self {
        Self { client, servers }
    }
}

#[async_trait]
impl GDTaskRepository for ApiGDTaskRepository {
    async fn find_by_status(
        &self,
        status: GDTaskStatus,
    ) -> Result<Vec<Arc<GDTask>>, RepositoryError> {
        let response = self
            .client
            .request(
                ApiRequest::get("/gdaemon_api/tasks")
                    .with_query("filter[status]", status.as_str())
                    .with_query("append", "status_num"),
            )
            .await?;

        if response.status != 200 {
            return Err(response.invalid().into());
        }

        let items: Vec<TaskPayload> = response.json()?;
        let mut tasks = Vec::with_capacity(items.len());

        for item in items {
            let Some(kind) = GDTaskKind::parse(&item.task) else {
                warn!(
                    log_type = "task_manager",
                    task_id = item.id,
                    "Skipping task with unknown kind {}",
                    item.task
                );
                continue;
            };

            let server = match item.server_id.filter(|id| *id > 0) {
                Some(server_id) => match self.servers.find_by_id(server_id).await? {
                    Some(server) => Some(server),
                    None => {
                        warn!(
                            log_type = "task_manager",
                            task_id = item.id,
                            server_id,
                            "Invalid task, game server not found"
                        );
                        continue;
                    }
                },
                None => None,
            };

            if server.is_none() && kind != GDTaskKind::CommandExecute {
                warn!(
                    log_type = "task_manager",
                    task_id = item.id,
                    "Skipping {} task without a game server",
                    kind
                );
                continue;
            }

            let task_status = item.status().unwrap_or(status);

            tasks.push(Arc::new(GDTask::new(
                item.id,
                item.run_after_id.unwrap_or_default(),
                server,
                kind,
                item.cmd.unwrap_or_default(),
                task_status,
            )));
        }

        Ok(tasks)
    }

    async fn save(&self, task: &GDTask) -> Result<(), RepositoryError> {
        let response = self
            .client
            .request(
                ApiRequest::put("/gdaemon_api/tasks/{id}")
                    .with_path_param("id", task.id())
                    .with_json(&StatusPayload {
                        status: task.status().num(),
                    })?,
            )
            .await?;

        if response.status != 200 && response.status != 204 {
            return Err(response.invalid().into());
        }

        if let Some(server) = task.server() {
            self.servers.save(server).await?;
        }

        Ok(())
    }

    async fn append_output(&self, task: &GDTask, output: &[u8]) -> Result<(), RepositoryError> {
        let output = String::from_utf8_lossy(output);

        let response = self
            .client
            .request(
                ApiRequest::put("/gdaemon_api/tasks/{id}/output")
                    .with_path_param("id", task.id())
                    .with_json(&OutputPayload { output: &output })?,
            )
            .await?;

        if response.status != 200 && response.status != 204 {
            return Err(response.invalid().into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApi, installed_server};
    use gameap_core::InstallationStatus;
    use gameap_core::memory::InMemoryServerRepository;

    #[tokio::test]
    async fn tasks_are_joined_with_servers() {
        let api = FakeApi::new();
        api.on(
            "GET /gdaemon_api/tasks",
            200,
            r#"[
                {"id": 10, "run_after_id": null, "server_id": 1, "task": "gsinst", "cmd": null, "status": "waiting", "status_num": 1},
                {"id": 11, "run_after_id": 10, "server_id": 1, "task": "gsstart", "status": "waiting"},
                {"id": 12, "server_id": 99, "task": "gsstart", "status": "waiting"},
                {"id": 13, "server_id": null, "task": "cmdexec", "cmd": "uptime", "status": "waiting"},
                {"id": 14, "server_id": 1, "task": "gsfly", "status": "waiting"}
            ]"#,
        );
        let servers = Arc::new(InMemoryServerRepository::with_servers([installed_server(1)]));
        let repository = ApiGDTaskRepository::new(api.clone(), servers);

        let tasks = repository
            .find_by_status(GDTaskStatus::Waiting)
            .await
            .unwrap();

        let ids: Vec<u64> = tasks.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![10, 11, 13]);
        assert_eq!(tasks[0].kind(), GDTaskKind::Install);
        assert_eq!(tasks[1].run_after_id(), 10);
        assert_eq!(tasks[2].command(), "uptime");
        assert!(tasks[2].server().is_none());

        assert_eq!(
            api.requests()[0].url,
            "/gdaemon_api/tasks?filter[status]=waiting&append=status_num"
        );
    }

    #[tokio::test]
    async fn save_puts_status_and_saves_server() {
        let api = FakeApi::new();
        api.on("PUT /gdaemon_api/tasks/10", 200, "{}");
        api.on("PUT /gdaemon_api/tasks/10/output", 200, "{}");
        let server = installed_server(1);
        let servers = Arc::new(InMemoryServerRepository::with_servers([server.clone()]));
        let repository = ApiGDTaskRepository::new(api.clone(), servers.clone());

        let task = GDTask::new(
            10,
            0,
            Some(server),
            GDTaskKind::Install,
            "",
            GDTaskStatus::Waiting,
        );
        task.set_status(GDTaskStatus::Working);

        repository.save(&task).await.unwrap();
        repository.append_output(&task, b"Installing\n").await.unwrap();

        let requests = api.requests();
        assert_eq!(requests[0].body, r#"{"status":2}"#);
        assert_eq!(requests[1].url, "/gdaemon_api/tasks/10/output");
        assert_eq!(requests[1].body, r#"{"output":"Installing\n"}"#);

        let saved = servers.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1.install_status, InstallationStatus::InstallInProgress);
    }

    #[tokio::test]
    async fn no_content_responses_are_accepted() {
        let api = FakeApi::new();
        api.on("PUT /gdaemon_api/tasks/7", 204, "");
        api.on("PUT /gdaemon_api/tasks/7/output", 204, "");
        let repository =
            ApiGDTaskRepository::new(api.clone(), Arc::new(InMemoryServerRepository::new()));

        let task = GDTask::new(7, 0, None, GDTaskKind::CommandExecute, "ls", GDTaskStatus::Success);

        repository.save(&task).await.unwrap();
        repository.append_output(&task, b"done\n").await.unwrap();
        assert_eq!(api.requests().len(), 2);
    }

    #[tokio::test]
    async fn failed_save_reports_api_response() {
        let api = FakeApi::new();
        api.on("PUT /gdaemon_api/tasks/5", 422, r#"{"message":"invalid"}"#);
        let repository =
            ApiGDTaskRepository::new(api, Arc::new(InMemoryServerRepository::new()));

        let task = GDTask::new(5, 0, None, GDTaskKind::CommandExecute, "ls", GDTaskStatus::Error);
        let err = repository.save(&task).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            r#"invalid response from api server: (422) {"message":"invalid"}"#
        );
    }
}
