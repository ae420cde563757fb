use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use gameap_core::{
    ApiRequest, ApiRequestMaker, RepositoryError, ServerRepository, ServerTask, ServerTaskCommand,
    ServerTaskRepository,
};

use super::PANEL_DATE_FORMAT;

#[derive(Debug, Deserialize)]
struct ServerTaskPayload {
    id: u64,
    command: String,
    server_id: u64,
    #[serde(default)]
    repeat: u32,
    /// Seconds.
    #[serde(default)]
    repeat_period: u64,
    #[serde(default)]
    counter: u32,
    execute_date: String,
}

#[derive(Debug, Serialize)]
struct ServerTaskSavePayload {
    repeat: u32,
    repeat_period: u64,
    counter: u32,
    execute_date: String,
}

impl From<&ServerTask> for ServerTaskSavePayload {
    fn from(task: &ServerTask) -> Self {
        Self {
            repeat: task.repeat,
            repeat_period: task.repeat_period.as_secs(),
            counter: task.counter,
            execute_date: task.execute_date.format(PANEL_DATE_FORMAT).to_string(),
        }
    }
}

#[derive(Serialize)]
struct FailPayload<'a> {
    output: &'a str,
}

/// Scheduled server tasks of this node.
pub struct ApiServerTaskRepository {
    client: Arc<dyn ApiRequestMaker>,
    servers: Arc<dyn ServerRepository>,
}

impl ApiServerTaskRepository {
    pub fn new(client: Arc<dyn ApiRequestMaker>, servers: Arc<dyn ServerRepository>) -> Self {
        Self { client, servers }
    }
}

#[async_trait]
impl ServerTaskRepository for ApiServerTaskRepository {
    async fn find(&self) -> Result<Vec<ServerTask>, RepositoryError> {
        let response = self
            .client
            .request(ApiRequest::get("/gdaemon_api/servers_tasks"))
            .await?;

        if response.status != 200 {
            return Err(response.invalid().into());
        }

        let items: Vec<ServerTaskPayload> = response.json()?;
        let mut tasks = Vec::with_capacity(items.len());

        for item in items {
            let Some(command) = ServerTaskCommand::parse(&item.command) else {
                warn!(
                    log_type = "scheduler",
                    task_id = item.id,
                    "Skipping server task with unknown command {}",
                    item.command
                );
                continue;
            };

            let server = self
                .servers
                .find_by_id(item.server_id)
                .await?
                .ok_or(RepositoryError::InvalidServerId(item.server_id))?;

            let execute_date = NaiveDateTime::parse_from_str(&item.execute_date, PANEL_DATE_FORMAT)
                .map_err(|_| RepositoryError::InvalidValue {
                    field: "execute_date",
                    value: item.execute_date.clone(),
                })?
                .and_utc();

            tasks.push(ServerTask {
                id: item.id,
                command,
                server,
                repeat: item.repeat,
                repeat_period: Duration::from_secs(item.repeat_period),
                counter: item.counter,
                execute_date,
            });
        }

        Ok(tasks)
    }

    async fn save(&self, task: &ServerTask) -> Result<(), RepositoryError> {
        let response = self
            .client
            .request(
                ApiRequest::put("/gdaemon_api/servers_tasks/{id}")
                    .with_path_param("id", task.id)
                    .with_json(&ServerTaskSavePayload::from(task))?,
            )
            .await?;

        if response.status != 200 {
            return Err(response.invalid().into());
        }

        Ok(())
    }

    async fn fail(&self, task: &ServerTask, output: &[u8]) -> Result<(), RepositoryError> {
        let output = String::from_utf8_lossy(output);

        let response = self
            .client
            .request(
                ApiRequest::post("/gdaemon_api/servers_tasks/{id}/fail")
                    .with_path_param("id", task.id)
                    .with_json(&FailPayload { output: &output })?,
            )
            .await?;

        if response.status != 200 && response.status != 201 {
            return Err(response.invalid().into());
        }

        Ok(())
    }
}
