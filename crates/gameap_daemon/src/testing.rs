//! Test doubles shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use gameap_config::DaemonConfig;
use gameap_core::{
    ApiError, ApiRequest, ApiRequestMaker, ApiResponse, CommandResult, Executor, ExecutorError,
    ExecutorOptions, InstallationStatus, OutputWriter, SUCCESS_RESULT, Server, ServerInfo,
    ServerState,
};

/// Recorded call: method, resolved URL with query, body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub body: String,
}

/// Answers requests from canned responses keyed by `"METHOD /path"`.
/// Unknown routes get a 404.
#[derive(Default)]
pub struct FakeApi {
    routes: Mutex<HashMap<String, VecDeque<ApiResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a response. The last one queued for a route is repeated.
    pub fn on(&self, route: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .entry(route.to_string())
            .or_default()
            .push_back(ApiResponse::new(status, body.as_bytes().to_vec()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, route: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| format!("{} {}", r.method, r.url) == route)
            .collect()
    }
}

#[async_trait]
impl ApiRequestMaker for FakeApi {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let path = request.resolved_url();
        let mut url = path.clone();
        if !request.query_params.is_empty() {
            let query: Vec<String> = request
                .query_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            url = format!("{}?{}", url, query.join("&"));
        }

        self.requests.lock().push(RecordedRequest {
            method: request.method.clone(),
            url,
            body: request
                .body
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default(),
        });

        let key = format!("{} {}", request.method, path);
        let mut routes = self.routes.lock();
        let response = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        Ok(response.unwrap_or_else(|| ApiResponse::new(404, b"{}".to_vec())))
    }
}

/// Records every command and answers from `(prefix, exit code, output)` rules.
/// The first matching rule wins; unmatched commands succeed silently.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<(String, CommandResult, String)>>,
    failing: Mutex<Vec<String>>,
    commands: Mutex<Vec<(String, ExecutorOptions)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, prefix: &str, code: CommandResult, output: &str) {
        self.rules
            .lock()
            .push((prefix.to_string(), code, output.to_string()));
    }

    /// Commands starting with `prefix` fail to spawn.
    pub fn fails(&self, prefix: &str) {
        self.failing.lock().push(prefix.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn options(&self) -> Vec<ExecutorOptions> {
        self.commands.lock().iter().map(|(_, o)| o.clone()).collect()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn exec_with_writer(
        &self,
        command: &str,
        out: &dyn OutputWriter,
        options: &ExecutorOptions,
    ) -> Result<CommandResult, ExecutorError> {
        self.commands
            .lock()
            .push((command.to_string(), options.clone()));

        if self
            .failing
            .lock()
            .iter()
            .any(|prefix| command.starts_with(prefix.as_str()))
        {
            return Err(ExecutorError::ExecutableNotFound(command.to_string()));
        }

        let rule = self
            .rules
            .lock()
            .iter()
            .find(|(prefix, _, _)| command.starts_with(prefix.as_str()))
            .map(|(_, code, output)| (*code, output.clone()));

        match rule {
            Some((code, output)) => {
                out.write_str(&output);
                Ok(code)
            }
            None => Ok(SUCCESS_RESULT),
        }
    }
}

/// Polls `condition` every few milliseconds for up to five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    condition()
}

pub fn config(work_path: &std::path::Path) -> DaemonConfig {
    DaemonConfig {
        node_id: 1,
        work_path: work_path.to_string_lossy().into_owned(),
        ..Default::default()
    }
}

pub fn installed_server(id: u64) -> Arc<Server> {
    Arc::new(Server::new(
        ServerInfo {
            id,
            enabled: true,
            uuid: format!("00000000-0000-4000-8000-{:012}", id),
            uuid_short: format!("{:08}", id),
            dir: format!("servers/{}", id),
            start_command: "./run.sh".to_string(),
            ..Default::default()
        },
        ServerState {
            install_status: InstallationStatus::Installed,
            ..Default::default()
        },
    ))
}
