use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use gameap_core::{
    ApiRequest, ApiRequestMaker, Game, GameMod, InstallationStatus, RepositoryError, Server,
    ServerInfo, ServerRepository, ServerState,
};

use super::PANEL_DATE_FORMAT;

pub const SERVER_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize)]
struct ServerId {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ServerSetting {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: JsonValue,
}

#[derive(Debug, Deserialize)]
struct ServerPayload {
    id: u64,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    install_status: i64,
    #[serde(default)]
    blocked: bool,

    #[serde(default)]
    name: String,
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    uuid_short: String,

    #[serde(default)]
    game: Game,
    #[serde(default)]
    game_mod: GameMod,

    #[serde(default)]
    server_ip: String,
    #[serde(default)]
    server_port: u16,
    #[serde(default)]
    query_port: Option<u16>,
    #[serde(default)]
    rcon_port: Option<u16>,
    #[serde(default)]
    rcon: Option<String>,

    #[serde(default)]
    dir: String,
    #[serde(default)]
    su_user: Option<String>,

    #[serde(default)]
    start_command: Option<String>,
    #[serde(default)]
    stop_command: Option<String>,
    #[serde(default)]
    force_stop_command: Option<String>,
    #[serde(default)]
    restart_command: Option<String>,

    #[serde(default)]
    process_active: bool,
    #[serde(default)]
    last_process_check: Option<String>,

    #[serde(default)]
    vars: Option<HashMap<String, JsonValue>>,
    #[serde(default)]
    settings: Option<Vec<ServerSetting>>,

    #[serde(default)]
    updated_at: Option<String>,
}

impl ServerPayload {
    fn into_server(self) -> Result<Server, RepositoryError> {
        let last_process_check = match self.last_process_check.as_deref() {
            None | Some("") => None,
            Some(value) => Some(
                NaiveDateTime::parse_from_str(value, PANEL_DATE_FORMAT)
                    .map_err(|_| RepositoryError::InvalidValue {
                        field: "last_process_check",
                        value: value.to_string(),
                    })?
                    .and_utc(),
            ),
        };

        let updated_at = self
            .updated_at
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc));

        let vars = self
            .vars
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| json_to_string(&v).map(|v| (k, v)))
            .collect();

        let settings = self
            .settings
            .unwrap_or_default()
            .into_iter()
            .filter(|s| !s.name.is_empty())
            .filter_map(|s| json_to_string(&s.value).map(|v| (s.name, v)))
            .collect();

        let info = ServerInfo {
            id: self.id,
            enabled: self.enabled,
            blocked: self.blocked,
            name: self.name,
            uuid: self.uuid,
            uuid_short: self.uuid_short,
            game: self.game,
            game_mod: self.game_mod,
            ip: self.server_ip,
            connect_port: self.server_port,
            query_port: self.query_port.unwrap_or_default(),
            rcon_port: self.rcon_port.unwrap_or_default(),
            rcon_password: self.rcon.unwrap_or_default(),
            dir: self.dir,
            user: self.su_user.unwrap_or_default(),
            start_command: self.start_command.unwrap_or_default(),
            stop_command: self.stop_command.unwrap_or_default(),
            force_stop_command: self.force_stop_command.unwrap_or_default(),
            restart_command: self.restart_command.unwrap_or_default(),
            vars,
            settings,
            updated_at,
        };

        let state = ServerState {
            install_status: InstallationStatus::from_code(self.install_status),
            process_active: self.process_active,
            last_process_check,
        };

        Ok(Server::new(info, state))
    }
}

fn json_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct ServerSavePayload {
    installed: u8,
    process_active: bool,
    last_process_check: Option<String>,
}

struct CachedServer {
    server: Arc<Server>,
    loaded_at: Instant,
}

/// Servers known to the panel, cached per id for [`SERVER_CACHE_TTL`].
pub struct ApiServerRepository {
    client: Arc<dyn ApiRequestMaker>,
    cache: DashMap<u64, CachedServer>,
    ttl: Duration,
}

impl ApiServerRepository {
    pub fn new(client: Arc<dyn ApiRequestMaker>) -> Self {
        Self::with_ttl(client, SERVER_CACHE_TTL)
    }

    pub fn with_ttl(client: Arc<dyn ApiRequestMaker>, ttl: Duration) -> Self {
        Self {
            client,
            cache: DashMap::new(),
            ttl,
        }
    }

    async fn fetch(&self, id: u64) -> Result<Option<Arc<Server>>, RepositoryError> {
        let response = self
            .client
            .request(ApiRequest::get("/gdaemon_api/servers/{id}").with_path_param("id", id))
            .await?;

        if response.status == 404 {
            return Ok(None);
        }

        if response.status != 200 && response.status != 204 {
            return Err(response.invalid().into());
        }

        let payload: ServerPayload = response.json()?;
        let server = Arc::new(payload.into_server()?);

        debug!(log_type = "api_client", "Loaded server {} from API", id);

        Ok(Some(server))
    }
}

#[async_trait]
impl ServerRepository for ApiServerRepository {
    async fn ids(&self) -> Result<Vec<u64>, RepositoryError> {
        let response = self
            .client
            .request(ApiRequest::get("/gdaemon_api/servers"))
            .await?;

        if response.status != 200 {
            return Err(response.invalid().into());
        }

        let items: Vec<ServerId> = response.json()?;

        Ok(items.into_iter().map(|s| s.id).collect())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Arc<Server>>, RepositoryError> {
        if let Some(cached) = self.cache.get(&id)
            && cached.loaded_at.elapsed() < self.ttl
        {
            return Ok(Some(cached.server.clone()));
        }

        match self.fetch(id).await? {
            Some(server) => {
                self.cache.insert(
                    id,
                    CachedServer {
                        server: server.clone(),
                        loaded_at: Instant::now(),
                    },
                );
                Ok(Some(server))
            }
            None => {
                self.cache.remove(&id);
                Ok(None)
            }
        }
    }

    async fn save(&self, server: &Server) -> Result<(), RepositoryError> {
        let state = server.state();
        let payload = ServerSavePayload {
            installed: state.install_status.code(),
            process_active: state.process_active,
            last_process_check: state
                .last_process_check
                .map(|t| t.format(PANEL_DATE_FORMAT).to_string()),
        };

        let response = self
            .client
            .request(
                ApiRequest::put("/gdaemon_api/servers/{id}")
                    .with_path_param("id", server.id())
                    .with_json(&payload)?,
            )
            .await?;

        if response.status != 200 && response.status != 204 {
            return Err(response.invalid().into());
        }

        Ok(())
    }
}
