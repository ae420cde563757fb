use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use gameap_config::DaemonConfig;

use super::game::{Game, GameMod};

const AUTOSTART_SETTING: &str = "autostart";
const AUTOSTART_CURRENT_SETTING: &str = "autostart_current";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallationStatus {
    #[default]
    NotInstalled,
    Installed,
    InstallInProgress,
}

impl InstallationStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => InstallationStatus::Installed,
            2 => InstallationStatus::InstallInProgress,
            _ => InstallationStatus::NotInstalled,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            InstallationStatus::NotInstalled => 0,
            InstallationStatus::Installed => 1,
            InstallationStatus::InstallInProgress => 2,
        }
    }
}

/// Static description of a game server as received from the panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub id: u64,
    pub enabled: bool,
    pub blocked: bool,

    pub name: String,
    pub uuid: String,
    pub uuid_short: String,

    pub game: Game,
    pub game_mod: GameMod,

    pub ip: String,
    pub connect_port: u16,
    pub query_port: u16,
    pub rcon_port: u16,
    pub rcon_password: String,

    /// Relative to the node work path.
    pub dir: String,
    pub user: String,

    pub start_command: String,
    pub stop_command: String,
    pub force_stop_command: String,
    pub restart_command: String,

    pub vars: HashMap<String, String>,
    pub settings: HashMap<String, String>,

    pub updated_at: Option<DateTime<Utc>>,
}

/// Runtime state the daemon reports back to the panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerState {
    pub install_status: InstallationStatus,
    pub process_active: bool,
    pub last_process_check: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Server {
    info: ServerInfo,
    state: RwLock<ServerState>,
}

impl Server {
    /// Game mod variable defaults are merged under the server's own vars.
    pub fn new(mut info: ServerInfo, state: ServerState) -> Self {
        for var in &info.game_mod.vars {
            if !info.vars.contains_key(&var.key) {
                info.vars.insert(var.key.clone(), var.default_value.clone());
            }
        }

        Self {
            info,
            state: RwLock::new(state),
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn id(&self) -> u64 {
        self.info.id
    }

    pub fn uuid(&self) -> &str {
        &self.info.uuid
    }

    pub fn uuid_short(&self) -> &str {
        &self.info.uuid_short
    }

    pub fn user(&self) -> &str {
        &self.info.user
    }

    pub fn game(&self) -> &Game {
        &self.info.game
    }

    pub fn game_mod(&self) -> &GameMod {
        &self.info.game_mod
    }

    pub fn start_command(&self) -> &str {
        &self.info.start_command
    }

    pub fn stop_command(&self) -> &str {
        &self.info.stop_command
    }

    pub fn restart_command(&self) -> &str {
        &self.info.restart_command
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.info.vars
    }

    pub fn work_dir(&self, cfg: &DaemonConfig) -> PathBuf {
        cfg.work_path().join(&self.info.dir)
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.info.settings.get(key).map(String::as_str)
    }

    pub fn auto_start(&self) -> bool {
        let value = self
            .setting(AUTOSTART_CURRENT_SETTING)
            .filter(|v| !v.is_empty())
            .or_else(|| self.setting(AUTOSTART_SETTING));

        matches!(value, Some("1") | Some("true"))
    }

    pub fn state(&self) -> ServerState {
        self.state.read().clone()
    }

    pub fn install_status(&self) -> InstallationStatus {
        self.state.read().install_status
    }

    pub fn is_installed(&self) -> bool {
        self.install_status() == InstallationStatus::Installed
    }

    pub fn set_install_status(&self, status: InstallationStatus) {
        self.state.write().install_status = status;
    }

    pub fn is_active(&self) -> bool {
        self.state.read().process_active
    }

    pub fn last_process_check(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_process_check
    }

    /// Records the outcome of a status probe.
    pub fn mark_status_checked(&self, active: bool) {
        let mut state = self.state.write();
        state.process_active = active;
        state.last_process_check = Some(Utc::now());
    }
}
