use serde::Deserialize;

use super::daemon::DaemonConfig;
use super::scripts::Scripts;

/// Node initialization data served by the panel.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeInitData {
    pub work_path: String,
    pub steamcmd_path: String,
    pub prefer_install_method: String,
    pub script_install: String,
    pub script_reinstall: String,
    pub script_update: String,
    pub script_start: String,
    pub script_pause: String,
    pub script_unpause: String,
    pub script_stop: String,
    pub script_kill: String,
    pub script_restart: String,
    pub script_status: String,
    pub script_get_console: String,
    pub script_send_command: String,
    pub script_delete: String,
}

impl NodeInitData {
    pub fn scripts(&self) -> Scripts {
        Scripts {
            install: self.script_install.clone(),
            reinstall: self.script_reinstall.clone(),
            update: self.script_update.clone(),
            start: self.script_start.clone(),
            pause: self.script_pause.clone(),
            unpause: self.script_unpause.clone(),
            stop: self.script_stop.clone(),
            kill: self.script_kill.clone(),
            restart: self.script_restart.clone(),
            status: self.script_status.clone(),
            get_console: self.script_get_console.clone(),
            send_command: self.script_send_command.clone(),
            delete: self.script_delete.clone(),
        }
    }

    /// Fills only the fields that are empty in `config`.
    pub fn apply_to(&self, config: &mut DaemonConfig) {
        if config.work_path.is_empty() {
            config.work_path = self.work_path.clone();
        }

        if config.steamcmd_path.is_empty() {
            config.steamcmd_path = self.steamcmd_path.clone();
        }

        if config.prefer_install_method.is_empty() {
            config.prefer_install_method = self.prefer_install_method.clone();
        }

        config.scripts.merge_missing(&self.scripts());
    }
}
