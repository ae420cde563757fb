use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(windows)]
pub const DEFAULT_PROCESS_MANAGER: &str = "winsw";
#[cfg(not(windows))]
pub const DEFAULT_PROCESS_MANAGER: &str = "tmux";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessManagerConfig {
    pub name: String,
    pub config: HashMap<String, String>,
}

impl Default for ProcessManagerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROCESS_MANAGER.to_string(),
            config: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SteamConfig {
    pub login: String,
    pub password: String,
}
