use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::logging::LogLevel;
use super::process_manager::{ProcessManagerConfig, SteamConfig};
use super::scripts::Scripts;
use crate::error::ConfigError;

pub const DEFAULT_LISTEN_IP: &str = "0.0.0.0";
pub const DEFAULT_LISTEN_PORT: u16 = 31717;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    #[serde(rename = "ds_id")]
    pub node_id: u64,

    pub listen_ip: String,
    pub listen_port: u16,

    pub api_host: String,
    pub api_key: String,

    pub daemon_login: String,
    pub daemon_password: String,
    pub password_authentication: bool,

    pub ca_certificate_file: String,
    pub certificate_chain_file: String,
    pub private_key_file: String,
    pub private_key_password: String,
    pub dh_file: String,

    pub log_level: String,
    pub output_log: String,

    pub work_path: String,
    pub tools_path: String,
    pub steamcmd_path: String,
    pub steam_config: SteamConfig,
    pub prefer_install_method: String,

    pub process_manager: ProcessManagerConfig,

    /// Rolling per-connection deadline of the wire server, in milliseconds.
    pub connection_timeout: u64,

    pub scripts: Scripts,

    /// Windows service credentials keyed by user name. Values may be `base64:` prefixed.
    pub users: HashMap<String, String>,
    pub use_network_service_user: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            listen_ip: DEFAULT_LISTEN_IP.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            api_host: String::new(),
            api_key: String::new(),
            daemon_login: String::new(),
            daemon_password: String::new(),
            password_authentication: false,
            ca_certificate_file: String::new(),
            certificate_chain_file: String::new(),
            private_key_file: String::new(),
            private_key_password: String::new(),
            dh_file: String::new(),
            log_level: "info".to_string(),
            output_log: String::new(),
            work_path: String::new(),
            tools_path: String::new(),
            steamcmd_path: String::new(),
            steam_config: SteamConfig::default(),
            prefer_install_method: String::new(),
            process_manager: ProcessManagerConfig::default(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT_MS,
            scripts: Scripts::default(),
            users: HashMap::new(),
            use_network_service_user: false,
        }
    }
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id == 0 {
            return Err(ConfigError::EmptyNodeId);
        }

        if self.api_host.is_empty() {
            return Err(ConfigError::EmptyApiHost);
        }

        if self.api_key.is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }

        Ok(())
    }

    pub fn work_path(&self) -> &Path {
        Path::new(&self.work_path)
    }

    pub fn tools_path(&self) -> PathBuf {
        if self.tools_path.is_empty() {
            self.work_path().join("tools")
        } else {
            PathBuf::from(&self.tools_path)
        }
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::parse(&self.log_level)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_ip, self.listen_port)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout.max(1))
    }

    /// Base URL of the panel API, with a scheme and without a trailing slash.
    pub fn api_base_url(&self) -> String {
        let host = self.api_host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        }
    }

    /// Certificate paths in the config are relative to the config file's directory.
    pub fn resolve_relative_paths(&mut self, base: &Path) {
        for path in [
            &mut self.ca_certificate_file,
            &mut self.certificate_chain_file,
            &mut self.private_key_file,
            &mut self.dh_file,
        ] {
            if !path.is_empty() && Path::new(path.as_str()).is_relative() {
                *path = base.join(path.as_str()).to_string_lossy().into_owned();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_node_api_host_and_key() {
        let mut config = DaemonConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyNodeId)));

        config.node_id = 1;
        assert!(matches!(config.validate(), Err(ConfigError::EmptyApiHost)));

        config.api_host = "panel.local".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyApiKey)));

        config.api_key = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tools_path_defaults_under_work_path() {
        let config = DaemonConfig {
            work_path: "/srv/gameap".to_string(),
            ..Default::default()
        };
        assert_eq!(config.tools_path(), PathBuf::from("/srv/gameap/tools"));

        let config = DaemonConfig {
            work_path: "/srv/gameap".to_string(),
            tools_path: "/opt/tools".to_string(),
            ..Default::default()
        };
        assert_eq!(config.tools_path(), PathBuf::from("/opt/tools"));
    }

    #[test]
    fn api_base_url_gets_scheme() {
        let mut config = DaemonConfig {
            api_host: "panel.local/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.api_base_url(), "http://panel.local");

        config.api_host = "https://panel.local".to_string();
        assert_eq!(config.api_base_url(), "https://panel.local");
    }

    #[test]
    fn relative_certificates_resolve_against_base() {
        let mut config = DaemonConfig {
            certificate_chain_file: "certs/server.crt".to_string(),
            private_key_file: "/abs/server.key".to_string(),
            ..Default::default()
        };

        config.resolve_relative_paths(Path::new("/etc/gameap-daemon"));

        assert_eq!(
            config.certificate_chain_file,
            "/etc/gameap-daemon/certs/server.crt"
        );
        assert_eq!(config.private_key_file, "/abs/server.key");
        assert!(config.ca_certificate_file.is_empty());
    }
}
