use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use super::ini;
use crate::error::ConfigError;
use crate::models::daemon::DaemonConfig;

#[cfg(windows)]
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "C:\\gameap\\daemon\\gameap-daemon.yaml",
    "C:\\gameap\\daemon\\gameap-daemon.cfg",
];

#[cfg(not(windows))]
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/gameap-daemon/gameap-daemon.yaml",
    "/etc/gameap-daemon/gameap-daemon.cfg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Yaml,
    Ini,
}

impl FileType {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(FileType::Yaml),
            "cfg" | "ini" | "conf" => Some(FileType::Ini),
            _ => None,
        }
    }
}

pub struct FileProvider;

impl FileProvider {
    /// Loads the config from `path`, or from the first existing default location.
    #[instrument(name = "file_provider: try_load_config")]
    pub fn try_load_config(path: Option<&Path>) -> Result<DaemonConfig, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::find_default().ok_or(ConfigError::NotFound)?,
        };

        if !path.exists() {
            return Err(ConfigError::NotFound);
        }

        debug!(log_type = "config", "Loading configuration from {}", path.display());

        let content = fs::read_to_string(&path)
            .map_err(|e| ConfigError::invalid_file("failed to read config file", e))?;

        let file_type =
            FileType::from_path(&path).ok_or_else(|| ConfigError::UnsupportedFormat(path.clone()))?;

        let mut config = Self::parse(&content, file_type)?;

        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }

        config.validate()?;

        Ok(config)
    }

    pub fn parse(content: &str, file_type: FileType) -> Result<DaemonConfig, ConfigError> {
        match file_type {
            FileType::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ConfigError::invalid_file("failed to parse yaml config", e)),
            FileType::Ini => ini::parse(content),
        }
    }

    fn find_default() -> Option<PathBuf> {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const YAML: &str = r#"
ds_id: 1
api_host: "panel.local"
api_key: "key"
listen_port: 31800
daemon_login: "login"
daemon_password: "password"
password_authentication: true
certificate_chain_file: "certs/server.crt"
private_key_file: "certs/server.key"
work_path: "/srv/gameap"
log_level: "debug"
process_manager:
  name: "simple"
scripts:
  start: "./start.sh"
users:
  gameap: "base64:cGFzc3dvcmQ="
"#;

    #[test]
    fn loads_yaml_and_resolves_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("gameap-daemon.yaml");
        fs::write(&config_path, YAML).unwrap();

        let config = FileProvider::try_load_config(Some(&config_path)).unwrap();

        assert_eq!(config.node_id, 1);
        assert_eq!(config.listen_port, 31800);
        assert_eq!(config.listen_ip, "0.0.0.0");
        assert!(config.password_authentication);
        assert_eq!(config.process_manager.name, "simple");
        assert_eq!(config.scripts.start, "./start.sh");
        assert_eq!(config.users.get("gameap").unwrap(), "base64:cGFzc3dvcmQ=");
        assert_eq!(
            PathBuf::from(&config.certificate_chain_file),
            temp_dir.path().join("certs/server.crt")
        );
        assert_eq!(config.connection_timeout, 5000);
    }

    #[test]
    fn yaml_round_trips_recognized_fields() {
        let config = FileProvider::parse(YAML, FileType::Yaml).unwrap();
        let serialized = serde_yaml::to_string(&config).unwrap();
        let reparsed = FileProvider::parse(&serialized, FileType::Yaml).unwrap();

        assert_eq!(config, reparsed);
    }

    #[test]
    fn loads_ini_by_extension() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("gameap-daemon.cfg");
        fs::write(&config_path, "ds_id=3\napi_host=panel\napi_key=key\n").unwrap();

        let config = FileProvider::try_load_config(Some(&config_path)).unwrap();

        assert_eq!(config.node_id, 3);
        assert_eq!(config.api_host, "panel");
    }

    #[test]
    fn missing_or_invalid_files_fail() {
        let temp_dir = TempDir::new().unwrap();

        let missing = temp_dir.path().join("missing.yaml");
        assert!(matches!(
            FileProvider::try_load_config(Some(&missing)),
            Err(ConfigError::NotFound)
        ));

        let unsupported = temp_dir.path().join("config.toml");
        fs::write(&unsupported, "ds_id = 1").unwrap();
        assert!(matches!(
            FileProvider::try_load_config(Some(&unsupported)),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        let invalid = temp_dir.path().join("config.yaml");
        fs::write(&invalid, "ds_id: [not a number").unwrap();
        assert!(matches!(
            FileProvider::try_load_config(Some(&invalid)),
            Err(ConfigError::InvalidFile { .. })
        ));

        let incomplete = temp_dir.path().join("incomplete.yaml");
        fs::write(&incomplete, "ds_id: 1\n").unwrap();
        assert!(matches!(
            FileProvider::try_load_config(Some(&incomplete)),
            Err(ConfigError::EmptyApiHost)
        ));
    }
}
