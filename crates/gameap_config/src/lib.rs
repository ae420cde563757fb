pub mod error;
pub mod models;
pub mod provider;

pub use error::ConfigError;
pub use models::daemon::{
    DEFAULT_CONNECTION_TIMEOUT_MS, DEFAULT_LISTEN_IP, DEFAULT_LISTEN_PORT, DaemonConfig,
};
pub use models::logging::LogLevel;
pub use models::node::NodeInitData;
pub use models::process_manager::{DEFAULT_PROCESS_MANAGER, ProcessManagerConfig, SteamConfig};
pub use models::scripts::Scripts;
pub use provider::{FileProvider, FileType};
