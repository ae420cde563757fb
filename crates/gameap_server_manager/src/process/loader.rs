use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use gameap_config::DaemonConfig;
use gameap_core::Executor;

use super::{ProcessManager, ProcessManagerError, Shawl, Simple, Systemd, Tmux, WinSw};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessManagerKind {
    Tmux,
    Systemd,
    Simple,
    WinSw,
    Shawl,
}

impl ProcessManagerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessManagerKind::Tmux => "tmux",
            ProcessManagerKind::Systemd => "systemd",
            ProcessManagerKind::Simple => "simple",
            ProcessManagerKind::WinSw => "winsw",
            ProcessManagerKind::Shawl => "shawl",
        }
    }

    /// Whether the backend can run on the current platform.
    pub fn is_supported(&self) -> bool {
        match self {
            ProcessManagerKind::Simple => true,
            ProcessManagerKind::Tmux => cfg!(unix),
            ProcessManagerKind::Systemd => cfg!(target_os = "linux"),
            ProcessManagerKind::WinSw | ProcessManagerKind::Shawl => cfg!(windows),
        }
    }
}

impl FromStr for ProcessManagerKind {
    type Err = ProcessManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tmux" => Ok(ProcessManagerKind::Tmux),
            "systemd" => Ok(ProcessManagerKind::Systemd),
            "simple" => Ok(ProcessManagerKind::Simple),
            "winsw" => Ok(ProcessManagerKind::WinSw),
            "shawl" => Ok(ProcessManagerKind::Shawl),
            other => Err(ProcessManagerError::UnknownProcessManager(other.to_string())),
        }
    }
}

impl fmt::Display for ProcessManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the process manager named in the config.
pub fn load(
    cfg: Arc<DaemonConfig>,
    executor: Arc<dyn Executor>,
    detailed_executor: Arc<dyn Executor>,
) -> Result<Arc<dyn ProcessManager>, ProcessManagerError> {
    let name = cfg.process_manager.name.as_str();
    let kind: ProcessManagerKind = name.parse()?;

    if !kind.is_supported() {
        return Err(ProcessManagerError::UnknownProcessManager(name.to_string()));
    }

    info!(log_type = "process_manager", "Using {} process manager", kind);

    let manager: Arc<dyn ProcessManager> = match kind {
        ProcessManagerKind::Tmux => Arc::new(Tmux::new(cfg, executor, detailed_executor)),
        ProcessManagerKind::Systemd => Arc::new(Systemd::new(cfg, executor, detailed_executor)),
        ProcessManagerKind::Simple => Arc::new(Simple::new(cfg, executor, detailed_executor)),
        ProcessManagerKind::WinSw => Arc::new(WinSw::new(cfg, executor, detailed_executor)),
        ProcessManagerKind::Shawl => Arc::new(Shawl::new(cfg, executor, detailed_executor)),
    };

    Ok(manager)
}
