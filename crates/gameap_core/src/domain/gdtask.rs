use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::server::{InstallationStatus, Server};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GDTaskStatus {
    Waiting,
    Working,
    Error,
    Success,
    Canceled,
}

impl GDTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GDTaskStatus::Waiting => "waiting",
            GDTaskStatus::Working => "working",
            GDTaskStatus::Error => "error",
            GDTaskStatus::Success => "success",
            GDTaskStatus::Canceled => "canceled",
        }
    }

    /// Numeric form used by the panel API.
    pub fn num(&self) -> u8 {
        match self {
            GDTaskStatus::Waiting => 1,
            GDTaskStatus::Working => 2,
            GDTaskStatus::Error => 3,
            GDTaskStatus::Success => 4,
            GDTaskStatus::Canceled => 5,
        }
    }

    pub fn from_num(num: u64) -> Option<Self> {
        match num {
            1 => Some(GDTaskStatus::Waiting),
            2 => Some(GDTaskStatus::Working),
            3 => Some(GDTaskStatus::Error),
            4 => Some(GDTaskStatus::Success),
            5 => Some(GDTaskStatus::Canceled),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(GDTaskStatus::Waiting),
            "working" => Some(GDTaskStatus::Working),
            "error" => Some(GDTaskStatus::Error),
            "success" => Some(GDTaskStatus::Success),
            "canceled" => Some(GDTaskStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for GDTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GDTaskKind {
    Start,
    Pause,
    Stop,
    Kill,
    Restart,
    Install,
    Reinstall,
    Update,
    Delete,
    Move,
    CommandExecute,
}

impl GDTaskKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gsstart" => Some(GDTaskKind::Start),
            "gspause" => Some(GDTaskKind::Pause),
            "gsstop" => Some(GDTaskKind::Stop),
            "gskill" => Some(GDTaskKind::Kill),
            "gsrest" => Some(GDTaskKind::Restart),
            "gsinst" => Some(GDTaskKind::Install),
            "gsreinst" => Some(GDTaskKind::Reinstall),
            "gsupd" => Some(GDTaskKind::Update),
            "gsdel" => Some(GDTaskKind::Delete),
            "gsmove" => Some(GDTaskKind::Move),
            "cmdexec" => Some(GDTaskKind::CommandExecute),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GDTaskKind::Start => "gsstart",
            GDTaskKind::Pause => "gspause",
            GDTaskKind::Stop => "gsstop",
            GDTaskKind::Kill => "gskill",
            GDTaskKind::Restart => "gsrest",
            GDTaskKind::Install => "gsinst",
            GDTaskKind::Reinstall => "gsreinst",
            GDTaskKind::Update => "gsupd",
            GDTaskKind::Delete => "gsdel",
            GDTaskKind::Move => "gsmove",
            GDTaskKind::CommandExecute => "cmdexec",
        }
    }

    pub fn is_installation(&self) -> bool {
        matches!(
            self,
            GDTaskKind::Install | GDTaskKind::Update | GDTaskKind::Reinstall
        )
    }
}

impl fmt::Display for GDTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work dispatched by the panel.
#[derive(Debug)]
pub struct GDTask {
    id: u64,
    run_after_id: u64,
    server: Option<Arc<Server>>,
    kind: GDTaskKind,
    command: String,
    status: Mutex<GDTaskStatus>,
}

impl GDTask {
    pub fn new(
        id: u64,
        run_after_id: u64,
        server: Option<Arc<Server>>,
        kind: GDTaskKind,
        command: impl Into<String>,
        status: GDTaskStatus,
    ) -> Self {
        Self {
            id,
            run_after_id,
            server,
            kind,
            command: command.into(),
            status: Mutex::new(status),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn run_after_id(&self) -> u64 {
        self.run_after_id
    }

    pub fn server(&self) -> Option<&Arc<Server>> {
        self.server.as_ref()
    }

    pub fn kind(&self) -> GDTaskKind {
        self.kind
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn status(&self) -> GDTaskStatus {
        *self.status.lock()
    }

    /// Installation tasks carry their status over to the server's install status.
    pub fn set_status(&self, status: GDTaskStatus) {
        *self.status.lock() = status;

        if self.kind.is_installation()
            && let Some(server) = &self.server
        {
            match status {
                GDTaskStatus::Working => {
                    server.set_install_status(InstallationStatus::InstallInProgress)
                }
                GDTaskStatus::Success => server.set_install_status(InstallationStatus::Installed),
                GDTaskStatus::Error | GDTaskStatus::Waiting => {
                    server.set_install_status(InstallationStatus::NotInstalled)
                }
                GDTaskStatus::Canceled => {}
            }
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status() == GDTaskStatus::Waiting
    }

    pub fn is_working(&self) -> bool {
        self.status() == GDTaskStatus::Working
    }

    pub fn is_complete(&self) -> bool {
        matches!(
            self.status(),
            GDTaskStatus::Error | GDTaskStatus::Success | GDTaskStatus::Canceled
        )
    }
}
