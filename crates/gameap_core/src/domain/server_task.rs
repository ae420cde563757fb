use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::server::Server;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerTaskCommand {
    Start,
    Stop,
    Restart,
    Update,
    Reinstall,
}

impl ServerTaskCommand {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(ServerTaskCommand::Start),
            "stop" => Some(ServerTaskCommand::Stop),
            "restart" => Some(ServerTaskCommand::Restart),
            "update" => Some(ServerTaskCommand::Update),
            "reinstall" => Some(ServerTaskCommand::Reinstall),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerTaskCommand::Start => "start",
            ServerTaskCommand::Stop => "stop",
            ServerTaskCommand::Restart => "restart",
            ServerTaskCommand::Update => "update",
            ServerTaskCommand::Reinstall => "reinstall",
        }
    }
}

impl fmt::Display for ServerTaskCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time triggered action on one server.
#[derive(Debug, Clone)]
pub struct ServerTask {
    pub id: u64,
    pub command: ServerTaskCommand,
    pub server: Arc<Server>,
    /// Total runs wanted, 0 means unlimited.
    pub repeat: u32,
    pub repeat_period: Duration,
    pub counter: u32,
    pub execute_date: DateTime<Utc>,
}

impl ServerTask {
    pub fn can_execute(&self) -> bool {
        self.repeat == 0 || self.counter < self.repeat
    }

    /// Counts one run and moves the next run one period ahead.
    pub fn prolong(&mut self) {
        self.counter += 1;
        self.execute_date += chrono::Duration::from_std(self.repeat_period)
            .unwrap_or_else(|_| chrono::Duration::zero());
    }
}
