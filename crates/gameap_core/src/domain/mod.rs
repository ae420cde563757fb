mod game;
mod gdtask;
mod server;
mod server_task;
mod template;

pub use game::{Game, GameMod, GameModVar};
pub use gdtask::{GDTask, GDTaskKind, GDTaskStatus};
pub use server::{InstallationStatus, Server, ServerInfo, ServerState};
pub use server_task::{ServerTask, ServerTaskCommand};
pub use template::{make_full_command, replace_short_codes};

/// Exit-code style outcome of a command.
pub type CommandResult = i32;

pub const SUCCESS_RESULT: CommandResult = 0;
pub const ERROR_RESULT: CommandResult = 1;
/// The process never ran.
pub const UNKNOWN_RESULT: CommandResult = -1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GDTaskStats {
    pub working_count: usize,
    pub waiting_count: usize,
}

pub trait StatsReader: Send + Sync {
    fn stats(&self) -> GDTaskStats;
}
