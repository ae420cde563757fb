//! Pseudo commands served in-process by the [`ExtendableExecutor`](crate::executor::ExtendableExecutor).

mod get_tool;
mod server_console;

pub use get_tool::GetTool;
pub use server_console::{SendServerCommand, ServerConsoleOutput};

pub const GET_TOOL: &str = "get-tool";
pub const SERVER_CONSOLE_OUTPUT: &str = "server-console-output";
pub const SERVER_COMMAND: &str = "server-command";
