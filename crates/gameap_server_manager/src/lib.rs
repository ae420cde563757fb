pub mod commands;
pub mod download;
pub mod executor;
pub mod handlers;
pub mod installer;
pub mod process;
pub mod users;

#[cfg(test)]
mod testing;

pub use commands::{CommandError, CommandKind, ServerCommand, ServerCommandFactory};
pub use download::{DownloadError, Downloader};
pub use executor::{CommandHandler, DefaultExecutor, DetailedExecutor, ExtendableExecutor};
pub use installer::{InstallError, InstallMode, Installer};
pub use process::{ProcessManager, ProcessManagerError, ProcessManagerKind};
