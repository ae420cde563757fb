//! Process managers supervise one game server process each.
//!
//! Every backend implements [`ProcessManager`]. The [`load`] function picks
//! one by the configured name.

mod error;
mod loader;
mod service;
mod shawl;
mod simple;
mod systemd;
mod tmux;
mod winsw;

use async_trait::async_trait;

use gameap_core::{CommandResult, OutputWriter, Server};

pub use error::ProcessManagerError;
pub use loader::{ProcessManagerKind, load};
pub use shawl::Shawl;
pub use simple::Simple;
pub use systemd::Systemd;
pub use tmux::Tmux;
pub use winsw::WinSw;

/// Supervises a game server process through one backend.
///
/// Results follow the exit code convention: `SUCCESS_RESULT` means the
/// operation succeeded (or, for `status`, that the process is running).
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn install(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError>;

    async fn uninstall(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError>;

    async fn start(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError>;

    async fn stop(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError>;

    async fn restart(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError>;

    async fn status(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError>;

    async fn get_output(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError>;

    async fn send_input(
        &self,
        input: &str,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError>;
}

/// Node scripts left empty run the server's own command.
pub(crate) fn template_or_command(template: &str) -> &str {
    if template.is_empty() {
        "{command}"
    } else {
        template
    }
}
