//! Panel API backed repositories.

mod gdtask;
mod server;
mod server_task;

pub use gdtask::ApiGDTaskRepository;
pub use server::{ApiServerRepository, SERVER_CACHE_TTL};
pub use server_task::ApiServerTaskRepository;

/// Date format used by the panel for plain timestamps.
pub(crate) const PANEL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
