//! GameAP node daemon.
//!
//! Four services share one shutdown scope: the task manager drains panel
//! tasks, the servers loop keeps game servers alive, the scheduler runs
//! periodic server tasks and the wire server answers the panel over TLS.

pub mod api;
pub mod cli;
pub mod node;
pub mod repositories;
pub mod runner;
pub mod scheduler;
pub mod server;
pub mod servers_loop;
pub mod task_manager;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use cli::{Args, ShutdownController};
pub use runner::run;
