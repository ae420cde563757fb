//! Logging setup.

mod tracing;

pub use self::tracing::{env_filter, init_subscriber};
