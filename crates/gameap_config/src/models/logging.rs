use serde::{Deserialize, Serialize};

/// Verbosity parsed from the first letter of `log_level`
/// (`T`race, `V`erbose, `D`ebug, `I`nfo, `W`arning, `E`rror, `F`atal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(value: &str) -> Self {
        match value.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('T') | Some('V') => LogLevel::Trace,
            Some('D') => LogLevel::Debug,
            Some('W') => LogLevel::Warn,
            Some('E') | Some('F') => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    /// Directive usable by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
