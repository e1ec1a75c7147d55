//! Tracing and logging setup shared by every binary.

use serde::Deserialize;

/// Tracing subscriber initialization.
pub mod tracing;

pub use crate::tracing::init;

/// Output format of log lines.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line, human oriented.
    Pretty,
    /// Single-line text.
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}
