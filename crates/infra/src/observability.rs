//! Tracing subscriber setup
//!
//! The filter comes from `SESSIONGUARD_LOG` (standard `EnvFilter` syntax)
//! and defaults to `info`. `SESSIONGUARD_LOG_FORMAT=json` switches to JSON
//! lines.

use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "SESSIONGUARD_LOG";
pub const LOG_FORMAT_ENV: &str = "SESSIONGUARD_LOG_FORMAT";
const DEFAULT_FILTER: &str = "info";

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Format named by `SESSIONGUARD_LOG_FORMAT`; anything but `json` is
    /// pretty.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) if value.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber is already installed; the existing one
/// is kept.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().with_current_span(true).try_init().is_ok(),
    };
    if installed {
        tracing::debug!(?format, "Tracing initialised");
    }
    installed
}
