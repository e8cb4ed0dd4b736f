//! Structured logging bootstrap for the binary.
//!
//! Logs go to stderr so they never interleave with assistant output on stdout.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "HELIX_LOG";
pub const LOG_FORMAT_ENV_VAR: &str = "HELIX_LOG_FORMAT";
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Filter from `HELIX_LOG`, or `warn` when unset or unparseable.
#[must_use]
pub fn env_filter(raw: Option<&str>) -> EnvFilter {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

pub fn init_logging() -> Result<(), TryInitError> {
    let filter = env_filter(std::env::var(LOG_ENV_VAR).ok().as_deref());
    let format = LogFormat::parse(std::env::var(LOG_FORMAT_ENV_VAR).ok().as_deref());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
}
