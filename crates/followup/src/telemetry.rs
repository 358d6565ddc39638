//! Process-wide tracing setup.
//!
//! Verbosity resolves in two layers: `RUST_LOG` when the operator sets it,
//! the configured log level otherwise. Output is compact single-line text
//! without ANSI escapes so journald and container log collectors stay
//! readable.

use crate::config::TelemetryConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("log directives '{directives}' do not parse")]
    BadDirectives {
        directives: String,
        source: ParseError,
    },
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(Box<dyn std::error::Error + Send + Sync>),
}

/// Install the global subscriber for this process.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => configured_filter(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::AlreadyInstalled)
}

fn configured_filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directives).map_err(|source| TelemetryError::BadDirectives {
        directives: directives.to_string(),
        source,
    })
}
