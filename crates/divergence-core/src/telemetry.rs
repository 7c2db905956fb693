//! Tracing subscriber setup

use crate::config::EngineConfig;
use crate::error::EngineError;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured filter
pub const LOG_ENV: &str = "DIVERGENCE_LOG";

/// Install a global `fmt` subscriber
///
/// `DIVERGENCE_LOG` wins over `config.log_filter` when set.
///
/// # Errors
/// - `EngineError::Config` if the filter does not parse or a subscriber is already installed
pub fn init_tracing(config: &EngineConfig) -> Result<(), EngineError> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive),
        Err(_) => EnvFilter::try_new(&config.log_filter),
    }
    .map_err(|e| EngineError::Config(format!("log filter: {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Config(format!("tracing: {e}")))
}
