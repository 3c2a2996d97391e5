//! Tracing subscriber installation.

use chronicle_types::BoxError;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Failure to install the global subscriber.
#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct LoggingError(#[source] BoxError);

/// Installs a global `tracing` subscriber configured by `config`.
///
/// An unparsable level falls back to `info`.
///
/// # Errors
///
/// Returns `LoggingError` if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    installed.map_err(LoggingError)?;

    tracing::debug!(level = %config.level, json = config.json, "logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error() {
        let config = LoggingConfig {
            level: "not a directive [".to_string(),
            json: false,
        };
        // Whichever test installs first wins; a second install always fails.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
