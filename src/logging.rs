//! Log sink setup for front-ends.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to whoever owns the process.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

const DEFAULT_LEVEL: &str = "warn";

fn filter(config: &LogConfig) -> EnvFilter {
    config
        .level
        .as_deref()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL))
}

/// Installs the global subscriber. Returns `false` if one was already set.
pub fn init_logging(config: &LogConfig) -> bool {
    let Some(path) = config.log_file.as_deref() else {
        return tracing_subscriber::fmt()
            .with_env_filter(filter(config))
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok();
    };

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter(config))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
            .is_ok(),
        Err(error) => {
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter(config))
                .with_writer(std::io::stderr)
                .try_init()
                .is_ok();
            tracing::warn!(path, %error, "could not open log file; logging to stderr");
            installed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{filter, init_logging};
    use crate::config::LogConfig;

    #[test]
    fn invalid_level_falls_back_to_default() {
        let config = LogConfig {
            log_file: None,
            level: Some("history=loudest".to_string()),
        };
        assert_eq!(filter(&config).to_string(), "warn");
    }

    #[test]
    fn second_install_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let config = LogConfig {
            log_file: Some(dir.path().join("history.log").display().to_string()),
            level: Some("debug".to_string()),
        };
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
