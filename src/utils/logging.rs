//! Logging initialization for devhost.
//!
//! Supports three formats:
//! - `pretty`: multi-line, human-readable
//! - `component`: `[timestamp] [LEVEL] target message {fields}`, compact and grep-friendly;
//!   use the [`log_component!`] macro to add a `component` field per subsystem
//! - `json`: structured JSON lines for log aggregators

use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::Result;

/// Install the global tracing subscriber from config.
///
/// `RUST_LOG` wins over `cfg.level`. When `cfg.file` is set, events are
/// appended there instead of stderr. Calling this twice keeps the first
/// subscriber.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let file = match &cfg.file {
        Some(path) => Some(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        ),
        None => None,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    // Each arm has its own subscriber type, so the writer is chosen per arm.
    let installed = match (cfg.format, file) {
        (LogFormat::Json, Some(file)) => builder.json().with_writer(Mutex::new(file)).try_init(),
        (LogFormat::Json, None) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Pretty, Some(file)) => {
            builder.pretty().with_writer(Mutex::new(file)).try_init()
        }
        (LogFormat::Pretty, None) => builder.pretty().with_writer(std::io::stderr).try_init(),
        (LogFormat::Component, Some(file)) => builder
            .compact()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        (LogFormat::Component, None) => builder.compact().with_writer(std::io::stderr).try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
    Ok(())
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`):
///
/// ```
/// # use devhost::log_component;
/// log_component!(info, "scheduler", "session settled");
/// log_component!(warn, "seed", "record skipped", index = 3u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            format: LogFormat::Json,
            level: "debug".to_string(),
            file: Some(dir.path().join("devhost.log").display().to_string()),
        };
        init_logging(&cfg).unwrap();
        assert!(dir.path().join("devhost.log").exists());
        // A second call is harmless.
        init_logging(&LoggingConfig::default()).unwrap();
    }

    #[test]
    fn test_init_logging_unwritable_file_is_error() {
        let cfg = LoggingConfig {
            file: Some("/nonexistent-dir/devhost.log".to_string()),
            ..LoggingConfig::default()
        };
        assert!(init_logging(&cfg).is_err());
    }

    #[test]
    fn test_log_component_macro_compiles() {
        crate::log_component!(info, "scheduler", "settled");
        crate::log_component!(debug, "probe", "polled", attempt = 2u32);
    }
}
