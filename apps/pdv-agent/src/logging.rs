//! # Logging Setup
//!
//! The `logging` config domain:
//!
//! ```json
//! { "level": "info", "filter": null, "format": "pretty", "directory": "logs", "file_prefix": "pdv-agent" }
//! ```
//!
//! ```text
//!   filter directives:  RUST_LOG  ──►  logging.filter  ──►  logging.level  ──►  default
//!   console:            pretty | json
//!   file (optional):    <directory>/<file_prefix>.log.YYYY-MM-DD, daily, non-blocking
//! ```

use anyhow::{Context, Result};
use pdv_config::{ConfigError, ConfigResolver};
use serde::Deserialize;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const DEFAULT_FILTER: &str = "info,pdv=debug,sqlx=warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// A single level, e.g. `debug`.
    #[serde(default)]
    pub level: Option<String>,

    /// Full `EnvFilter` directives; wins over `level`.
    #[serde(default)]
    pub filter: Option<String>,

    #[serde(default)]
    pub format: LogFormat,

    /// Daily log files go here when set.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl LoggingSettings {
    /// Reads the `logging` domain. A section that does not deserialize
    /// yields the defaults plus the error, to be reported once logging is up.
    pub fn from_config(config: &ConfigResolver) -> (Self, Option<ConfigError>) {
        match config.try_section::<LoggingSettings>("logging", "") {
            Ok(settings) => (settings.unwrap_or_default(), None),
            Err(e) => (LoggingSettings::default(), Some(e)),
        }
    }
}

/// Picks the filter directives from `RUST_LOG` (passed in as `env`), then
/// the settings, then [`DEFAULT_FILTER`].
pub fn filter_directives(settings: &LoggingSettings, env: Option<String>) -> String {
    [env, settings.filter.clone(), settings.level.clone()]
        .into_iter()
        .flatten()
        .find(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Installs the global subscriber. Keep the returned guard alive for as
/// long as file output should be flushed.
pub fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let directives = filter_directives(settings, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let mut layers = Vec::new();
    layers.push(match settings.format {
        LogFormat::Pretty => fmt::layer().pretty().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
    });

    let mut guard = None;
    if let Some(dir) = &settings.directory {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        let prefix = settings.file_prefix.as_deref().unwrap_or("pdv-agent");
        let appender = tracing_appender::rolling::daily(dir, format!("{prefix}.log"));
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        layers.push(match settings.format {
            LogFormat::Pretty => fmt::layer().with_writer(writer).with_ansi(false).boxed(),
            LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        });
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .context("installing the tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_defaults() {
        let settings: LoggingSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings.format, LogFormat::Pretty);
        assert!(settings.directory.is_none());

        let settings: LoggingSettings =
            serde_json::from_value(json!({ "format": "json", "directory": "logs" })).unwrap();
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.directory, Some(PathBuf::from("logs")));
    }

    #[test]
    fn test_bad_logging_section_is_returned_not_lost() {
        let mut config = ConfigResolver::empty("unused");
        config.set("logging", "format", json!("xml")).unwrap();
        let (settings, error) = LoggingSettings::from_config(&config);
        assert_eq!(settings.format, LogFormat::Pretty);
        assert!(error.is_some());

        config.set("logging", "format", json!("json")).unwrap();
        let (settings, error) = LoggingSettings::from_config(&config);
        assert_eq!(settings.format, LogFormat::Json);
        assert!(error.is_none());

        let (settings, error) = LoggingSettings::from_config(&ConfigResolver::empty("unused"));
        assert!(settings.level.is_none());
        assert!(error.is_none());
    }

    #[test]
    fn test_filter_precedence() {
        let mut settings = LoggingSettings::default();
        assert_eq!(filter_directives(&settings, None), DEFAULT_FILTER);

        settings.level = Some("warn".into());
        assert_eq!(filter_directives(&settings, None), "warn");

        settings.filter = Some("info,pdv_sync=trace".into());
        assert_eq!(filter_directives(&settings, None), "info,pdv_sync=trace");

        assert_eq!(filter_directives(&settings, Some("debug".into())), "debug");
        // an empty RUST_LOG does not count
        assert_eq!(filter_directives(&settings, Some(" ".into())), "info,pdv_sync=trace");
    }
}
