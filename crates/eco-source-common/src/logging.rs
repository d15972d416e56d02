//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "ECO_SOURCE_LOG";
const DAEMON_DIRECTIVE: &str = "info";
const CLI_DIRECTIVE: &str = "warn";

static GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

/// Stdout log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Sinks attached by [`init_tracing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSinks {
    pub stdout: bool,
    /// Base path of the decision log; the appender suffixes it with the date.
    pub file: Option<PathBuf>,
}

/// First non-blank directive of `ECO_SOURCE_LOG`, then `RUST_LOG`, else `fallback`.
pub fn resolve_directive(service_env: Option<&str>, rust_log: Option<&str>, fallback: &str) -> String {
    [service_env, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|directive| !directive.is_empty())
        .unwrap_or(fallback)
        .to_owned()
}

fn env_filter(fallback: &str) -> EnvFilter {
    let service_env = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = resolve_directive(service_env.as_deref(), rust_log.as_deref(), fallback);
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("invalid log directive '{directive}' ({err}); using '{fallback}'");
        EnvFilter::new(fallback)
    })
}

/// Install the daemon subscriber described by `config`.
///
/// Stdout gets the configured format and the decision log is always JSON.
/// Either sink can be switched off. Only the first call in a process installs
/// a subscriber; the returned [`LogSinks`] describes what `config` asked for.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<LogSinks> {
    let mut guards = Vec::new();

    let file = if config.file {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!("failed to create log directory {}", config.directory.display())
        })?;
        let file_name = format!(
            "{}.log",
            config.file_prefix.as_deref().unwrap_or(service_name)
        );
        let (writer, guard) = tracing_appender::non_blocking(daily(&config.directory, &file_name));
        guards.push(guard);
        Some((config.directory.join(file_name), writer))
    } else {
        None
    };

    let stdout = if config.stdout {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(guard);
        Some(writer)
    } else {
        None
    };

    let sinks = LogSinks {
        stdout: stdout.is_some(),
        file: file.as_ref().map(|(path, _)| path.clone()),
    };

    let stdout_layer = stdout.map(|writer| match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .json()
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(writer)
            .boxed(),
    });
    let file_layer = file.map(|(_, writer)| {
        fmt::layer()
            .with_target(true)
            .with_timer(UtcTime::rfc_3339())
            .json()
            .with_writer(writer)
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter(DAEMON_DIRECTIVE))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();
    if installed {
        let _ = GUARDS.set(guards);
    }

    info!(
        service = %service_name,
        stdout = sinks.stdout,
        decision_log = ?sinks.file,
        format = ?config.format,
        "tracing initialised"
    );
    Ok(sinks)
}

/// Stderr-only subscriber for one-shot commands whose stdout carries the result.
///
/// Defaults to `warn` so rejected telemetry is reported without noise.
pub fn init_cli_tracing(format: LogFormat) -> bool {
    let layer = match format {
        LogFormat::StructuredJson => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_writer(std::io::stderr).boxed(),
    };
    tracing_subscriber::registry()
        .with(env_filter(CLI_DIRECTIVE))
        .with(layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_uses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"structured-json\"").unwrap();
        assert_eq!(parsed.format, LogFormat::StructuredJson);
        let parsed: Wrapper = toml::from_str("format = \"pretty\"").unwrap();
        assert_eq!(parsed.format, LogFormat::Pretty);
    }

    #[test]
    fn service_variable_takes_precedence_over_rust_log() {
        assert_eq!(
            resolve_directive(Some("eco_source_core=debug"), Some("trace"), "info"),
            "eco_source_core=debug"
        );
        assert_eq!(resolve_directive(None, Some("trace"), "info"), "trace");
        assert_eq!(resolve_directive(Some("  "), Some("warn"), "info"), "warn");
        assert_eq!(resolve_directive(None, None, "info"), "info");
    }

    #[test]
    fn decision_log_lands_under_the_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("tower".into()),
            stdout: false,
            file: true,
        };
        let sinks = init_tracing("eco-source-test", &config).unwrap();
        assert!(config.directory.is_dir());
        assert!(!sinks.stdout);
        assert_eq!(sinks.file, Some(config.directory.join("tower.log")));
    }

    #[test]
    fn disabled_decision_log_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("unused"),
            file: false,
            ..LoggingConfig::default()
        };
        let sinks = init_tracing("eco-source-test", &config).unwrap();
        assert!(!config.directory.exists());
        assert_eq!(sinks.file, None);
        assert!(sinks.stdout);
    }
}
