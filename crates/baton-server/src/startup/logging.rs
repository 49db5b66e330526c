//! File-based logging with per-component routing.
//!
//! Different components write to separate log files with daily rotation:
//!
//! | Log File     | Component                  | Target Prefixes        |
//! |--------------|----------------------------|------------------------|
//! | baton.log    | Root logger (all)          | (all)                  |
//! | lock.log     | Mutual exclusion engine    | baton_lock             |
//! | cluster.log  | Peer transport & directory | baton_core             |
//! | console.log  | Operator console           | baton_server::console  |
//! | store.log    | Replicated record store    | baton_server::store    |
//!
//! Log files land in `~/baton/logs` by default; override with the
//! `BATON_LOG_DIR` environment variable or the `log.dir` config key.
//! `RUST_LOG` controls the level for the console and root file layers.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Internal definition for a component log file.
struct ComponentLogDef {
    /// Log file name (e.g. "lock.log")
    file_name: &'static str,
    /// Target module prefixes routed to this file
    targets: &'static [&'static str],
}

/// Component log definitions. Each entry produces a separate rolling log
/// file; events are routed by their `tracing` target (Rust module path).
/// The root `baton.log` file always captures all events regardless of
/// target.
const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "lock.log",
        targets: &["baton_lock"],
    },
    ComponentLogDef {
        file_name: "cluster.log",
        targets: &["baton_core"],
    },
    ComponentLogDef {
        file_name: "console.log",
        targets: &["baton_server::console"],
    },
    ComponentLogDef {
        file_name: "store.log",
        targets: &["baton_server::store"],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy)]
pub enum LogRotation {
    /// Rotate daily (default)
    Daily,
    /// Rotate hourly
    Hourly,
    /// Never rotate (single file)
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration for the entire application.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base log directory (default: `~/baton/logs`)
    pub log_dir: PathBuf,
    /// Enable console output
    pub console_output: bool,
    /// Console log level
    pub console_level: Level,
    /// Enable file logging
    pub file_logging: bool,
    /// Default log level for files
    pub file_level: Level,
    /// Log rotation policy
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: true,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

fn default_log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BATON_LOG_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/baton/logs", home))
}

impl LoggingConfig {
    /// Create from application configuration.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: String,
    ) -> Self {
        let log_dir = log_dir.map(PathBuf::from).unwrap_or_else(default_log_dir);
        let level = level.parse().unwrap_or(Level::INFO);

        Self {
            log_dir,
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation: LogRotation::Daily,
        }
    }
}

/// Guard that keeps the logging system alive.
///
/// Holds the file appender worker guards; must be kept alive for the
/// duration of the application so buffered output is flushed on exit.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Initialize the logging system with multi-file output.
///
/// Returns a [`LoggingGuard`] that must be kept alive for the duration of
/// the application.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    // Console layer, per-layer EnvFilter honoring RUST_LOG
    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer().with_target(true).with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        // Root log file: baton.log captures all events
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, "baton.log");
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_ansi(false)
            .with_target(true)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        // Component files routed by tracing target
        for def in COMPONENT_LOGS {
            let appender =
                RollingFileAppender::new(config.rotation.into(), &config.log_dir, def.file_name);
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let level = LevelFilter::from_level(config.file_level);
            let filter =
                Targets::new().with_targets(def.targets.iter().map(|target| (*target, level)));
            let layer = fmt::layer()
                .with_writer(nb)
                .with_ansi(false)
                .with_target(true)
                .with_filter(filter);
            layers.push(Box::new(layer));
        }
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_level_parse() {
        let config = LoggingConfig::from_config(
            Some("/tmp/baton-test-logs".to_string()),
            false,
            true,
            "debug".to_string(),
        );
        assert_eq!(config.console_level, Level::DEBUG);
        assert_eq!(config.file_level, Level::DEBUG);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/baton-test-logs"));

        // Garbage falls back to info
        let config = LoggingConfig::from_config(None, true, true, "shouting".to_string());
        assert_eq!(config.console_level, Level::INFO);
    }
}
