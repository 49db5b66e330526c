//! Configuration management for the Baton server
//!
//! Settings are layered: environment variables with the `baton` prefix,
//! an optional config file, then command line overrides on top.

use std::time::Duration;

use clap::Parser;
use config::{Config, Environment};

use baton_common::{DEFAULT_PEERS_FILE, error::BatonError};
use baton_core::PeerClientConfig;

use crate::startup::LoggingConfig;

const DEFAULT_STORE_FILE: &str = "data/fortunes.db";

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "baton-server", about = "Token-ring distributed lock peer")]
struct Cli {
    /// Identifier of this peer; must appear in the peers file
    #[arg(short = 'i', long = "id", env = "BATON_PEER_ID")]
    id: Option<u64>,
    /// Listen address, `host:port`; defaults to the peers-file entry
    #[arg(short = 'b', long = "bind")]
    bind: Option<String>,
    /// Path to the peers file (`id@host:port` per line)
    #[arg(long = "peers-file")]
    peers_file: Option<String>,
    /// Comma-separated peer list, overrides the peers file
    #[arg(long = "peers")]
    peers: Option<String>,
    /// Path to the record store file
    #[arg(long = "store-file")]
    store_file: Option<String>,
    /// Directory for log files
    #[arg(long = "log-dir", env = "BATON_LOG_DIR")]
    log_dir: Option<String>,
    /// Optional config file (without extension)
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

/// Application configuration loaded from environment, file and arguments
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new() -> Result<Self, BatonError> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(args: Cli) -> Result<Self, BatonError> {
        let mut config_builder = Config::builder().add_source(
            Environment::with_prefix("baton")
                .separator(".")
                .try_parsing(true),
        );

        if let Some(path) = &args.config {
            config_builder = config_builder.add_source(config::File::with_name(path));
        } else {
            config_builder =
                config_builder.add_source(config::File::with_name("conf/baton").required(false));
        }

        if let Some(v) = args.id {
            config_builder = config_builder
                .set_override("peer.id", v as i64)
                .map_err(override_error)?;
        }
        if let Some(v) = args.bind {
            config_builder = config_builder
                .set_override("server.bind", v)
                .map_err(override_error)?;
        }
        if let Some(v) = args.peers_file {
            config_builder = config_builder
                .set_override("peer.file", v)
                .map_err(override_error)?;
        }
        if let Some(v) = args.peers {
            config_builder = config_builder
                .set_override("peer.list", v)
                .map_err(override_error)?;
        }
        if let Some(v) = args.store_file {
            config_builder = config_builder
                .set_override("store.file", v)
                .map_err(override_error)?;
        }
        if let Some(v) = args.log_dir {
            config_builder = config_builder
                .set_override("log.dir", v)
                .map_err(override_error)?;
        }

        let config = config_builder
            .build()
            .map_err(|e| BatonError::Config(e.to_string()))?;

        Ok(Configuration { config })
    }

    pub fn peer_id(&self) -> Result<u64, BatonError> {
        self.config
            .get_int("peer.id")
            .map(|v| v as u64)
            .map_err(|_| BatonError::Config("peer.id is required (set --id or BATON_PEER_ID)".to_string()))
    }

    pub fn bind_address(&self) -> Option<String> {
        self.config.get_string("server.bind").ok()
    }

    pub fn peers_file(&self) -> String {
        self.config
            .get_string("peer.file")
            .unwrap_or(DEFAULT_PEERS_FILE.to_string())
    }

    /// Inline peer list, when given it takes precedence over the peers file.
    pub fn peer_list(&self) -> Option<String> {
        self.config.get_string("peer.list").ok()
    }

    pub fn store_file(&self) -> String {
        self.config
            .get_string("store.file")
            .unwrap_or(DEFAULT_STORE_FILE.to_string())
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("log.dir").ok(),
            self.config.get_bool("log.console").unwrap_or(true),
            self.config.get_bool("log.file").unwrap_or(true),
            self.config
                .get_string("log.level")
                .unwrap_or("info".to_string()),
        )
    }

    pub fn peer_client_config(&self) -> PeerClientConfig {
        let defaults = PeerClientConfig::default();
        PeerClientConfig {
            connect_timeout: self
                .config
                .get_int("client.connect_timeout_ms")
                .map(|v| Duration::from_millis(v as u64))
                .unwrap_or(defaults.connect_timeout),
            send_timeout: self
                .config
                .get_int("client.send_timeout_ms")
                .map(|v| Duration::from_millis(v as u64))
                .unwrap_or(defaults.send_timeout),
            max_retries: self
                .config
                .get_int("client.max_retries")
                .map(|v| v as u32)
                .unwrap_or(defaults.max_retries),
            retry_delay: self
                .config
                .get_int("client.retry_delay_ms")
                .map(|v| Duration::from_millis(v as u64))
                .unwrap_or(defaults.retry_delay),
        }
    }
}

fn override_error(e: config::ConfigError) -> BatonError {
    BatonError::Config(e.to_string())
}
