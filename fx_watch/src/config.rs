use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fx_common::markets::forex::{CurrencyPair, SupportedPairs, DEFAULT_WATCHLIST_PAIRS, SUPPORTED_PAIRS};
use fx_common::watchlist::DEFAULT_STORAGE_KEY;
use fx_common::{PollingSettings, WatchlistSettings};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "fx_watch.conf";
const DEFAULT_ENDPOINT_URL: &str = "http://localhost:8081/api/forex";

/// Where rates are fetched from.
#[derive(ValueEnum, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// The forex proxy endpoint with the `{success, data, error}` envelope.
    Proxy,
    /// The upstream provider, authenticated with a token header.
    Provider,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Poll the active watchlist pairs and accept commands on stdin (default).
    Watch,
    /// Print rates for one pair from the streaming endpoint.
    Stream {
        /// Pair to stream, e.g. USD/JPY.
        #[clap(long)]
        pair: String,
        /// Stop after this many seconds.
        #[clap(long, default_value_t = 60)]
        max_secs: u64,
    },
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Forex watchlist with live rate polling", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(subcommand)]
    #[serde(skip)]
    pub command: Option<Command>,

    #[clap(long, env = "FX_WATCH_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FX_WATCH_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FX_WATCH_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, value_enum, env = "FX_WATCH_SOURCE", help = "Rate source: proxy or provider.")]
    pub source: Option<SourceMode>,

    #[clap(long, env = "FX_WATCH_ENDPOINT_URL", help = "Forex proxy endpoint URL.")]
    pub endpoint_url: Option<String>,

    #[clap(long, env = "FOREX_SERVICE_URL", help = "Upstream provider base URL.")]
    pub provider_base_url: Option<String>,

    #[clap(long, env = "FOREX_SERVICE_TOKEN", help = "Upstream provider access token.")]
    pub provider_token: Option<String>,

    #[clap(long, env = "FX_WATCH_POLL_INTERVAL_MS", help = "Delay between polls of one pair, in milliseconds.")]
    pub poll_interval_ms: Option<u64>,

    #[clap(long, env = "FX_WATCH_QUOTA_BACKOFF_SECS", help = "Delay between polls after a quota failure, in seconds.")]
    pub quota_backoff_secs: Option<u64>,

    #[clap(long, env = "FX_WATCH_FETCH_TIMEOUT_MS", help = "Upper bound on one fetch, in milliseconds.")]
    pub fetch_timeout_ms: Option<u64>,

    #[clap(long, env = "FX_WATCH_STORAGE_DIR", help = "Directory holding the persisted watchlist.")]
    pub storage_dir: Option<PathBuf>,

    #[clap(long, env = "FX_WATCH_STORAGE_KEY", help = "Storage key of the persisted watchlist.")]
    pub storage_key: Option<String>,

    #[clap(long, env = "FX_WATCH_SUPPORTED_PAIRS", value_delimiter = ',', help = "Comma separated pairs that may be added.")]
    pub supported_pairs: Option<Vec<String>>,

    #[clap(long, env = "FX_WATCH_DEFAULT_PAIRS", value_delimiter = ',', help = "Comma separated pairs seeded into an empty watchlist.")]
    pub default_pairs: Option<Vec<String>>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            command: other.command.or(self.command),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            source: other.source.or(self.source),
            endpoint_url: other.endpoint_url.or(self.endpoint_url),
            provider_base_url: other.provider_base_url.or(self.provider_base_url),
            provider_token: other.provider_token.or(self.provider_token),
            poll_interval_ms: other.poll_interval_ms.or(self.poll_interval_ms),
            quota_backoff_secs: other.quota_backoff_secs.or(self.quota_backoff_secs),
            fetch_timeout_ms: other.fetch_timeout_ms.or(self.fetch_timeout_ms),
            storage_dir: other.storage_dir.or(self.storage_dir),
            storage_key: other.storage_key.or(self.storage_key),
            supported_pairs: other.supported_pairs.or(self.supported_pairs),
            default_pairs: other.default_pairs.or(self.default_pairs),
        }
    }

    fn defaults() -> Config {
        let storage_dir = dirs::data_dir()
            .map(|dir| dir.join("fx_watch"))
            .unwrap_or_else(|| PathBuf::from("./data"));

        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            source: Some(SourceMode::Proxy),
            endpoint_url: Some(DEFAULT_ENDPOINT_URL.to_string()),
            poll_interval_ms: Some(5000),
            quota_backoff_secs: Some(300),
            fetch_timeout_ms: Some(8000),
            storage_dir: Some(storage_dir),
            storage_key: Some(DEFAULT_STORAGE_KEY.to_string()),
            supported_pairs: Some(SUPPORTED_PAIRS.iter().map(|p| p.to_string()).collect()),
            default_pairs: Some(DEFAULT_WATCHLIST_PAIRS.iter().map(|p| p.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Watch)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn source(&self) -> SourceMode {
        self.source.unwrap_or(SourceMode::Proxy)
    }

    pub fn endpoint_url(&self) -> &str {
        self.endpoint_url.as_deref().unwrap_or(DEFAULT_ENDPOINT_URL)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.unwrap_or(8000))
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| PathBuf::from("./data"))
    }

    /// Polling cadence from config, rejecting zero durations.
    pub fn polling_settings(&self) -> Result<PollingSettings> {
        let defaults = PollingSettings::default();
        let settings = PollingSettings {
            interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            quota_backoff: self
                .quota_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.quota_backoff),
            fetch_timeout: self.fetch_timeout(),
        };
        if settings.interval.is_zero() {
            bail!("pollIntervalMs must be greater than zero");
        }
        if settings.quota_backoff.is_zero() {
            bail!("quotaBackoffSecs must be greater than zero");
        }
        if settings.fetch_timeout.is_zero() {
            bail!("fetchTimeoutMs must be greater than zero");
        }
        Ok(settings)
    }

    pub fn watchlist_settings(&self) -> Result<WatchlistSettings> {
        let defaults = WatchlistSettings::default();

        let supported = match &self.supported_pairs {
            Some(pairs) => SupportedPairs::new(pairs.iter().map(|p| p.trim()))
                .context("Invalid supported pair list")?,
            None => defaults.supported,
        };
        if supported.is_empty() {
            bail!("The supported pair list is empty");
        }

        let default_pairs = match &self.default_pairs {
            Some(pairs) => pairs
                .iter()
                .map(|p| p.trim().parse::<CurrencyPair>())
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid default pair list")?,
            None => defaults.default_pairs,
        };
        if let Some(unsupported) = default_pairs.iter().find(|p| !supported.contains_pair(p)) {
            bail!("Default pair {} is not in the supported pair list", unsupported);
        }

        Ok(WatchlistSettings {
            storage_key: self.storage_key.clone().unwrap_or(defaults.storage_key),
            supported,
            default_pairs,
        })
    }
}

/// Outcome of looking for the config file. Kept until logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigFileStatus {
    Loaded(PathBuf),
    Missing(PathBuf),
    Invalid { path: PathBuf, reason: String },
}

impl ConfigFileStatus {
    pub fn log(&self) {
        match self {
            ConfigFileStatus::Loaded(path) => tracing::info!("Loaded config file {}", path.display()),
            ConfigFileStatus::Missing(path) => tracing::info!(
                "Config file not found at {}. Using defaults and environment/CLI variables.",
                path.display()
            ),
            ConfigFileStatus::Invalid { path, reason } => tracing::warn!(
                "Failed to load config file {}: {}. Falling back to other sources.",
                path.display(),
                reason
            ),
        }
    }
}

fn read_config_file(path: &Path) -> (Option<Config>, ConfigFileStatus) {
    if !path.exists() {
        return (None, ConfigFileStatus::Missing(path.to_path_buf()));
    }
    let invalid = |reason: String| ConfigFileStatus::Invalid {
        path: path.to_path_buf(),
        reason,
    };
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => (Some(file_config), ConfigFileStatus::Loaded(path.to_path_buf())),
            Err(e) => (None, invalid(format!("parse error: {}", e))),
        },
        Err(e) => (None, invalid(format!("read error: {}", e))),
    }
}

/// Layers defaults, the JSON config file and CLI/env values, lowest first.
pub fn load_config_from(cli: Config) -> (Config, ConfigFileStatus) {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    let (file_config, status) = read_config_file(&config_file_path);
    if let Some(file_config) = file_config {
        current_config = current_config.merge(file_config);
    }
    (current_config.merge(cli), status)
}

pub fn load_config() -> (Config, ConfigFileStatus) {
    load_config_from(Config::parse())
}
