//! Layered run settings.
//!
//! Precedence, lowest first: built-in defaults, the settings file, `TALLY_*`
//! environment variables, command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use tally_attribution::AttributionConfig;
use tally_core::constants::{
    BLOCK_FETCH_BACKOFF, BLOCK_FETCH_MAX_ATTEMPTS, BLOCK_FETCH_TIMEOUT, BUDGET_WINDOW,
    DEFAULT_BUNDLES_URL, DEFAULT_REQUESTS_PER_WINDOW, DEFAULT_RPC_URL, LOOKUP_RETRY_BACKOFF,
    LOOKUP_TIMEOUT, MAX_LOOKUP_ATTEMPTS, NUM_CONSECUTIVE_LEADER_SLOTS,
};
use tally_engine::EngineConfig;
use tally_rpc::RpcConfig;

/// Where reports go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured log events.
    Text,
    /// JSON lines on stdout or `--out-file`.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rpc_url: String,
    pub commitment: String,
    pub rpc_timeout_ms: u64,
    pub rpc_max_attempts: u32,
    pub rpc_backoff_ms: u64,

    pub bundles_url: String,
    pub lookup_timeout_ms: u64,
    pub lookup_max_attempts: u32,
    pub lookup_backoff_ms: u64,
    pub requests_per_window: u32,
    pub window_ms: u64,
    pub max_in_flight: Option<usize>,

    pub turn_size: usize,
    pub labels: Vec<String>,

    pub output: OutputFormat,
    pub out_file: Option<PathBuf>,
    pub log_level: String,
    pub log_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            commitment: "finalized".to_string(),
            rpc_timeout_ms: millis(BLOCK_FETCH_TIMEOUT),
            rpc_max_attempts: BLOCK_FETCH_MAX_ATTEMPTS,
            rpc_backoff_ms: millis(BLOCK_FETCH_BACKOFF),
            bundles_url: DEFAULT_BUNDLES_URL.to_string(),
            lookup_timeout_ms: millis(LOOKUP_TIMEOUT),
            lookup_max_attempts: MAX_LOOKUP_ATTEMPTS,
            lookup_backoff_ms: millis(LOOKUP_RETRY_BACKOFF),
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            window_ms: millis(BUDGET_WINDOW),
            max_in_flight: None,
            turn_size: NUM_CONSECUTIVE_LEADER_SLOTS,
            labels: Vec::new(),
            output: OutputFormat::Text,
            out_file: None,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// `<config_dir>/tally/tally.toml`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tally").join("tally.toml"))
}

impl Settings {
    /// Load defaults, then the settings file, then the environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        match path {
            Some(p) => builder = builder.add_source(File::from(p).required(true)),
            None => {
                if let Some(p) = default_settings_path() {
                    builder = builder.add_source(File::from(p).required(false));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix("TALLY")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("labels"),
        );

        builder
            .build()
            .context("failed to read settings")?
            .try_deserialize()
            .context("invalid settings")
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            endpoint: self.rpc_url.clone(),
            timeout: Duration::from_millis(self.rpc_timeout_ms),
            commitment: self.commitment.clone(),
            max_attempts: self.rpc_max_attempts,
            retry_backoff: Duration::from_millis(self.rpc_backoff_ms),
        }
    }

    pub fn attribution_config(&self) -> AttributionConfig {
        AttributionConfig {
            base_url: self.bundles_url.clone(),
            timeout: Duration::from_millis(self.lookup_timeout_ms),
            max_attempts: self.lookup_max_attempts,
            retry_backoff: Duration::from_millis(self.lookup_backoff_ms),
            window: Duration::from_millis(self.window_ms),
            max_in_flight: self.max_in_flight,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            requests_per_window: self.requests_per_window,
            turn_size: self.turn_size,
            labels: self.labels.clone(),
            attribution: self.attribution_config(),
        }
    }
}
