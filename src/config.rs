use eyre::{eyre, Result, WrapErr};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::orchestrator::RelaySettings;
use crate::reader::evm::parse_rpc_urls;

/// Main configuration for the relayer
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub relay: RelayConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    /// `json` switches the log formatter
    pub log_format: Option<String>,
}

/// Source chain: where TokensLocked events are read
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub rpc_url: String,
    /// Additional RPC URLs for fallback (tried in order when primary fails)
    pub rpc_fallback_urls: Vec<String>,
    pub bridge_address: String,
}

impl SourceConfig {
    /// All RPC URLs: primary followed by fallbacks.
    pub fn all_rpc_urls(&self) -> Vec<String> {
        let mut urls = vec![self.rpc_url.clone()];
        urls.extend(self.rpc_fallback_urls.iter().cloned());
        urls
    }
}

/// Destination chain: where mints are submitted
#[derive(Clone)]
pub struct DestinationConfig {
    pub rpc_url: String,
    pub bridge_address: String,
    pub private_key: String,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("rpc_url", &self.rpc_url)
            .field("bridge_address", &self.bridge_address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Relay loop configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Treated as already processed; scanning starts at the next block
    pub start_block: u64,
    pub poll_interval_ms: u64,
    pub reorg_safety_margin: u64,
    pub max_chunk_size: u64,
    pub rpc_timeout_ms: u64,
    pub receipt_timeout_ms: u64,
    pub alert_after_failures: u32,
    pub max_backoff_ms: u64,
    pub dry_run: bool,
    pub relayer_id: String,
}

impl RelayConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    pub fn settings(&self) -> RelaySettings {
        RelaySettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            reorg_safety_margin: self.reorg_safety_margin,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            alert_after_failures: self.alert_after_failures,
            store_timeout: self.rpc_timeout(),
        }
    }
}

/// Where relay progress is checkpointed
#[derive(Clone)]
pub enum StorageConfig {
    Memory,
    File(PathBuf),
    Postgres { url: String },
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageConfig::Memory => f.write_str("Memory"),
            StorageConfig::File(path) => f.debug_tuple("File").field(path).finish(),
            StorageConfig::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("url", &"<redacted>")
                .finish(),
        }
    }
}

/// Health/metrics server
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,
}

/// Default functions
fn default_start_block() -> u64 {
    0
}

fn default_poll_interval() -> u64 {
    15_000
}

fn default_reorg_safety_margin() -> u64 {
    12
}

fn default_max_chunk_size() -> u64 {
    1000
}

fn default_rpc_timeout() -> u64 {
    10_000
}

fn default_receipt_timeout() -> u64 {
    120_000
}

fn default_alert_after_failures() -> u32 {
    5
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_relayer_id() -> String {
    "default".to_string()
}

fn default_api_port() -> u16 {
    9090
}

/// Required variable; empty counts as missing
fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(eyre!("{} environment variable is required", name)),
    }
}

/// Optional variable with a default. A value that is present but does not
/// parse is an error, never replaced by the default.
fn optional<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e| eyre!("{} has invalid value {:?}: {}", name, value, e)),
        _ => Ok(default),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_hex_of_len(value: &str, hex_chars: usize) -> bool {
    value.len() == hex_chars + 2
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build and validate a config from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source_rpc_raw = required(&lookup, "SOURCE_RPC_URL")?;
        let source_rpc_urls = parse_rpc_urls(&source_rpc_raw);
        if source_rpc_urls.is_empty() {
            return Err(eyre!("SOURCE_RPC_URL cannot be empty"));
        }

        let source = SourceConfig {
            rpc_url: source_rpc_urls[0].clone(),
            rpc_fallback_urls: source_rpc_urls[1..].to_vec(),
            bridge_address: required(&lookup, "SOURCE_BRIDGE_ADDRESS")?,
        };

        let destination = DestinationConfig {
            rpc_url: required(&lookup, "DEST_RPC_URL")?,
            bridge_address: required(&lookup, "DEST_BRIDGE_ADDRESS")?,
            private_key: required(&lookup, "RELAYER_PRIVATE_KEY")?,
        };

        let relay = RelayConfig {
            start_block: optional(&lookup, "START_BLOCK", default_start_block())?,
            poll_interval_ms: optional(&lookup, "POLL_INTERVAL_MS", default_poll_interval())?,
            reorg_safety_margin: optional(
                &lookup,
                "REORG_SAFETY_MARGIN",
                default_reorg_safety_margin(),
            )?,
            max_chunk_size: optional(&lookup, "MAX_CHUNK_SIZE", default_max_chunk_size())?,
            rpc_timeout_ms: optional(&lookup, "RPC_TIMEOUT_MS", default_rpc_timeout())?,
            receipt_timeout_ms: optional(&lookup, "RECEIPT_TIMEOUT_MS", default_receipt_timeout())?,
            alert_after_failures: optional(
                &lookup,
                "ALERT_AFTER_FAILURES",
                default_alert_after_failures(),
            )?,
            max_backoff_ms: optional(&lookup, "MAX_BACKOFF_MS", default_max_backoff())?,
            dry_run: optional(&lookup, "RELAY_DRY_RUN", false)?,
            relayer_id: non_empty(&lookup, "RELAYER_ID").unwrap_or_else(default_relayer_id),
        };

        let state_file = non_empty(&lookup, "STATE_FILE");
        let database_url = non_empty(&lookup, "DATABASE_URL");
        let storage = match (state_file, database_url) {
            (Some(_), Some(_)) => {
                return Err(eyre!(
                    "STATE_FILE and DATABASE_URL are mutually exclusive; set only one"
                ))
            }
            (Some(path), None) => StorageConfig::File(PathBuf::from(path)),
            (None, Some(url)) => StorageConfig::Postgres { url },
            (None, None) => StorageConfig::Memory,
        };

        let api = ApiConfig {
            bind_address: non_empty(&lookup, "API_BIND").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: optional(&lookup, "API_PORT", default_api_port())?,
        };

        let config = Config {
            source,
            destination,
            relay,
            storage,
            api,
            log_format: non_empty(&lookup, "LOG_FORMAT"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for url in self.source.all_rpc_urls() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(eyre!("source RPC URL must be http(s): {}", url));
            }
        }

        if !self.destination.rpc_url.starts_with("http://")
            && !self.destination.rpc_url.starts_with("https://")
        {
            return Err(eyre!(
                "destination RPC URL must be http(s): {}",
                self.destination.rpc_url
            ));
        }

        if !is_hex_of_len(&self.source.bridge_address, 40) {
            return Err(eyre!(
                "SOURCE_BRIDGE_ADDRESS must be a valid hex address (42 chars with 0x prefix)"
            ));
        }

        if !is_hex_of_len(&self.destination.bridge_address, 40) {
            return Err(eyre!(
                "DEST_BRIDGE_ADDRESS must be a valid hex address (42 chars with 0x prefix)"
            ));
        }

        if !is_hex_of_len(&self.destination.private_key, 64) {
            return Err(eyre!(
                "RELAYER_PRIVATE_KEY must be 66 chars (0x + 64 hex chars)"
            ));
        }

        if self.relay.max_chunk_size == 0 {
            return Err(eyre!("MAX_CHUNK_SIZE must be greater than 0"));
        }

        if self.relay.rpc_timeout_ms == 0 {
            return Err(eyre!("RPC_TIMEOUT_MS must be greater than 0"));
        }

        if self.relay.receipt_timeout_ms == 0 {
            return Err(eyre!("RECEIPT_TIMEOUT_MS must be greater than 0"));
        }

        if self.relay.alert_after_failures == 0 {
            return Err(eyre!("ALERT_AFTER_FAILURES must be greater than 0"));
        }

        if self.relay.max_backoff_ms < self.relay.poll_interval_ms {
            return Err(eyre!(
                "MAX_BACKOFF_MS ({}) cannot be less than POLL_INTERVAL_MS ({})",
                self.relay.max_backoff_ms,
                self.relay.poll_interval_ms
            ));
        }

        if self.relay.relayer_id.len() > 64 {
            return Err(eyre!("RELAYER_ID cannot exceed 64 characters"));
        }

        Ok(())
    }

    pub fn json_logs(&self) -> bool {
        matches!(self.log_format.as_deref(), Some(f) if f.eq_ignore_ascii_case("json"))
    }
}
