//! Configuration for the audit ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Block sealing configuration
    pub sealing: SealingConfig,

    /// Notification channel configuration
    pub notifications: NotificationConfig,

    /// Genesis block payload
    pub genesis: GenesisConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/audit-ledger"),
            service_name: "audit-ledger".to_string(),
            log_json: false,
            rocksdb: RocksDBConfig::default(),
            sealing: SealingConfig::default(),
            notifications: NotificationConfig::default(),
            genesis: GenesisConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: false,
        }
    }
}

/// Block sealing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealingConfig {
    /// Pending transactions that trigger an immediate seal
    pub max_transactions_per_block: usize,

    /// Timer-driven seal interval (milliseconds)
    pub block_interval_ms: u64,

    /// Enable the seal timer
    pub timer_enabled: bool,

    /// Actor mailbox capacity
    pub mailbox_capacity: usize,
}

impl Default for SealingConfig {
    fn default() -> Self {
        Self {
            max_transactions_per_block: 100,
            block_interval_ms: 30_000,
            timer_enabled: true,
            mailbox_capacity: 1000,
        }
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Broadcast buffer per listener before it starts lagging
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Synthetic payload anchored by the genesis block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Free-form genesis message
    pub message: String,

    /// Facility the chain belongs to
    pub hospital: String,

    /// Purpose of the chain
    pub purpose: String,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            message: "Or-care-stra Ensemble Genesis Block".to_string(),
            hospital: "Chris Hani Baragwanath Academic Hospital".to_string(),
            purpose: "Digital Twin Asset Tracking Audit Trail".to_string(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let config = Config::default();
        config.with_env_overrides()
    }

    /// Apply environment variable overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> crate::Result<Self> {
        if let Ok(data_dir) = std::env::var("AUDIT_LEDGER_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(value) = std::env::var("AUDIT_LEDGER_MAX_TX_PER_BLOCK") {
            self.sealing.max_transactions_per_block = value.parse().map_err(|e| {
                crate::Error::Config(format!("AUDIT_LEDGER_MAX_TX_PER_BLOCK: {}", e))
            })?;
        }

        if let Ok(value) = std::env::var("AUDIT_LEDGER_BLOCK_INTERVAL_MS") {
            self.sealing.block_interval_ms = value.parse().map_err(|e| {
                crate::Error::Config(format!("AUDIT_LEDGER_BLOCK_INTERVAL_MS: {}", e))
            })?;
        }

        if let Ok(value) = std::env::var("AUDIT_LEDGER_LOG_JSON") {
            self.log_json = matches!(value.as_str(), "1" | "true" | "yes");
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject settings the sealer cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.sealing.max_transactions_per_block == 0 {
            return Err(crate::Error::Config(
                "max_transactions_per_block must be at least 1".to_string(),
            ));
        }
        if self.sealing.block_interval_ms == 0 {
            return Err(crate::Error::Config(
                "block_interval_ms must be positive".to_string(),
            ));
        }
        if self.sealing.mailbox_capacity == 0 || self.notifications.channel_capacity == 0 {
            return Err(crate::Error::Config(
                "channel capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
