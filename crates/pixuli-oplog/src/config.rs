//! Configuration for the operation log service

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Storage key used when none is configured
pub const DEFAULT_STORAGE_KEY: &str = "pixuli-operation-logs";

/// Default cap on retained records
pub const DEFAULT_MAX_LOGS: usize = 10_000;

/// Default quiet period before a mutation is persisted
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 500;

/// Operation log service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationLogConfig {
    /// Key the serialized log is stored under
    pub storage_key: String,
    /// Maximum number of records kept in memory (and therefore persisted)
    pub max_logs: usize,
    /// Quiet period in milliseconds before a debounced write fires
    pub save_debounce_ms: u64,
    /// When set, a write rejected for lack of space prunes memory to this
    /// many newest records and is retried once. Off by default.
    pub quota_prune_to: Option<usize>,
}

impl Default for OperationLogConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            max_logs: DEFAULT_MAX_LOGS,
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            quota_prune_to: None,
        }
    }
}

impl OperationLogConfig {
    /// Create a config with a custom storage key and record cap
    pub fn new(storage_key: impl Into<String>, max_logs: usize) -> Self {
        Self {
            storage_key: storage_key.into(),
            max_logs,
            ..Default::default()
        }
    }

    /// Start a builder seeded with defaults
    pub fn builder() -> OperationLogConfigBuilder {
        OperationLogConfigBuilder::new()
    }

    /// The debounce window as a [`Duration`]
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    /// How many records must go to bring `current_len` back under the cap
    pub fn overflow(&self, current_len: usize) -> usize {
        current_len.saturating_sub(self.max_logs)
    }
}

/// Builder for [`OperationLogConfig`]
#[derive(Debug, Default)]
pub struct OperationLogConfigBuilder {
    storage_key: Option<String>,
    max_logs: Option<usize>,
    save_debounce: Option<Duration>,
    quota_prune_to: Option<usize>,
}

impl OperationLogConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage key
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    /// Set the record cap
    pub fn max_logs(mut self, max: usize) -> Self {
        self.max_logs = Some(max);
        self
    }

    /// Set the debounce window
    pub fn save_debounce(mut self, window: Duration) -> Self {
        self.save_debounce = Some(window);
        self
    }

    /// Enable prune-and-retry on quota errors
    pub fn quota_prune_to(mut self, keep: usize) -> Self {
        self.quota_prune_to = Some(keep);
        self
    }

    /// Build the config
    pub fn build(self) -> OperationLogConfig {
        let mut config = OperationLogConfig::default();

        if let Some(key) = self.storage_key {
            config.storage_key = key;
        }
        if let Some(max) = self.max_logs {
            config.max_logs = max;
        }
        if let Some(window) = self.save_debounce {
            config.save_debounce_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        }
        if let Some(keep) = self.quota_prune_to {
            config.quota_prune_to = Some(keep);
        }

        config
    }
}
