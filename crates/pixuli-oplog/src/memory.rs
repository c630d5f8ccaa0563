//! In-memory storage implementation
//!
//! This module provides an in-memory implementation of the storage trait,
//! suitable for testing, simulation and hosts whose own key/value store is
//! already held in process memory.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::OperationLogStorage;
use crate::error::StorageError;

/// In-memory implementation of [`OperationLogStorage`]
///
/// Uses `DashMap` for concurrent access. An optional byte capacity models a
/// browser storage quota: a write whose value would push the total past the
/// capacity is rejected with [`StorageError::QuotaExceeded`].
#[derive(Debug, Default)]
pub struct InMemoryLogStorage {
    /// Stored values by key
    items: DashMap<String, String>,
    /// Total bytes the store will hold, if bounded
    capacity_bytes: Option<usize>,
    /// Artificial latency applied to reads
    read_delay: Option<Duration>,
    /// When set, every write fails with a backend error
    fail_writes: AtomicBool,
    /// Number of `get_item` calls served
    reads: AtomicUsize,
    /// Number of `set_item` calls attempted
    writes: AtomicUsize,
}

impl InMemoryLogStorage {
    /// Create a new, unbounded in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes beyond `capacity_bytes` in total
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes: Some(capacity_bytes),
            ..Self::default()
        }
    }

    /// Delay every read by `delay`
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Seed a value, bypassing counters and capacity checks
    pub fn with_item(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current value stored under `key`
    pub fn item(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|value| value.value().clone())
    }

    /// Number of `get_item` calls so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `set_item` calls so far, failed ones included
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Bytes currently held across all keys
    pub fn used_bytes(&self) -> usize {
        self.items
            .iter()
            .map(|entry| entry.key().len() + entry.value().len())
            .sum()
    }

    fn check_capacity(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let Some(capacity) = self.capacity_bytes else {
            return Ok(());
        };

        // The value being replaced does not count against the new write
        let replaced = self
            .items
            .get(key)
            .map(|existing| key.len() + existing.len())
            .unwrap_or(0);
        let available = capacity.saturating_sub(self.used_bytes().saturating_sub(replaced));
        let needed = key.len() + value.len();

        if needed > available {
            return Err(StorageError::QuotaExceeded { needed, available });
        }
        Ok(())
    }
}

#[async_trait]
impl OperationLogStorage for InMemoryLogStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        trace!(key, "Reading item");

        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }

        Ok(self.item(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::backend("writes disabled"));
        }
        self.check_capacity(key, value)?;

        self.items.insert(key.to_string(), value.to_string());
        debug!(key, bytes = value.len(), "Stored item");
        Ok(())
    }
}
