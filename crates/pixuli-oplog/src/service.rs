//! The operation log service
//!
//! [`OperationLogService`] owns the only authoritative copy of the log. All
//! reads and mutations are synchronous against memory; persistence trails
//! behind through a debounced write to the configured storage backend.
//!
//! ## Persistence Flow
//!
//! ```text
//! log() / clear_logs()
//!   ├─ mutate memory under the write lock
//!   └─ schedule_save()
//!        ├─ resolve the runtime handle (captured once, reused from any thread)
//!        ├─ abort the pending timer task (if any)
//!        └─ spawn timer: sleep(save_debounce) → spawn write
//!                                               ├─ snapshot memory as JSON
//!                                               └─ storage.set_item(key, json)
//! ```

use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::OperationLogStorage;
use crate::clock::{Clock, SystemClock};
use crate::config::OperationLogConfig;
use crate::error::StorageError;
use crate::export::{self, ExportFormat};
use crate::model::{
    ClearMode, ClearOptions, LogActionType, LogOptions, LogQueryOptions, LogStatistics, LogStatus,
    OperationLog,
};
use crate::query::run_query;
use crate::statistics::compute_statistics;

/// State shared between the service and its background write tasks
struct Shared<S> {
    storage: S,
    config: OperationLogConfig,
    /// Newest first, never longer than `config.max_logs`
    logs: RwLock<Vec<OperationLog>>,
}

impl<S: OperationLogStorage> Shared<S> {
    fn snapshot_json(&self) -> Result<String, StorageError> {
        let logs = self.logs.read();
        serde_json::to_string(&*logs).map_err(|e| StorageError::serialization(e.to_string()))
    }

    /// Write the current state, applying the quota fallback when configured
    async fn persist(&self) -> Result<(), StorageError> {
        let key = &self.config.storage_key;
        let payload = self.snapshot_json()?;

        match self.storage.set_item(key, &payload).await {
            Ok(()) => {
                debug!(key = %key, bytes = payload.len(), "Persisted operation logs");
                Ok(())
            }
            Err(e) if e.is_quota_exceeded() => {
                let Some(keep) = self.config.quota_prune_to else {
                    return Err(e);
                };

                let pruned = {
                    let mut logs = self.logs.write();
                    let before = logs.len();
                    logs.truncate(keep);
                    before - logs.len()
                };
                warn!(error = %e, pruned, keep, "Storage quota exceeded, retrying with pruned log");

                let payload = self.snapshot_json()?;
                self.storage.set_item(key, &payload).await
            }
            Err(e) => Err(e),
        }
    }

    /// Debounced write: failures are logged and dropped
    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            error!(
                key = %self.config.storage_key,
                error = %e,
                "Failed to save operation logs"
            );
        }
    }
}

/// Bounded, queryable activity log with debounced persistence
///
/// Construct one per application and share it by reference. Mutations
/// (`log`, `clear_logs`) take effect in memory immediately; the storage
/// backend sees the latest state once the debounce window has passed without
/// further mutations. A burst of mutations produces a single write.
///
/// Persistence needs a Tokio runtime. The service remembers the first runtime
/// it sees (at construction, on load, or on a mutation), so later mutations
/// may come from any thread. Until a runtime has been seen, mutations still
/// apply to memory and a warning is logged. Dropping the service does not
/// cancel a write that is already scheduled.
pub struct OperationLogService<S: OperationLogStorage + 'static> {
    shared: Arc<Shared<S>>,
    /// Set once the persisted log has been merged into memory
    loaded: OnceCell<()>,
    /// Timer task of the next debounced write
    pending_save: Mutex<Option<JoinHandle<()>>>,
    /// Runtime the debounce timers run on
    runtime: OnceLock<Handle>,
    clock: Arc<dyn Clock>,
}

impl<S: OperationLogStorage + 'static> OperationLogService<S> {
    /// Create a service with the default configuration
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, OperationLogConfig::default())
    }

    /// Create a service with a custom configuration
    pub fn with_config(storage: S, config: OperationLogConfig) -> Self {
        let runtime = OnceLock::new();
        if let Ok(handle) = Handle::try_current() {
            let _ = runtime.set(handle);
        }

        Self {
            shared: Arc::new(Shared {
                storage,
                config,
                logs: RwLock::new(Vec::new()),
            }),
            loaded: OnceCell::new(),
            pending_save: Mutex::new(None),
            runtime,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a custom clock for timestamps and the daily statistics window
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The active configuration
    pub fn config(&self) -> &OperationLogConfig {
        &self.shared.config
    }

    /// The storage backend
    pub fn storage(&self) -> &S {
        &self.shared.storage
    }

    /// Whether the persisted log has been loaded
    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Load the persisted log once
    ///
    /// Concurrent callers share a single read. Corrupt or unreadable data is
    /// logged and treated as an empty log. Records logged before the load
    /// completes stay in front of the loaded ones.
    #[instrument(skip(self), fields(key = %self.shared.config.storage_key))]
    pub async fn ensure_loaded(&self) {
        self.runtime_handle();
        self.loaded
            .get_or_init(|| async { self.load_from_storage().await })
            .await;
    }

    async fn load_from_storage(&self) {
        let key = &self.shared.config.storage_key;
        let stored = match self.shared.storage.get_item(key).await {
            Ok(Some(raw)) => parse_stored_logs(&raw),
            Ok(None) => {
                debug!("No stored operation logs, starting fresh");
                Vec::new()
            }
            Err(e) => {
                error!(error = %e, "Failed to load operation logs");
                Vec::new()
            }
        };

        let stored_count = stored.len();
        let mut logs = self.shared.logs.write();
        let recorded_before_load = logs.len();
        logs.extend(stored);
        let evicted = self.shared.config.overflow(logs.len());
        logs.truncate(self.shared.config.max_logs);

        info!(
            loaded = stored_count,
            recorded_before_load,
            evicted,
            total = logs.len(),
            "Loaded operation logs"
        );
    }

    /// Record an operation
    ///
    /// Never fails and never blocks on storage. The new record becomes the
    /// first entry; the oldest entries beyond `max_logs` are evicted.
    pub fn log(&self, action: LogActionType, status: LogStatus, options: LogOptions) {
        let entry = OperationLog::new(action, status, self.clock.now_millis(), options);
        trace!(id = %entry.id, %action, %status, "Recording operation");

        {
            let mut logs = self.shared.logs.write();
            logs.insert(0, entry);

            let overflow = self.shared.config.overflow(logs.len());
            if overflow > 0 {
                logs.truncate(self.shared.config.max_logs);
                debug!(evicted = overflow, "Evicted oldest operation logs");
            }
        }

        self.schedule_save();
    }

    /// Filter, sort and paginate the log
    pub fn query(&self, options: &LogQueryOptions) -> Vec<OperationLog> {
        run_query(&self.shared.logs.read(), options)
    }

    /// Aggregate figures, recomputed on every call
    pub fn statistics(&self) -> LogStatistics {
        compute_statistics(&self.shared.logs.read(), self.clock.today_start_millis())
    }

    /// Remove records and return how many went
    ///
    /// See [`ClearOptions`] for which option wins when several are set.
    pub fn clear_logs(&self, options: &ClearOptions) -> usize {
        let mode = options.mode();
        let removed = {
            let mut logs = self.shared.logs.write();
            let before = logs.len();
            match mode {
                ClearMode::Before(timestamp) => logs.retain(|log| log.timestamp >= timestamp),
                ClearMode::KeepNewest(count) => logs.truncate(count),
                ClearMode::Action(action) => logs.retain(|log| log.action != action),
                ClearMode::All => logs.clear(),
            }
            before - logs.len()
        };

        if removed > 0 {
            info!(removed, ?mode, "Cleared operation logs");
            self.schedule_save();
        }
        removed
    }

    /// Query results as a pretty-printed JSON array
    pub fn export_to_json(&self, options: &LogQueryOptions) -> String {
        export::to_json(&self.query(options)).unwrap_or_else(|e| {
            error!(error = %e, "Failed to export operation logs as JSON");
            "[]".to_string()
        })
    }

    /// Query results as CSV
    pub fn export_to_csv(&self, options: &LogQueryOptions) -> String {
        export::to_csv(&self.query(options))
    }

    /// Query results in the given format
    pub fn export(&self, format: ExportFormat, options: &LogQueryOptions) -> String {
        match format {
            ExportFormat::Json => self.export_to_json(options),
            ExportFormat::Csv => self.export_to_csv(options),
        }
    }

    /// Snapshot of every record, newest first
    pub fn all_logs(&self) -> Vec<OperationLog> {
        self.shared.logs.read().clone()
    }

    /// Number of records in memory
    pub fn len(&self) -> usize {
        self.shared.logs.read().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.shared.logs.read().is_empty()
    }

    /// Persist now instead of waiting for the debounce window
    ///
    /// Replaces any scheduled write. Unlike the debounced path, storage
    /// errors are returned to the caller.
    #[instrument(skip(self), fields(key = %self.shared.config.storage_key))]
    pub async fn flush(&self) -> Result<(), StorageError> {
        if let Some(handle) = self.pending_save.lock().take() {
            handle.abort();
        }
        self.shared.persist().await
    }

    /// The remembered runtime, capturing the current one on first sight
    fn runtime_handle(&self) -> Option<Handle> {
        if let Some(handle) = self.runtime.get() {
            return Some(handle.clone());
        }
        let handle = Handle::try_current().ok()?;
        Some(self.runtime.get_or_init(|| handle).clone())
    }

    fn schedule_save(&self) {
        // A pending write is only replaced, never dropped
        let Some(runtime) = self.runtime_handle() else {
            warn!("No async runtime, operation logs will not be persisted");
            return;
        };

        let mut pending = self.pending_save.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let shared = Arc::clone(&self.shared);
        let delay = shared.config.save_debounce();
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Aborting this timer must not interrupt a write in progress
            tokio::spawn(async move { shared.persist_logged().await });
        }));
    }
}

/// Decode a persisted log, skipping records that fail to decode
fn parse_stored_logs(raw: &str) -> Vec<OperationLog> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "Stored operation logs are not valid JSON, starting fresh");
            return Vec::new();
        }
    };

    let serde_json::Value::Array(items) = value else {
        error!("Stored operation logs are not a JSON array, starting fresh");
        return Vec::new();
    };

    let mut logs = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for item in items {
        match serde_json::from_value::<OperationLog>(item) {
            Ok(log) => logs.push(log),
            Err(e) => {
                skipped += 1;
                warn!(error = %e, "Failed to decode stored operation log, skipping");
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, kept = logs.len(), "Dropped undecodable operation logs");
    }
    logs
}
