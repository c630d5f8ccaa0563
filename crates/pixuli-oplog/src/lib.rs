//! # Pixuli Operation Log
//!
//! A bounded, queryable activity log for the Pixuli image manager.
//!
//! Every front end (web, desktop, mobile) records the same operations
//! (uploads, deletions, compressions, config changes...) through one
//! [`OperationLogService`]. The service keeps the log in memory, answers
//! queries and statistics synchronously, and persists through whatever
//! key/value store the platform provides.
//!
//! ## Features
//!
//! - **OperationLogStorage trait**: minimal async key/value contract for persistence
//! - **InMemoryLogStorage**: in-memory backend for tests and simulation, with quota modelling
//! - **FileLogStorage**: one-file-per-key backend for desktop hosts
//! - **OperationLogService**: capped log with filter/sort/paginate, statistics, JSON/CSV export
//! - **Debounced persistence**: bursts of mutations collapse into a single write
//!
//! ## Example
//!
//! ```rust,ignore
//! use pixuli_oplog::{
//!     InMemoryLogStorage, LogActionType, LogFilter, LogOptions, LogQueryOptions, LogStatus,
//!     OperationLogService,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = OperationLogService::new(InMemoryLogStorage::new());
//!     service.ensure_loaded().await;
//!
//!     service.log(
//!         LogActionType::Upload,
//!         LogStatus::Success,
//!         LogOptions::new().image_name("sunset.png").duration(840),
//!     );
//!
//!     let uploads = service.query(
//!         &LogQueryOptions::new().filter(LogFilter::new().action(LogActionType::Upload)),
//!     );
//!     assert_eq!(uploads.len(), 1);
//!
//!     // Persist now rather than after the debounce window
//!     service.flush().await.unwrap();
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod memory;
pub mod model;
pub mod persistent;
pub mod query;
pub mod service;
pub mod statistics;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DEFAULT_MAX_LOGS, DEFAULT_SAVE_DEBOUNCE_MS, DEFAULT_STORAGE_KEY, OperationLogConfig,
    OperationLogConfigBuilder,
};
pub use error::{ParseEnumError, StorageError};
pub use export::{CSV_HEADERS, ExportFormat};
pub use memory::InMemoryLogStorage;
pub use model::{
    ClearOptions, LogActionType, LogDetails, LogFilter, LogOptions, LogQueryOptions,
    LogStatistics, LogStatus, OperationLog, SortBy, SortOrder,
};
pub use persistent::FileLogStorage;
pub use service::OperationLogService;

use std::sync::Arc;

use async_trait::async_trait;

/// Async key/value contract the operation log persists through
///
/// Each platform supplies one implementation (browser storage, a mobile
/// async store, a desktop file). The service never branches on which one is
/// in use.
///
/// There is no atomicity across calls and no notification of external
/// changes. Both operations may fail; the service logs failures instead of
/// surfacing them.
#[async_trait]
pub trait OperationLogStorage: Send + Sync {
    /// Read the value stored under `key`
    ///
    /// # Returns
    ///
    /// `None` if nothing was ever written under `key`.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QuotaExceeded`] when the store is full, or
    /// another variant for backend failures.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: OperationLogStorage + ?Sized> OperationLogStorage for Arc<T> {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the OperationLogStorage trait is object-safe
    fn _assert_object_safe(_: &dyn OperationLogStorage) {}

    #[tokio::test]
    async fn test_shared_storage_through_arc() {
        let backend = Arc::new(InMemoryLogStorage::new());
        let service = OperationLogService::new(backend.clone());

        service.log(LogActionType::Analyze, LogStatus::Success, LogOptions::new());
        service.flush().await.unwrap();

        // The caller's handle sees the service's write
        let stored = backend.item(DEFAULT_STORAGE_KEY).unwrap();
        assert!(stored.contains("\"analyze\""));
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_dyn_storage() {
        let backend: Arc<dyn OperationLogStorage> = Arc::new(InMemoryLogStorage::new());
        let service = OperationLogService::new(backend);

        service.ensure_loaded().await;
        service.log(LogActionType::Edit, LogStatus::Pending, LogOptions::new());
        service.flush().await.unwrap();
        assert_eq!(service.len(), 1);
    }
}
