//! Behavioural tests for the operation log service
//!
//! These tests drive the service through its public API only: recording,
//! querying, clearing, exporting, loading and the debounced write path.

use std::sync::Arc;
use std::time::Duration;

use pixuli_oplog::{
    ClearOptions, DEFAULT_STORAGE_KEY, FileLogStorage, InMemoryLogStorage, LogActionType,
    LogFilter, LogOptions, LogQueryOptions, LogStatus, ManualClock, OperationLog,
    OperationLogConfig, OperationLogService, SortBy, SortOrder,
};
use tempfile::TempDir;

type MemoryService = OperationLogService<Arc<InMemoryLogStorage>>;

fn memory_service(max_logs: usize) -> (MemoryService, Arc<InMemoryLogStorage>) {
    let storage = Arc::new(InMemoryLogStorage::new());
    let config = OperationLogConfig::builder().max_logs(max_logs).build();
    (
        OperationLogService::with_config(storage.clone(), config),
        storage,
    )
}

fn stored_logs(storage: &InMemoryLogStorage) -> Vec<OperationLog> {
    let raw = storage.item(DEFAULT_STORAGE_KEY).expect("nothing persisted");
    serde_json::from_str(&raw).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

/// Cap of two keeps the two newest records
#[tokio::test]
async fn test_cap_evicts_oldest() {
    let (service, _) = memory_service(2);

    service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());
    service.log(LogActionType::Delete, LogStatus::Failed, LogOptions::new());
    service.log(LogActionType::Compress, LogStatus::Success, LogOptions::new());

    let logs = service.all_logs();
    assert_eq!(logs.len(), 2);
    let actions: Vec<_> = logs.iter().map(|log| log.action).collect();
    assert_eq!(actions, [LogActionType::Compress, LogActionType::Delete]);
}

#[tokio::test]
async fn test_success_rate_two_thirds() {
    let (service, _) = memory_service(100);

    service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());
    service.log(LogActionType::Upload, LogStatus::Failed, LogOptions::new());
    service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());

    assert_eq!(service.statistics().success_rate, 66.67);
}

#[tokio::test]
async fn test_clear_by_action() {
    let (service, _) = memory_service(100);

    service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());
    service.log(LogActionType::Delete, LogStatus::Success, LogOptions::new());
    service.log(LogActionType::Upload, LogStatus::Failed, LogOptions::new());

    let removed = service.clear_logs(&ClearOptions::action(LogActionType::Upload));
    assert_eq!(removed, 2);

    let remaining = service.all_logs();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].action, LogActionType::Delete);
}

#[tokio::test]
async fn test_concurrent_loads_read_once() {
    let storage = Arc::new(
        InMemoryLogStorage::new()
            .with_read_delay(Duration::from_millis(50))
            .with_item(
                DEFAULT_STORAGE_KEY,
                r#"[{"id": "1-a", "action": "upload", "status": "success", "timestamp": 1}]"#,
            ),
    );
    let service = OperationLogService::new(storage.clone());

    tokio::join!(service.ensure_loaded(), service.ensure_loaded());
    service.ensure_loaded().await;

    assert_eq!(storage.read_count(), 1);
    assert!(service.is_loaded());
    assert_eq!(service.len(), 1);
}

// ============================================================================
// Invariants
// ============================================================================

#[tokio::test]
async fn test_length_never_exceeds_cap() {
    let (service, _) = memory_service(25);

    for i in 0..200 {
        let action = LogActionType::ALL[i % LogActionType::ALL.len()];
        service.log(action, LogStatus::Success, LogOptions::new());
        assert!(service.len() <= 25);
    }
    assert_eq!(service.len(), 25);
}

#[tokio::test]
async fn test_newest_record_is_first() {
    let (service, _) = memory_service(100);

    for i in 0..10 {
        service.log(
            LogActionType::Edit,
            LogStatus::Success,
            LogOptions::new().image_id(format!("img-{i}")),
        );
        assert_eq!(service.all_logs()[0].image_id, Some(format!("img-{i}")));
    }
}

#[tokio::test]
async fn test_timestamp_sort_directions() {
    let clock = Arc::new(ManualClock::new(10_000));
    let (service, _) = memory_service(100);
    let service = service.with_clock(clock.clone());

    for step in [5, 0, 30, 1, 0, 12] {
        clock.advance(step);
        service.log(LogActionType::Convert, LogStatus::Success, LogOptions::new());
    }

    let asc = service.query(&LogQueryOptions::new().sort_order(SortOrder::Asc));
    assert!(asc.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));

    let desc = service.query(&LogQueryOptions::new().sort_order(SortOrder::Desc));
    assert!(desc.windows(2).all(|pair| pair[0].timestamp >= pair[1].timestamp));
}

#[tokio::test]
async fn test_clear_all_returns_prior_length() {
    let (service, _) = memory_service(100);
    for _ in 0..7 {
        service.log(LogActionType::Analyze, LogStatus::Pending, LogOptions::new());
    }

    assert_eq!(service.clear_logs(&ClearOptions::all()), 7);
    assert!(service.is_empty());
}

#[tokio::test]
async fn test_keep_count_keeps_newest() {
    let (service, _) = memory_service(100);
    for i in 0..6 {
        service.log(
            LogActionType::Upload,
            LogStatus::Success,
            LogOptions::new().image_id(i.to_string()),
        );
    }
    let newest: Vec<_> = service.all_logs().into_iter().take(4).collect();

    assert_eq!(service.clear_logs(&ClearOptions::keep(4)), 2);
    assert_eq!(service.all_logs(), newest);

    // Keeping more than exist removes nothing
    assert_eq!(service.clear_logs(&ClearOptions::keep(10)), 0);
    assert_eq!(service.len(), 4);
}

#[tokio::test]
async fn test_clear_before_takes_priority() {
    let clock = Arc::new(ManualClock::new(0));
    let (service, _) = memory_service(100);
    let service = service.with_clock(clock.clone());

    for _ in 0..4 {
        service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());
        clock.advance(10);
    }
    // Timestamps 0, 10, 20, 30

    let options = ClearOptions {
        before_timestamp: Some(20),
        keep_count: Some(0),
        action: Some(LogActionType::Upload),
    };
    assert_eq!(service.clear_logs(&options), 2);
    let remaining: Vec<_> = service.all_logs().iter().map(|log| log.timestamp).collect();
    assert_eq!(remaining, [30, 20]);
}

#[tokio::test]
async fn test_statistics_totals_agree() {
    let (service, _) = memory_service(100);
    for i in 0..31 {
        service.log(
            LogActionType::ALL[i % LogActionType::ALL.len()],
            LogStatus::ALL[i % LogStatus::ALL.len()],
            LogOptions::new(),
        );
    }
    service.clear_logs(&ClearOptions::action(LogActionType::Edit));

    let stats = service.statistics();
    assert_eq!(stats.total, service.all_logs().len());
    assert_eq!(stats.by_action.values().sum::<usize>(), stats.total);
    assert_eq!(stats.by_status.values().sum::<usize>(), stats.total);
    assert_eq!(stats.by_action[&LogActionType::Edit], 0);
}

#[tokio::test]
async fn test_today_count_excludes_older_records() {
    let now = chrono::Utc::now().timestamp_millis();
    let two_days_ago = now - 2 * 24 * 60 * 60 * 1000;
    let seed = format!(
        r#"[{{"id": "old", "action": "upload", "status": "success", "timestamp": {two_days_ago}}}]"#
    );
    let storage = Arc::new(InMemoryLogStorage::new().with_item(DEFAULT_STORAGE_KEY, seed));
    let service = OperationLogService::new(storage);
    service.ensure_loaded().await;

    service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());

    let stats = service.statistics();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.today_count, 1);
}

// ============================================================================
// Query & Export
// ============================================================================

#[tokio::test]
async fn test_keyword_search() {
    let (service, _) = memory_service(100);
    service.log(
        LogActionType::Upload,
        LogStatus::Success,
        LogOptions::new().image_name("Holiday-Beach.JPG"),
    );
    service.log(
        LogActionType::Upload,
        LogStatus::Failed,
        LogOptions::new().error("GitHub API rate limit"),
    );
    service.log(
        LogActionType::ConfigChange,
        LogStatus::Success,
        LogOptions::new().detail("platform", "Gitee"),
    );

    let search = |keyword: &str| {
        service
            .query(&LogQueryOptions::new().filter(LogFilter::new().keyword(keyword)))
            .len()
    };
    assert_eq!(search("beach"), 1);
    assert_eq!(search("RATE LIMIT"), 1);
    assert_eq!(search("gitee"), 1);
    assert_eq!(search("git"), 2);
    assert_eq!(search("nothing-here"), 0);
}

#[tokio::test]
async fn test_paged_query_by_action() {
    let (service, _) = memory_service(100);
    for action in [
        LogActionType::Upload,
        LogActionType::Delete,
        LogActionType::Analyze,
        LogActionType::Compress,
    ] {
        service.log(action, LogStatus::Success, LogOptions::new());
    }

    let options = LogQueryOptions::new()
        .sort_by(SortBy::Action)
        .sort_order(SortOrder::Asc)
        .offset(1)
        .limit(2);
    let page: Vec<_> = service.query(&options).iter().map(|log| log.action).collect();
    assert_eq!(page, [LogActionType::Compress, LogActionType::Delete]);
}

#[tokio::test]
async fn test_csv_line_count_and_quoting() {
    let (service, _) = memory_service(100);
    service.log(
        LogActionType::Edit,
        LogStatus::Failed,
        LogOptions::new().error(r#"bad "quote""#),
    );
    service.log(LogActionType::Edit, LogStatus::Success, LogOptions::new());

    let options = LogQueryOptions::new();
    let csv = service.export_to_csv(&options);

    assert_eq!(csv.split('\n').count(), 1 + service.query(&options).len());
    assert!(csv.contains(r#""bad ""quote""""#));
}

#[tokio::test]
async fn test_json_export_parses_back_to_query() {
    let (service, _) = memory_service(100);
    service.log(
        LogActionType::BatchUpload,
        LogStatus::Success,
        LogOptions::new()
            .detail("count", 12)
            .detail("names", serde_json::json!(["a.png", "b.png"]))
            .duration(3_400)
            .user_id("u-1"),
    );
    service.log(LogActionType::BatchDelete, LogStatus::Pending, LogOptions::new());

    for options in [
        LogQueryOptions::new(),
        LogQueryOptions::new().sort_order(SortOrder::Asc),
        LogQueryOptions::new().filter(LogFilter::new().status(LogStatus::Pending)),
        LogQueryOptions::new().limit(1),
    ] {
        let parsed: Vec<OperationLog> =
            serde_json::from_str(&service.export_to_json(&options)).unwrap();
        assert_eq!(parsed, service.query(&options));
    }
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_load_normalizes_legacy_timestamps() {
    let seed = r#"[
        {"id": "2", "action": "delete", "status": "failed", "timestamp": "2024-01-02T03:04:05.678Z"},
        {"id": "1", "action": "upload", "status": "success", "timestamp": 1704067200000, "imageName": "x.png"}
    ]"#;
    let storage = Arc::new(InMemoryLogStorage::new().with_item(DEFAULT_STORAGE_KEY, seed));
    let service = OperationLogService::new(storage);
    service.ensure_loaded().await;

    let logs = service.all_logs();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].timestamp, 1_704_164_645_678);
    assert_eq!(logs[1].image_name.as_deref(), Some("x.png"));
}

#[tokio::test]
async fn test_corrupt_storage_loads_empty() {
    for seed in ["{not json", r#"{"id": "1"}"#, "42"] {
        let storage = Arc::new(InMemoryLogStorage::new().with_item(DEFAULT_STORAGE_KEY, seed));
        let service = OperationLogService::new(storage);
        service.ensure_loaded().await;

        assert!(service.is_loaded());
        assert!(service.is_empty());
    }
}

#[tokio::test]
async fn test_records_before_load_are_kept_in_front() {
    let seed = r#"[{"id": "old", "action": "upload", "status": "success", "timestamp": 1}]"#;
    let storage = Arc::new(InMemoryLogStorage::new().with_item(DEFAULT_STORAGE_KEY, seed));
    let service = OperationLogService::new(storage);

    service.log(LogActionType::Delete, LogStatus::Success, LogOptions::new());
    service.ensure_loaded().await;

    let logs = service.all_logs();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].action, LogActionType::Delete);
    assert_eq!(logs[1].id, "old");
}

#[tokio::test]
async fn test_load_respects_cap() {
    let seed: Vec<_> = (0..10)
        .map(|i| {
            serde_json::json!({
                "id": format!("{i}"),
                "action": "upload",
                "status": "success",
                "timestamp": 100 - i,
            })
        })
        .collect();
    let storage = Arc::new(
        InMemoryLogStorage::new()
            .with_item(DEFAULT_STORAGE_KEY, serde_json::to_string(&seed).unwrap()),
    );
    let config = OperationLogConfig::builder().max_logs(3).build();
    let service = OperationLogService::with_config(storage, config);
    service.ensure_loaded().await;

    let ids: Vec<_> = service.all_logs().into_iter().map(|log| log.id).collect();
    assert_eq!(ids, ["0", "1", "2"]);
}

// ============================================================================
// Debounced Persistence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_produces_single_write_after_quiet_period() {
    let (service, storage) = memory_service(100);

    for _ in 0..5 {
        service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // Last call was 100ms ago; the write is due 400ms from now
    tokio::time::sleep(Duration::from_millis(399)).await;
    assert_eq!(storage.write_count(), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(storage.write_count(), 1);
    assert_eq!(stored_logs(&storage).len(), 5);

    // Nothing further without new mutations
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(storage.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_write_reflects_state_when_timer_fires() {
    let (service, storage) = memory_service(100);

    service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());
    tokio::time::sleep(Duration::from_millis(200)).await;
    service.log(LogActionType::Delete, LogStatus::Success, LogOptions::new());
    service.clear_logs(&ClearOptions::action(LogActionType::Upload));

    tokio::time::sleep(Duration::from_millis(600)).await;
    let persisted = stored_logs(&storage);
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].action, LogActionType::Delete);
}

#[tokio::test(start_paused = true)]
async fn test_noop_clear_does_not_schedule_write() {
    let (service, storage) = memory_service(100);

    assert_eq!(service.clear_logs(&ClearOptions::all()), 0);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(storage.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_is_absorbed_and_retried_next_cycle() {
    let (service, storage) = memory_service(100);
    storage.set_fail_writes(true);

    service.log(LogActionType::Compress, LogStatus::Failed, LogOptions::new());
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(storage.write_count(), 1);
    assert!(storage.item(DEFAULT_STORAGE_KEY).is_none());
    assert_eq!(service.len(), 1);

    storage.set_fail_writes(false);
    service.log(LogActionType::Compress, LogStatus::Success, LogOptions::new());
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(stored_logs(&storage).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_flush_replaces_pending_write() {
    let (service, storage) = memory_service(100);

    service.log(LogActionType::Edit, LogStatus::Success, LogOptions::new());
    service.flush().await.unwrap();
    assert_eq!(storage.write_count(), 1);

    // The aborted timer never fires
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(storage.write_count(), 1);
}

#[tokio::test]
async fn test_flush_surfaces_storage_errors() {
    let (service, storage) = memory_service(100);
    storage.set_fail_writes(true);

    service.log(LogActionType::Edit, LogStatus::Success, LogOptions::new());
    assert!(service.flush().await.is_err());
    assert_eq!(service.len(), 1);
}

/// Mutations from threads outside the runtime reuse the runtime seen earlier
#[tokio::test(start_paused = true)]
async fn test_log_from_foreign_thread_keeps_write_scheduled() {
    let (service, storage) = memory_service(100);
    let service = Arc::new(service);

    service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());

    let ui_thread = {
        let service = Arc::clone(&service);
        std::thread::spawn(move || {
            service.log(LogActionType::Delete, LogStatus::Success, LogOptions::new());
        })
    };
    ui_thread.join().unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(storage.write_count(), 1);

    let persisted = stored_logs(&storage);
    let actions: Vec<_> = persisted.iter().map(|log| log.action).collect();
    assert_eq!(actions, [LogActionType::Delete, LogActionType::Upload]);
}

// ============================================================================
// Quota Fallback
// ============================================================================

fn quota_service(prune_to: Option<usize>) -> (MemoryService, Arc<InMemoryLogStorage>) {
    // Room for a handful of records only
    let storage = Arc::new(InMemoryLogStorage::with_capacity(600));
    let mut builder = OperationLogConfig::builder();
    if let Some(keep) = prune_to {
        builder = builder.quota_prune_to(keep);
    }
    (
        OperationLogService::with_config(storage.clone(), builder.build()),
        storage,
    )
}

#[tokio::test]
async fn test_quota_error_is_dropped_by_default() {
    let (service, storage) = quota_service(None);
    for _ in 0..20 {
        service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());
    }

    let err = service.flush().await.unwrap_err();
    assert!(err.is_quota_exceeded());
    assert_eq!(service.len(), 20);
    assert!(storage.item(DEFAULT_STORAGE_KEY).is_none());
}

#[tokio::test]
async fn test_quota_prune_and_retry_when_enabled() {
    let (service, storage) = quota_service(Some(2));
    for _ in 0..20 {
        service.log(LogActionType::Upload, LogStatus::Success, LogOptions::new());
    }
    let newest = service.all_logs()[0].clone();

    service.flush().await.unwrap();
    assert_eq!(service.len(), 2);
    assert_eq!(service.all_logs()[0], newest);
    assert_eq!(stored_logs(&storage).len(), 2);
    assert_eq!(storage.write_count(), 2);
}

// ============================================================================
// File Storage
// ============================================================================

#[tokio::test]
async fn test_file_storage_round_trip_across_instances() {
    let temp_dir = TempDir::new().unwrap();

    {
        let storage = FileLogStorage::new(temp_dir.path()).await.unwrap();
        let service = OperationLogService::new(storage);
        service.ensure_loaded().await;
        service.log(
            LogActionType::Upload,
            LogStatus::Success,
            LogOptions::new().image_name("first.png"),
        );
        service.log(LogActionType::Delete, LogStatus::Failed, LogOptions::new().error("404"));
        service.flush().await.unwrap();
    }

    let storage = FileLogStorage::new(temp_dir.path()).await.unwrap();
    let service = OperationLogService::new(storage);
    service.ensure_loaded().await;

    let logs = service.all_logs();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].error.as_deref(), Some("404"));
    assert_eq!(logs[1].image_name.as_deref(), Some("first.png"));
}

#[tokio::test]
async fn test_custom_storage_key_file() {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileLogStorage::new(temp_dir.path()).await.unwrap();
    let config = OperationLogConfig::new("mobile-logs", 100);
    let service = OperationLogService::with_config(storage.clone(), config);

    service.log(LogActionType::Analyze, LogStatus::Success, LogOptions::new());
    service.flush().await.unwrap();

    assert!(storage.path_for("mobile-logs").exists());
    assert!(!storage.path_for(DEFAULT_STORAGE_KEY).exists());
}

// ============================================================================
// Stress
// ============================================================================

/// Many tasks logging at once never break the cap or lose the newest record
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logging_under_cap() {
    const NUM_TASKS: usize = 16;
    const LOGS_PER_TASK: usize = 250;

    let (service, storage) = memory_service(1_000);
    let service = Arc::new(service);

    let handles: Vec<_> = (0..NUM_TASKS)
        .map(|task| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                for i in 0..LOGS_PER_TASK {
                    service.log(
                        LogActionType::ALL[(task + i) % LogActionType::ALL.len()],
                        LogStatus::Success,
                        LogOptions::new().image_id(format!("{task}-{i}")),
                    );
                    assert!(service.len() <= 1_000);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(service.len(), 1_000);
    let stats = service.statistics();
    assert_eq!(stats.total, 1_000);
    assert_eq!(stats.success_rate, 100.0);

    service.flush().await.unwrap();
    assert_eq!(stored_logs(&storage), service.all_logs());
}
