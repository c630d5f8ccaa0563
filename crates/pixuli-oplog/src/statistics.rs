//! Aggregate statistics over a set of records

use crate::model::{LogActionType, LogStatistics, LogStatus, OperationLog};

/// Recompute statistics from scratch
///
/// `today_start_millis` is local midnight of the current day; records at or
/// after it count towards `today_count`.
pub fn compute_statistics(logs: &[OperationLog], today_start_millis: i64) -> LogStatistics {
    let mut by_action: std::collections::BTreeMap<_, _> =
        LogActionType::ALL.iter().map(|action| (*action, 0)).collect();
    let mut by_status: std::collections::BTreeMap<_, _> =
        LogStatus::ALL.iter().map(|status| (*status, 0)).collect();
    let mut today_count = 0;

    for log in logs {
        *by_action.entry(log.action).or_insert(0) += 1;
        *by_status.entry(log.status).or_insert(0) += 1;
        if log.timestamp >= today_start_millis {
            today_count += 1;
        }
    }

    let total = logs.len();
    let successes = by_status.get(&LogStatus::Success).copied().unwrap_or(0);

    LogStatistics {
        total,
        by_action,
        by_status,
        today_count,
        success_rate: success_rate(successes, total),
    }
}

/// Percentage rounded to two decimals, 0 for an empty log
fn success_rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (successes as f64 / total as f64 * 10_000.0).round() / 100.0
}
