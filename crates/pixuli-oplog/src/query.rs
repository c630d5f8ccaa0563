//! Filter, sort and paginate pipeline over a slice of records

use std::cmp::Ordering;

use crate::model::{LogFilter, LogQueryOptions, OperationLog, SortBy, SortOrder};

/// Run the full query pipeline over `logs`
///
/// Filtering keeps the input order, sorting is stable (ties keep their
/// filtered order), and pagination slices the sorted result.
pub fn run_query(logs: &[OperationLog], options: &LogQueryOptions) -> Vec<OperationLog> {
    let mut result: Vec<OperationLog> = match &options.filter {
        Some(filter) => logs.iter().filter(|log| matches_filter(log, filter)).cloned().collect(),
        None => logs.to_vec(),
    };

    sort_logs(&mut result, options.sort_by, options.sort_order);
    paginate(result, options.offset, options.limit)
}

/// Whether `log` satisfies every populated field of `filter`
pub fn matches_filter(log: &OperationLog, filter: &LogFilter) -> bool {
    if let Some(actions) = &filter.actions
        && !actions.contains(&log.action)
    {
        return false;
    }
    if let Some(statuses) = &filter.statuses
        && !statuses.contains(&log.status)
    {
        return false;
    }
    if filter.start_time.is_some_and(|start| log.timestamp < start) {
        return false;
    }
    if filter.end_time.is_some_and(|end| log.timestamp > end) {
        return false;
    }
    if let Some(image_id) = &filter.image_id
        && log.image_id.as_ref() != Some(image_id)
    {
        return false;
    }
    if let Some(keyword) = &filter.keyword
        && !searchable_text(log).contains(&keyword.to_lowercase())
    {
        return false;
    }
    true
}

/// Lowercased text the keyword filter searches: image name, error and
/// serialized details, empty fields skipped, joined by single spaces
fn searchable_text(log: &OperationLog) -> String {
    [log.image_name.clone(), log.error.clone(), log.details_json()]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable in-place sort
pub fn sort_logs(logs: &mut [OperationLog], sort_by: SortBy, sort_order: SortOrder) {
    logs.sort_by(|a, b| {
        let ordering = compare(a, b, sort_by);
        match sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn compare(a: &OperationLog, b: &OperationLog, sort_by: SortBy) -> Ordering {
    match sort_by {
        SortBy::Timestamp => a.timestamp.cmp(&b.timestamp),
        // Actions and statuses order by their wire strings
        SortBy::Action => a.action.as_str().cmp(b.action.as_str()),
        SortBy::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

/// Slice `offset..offset + limit`; without a limit the input is returned whole
pub fn paginate(
    logs: Vec<OperationLog>,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Vec<OperationLog> {
    match limit {
        Some(limit) => logs
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(limit)
            .collect(),
        None => logs,
    }
}
