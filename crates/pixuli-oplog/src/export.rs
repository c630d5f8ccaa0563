//! JSON and CSV rendering of query results
//!
//! JSON keeps integer millisecond timestamps; CSV renders them as ISO 8601
//! UTC strings. Front ends depend on both shapes.

use chrono::SecondsFormat;

use crate::error::StorageError;
use crate::model::OperationLog;

/// CSV header row, in column order
pub const CSV_HEADERS: [&str; 9] = [
    "ID",
    "Action",
    "Status",
    "Timestamp",
    "Image ID",
    "Image Name",
    "Error",
    "Duration (ms)",
    "Details",
];

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Pretty-printed (two-space indented) JSON array
pub fn to_json(logs: &[OperationLog]) -> Result<String, StorageError> {
    serde_json::to_string_pretty(logs).map_err(|e| StorageError::serialization(e.to_string()))
}

/// CSV document: header plus one row per record, every cell quoted
pub fn to_csv(logs: &[OperationLog]) -> String {
    std::iter::once(CSV_HEADERS.map(str::to_string).to_vec())
        .chain(logs.iter().map(csv_row))
        .map(|row| {
            row.iter()
                .map(|cell| quote_cell(cell))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn csv_row(log: &OperationLog) -> Vec<String> {
    vec![
        log.id.clone(),
        log.action.to_string(),
        log.status.to_string(),
        iso_timestamp(log.timestamp),
        log.image_id.clone().unwrap_or_default(),
        log.image_name.clone().unwrap_or_default(),
        log.error.clone().unwrap_or_default(),
        log.duration.map(|d| d.to_string()).unwrap_or_default(),
        log.details_json().unwrap_or_default(),
    ]
}

fn quote_cell(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// `2024-01-02T03:04:05.678Z`; out-of-range values fall back to the raw number
pub fn iso_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

/// Default export file name, e.g. `pixuli-logs-2024-01-02T03-04-05-678Z.csv`
pub fn export_file_name(format: ExportFormat, now: chrono::DateTime<chrono::Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("pixuli-logs-{stamp}.{}", format.extension())
}
