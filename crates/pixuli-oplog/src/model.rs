//! Operation log record model
//!
//! Records, the action/status enumerations, and the value types used to
//! query, clear and summarise the log. Everything here serializes to the
//! wire format shared by all Pixuli front ends: camelCase field names,
//! snake_case enum strings, integer millisecond timestamps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ParseEnumError;

/// Free-form details attached to a record.
///
/// Keys are kept sorted so the serialized form (and the keyword search over
/// it) is deterministic.
pub type LogDetails = BTreeMap<String, serde_json::Value>;

/// Kind of operation a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogActionType {
    Upload,
    Delete,
    Edit,
    Compress,
    Convert,
    Analyze,
    ConfigChange,
    BatchUpload,
    BatchDelete,
}

impl LogActionType {
    /// Every action, in declaration order
    pub const ALL: [LogActionType; 9] = [
        LogActionType::Upload,
        LogActionType::Delete,
        LogActionType::Edit,
        LogActionType::Compress,
        LogActionType::Convert,
        LogActionType::Analyze,
        LogActionType::ConfigChange,
        LogActionType::BatchUpload,
        LogActionType::BatchDelete,
    ];

    /// The wire string for this action
    pub fn as_str(&self) -> &'static str {
        match self {
            LogActionType::Upload => "upload",
            LogActionType::Delete => "delete",
            LogActionType::Edit => "edit",
            LogActionType::Compress => "compress",
            LogActionType::Convert => "convert",
            LogActionType::Analyze => "analyze",
            LogActionType::ConfigChange => "config_change",
            LogActionType::BatchUpload => "batch_upload",
            LogActionType::BatchDelete => "batch_delete",
        }
    }
}

impl fmt::Display for LogActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogActionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Outcome of a recorded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Failed,
    Pending,
}

impl LogStatus {
    /// Every status, in declaration order
    pub const ALL: [LogStatus; 3] = [LogStatus::Success, LogStatus::Failed, LogStatus::Pending];

    /// The wire string for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
            LogStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "status",
                value: s.to_string(),
            })
    }
}

/// A single recorded operation
///
/// Records are immutable once created; the service only ever adds or
/// removes whole records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLog {
    /// Unique identifier (`<millis>-<random base36>`)
    pub id: String,
    /// What was done
    pub action: LogActionType,
    /// How it went
    pub status: LogStatus,
    /// Creation time in milliseconds since the Unix epoch
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    /// A stored value that is not a JSON object loads as `None`
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_details"
    )]
    pub details: Option<LogDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Duration of the operation in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl OperationLog {
    /// Create a record stamped with `timestamp_millis` and a fresh id
    pub fn new(
        action: LogActionType,
        status: LogStatus,
        timestamp_millis: i64,
        options: LogOptions,
    ) -> Self {
        Self {
            id: generate_id(timestamp_millis),
            action,
            status,
            timestamp: timestamp_millis,
            user_id: options.user_id,
            image_id: options.image_id,
            image_name: options.image_name,
            details: options.details,
            error: options.error,
            duration: options.duration,
        }
    }

    /// Creation time as a UTC datetime
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Compact JSON of the details map, if any
    pub fn details_json(&self) -> Option<String> {
        self.details
            .as_ref()
            .and_then(|details| serde_json::to_string(details).ok())
    }
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

fn generate_id(timestamp_millis: i64) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{timestamp_millis}-{suffix}")
}

/// Accepts integer, float or date-string timestamps.
///
/// Older front ends persisted ISO strings; everything is normalized to
/// integer milliseconds on load.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct TimestampVisitor;

    impl Visitor<'_> for TimestampVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a millisecond timestamp or an ISO 8601 date string")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom(format!("timestamp {v} out of range")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.is_finite() {
                Ok(v.trunc() as i64)
            } else {
                Err(E::custom("timestamp is not a finite number"))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            parse_timestamp_str(v).ok_or_else(|| E::custom(format!("invalid timestamp '{v}'")))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

/// Keeps the record when its details bag has the wrong shape
fn deserialize_details<'de, D>(deserializer: D) -> Result<Option<LogDetails>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Object(map) => Ok(Some(map.into_iter().collect())),
        _ => Ok(None),
    }
}

fn parse_timestamp_str(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(millis) = value.parse::<i64>() {
        return Some(millis);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Optional fields supplied when recording an operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogOptions {
    pub user_id: Option<String>,
    pub image_id: Option<String>,
    pub image_name: Option<String>,
    pub details: Option<LogDetails>,
    pub error: Option<String>,
    pub duration: Option<u64>,
}

impl LogOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn image_name(mut self, image_name: impl Into<String>) -> Self {
        self.image_name = Some(image_name.into());
        self
    }

    /// Add one entry to the details map
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details
            .get_or_insert_with(LogDetails::new)
            .insert(key.into(), value.into());
        self
    }

    /// Replace the whole details map
    pub fn details(mut self, details: LogDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set the duration in milliseconds
    pub fn duration(mut self, duration_millis: u64) -> Self {
        self.duration = Some(duration_millis);
        self
    }
}

/// Predicate bundle for [`query`](crate::OperationLogService::query)
///
/// Every populated field must match. A `Some` list matches records whose
/// value is in the list, so an empty list matches nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub actions: Option<Vec<LogActionType>>,
    pub statuses: Option<Vec<LogStatus>>,
    /// Inclusive lower bound, milliseconds
    pub start_time: Option<i64>,
    /// Inclusive upper bound, milliseconds
    pub end_time: Option<i64>,
    pub image_id: Option<String>,
    /// Case-insensitive substring over image name, error and details
    pub keyword: Option<String>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a single action
    pub fn action(mut self, action: LogActionType) -> Self {
        self.actions = Some(vec![action]);
        self
    }

    /// Match any of the given actions
    pub fn actions(mut self, actions: impl IntoIterator<Item = LogActionType>) -> Self {
        self.actions = Some(actions.into_iter().collect());
        self
    }

    /// Match a single status
    pub fn status(mut self, status: LogStatus) -> Self {
        self.statuses = Some(vec![status]);
        self
    }

    /// Match any of the given statuses
    pub fn statuses(mut self, statuses: impl IntoIterator<Item = LogStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn start_time(mut self, millis: i64) -> Self {
        self.start_time = Some(millis);
        self
    }

    pub fn end_time(mut self, millis: i64) -> Self {
        self.end_time = Some(millis);
        self
    }

    pub fn image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }
}

/// Field to order query results by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Timestamp,
    Action,
    Status,
}

/// Direction of the sort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Options for [`query`](crate::OperationLogService::query) and the exports
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogQueryOptions {
    pub filter: Option<LogFilter>,
    pub limit: Option<usize>,
    /// Only honoured together with `limit`
    pub offset: Option<usize>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl LogQueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: LogFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn sort_order(mut self, sort_order: SortOrder) -> Self {
        self.sort_order = sort_order;
        self
    }
}

/// Options for [`clear_logs`](crate::OperationLogService::clear_logs)
///
/// When several fields are set only one applies, in priority order
/// `before_timestamp`, `keep_count`, `action`. No field set clears everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearOptions {
    /// Drop records strictly older than this timestamp
    pub before_timestamp: Option<i64>,
    /// Keep only this many of the newest records
    pub keep_count: Option<usize>,
    /// Drop every record with this action
    pub action: Option<LogActionType>,
}

impl ClearOptions {
    /// Clear everything
    pub fn all() -> Self {
        Self::default()
    }

    pub fn before(timestamp_millis: i64) -> Self {
        Self {
            before_timestamp: Some(timestamp_millis),
            ..Self::default()
        }
    }

    pub fn keep(count: usize) -> Self {
        Self {
            keep_count: Some(count),
            ..Self::default()
        }
    }

    pub fn action(action: LogActionType) -> Self {
        Self {
            action: Some(action),
            ..Self::default()
        }
    }

    /// The removal mode these options select
    pub(crate) fn mode(&self) -> ClearMode {
        if let Some(before) = self.before_timestamp {
            ClearMode::Before(before)
        } else if let Some(count) = self.keep_count {
            ClearMode::KeepNewest(count)
        } else if let Some(action) = self.action {
            ClearMode::Action(action)
        } else {
            ClearMode::All
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClearMode {
    Before(i64),
    KeepNewest(usize),
    Action(LogActionType),
    All,
}

/// Aggregate figures over the whole in-memory log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStatistics {
    pub total: usize,
    /// Count per action; every action is present, zero when unused
    pub by_action: BTreeMap<LogActionType, usize>,
    /// Count per status; every status is present, zero when unused
    pub by_status: BTreeMap<LogStatus, usize>,
    /// Records at or after local midnight today
    pub today_count: usize,
    /// Percentage of successful records, two decimals, 0 when empty
    pub success_rate: f64,
}
