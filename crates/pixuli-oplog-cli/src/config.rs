use std::path::PathBuf;

use chrono::{DateTime, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pixuli_logging::{FileOutput, LogConfig, RotationStrategy};
use pixuli_oplog::{
    DEFAULT_MAX_LOGS, DEFAULT_STORAGE_KEY, ExportFormat, LogActionType, LogFilter,
    LogQueryOptions, LogStatus, OperationLogConfig, SortBy, SortOrder,
};

#[derive(Debug, Parser)]
#[command(
    name = "pixuli-oplog",
    about = "Record, query and export the Pixuli operation log",
    version
)]
pub struct Cli {
    /// Directory holding the persisted log
    #[arg(long, global = true, default_value = "./data/oplog")]
    pub data_dir: PathBuf,
    /// Key the log is stored under
    #[arg(long, global = true, default_value = DEFAULT_STORAGE_KEY)]
    pub storage_key: String,
    /// Maximum number of records to retain
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_LOGS)]
    pub max_logs: usize,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
    /// Human-readable diagnostics instead of JSON lines
    #[arg(long, global = true)]
    pub pretty_logs: bool,
    /// Also write JSON diagnostics to files in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
    /// When to start a new diagnostics file (daily, hourly, never)
    #[arg(long, global = true, default_value_t = RotationStrategy::Daily)]
    pub log_rotation: RotationStrategy,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Service configuration for the selected store and cap
    pub fn service_config(&self) -> OperationLogConfig {
        OperationLogConfig::new(self.storage_key.clone(), self.max_logs)
    }

    /// Diagnostics setup from the logging flags
    pub fn log_config(&self) -> LogConfig {
        let base = if self.pretty_logs {
            LogConfig::development()
        } else {
            LogConfig::default()
        };
        LogConfig {
            level: self.log_level.clone(),
            file: self.log_dir.as_ref().map(|dir| {
                FileOutput::new(dir)
                    .with_prefix("pixuli-oplog")
                    .with_rotation(self.log_rotation)
            }),
            ..base
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record one operation
    Record {
        /// Operation type (upload, delete, edit, compress, convert, analyze,
        /// config_change, batch_upload, batch_delete)
        action: LogActionType,
        /// Outcome (success, failed, pending)
        status: LogStatus,
        #[arg(long)]
        image_id: Option<String>,
        #[arg(long)]
        image_name: Option<String>,
        /// Error message for failed operations
        #[arg(long)]
        error: Option<String>,
        /// Duration in milliseconds
        #[arg(long)]
        duration: Option<u64>,
        #[arg(long)]
        user_id: Option<String>,
        /// Extra detail as key=value; values that parse as JSON are kept as JSON
        #[arg(long = "detail", value_parser = parse_detail)]
        details: Vec<(String, serde_json::Value)>,
    },
    /// Print matching records as JSON
    Query(QueryArgs),
    /// Print aggregate statistics as JSON
    Stats,
    /// Write matching records to a file
    Export {
        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,
        /// Output file (defaults to a timestamped name in the current directory)
        #[arg(long, conflicts_with = "stdout")]
        output: Option<PathBuf>,
        /// Print to stdout instead of writing a file
        #[arg(long)]
        stdout: bool,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Remove records; with no option, removes everything
    Clear {
        /// Remove records older than this time (millis, RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_timestamp)]
        before: Option<i64>,
        /// Keep only this many of the newest records
        #[arg(long)]
        keep: Option<usize>,
        /// Remove every record of this operation type
        #[arg(long)]
        action: Option<LogActionType>,
    },
}

impl Command {
    /// Whether running the command changes the log
    pub fn mutates(&self) -> bool {
        matches!(self, Command::Record { .. } | Command::Clear { .. })
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct QueryArgs {
    /// Only these operation types (repeatable)
    #[arg(long = "action")]
    pub actions: Vec<LogActionType>,
    /// Only these outcomes (repeatable)
    #[arg(long = "status")]
    pub statuses: Vec<LogStatus>,
    /// Inclusive lower bound (millis, RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_timestamp)]
    pub since: Option<i64>,
    /// Inclusive upper bound (millis, RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_timestamp)]
    pub until: Option<i64>,
    #[arg(long)]
    pub image_id: Option<String>,
    /// Case-insensitive search over image name, error and details
    #[arg(long)]
    pub keyword: Option<String>,
    #[arg(long)]
    pub limit: Option<usize>,
    /// Skip this many results (only applies together with --limit)
    #[arg(long)]
    pub offset: Option<usize>,
    #[arg(long, value_enum, default_value_t = SortField::Timestamp)]
    pub sort_by: SortField,
    #[arg(long, value_enum, default_value_t = Order::Desc)]
    pub order: Order,
}

impl QueryArgs {
    pub fn to_options(&self) -> LogQueryOptions {
        let mut filter = LogFilter::new();
        if !self.actions.is_empty() {
            filter = filter.actions(self.actions.iter().copied());
        }
        if !self.statuses.is_empty() {
            filter = filter.statuses(self.statuses.iter().copied());
        }
        if let Some(since) = self.since {
            filter = filter.start_time(since);
        }
        if let Some(until) = self.until {
            filter = filter.end_time(until);
        }
        if let Some(image_id) = &self.image_id {
            filter = filter.image_id(image_id.clone());
        }
        if let Some(keyword) = &self.keyword {
            filter = filter.keyword(keyword.clone());
        }

        let mut options = LogQueryOptions::new()
            .filter(filter)
            .sort_by(self.sort_by.into())
            .sort_order(self.order.into());
        if let Some(limit) = self.limit {
            options = options.limit(limit);
        }
        if let Some(offset) = self.offset {
            options = options.offset(offset);
        }
        options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortField {
    #[default]
    Timestamp,
    Action,
    Status,
}

impl From<SortField> for SortBy {
    fn from(field: SortField) -> Self {
        match field {
            SortField::Timestamp => SortBy::Timestamp,
            SortField::Action => SortBy::Action,
            SortField::Status => SortBy::Status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => SortOrder::Asc,
            Order::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

/// `key=value`; the value is JSON when it parses as JSON, a string otherwise
pub fn parse_detail(arg: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{arg}'"))?;
    if key.is_empty() {
        return Err(format!("empty detail key in '{arg}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Epoch milliseconds, an RFC 3339 time, or a `YYYY-MM-DD` date (UTC midnight)
pub fn parse_timestamp(arg: &str) -> Result<i64, String> {
    if let Ok(millis) = arg.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(arg) {
        return Ok(time.timestamp_millis());
    }
    NaiveDate::parse_from_str(arg, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis())
        .ok_or_else(|| format!("invalid time '{arg}'"))
}
