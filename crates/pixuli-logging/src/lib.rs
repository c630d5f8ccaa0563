//! JSONL and console logging setup for Pixuli binaries
//!
//! Library crates only emit `tracing` events. Binaries call
//! [`PixuliSubscriberBuilder::init`] once at startup to decide where those
//! events go.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines on stderr (default)
//! - **Pretty Console**: Human-readable output for development
//! - **File Output**: JSONL files with daily/hourly rotation via tracing-appender
//! - **RUST_LOG Override**: `EnvFilter` takes the environment over the configured level
//!
//! # Quick Start
//!
//! ```ignore
//! use pixuli_logging::{FileOutput, LogConfig, PixuliSubscriberBuilder};
//!
//! let _guard = PixuliSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .with_file_output(FileOutput::new("./logs"))
//!     .init();
//! ```
//!
//! Keep the returned guard alive for as long as file output should be
//! written; dropping it flushes the background writer.

pub mod config;

pub use config::{ConsoleOutput, FileOutput, LogConfig, LogFormat, RotationStrategy};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Level or filter directive did not parse
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    /// Log file or directory could not be created
    #[error("cannot open log output: {0}")]
    Io(#[from] std::io::Error),

    /// Rolling appender failed to initialize
    #[error("cannot create rolling log file: {0}")]
    Appender(String),

    /// A global subscriber is already installed
    #[error("a global subscriber is already set: {0}")]
    AlreadyInitialized(String),
}

/// Builder for the process-wide subscriber
#[derive(Debug, Clone, Default)]
pub struct PixuliSubscriberBuilder {
    config: LogConfig,
}

impl PixuliSubscriberBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the filter directive used when RUST_LOG is unset
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Also write JSONL events to files
    pub fn with_file_output(mut self, output: FileOutput) -> Self {
        self.config.file = Some(output);
        self
    }

    /// The configuration that `init` will apply
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber, reporting failures on stderr
    ///
    /// A failure leaves logging disabled rather than aborting the program.
    pub fn init(self) -> Option<WorkerGuard> {
        self.try_init().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        })
    }

    /// Install the subscriber globally
    ///
    /// Returns the file writer guard when file output is configured.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let config = self.config;
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
                directive: config.level.clone(),
                reason: e.to_string(),
            })?,
        };

        let console = &config.console;
        let location = config.include_location;

        // stdout is reserved for command output
        let pretty_console = (console.enabled && console.format == LogFormat::Pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
                .with_writer(std::io::stderr)
        });

        let json_console = (console.enabled && console.format == LogFormat::Json).then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .flatten_event(true)
                .with_file(location)
                .with_line_number(location)
                .with_writer(std::io::stderr)
        });

        let (file_layer, guard) = match &config.file {
            Some(output) => {
                let (writer, guard) = open_file_writer(output)?;
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .flatten_event(true)
                    .with_file(location)
                    .with_line_number(location)
                    .with_ansi(false)
                    .with_writer(writer);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        Registry::default()
            .with(env_filter)
            .with(pretty_console)
            .with(json_console)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }
}

/// Non-blocking writer for `output`; `Never` truncates a single file
fn open_file_writer(output: &FileOutput) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match output.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&output.directory)?;
            let file = File::create(output.directory.join(format!("{}.log", output.prefix)))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&output.prefix)
        .filename_suffix("log")
        .build(&output.directory)
        .map_err(|e| LoggingError::Appender(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let builder = PixuliSubscriberBuilder::new()
            .with_config(LogConfig::development())
            .with_level("pixuli_oplog=trace")
            .with_file_output(FileOutput::new("/tmp/logs").with_rotation(RotationStrategy::Hourly));

        let config = builder.config();
        assert_eq!(config.level, "pixuli_oplog=trace");
        assert_eq!(config.console.format, LogFormat::Pretty);
        assert_eq!(
            config.file.as_ref().map(|file| file.rotation),
            Some(RotationStrategy::Hourly)
        );
    }

    #[test]
    fn test_single_file_writer_creates_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        let output = FileOutput::new(&nested)
            .with_prefix("run")
            .with_rotation(RotationStrategy::Never);

        let (_writer, _guard) = open_file_writer(&output).unwrap();
        assert!(nested.join("run.log").exists());
    }

    #[test]
    fn test_rolling_writer_uses_prefix_and_suffix() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let output = FileOutput::new(temp_dir.path()).with_prefix("oplog");

        let (_writer, guard) = open_file_writer(&output).unwrap();
        drop(guard);

        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("oplog."));
        assert!(names[0].ends_with(".log"));
    }
}
