//! Where log events go and how they are formatted

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logging configuration for a binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when RUST_LOG is unset (`info`, `pixuli_oplog=debug`, ...)
    pub level: String,
    pub console: ConsoleOutput,
    /// JSONL file output, off when `None`
    pub file: Option<FileOutput>,
    /// Attach source file and line to JSON events
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleOutput::default(),
            file: None,
            include_location: true,
        }
    }
}

impl LogConfig {
    /// Verbose, human-readable console output
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleOutput {
                enabled: true,
                format: LogFormat::Pretty,
                ansi: true,
            },
            ..Default::default()
        }
    }
}

/// Event format on the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable, multi-field lines
    Pretty,
}

/// Console (stderr) output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleOutput {
    pub enabled: bool,
    pub format: LogFormat,
    /// Colour codes, only honoured by the pretty format
    pub ansi: bool,
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Json,
            ansi: false,
        }
    }
}

/// JSONL file output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOutput {
    pub directory: PathBuf,
    /// File name prefix; rotated files get a date suffix
    pub prefix: String,
    pub rotation: RotationStrategy,
}

impl Default for FileOutput {
    fn default() -> Self {
        Self::new("./logs")
    }
}

impl FileOutput {
    /// Daily-rotated `pixuli.*.log` files in `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "pixuli".to_string(),
            rotation: RotationStrategy::Daily,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_rotation(mut self, rotation: RotationStrategy) -> Self {
        self.rotation = rotation;
        self
    }
}

/// When a new log file is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// One `<prefix>.log`, truncated at startup
    Never,
}

impl RotationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationStrategy::Daily => "daily",
            RotationStrategy::Hourly => "hourly",
            RotationStrategy::Never => "never",
        }
    }
}

impl fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(RotationStrategy::Daily),
            "hourly" => Ok(RotationStrategy::Hourly),
            "never" => Ok(RotationStrategy::Never),
            other => Err(format!(
                "unknown rotation '{other}', expected daily, hourly or never"
            )),
        }
    }
}
