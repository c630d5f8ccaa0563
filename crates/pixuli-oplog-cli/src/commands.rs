//! Command execution against a loaded service

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use pixuli_oplog::export::export_file_name;
use pixuli_oplog::{
    ClearOptions, ExportFormat, LogOptions, OperationLogService, OperationLogStorage,
};
use tracing::info;

use crate::config::Command;

/// Run one command and return what should be printed to stdout
///
/// The caller loads the service first and flushes it afterwards.
pub async fn run<S: OperationLogStorage + 'static>(
    service: &OperationLogService<S>,
    command: Command,
    now: DateTime<Utc>,
) -> anyhow::Result<String> {
    match command {
        Command::Record {
            action,
            status,
            image_id,
            image_name,
            error,
            duration,
            user_id,
            details,
        } => {
            let mut options = LogOptions::new();
            if let Some(image_id) = image_id {
                options = options.image_id(image_id);
            }
            if let Some(image_name) = image_name {
                options = options.image_name(image_name);
            }
            if let Some(error) = error {
                options = options.error(error);
            }
            if let Some(duration) = duration {
                options = options.duration(duration);
            }
            if let Some(user_id) = user_id {
                options = options.user_id(user_id);
            }
            for (key, value) in details {
                options = options.detail(key, value);
            }

            service.log(action, status, options);
            let recorded = service
                .all_logs()
                .into_iter()
                .next()
                .context("recorded entry is missing")?;
            Ok(serde_json::to_string_pretty(&recorded)?)
        }

        Command::Query(args) => Ok(service.export_to_json(&args.to_options())),

        Command::Stats => Ok(serde_json::to_string_pretty(&service.statistics())?),

        Command::Export {
            format,
            output,
            stdout,
            query,
        } => {
            let format = ExportFormat::from(format);
            let options = query.to_options();
            let document = service.export(format, &options);
            if stdout {
                return Ok(document);
            }

            let path = output.unwrap_or_else(|| PathBuf::from(export_file_name(format, now)));
            tokio::fs::write(&path, &document)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;

            let count = service.query(&options).len();
            info!(path = %path.display(), count, "Exported operation logs");
            Ok(format!("Exported {count} records to {}", path.display()))
        }

        Command::Clear {
            before,
            keep,
            action,
        } => {
            let options = ClearOptions {
                before_timestamp: before,
                keep_count: keep,
                action,
            };
            Ok(service.clear_logs(&options).to_string())
        }
    }
}
