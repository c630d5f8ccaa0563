use anyhow::Context;
use clap::Parser;
use pixuli_logging::PixuliSubscriberBuilder;
use pixuli_oplog::{FileLogStorage, OperationLogService};
use pixuli_oplog_cli::commands;
use pixuli_oplog_cli::config::Cli;
use tracing::debug;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let _guard = PixuliSubscriberBuilder::new()
        .with_config(cli.log_config())
        .init();

    let storage = FileLogStorage::new(&cli.data_dir)
        .await
        .with_context(|| format!("cannot open log directory {}", cli.data_dir.display()))?;
    let service = OperationLogService::with_config(storage, cli.service_config());
    service.ensure_loaded().await;
    debug!(
        dir = %service.storage().base_dir().display(),
        records = service.len(),
        "Operation log ready"
    );

    let mutates = cli.command.mutates();
    let output = commands::run(&service, cli.command, chrono::Utc::now()).await?;

    if mutates {
        service
            .flush()
            .await
            .context("failed to save operation logs")?;
    }

    println!("{output}");
    Ok(())
}
