use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pdns_migrate::batch::BatchExecutor;
use pdns_migrate::client::PdnsClient;
use pdns_migrate::cli::Cli;
use pdns_migrate::engine::ReconciliationEngine;
use pdns_migrate::ingest::{FileZoneSource, ZoneSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::new(if cli.verbose {
            format!("pdns_migrate=debug,{}", cli.log_level)
        } else {
            format!("pdns_migrate={}", cli.log_level)
        }),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(false)
                .with_ansi(true),
        )
        .init();

    let source_client = PdnsClient::new(cli.source_connection(), cli.retry_policy())?;
    let target_client = PdnsClient::new(cli.target_connection(), cli.retry_policy())?;

    info!(source = %cli.source_url, target = %cli.target_url, "starting migration");

    let exit_code = if let Some(zone) = &cli.zone {
        run_single(&source_client, &target_client, zone, &cli).await
    } else if let Some(path) = &cli.zones_file {
        run_batch(&source_client, &target_client, path, &cli).await
    } else {
        unreachable!("Cli::validate rejects the zone/zones_file combination above")
    };

    source_client.close().await;
    target_client.close().await;

    std::process::exit(exit_code);
}

/// Single-zone path. Mirrors
/// `original_source/powerdns_migrator/cli.py::_run_single`.
async fn run_single(
    source_client: &PdnsClient,
    target_client: &PdnsClient,
    zone: &str,
    cli: &Cli,
) -> i32 {
    let engine = ReconciliationEngine::new(source_client, target_client, cli.engine_policy());
    match engine.migrate(zone, cli.migration_mode()).await {
        Ok(result) => {
            info!(zone = %zone, action = ?result.action, changes = result.changes.len(), "migration complete");
            0
        }
        Err(e) => {
            tracing::error!(zone = %zone, error = %e, kind = e.kind(), "migration failed");
            1
        }
    }
}

async fn run_batch(
    source_client: &PdnsClient,
    target_client: &PdnsClient,
    zones_path: &std::path::Path,
    cli: &Cli,
) -> i32 {
    let source = FileZoneSource::new(zones_path);
    let zones = match source.load() {
        Ok(zones) => zones,
        Err(e) => {
            tracing::error!(error = %e, "failed to load zones file");
            return 1;
        }
    };

    let executor = BatchExecutor::new(
        source_client,
        target_client,
        cli.engine_policy(),
        cli.migration_mode(),
        cli.batch_options(),
    );
    let outcome = executor.run(zones).await;
    info!(
        total = outcome.stats.total,
        succeeded = outcome.stats.succeeded,
        failed = outcome.stats.failed,
        interrupted = outcome.interrupted,
        "batch complete"
    );
    outcome.exit_code()
}
