//! dimsync: reconcile video asset dimensions.
//!
//! Reads DATABASE_URL and the worker settings from the environment (or `.env`).

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dimsync_cli::{build_reconciler, parse_dimensions, override_tags, reprocess_tags, retry_tags};
use dimsync_core::{AssetRecord, Config, Dimensions};
use dimsync_db::{connect_pool, AssetStore, PgAssetRepository};
use dimsync_worker::{init_tracing, CandidateSummary, LogFormat, ReconciliationService, ServiceConfig};
use serde::Serialize;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "dimsync", about = "Video dimension reconciliation worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker until interrupted
    Run,
    /// Run a single tick and print its report
    Once,
    /// Show the assets the next tick would process
    Candidates {
        /// Maximum number of assets (defaults to BATCH_SIZE)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove processing-failed so the asset is picked up again
    Retry {
        /// Asset UUID
        id: Uuid,
    },
    /// Set dimensions manually on the next tick
    Override {
        /// Asset UUID
        id: Uuid,
        /// Dimensions as WIDTHxHEIGHT
        #[arg(value_parser = parse_dimensions)]
        dimensions: Dimensions,
    },
    /// Recompute dimensions from the source on the next tick
    Reprocess {
        /// Asset UUID
        id: Uuid,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

async fn edit_tags<F>(store: &dyn AssetStore, id: Uuid, edit: F) -> anyhow::Result<AssetRecord>
where
    F: FnOnce(Option<&str>) -> Option<String>,
{
    let asset = store
        .get(id)
        .await?
        .with_context(|| format!("Asset {} not found", id))?;

    let tags = edit(asset.tags.as_deref());
    if tags == asset.tags {
        tracing::info!(asset_id = %id, "Tags unchanged");
        return Ok(asset);
    }

    store.set_tags(id, tags.clone()).await?;
    tracing::info!(asset_id = %id, tags = ?tags, "Tags updated");
    Ok(AssetRecord { tags, ..asset })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env())?;

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = connect_pool(&config).await?;
    let store: Arc<dyn AssetStore> = Arc::new(PgAssetRepository::new(pool));

    match cli.command {
        Commands::Run => {
            let reconciler = Arc::new(build_reconciler(&config, store)?);
            let handle = ReconciliationService::new(
                reconciler,
                ServiceConfig {
                    tick_interval: config.tick_interval(),
                },
            )
            .start();

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            handle.shutdown().await;
        }
        Commands::Once => {
            let reconciler = build_reconciler(&config, store)?;
            let report = reconciler.run_tick().await?;
            print_json(&report)?;
        }
        Commands::Candidates { limit } => {
            let reconciler = build_reconciler(&config, store)?;
            let candidates = reconciler
                .selector()
                .select_with_limit(limit.unwrap_or(config.batch_size()))
                .await?;
            let summaries: Vec<CandidateSummary> =
                candidates.iter().map(CandidateSummary::from).collect();
            print_json(&summaries)?;
        }
        Commands::Retry { id } => {
            let asset = edit_tags(store.as_ref(), id, retry_tags).await?;
            print_json(&asset)?;
        }
        Commands::Override { id, dimensions } => {
            let asset =
                edit_tags(store.as_ref(), id, |tags| override_tags(tags, dimensions)).await?;
            print_json(&asset)?;
        }
        Commands::Reprocess { id } => {
            let asset = edit_tags(store.as_ref(), id, reprocess_tags).await?;
            print_json(&asset)?;
        }
    }

    Ok(())
}
