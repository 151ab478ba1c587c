//! ChainLedger Indexer Binary
//!
//! Replays a JSON-lines file of chain events into the ledger.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chainledger_indexer::{
    chain_state::BalanceSnapshot, EventDispatcher, Indexer, IndexerConfig, JsonLinesSource,
    StaticChainState,
};
use chainledger_ledger::{EntityStore, LedgerEngine, LedgerStore, MemoryStore, PgEntityStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IndexerConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting ChainLedger indexer");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let events_path = config
        .events_path
        .clone()
        .context("INDEXER_EVENTS_PATH must be set")?;

    let run_id = format!("indexer-{}", uuid::Uuid::new_v4());
    info!(run_id = %run_id, events = %events_path.display(), "Run ID assigned");

    let store: Arc<dyn EntityStore> = match &config.database_url {
        Some(url) => {
            let pg = PgEntityStore::connect(url, config.db_max_connections).await?;
            pg.migrate().await?;
            info!("Using PostgreSQL store");
            Arc::new(pg)
        }
        None => {
            warn!("DATABASE_URL not set, ledger state is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let mut dispatcher = EventDispatcher::new(LedgerEngine::new(LedgerStore::new(store)));
    if config.reconcile {
        if let Some(path) = &config.chain_state_path {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading chain state {}", path.display()))?;
            let snapshots: Vec<BalanceSnapshot> =
                serde_json::from_str(&raw).context("parsing chain state snapshots")?;
            info!(balances = snapshots.len(), "Balance reconciliation enabled");
            dispatcher =
                dispatcher.with_reconciliation(Arc::new(StaticChainState::from_snapshots(snapshots)));
        }
    }

    let indexer = Arc::new(Indexer::new(config.clone(), run_id.clone(), dispatcher));

    // Set up graceful shutdown
    let indexer_clone = indexer.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("Failed to listen for Ctrl+C");
            return;
        }
        info!("Shutdown signal received");
        if let Err(e) = indexer_clone.stop().await {
            error!(error = %e, "Error during shutdown");
        }
    });

    let mut source = JsonLinesSource::open(&events_path).await?;
    let result = indexer.run(&mut source).await;

    println!("{}", indexer.metrics().to_prometheus());

    match result {
        Ok(()) => {
            info!(run_id = %run_id, cursor = ?indexer.cursor(), "Indexer finished");
            Ok(())
        }
        Err(e) => {
            error!(run_id = %run_id, code = e.error_code(), error = %e, "Indexer halted");
            Err(e.into())
        }
    }
}
