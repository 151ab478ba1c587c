//! ChainLedger Simulator
//!
//! Feeds synthetic chain events through the indexer and checks the ledger
//! invariants on the result.

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod scenario;

use controller::SimulationController;
use scenario::Scenario;

/// ChainLedger Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "ChainLedger event-stream simulator")]
struct Args {
    /// Scenario to run: a built-in name or a JSON scenario file
    #[arg(short, long)]
    scenario: Option<String>,

    /// Number of accounts in randomized mode
    #[arg(short, long, default_value = "5")]
    accounts: usize,

    /// Number of transfers in randomized mode
    #[arg(short, long, default_value = "1000")]
    events: usize,

    /// Fraction of events delivered twice in randomized mode
    #[arg(long, default_value = "0.1")]
    redeliver: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Print metrics in Prometheus format when done
    #[arg(long)]
    prometheus: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting ChainLedger Simulator");

    let mut controller = SimulationController::new(args.seed);

    if let Some(scenario_name) = &args.scenario {
        let scenario = Scenario::load(scenario_name)?;
        controller.run_scenario(&scenario).await?;
    } else {
        info!(
            "Randomized mode: {} accounts, {} events, {} redelivered",
            args.accounts, args.events, args.redeliver
        );
        controller
            .run_random(args.accounts, args.events, args.redeliver)
            .await?;
    }

    let metrics = controller.get_metrics();
    info!("Simulation complete");
    info!("Events: {}", metrics.events_total);
    info!("Transfers applied: {}", metrics.transfers_applied);
    info!("Liquidity applied: {}", metrics.liquidity_applied);
    info!("Duplicates skipped: {}", metrics.duplicates_skipped);
    info!("Failed: {}", metrics.events_failed);

    if args.prometheus {
        println!("{}", controller.prometheus());
    }

    Ok(())
}
