//! Simulation controller.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Duration, Utc};
use num_bigint::BigInt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};

use chainledger_common::{AccountId, BalanceKey, DayKey, LiquiditySummaryKey, Timestamp, TokenSymbol};
use chainledger_indexer::{
    ChainEvent, ChannelEventSource, EventDispatcher, Indexer, IndexerConfig, MetricsSnapshot,
};
use chainledger_ledger::{LedgerEngine, LedgerStore, MemoryStore};

use crate::scenario::{Scenario, ScenarioStep};

/// Chain block time.
const BLOCK_TIME_SECS: i64 = 6;

/// Tokens used by the randomized mode.
const TOKENS: &[&str] = &["DOT", "ACA", "AUSD"];

/// Drives an indexer over a memory store with synthetic chain events.
pub struct SimulationController {
    indexer: Arc<Indexer>,
    store: Arc<MemoryStore>,
    /// Chain clock for the next block.
    clock: Timestamp,
    next_block: u64,
    last_event: Option<ChainEvent>,
    rng: StdRng,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let store = Arc::new(MemoryStore::new());
        let dispatcher = EventDispatcher::new(LedgerEngine::new(LedgerStore::new(store.clone())));
        let indexer = Indexer::new(
            IndexerConfig::default(),
            "simulator".to_string(),
            dispatcher,
        );

        Self {
            indexer: Arc::new(indexer),
            store,
            clock: Utc::now(),
            next_block: 1,
            last_event: None,
            rng,
        }
    }

    /// Run a scenario, failing on the first unmet assertion.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        self.clock = DateTime::parse_from_rfc3339(&scenario.start_time)
            .with_context(|| format!("invalid start time {}", scenario.start_time))?
            .with_timezone(&Utc);
        self.indexer.start().await?;

        for (n, step) in scenario.steps.iter().enumerate() {
            self.execute_step(step)
                .await
                .with_context(|| format!("step {} of {}", n + 1, scenario.name))?;
        }

        info!("Scenario {} passed", scenario.name);
        Ok(())
    }

    /// Generate random transfers between `accounts` accounts, redeliver a
    /// fraction of them, and check the ledger against a shadow copy.
    pub async fn run_random(
        &mut self,
        accounts: usize,
        events: usize,
        redeliver_ratio: f64,
    ) -> anyhow::Result<()> {
        if accounts < 2 {
            bail!("Randomized mode needs at least two accounts");
        }
        info!(accounts, events, redeliver_ratio, "Running randomized simulation");

        let mut expected: HashMap<BalanceKey, Decimal> = HashMap::new();
        let mut stream = Vec::with_capacity(events);
        for _ in 0..events {
            let from = self.rng.gen_range(0..accounts);
            let to = self.rng.gen_range(0..accounts);
            let token = TOKENS[self.rng.gen_range(0..TOKENS.len())];
            let amount = Decimal::new(self.rng.gen_range(1..10_000_000), 4);
            let (from, to) = (format!("acct-{from}"), format!("acct-{to}"));

            *expected
                .entry(BalanceKey::new(AccountId::new(from.as_str()), token.into()))
                .or_default() -= amount;
            *expected
                .entry(BalanceKey::new(AccountId::new(to.as_str()), token.into()))
                .or_default() += amount;

            let event = self.transfer_event(&from, &to, token, &amount.to_string());
            stream.push(event.clone());
            if self.rng.gen_bool(redeliver_ratio.clamp(0.0, 1.0)) {
                stream.push(event);
            }
        }

        let (tx, mut source) = ChannelEventSource::channel(64);
        let producer = tokio::spawn(async move {
            for event in stream {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        self.indexer.run(&mut source).await?;
        producer.await?;

        self.check_balances(&expected)?;
        self.check_conservation()?;
        info!("Randomized simulation consistent");
        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Transfer {
                from,
                to,
                token,
                amount,
            } => {
                info!("Transfer: {} -> {} {} {}", from, to, amount, token);
                let event = self.transfer_event(from, to, token, amount);
                self.deliver(event).await?;
            }
            ScenarioStep::AddLiquidity {
                who,
                token0,
                amount0,
                token1,
                amount1,
            } => {
                info!("Add liquidity: {} {} / {} {}", amount0, token0, amount1, token1);
                let event = self.liquidity_event("AddLiquidity", who, token0, amount0, token1, amount1);
                self.deliver(event).await?;
            }
            ScenarioStep::RemoveLiquidity {
                who,
                token0,
                amount0,
                token1,
                amount1,
            } => {
                info!("Remove liquidity: {} {} / {} {}", amount0, token0, amount1, token1);
                let event =
                    self.liquidity_event("RemoveLiquidity", who, token0, amount0, token1, amount1);
                self.deliver(event).await?;
            }
            ScenarioStep::RedeliverLast => {
                let event = self
                    .last_event
                    .clone()
                    .ok_or_else(|| anyhow!("Nothing to redeliver"))?;
                info!("Redelivering event {}", event.id());
                self.indexer.process(&event).await?;
            }
            ScenarioStep::AdvanceClock { minutes } => {
                self.clock += Duration::minutes(*minutes);
                info!("Clock advanced to {}", self.clock);
            }
            ScenarioStep::AssertBalance {
                address,
                token,
                amount,
            } => {
                let expected = Decimal::from_str_exact(amount)?;
                let key = BalanceKey::new(AccountId::new(address.as_str()), token.as_str().into());
                let actual = self
                    .indexer
                    .dispatcher()
                    .store()
                    .balance(&key)
                    .await?
                    .map(|b| b.balance)
                    .unwrap_or(Decimal::ZERO);
                if actual != expected {
                    bail!("Balance {} is {}, expected {}", key, actual, expected);
                }
            }
            ScenarioStep::AssertLiquidity {
                token0,
                token1,
                day,
                token0_total,
                token1_total,
            } => {
                let key = LiquiditySummaryKey::new(
                    token0.as_str().into(),
                    token1.as_str().into(),
                    DayKey::parse(day)?,
                );
                let summary = self
                    .indexer
                    .dispatcher()
                    .store()
                    .liquidity_summary(&key)
                    .await?
                    .ok_or_else(|| anyhow!("No liquidity summary {}", key))?;
                let expected: (BigInt, BigInt) = (token0_total.parse()?, token1_total.parse()?);
                let actual = (summary.token0_daily_total, summary.token1_daily_total);
                if actual != expected {
                    bail!("Liquidity {} is {:?}, expected {:?}", key, actual, expected);
                }
            }
        }

        Ok(())
    }

    async fn deliver(&mut self, event: ChainEvent) -> anyhow::Result<()> {
        if self.indexer.process(&event).await?.is_none() {
            warn!("Event {} was dropped", event.id());
        }
        self.last_event = Some(event);
        Ok(())
    }

    fn next_event(&mut self, section: &str, method: &str, data: Vec<Value>) -> ChainEvent {
        let event = ChainEvent {
            section: section.to_string(),
            method: method.to_string(),
            data,
            block_number: self.next_block,
            event_index: 0,
            timestamp: self.clock,
        };
        self.next_block += 1;
        self.clock += Duration::seconds(BLOCK_TIME_SECS);
        event
    }

    fn transfer_event(&mut self, from: &str, to: &str, token: &str, amount: &str) -> ChainEvent {
        self.next_event(
            "currencies",
            "Transferred",
            vec![json!({ "token": token }), json!(from), json!(to), json!(amount)],
        )
    }

    fn liquidity_event(
        &mut self,
        method: &str,
        who: &str,
        token0: &str,
        amount0: &str,
        token1: &str,
        amount1: &str,
    ) -> ChainEvent {
        self.next_event(
            "dex",
            method,
            vec![
                json!(who),
                json!({ "token": token0 }),
                json!(amount0),
                json!({ "token": token1 }),
                json!(amount1),
            ],
        )
    }

    fn check_balances(&self, expected: &HashMap<BalanceKey, Decimal>) -> anyhow::Result<()> {
        let stored: HashMap<BalanceKey, Decimal> = self
            .store
            .balances()
            .into_iter()
            .map(|b| (b.key, b.balance))
            .collect();

        for (key, amount) in expected {
            let actual = stored.get(key).copied().unwrap_or(Decimal::ZERO);
            if actual != *amount {
                bail!("Balance {} is {}, expected {}", key, actual, amount);
            }
        }
        Ok(())
    }

    /// Plain-token balances sum to zero per token.
    fn check_conservation(&self) -> anyhow::Result<()> {
        let mut totals: HashMap<TokenSymbol, Decimal> = HashMap::new();
        for balance in self.store.balances() {
            *totals.entry(balance.key.currency).or_default() += balance.balance;
        }

        for (token, total) in totals {
            if !total.is_zero() {
                bail!("Token {} not conserved: balances sum to {}", token, total);
            }
        }
        Ok(())
    }

    /// Get simulation metrics.
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.indexer.metrics().snapshot()
    }

    pub fn prometheus(&self) -> String {
        self.indexer.metrics().to_prometheus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_scenarios_pass() {
        for name in Scenario::builtin() {
            let mut controller = SimulationController::new(Some(1));
            let scenario = Scenario::load(name).unwrap();
            controller.run_scenario(&scenario).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_redelivery_counts_duplicates() {
        let mut controller = SimulationController::new(Some(1));
        controller
            .run_scenario(&Scenario::load("redelivery").unwrap())
            .await
            .unwrap();

        let metrics = controller.get_metrics();
        assert_eq!(metrics.duplicates_skipped, 3);
        assert_eq!(metrics.transfers_applied, 2);
        assert_eq!(metrics.liquidity_applied, 1);
    }

    #[tokio::test]
    async fn test_failed_assertion_is_reported() {
        let mut controller = SimulationController::new(Some(1));
        let scenario = Scenario {
            name: "wrong".to_string(),
            description: "expects the wrong balance".to_string(),
            start_time: "2023-06-15T12:00:00Z".to_string(),
            steps: vec![
                ScenarioStep::Transfer {
                    from: "X".to_string(),
                    to: "Y".to_string(),
                    token: "DOT".to_string(),
                    amount: "1".to_string(),
                },
                ScenarioStep::AssertBalance {
                    address: "Y".to_string(),
                    token: "DOT".to_string(),
                    amount: "2".to_string(),
                },
            ],
        };

        let err = controller.run_scenario(&scenario).await.unwrap_err();
        assert!(format!("{err:#}").contains("expected 2"));
    }

    #[tokio::test]
    async fn test_random_mode_conserves() {
        let mut controller = SimulationController::new(Some(42));
        controller.run_random(6, 300, 0.2).await.unwrap();

        let metrics = controller.get_metrics();
        assert_eq!(metrics.events_failed, 0);
        assert_eq!(
            metrics.transfers_applied + metrics.duplicates_skipped,
            metrics.events_total
        );
    }
}
