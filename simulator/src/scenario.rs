//! Simulation scenarios.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Chain clock at the first block, RFC 3339.
    pub start_time: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Emit a `currencies.Transferred` event of a plain token.
    Transfer {
        from: String,
        to: String,
        token: String,
        amount: String,
    },
    /// Emit a `dex.AddLiquidity` event.
    AddLiquidity {
        who: String,
        token0: String,
        amount0: String,
        token1: String,
        amount1: String,
    },
    /// Emit a `dex.RemoveLiquidity` event.
    RemoveLiquidity {
        who: String,
        token0: String,
        amount0: String,
        token1: String,
        amount1: String,
    },
    /// Deliver the previous event again.
    RedeliverLast,
    /// Move the chain clock forward.
    AdvanceClock { minutes: i64 },
    /// Assert a stored balance.
    AssertBalance {
        address: String,
        token: String,
        amount: String,
    },
    /// Assert the totals of a daily liquidity summary.
    AssertLiquidity {
        token0: String,
        token1: String,
        day: String,
        token0_total: String,
        token1_total: String,
    },
}

impl Scenario {
    /// Load a built-in scenario by name, or a JSON scenario file by path.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "simple-transfer" => Ok(Self::simple_transfer()),
            "liquidity-day" => Ok(Self::liquidity_day()),
            "redelivery" => Ok(Self::redelivery()),
            "month-rollover" => Ok(Self::month_rollover()),
            path if Path::new(path).is_file() => {
                let raw = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&raw)?)
            }
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Names of the built-in scenarios.
    pub fn builtin() -> &'static [&'static str] {
        &["simple-transfer", "liquidity-day", "redelivery", "month-rollover"]
    }

    /// One plain transfer between two accounts.
    fn simple_transfer() -> Self {
        Self {
            name: "simple-transfer".to_string(),
            description: "Transfer 100 DOT from X to Y".to_string(),
            start_time: "2023-06-15T12:00:00Z".to_string(),
            steps: vec![
                transfer("X", "Y", "DOT", "100"),
                assert_balance("X", "DOT", "-100"),
                assert_balance("Y", "DOT", "100"),
            ],
        }
    }

    /// Add then partially remove liquidity within one day.
    fn liquidity_day() -> Self {
        Self {
            name: "liquidity-day".to_string(),
            description: "Add and remove DOT/ACA liquidity on one day".to_string(),
            start_time: "2023-06-15T08:00:00Z".to_string(),
            steps: vec![
                ScenarioStep::AddLiquidity {
                    who: "W".to_string(),
                    token0: "DOT".to_string(),
                    amount0: "500".to_string(),
                    token1: "ACA".to_string(),
                    amount1: "1000".to_string(),
                },
                assert_liquidity("DOT", "ACA", "20230615", "500", "1000"),
                ScenarioStep::AdvanceClock { minutes: 120 },
                ScenarioStep::RemoveLiquidity {
                    who: "W".to_string(),
                    token0: "DOT".to_string(),
                    amount0: "200".to_string(),
                    token1: "ACA".to_string(),
                    amount1: "400".to_string(),
                },
                assert_liquidity("DOT", "ACA", "20230615", "300", "600"),
            ],
        }
    }

    /// Every event delivered twice.
    fn redelivery() -> Self {
        Self {
            name: "redelivery".to_string(),
            description: "Redelivered events leave the ledger unchanged".to_string(),
            start_time: "2023-06-15T12:00:00Z".to_string(),
            steps: vec![
                transfer("X", "Y", "DOT", "100"),
                ScenarioStep::RedeliverLast,
                transfer("Y", "Z", "DOT", "30.5"),
                ScenarioStep::RedeliverLast,
                ScenarioStep::AddLiquidity {
                    who: "W".to_string(),
                    token0: "DOT".to_string(),
                    amount0: "10".to_string(),
                    token1: "ACA".to_string(),
                    amount1: "20".to_string(),
                },
                ScenarioStep::RedeliverLast,
                assert_balance("X", "DOT", "-100"),
                assert_balance("Y", "DOT", "69.5"),
                assert_balance("Z", "DOT", "30.5"),
                assert_liquidity("DOT", "ACA", "20230615", "10", "20"),
            ],
        }
    }

    /// Liquidity buckets across month and year boundaries.
    fn month_rollover() -> Self {
        let add = || ScenarioStep::AddLiquidity {
            who: "W".to_string(),
            token0: "DOT".to_string(),
            amount0: "1".to_string(),
            token1: "ACA".to_string(),
            amount1: "2".to_string(),
        };

        Self {
            name: "month-rollover".to_string(),
            description: "Day buckets split at month and year boundaries".to_string(),
            start_time: "2022-12-31T23:30:00Z".to_string(),
            steps: vec![
                add(),
                ScenarioStep::AdvanceClock { minutes: 60 },
                add(),
                ScenarioStep::AdvanceClock { minutes: 31 * 24 * 60 },
                add(),
                assert_liquidity("DOT", "ACA", "20221231", "1", "2"),
                assert_liquidity("DOT", "ACA", "20230101", "1", "2"),
                assert_liquidity("DOT", "ACA", "20230201", "1", "2"),
            ],
        }
    }
}

fn transfer(from: &str, to: &str, token: &str, amount: &str) -> ScenarioStep {
    ScenarioStep::Transfer {
        from: from.to_string(),
        to: to.to_string(),
        token: token.to_string(),
        amount: amount.to_string(),
    }
}

fn assert_balance(address: &str, token: &str, amount: &str) -> ScenarioStep {
    ScenarioStep::AssertBalance {
        address: address.to_string(),
        token: token.to_string(),
        amount: amount.to_string(),
    }
}

fn assert_liquidity(token0: &str, token1: &str, day: &str, total0: &str, total1: &str) -> ScenarioStep {
    ScenarioStep::AssertLiquidity {
        token0: token0.to_string(),
        token1: token1.to_string(),
        day: day.to_string(),
        token0_total: total0.to_string(),
        token1_total: total1.to_string(),
    }
}
