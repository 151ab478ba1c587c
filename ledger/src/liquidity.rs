//! Daily liquidity aggregates per token pair.

use chainledger_common::{
    bigint_string, DayKey, EventId, LedgerError, LiquidityDirection, LiquiditySummaryKey, Result,
    Timestamp, TokenSymbol,
};
use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Running signed totals of liquidity moved for one token pair on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLiquiditySummary {
    /// Token pair and day.
    pub key: LiquiditySummaryKey,
    /// Net raw units of token0 added during the day.
    #[serde(with = "bigint_string")]
    pub token0_daily_total: BigInt,
    /// Net raw units of token1 added during the day.
    #[serde(with = "bigint_string")]
    pub token1_daily_total: BigInt,
}

impl DailyLiquiditySummary {
    /// Create an empty bucket.
    pub fn zero(key: LiquiditySummaryKey) -> Self {
        Self {
            key,
            token0_daily_total: BigInt::zero(),
            token1_daily_total: BigInt::zero(),
        }
    }

    pub fn token0(&self) -> &TokenSymbol {
        &self.key.token0
    }

    pub fn token1(&self) -> &TokenSymbol {
        &self.key.token1
    }

    pub fn day(&self) -> &DayKey {
        &self.key.day
    }

    /// Add signed deltas to both totals.
    pub fn apply(&mut self, token0_delta: &BigInt, token1_delta: &BigInt) {
        self.token0_daily_total += token0_delta;
        self.token1_daily_total += token1_delta;
    }
}

/// Audit record of one liquidity event applied to a summary.
///
/// Keyed by the source event; its presence marks the event as applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityChange {
    /// Source event.
    pub id: EventId,
    /// Summary bucket the change was applied to.
    pub summary: LiquiditySummaryKey,
    pub direction: LiquidityDirection,
    /// Signed token0 delta.
    #[serde(with = "bigint_string")]
    pub token0_delta: BigInt,
    /// Signed token1 delta.
    #[serde(with = "bigint_string")]
    pub token1_delta: BigInt,
    /// Event time.
    pub timestamp: Timestamp,
}

impl LiquidityChange {
    /// Build a change from unsigned raw amounts.
    pub fn new(
        id: EventId,
        summary: LiquiditySummaryKey,
        direction: LiquidityDirection,
        token0_amount: &BigInt,
        token1_amount: &BigInt,
        timestamp: Timestamp,
    ) -> Result<Self> {
        if token0_amount.sign() == num_bigint::Sign::Minus
            || token1_amount.sign() == num_bigint::Sign::Minus
        {
            return Err(LedgerError::invalid_amount(
                format!("({token0_amount}, {token1_amount})"),
                "liquidity amounts must not be negative",
            ));
        }

        Ok(Self {
            id,
            summary,
            direction,
            token0_delta: direction.signed(token0_amount),
            token1_delta: direction.signed(token1_amount),
            timestamp,
        })
    }
}
