//! Core ledger engine: balance mutations and liquidity aggregation.

use num_bigint::BigInt;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use chainledger_common::{
    EventId, LedgerError, LiquidityDirection, Result, Timestamp, TransferDirection, TransferId,
    TransferRecordId,
};

use crate::balance::AccountBalance;
use crate::journal::CurrencyTransfer;
use crate::liquidity::{DailyLiquiditySummary, LiquidityChange};
use crate::store::LedgerStore;

/// Result of applying one side of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Record written and balance updated.
    Applied {
        /// Balance after the mutation.
        balance: Decimal,
    },
    /// A record for this transfer side already exists; nothing changed.
    AlreadyApplied,
}

impl TransferOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransferOutcome::Applied { .. })
    }
}

/// Result of applying a liquidity event to a daily summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiquidityOutcome {
    Applied,
    /// The source event was applied before; nothing changed.
    AlreadyApplied,
}

impl LiquidityOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LiquidityOutcome::Applied)
    }
}

/// The ledger engine applies deduplicated mutations through the store.
///
/// Every mutation is written as one batch together with its audit record,
/// and the audit record's key is checked first, so delivering the same
/// event again is a no-op.
#[derive(Clone)]
pub struct LedgerEngine {
    store: LedgerStore,
}

impl LedgerEngine {
    /// Create a new ledger engine over a store.
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Apply one side of a transfer to a balance.
    ///
    /// `amount` is unsigned; `direction` gives the sign. `balance` is updated
    /// in place only once the batch is persisted.
    #[instrument(
        skip(self, balance, timestamp),
        fields(balance = %balance.key, transfer = %transfer_id, direction = %direction)
    )]
    pub async fn apply_transfer(
        &self,
        balance: &mut AccountBalance,
        direction: TransferDirection,
        amount: Decimal,
        transfer_id: TransferId,
        timestamp: Timestamp,
    ) -> Result<TransferOutcome> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(LedgerError::invalid_amount(
                amount.to_string(),
                "transfer amount must not be negative",
            ));
        }

        let record_id = TransferRecordId::new(transfer_id, direction);
        if self.store.transfer(&record_id).await?.is_some() {
            debug!(record = %record_id, "Transfer side already applied");
            return Ok(TransferOutcome::AlreadyApplied);
        }

        let record = CurrencyTransfer::new(
            transfer_id,
            direction,
            balance.key.clone(),
            amount,
            timestamp,
        );
        let updated = AccountBalance {
            key: balance.key.clone(),
            balance: balance.checked_apply(record.amount)?,
        };

        self.store
            .inner()
            .save_batch(vec![record.clone().into(), updated.clone().into()])
            .await?;

        info!(
            record = %record_id,
            amount = %record.amount,
            balance_after = %updated.balance,
            "Transfer applied"
        );

        balance.balance = updated.balance;
        Ok(TransferOutcome::Applied {
            balance: updated.balance,
        })
    }

    /// Apply a liquidity event's amounts to a daily summary.
    ///
    /// Amounts are unsigned raw units; `direction` gives the sign.
    #[instrument(
        skip(self, summary, token0_amount, token1_amount, timestamp),
        fields(summary = %summary.key, event = %source_event, direction = %direction)
    )]
    pub async fn apply_liquidity_delta(
        &self,
        summary: &mut DailyLiquiditySummary,
        token0_amount: &BigInt,
        token1_amount: &BigInt,
        direction: LiquidityDirection,
        source_event: EventId,
        timestamp: Timestamp,
    ) -> Result<LiquidityOutcome> {
        if self.store.liquidity_change(&source_event).await?.is_some() {
            debug!(event = %source_event, "Liquidity event already applied");
            return Ok(LiquidityOutcome::AlreadyApplied);
        }

        let change = LiquidityChange::new(
            source_event,
            summary.key.clone(),
            direction,
            token0_amount,
            token1_amount,
            timestamp,
        )?;
        let mut updated = summary.clone();
        updated.apply(&change.token0_delta, &change.token1_delta);

        self.store
            .inner()
            .save_batch(vec![change.clone().into(), updated.clone().into()])
            .await?;

        info!(
            token0_delta = %change.token0_delta,
            token1_delta = %change.token1_delta,
            token0_total = %updated.token0_daily_total,
            token1_total = %updated.token1_daily_total,
            "Liquidity applied"
        );

        *summary = updated;
        Ok(LiquidityOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::net_by_currency;
    use crate::store::{Entity, EntityKey, EntityStore, MemoryStore};
    use async_trait::async_trait;
    use chainledger_common::{AccountId, DayKey, TokenSymbol};
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine() -> (Arc<MemoryStore>, LedgerEngine) {
        let memory = Arc::new(MemoryStore::new());
        let engine = LedgerEngine::new(LedgerStore::new(memory.clone()));
        (memory, engine)
    }

    async fn transfer(
        engine: &LedgerEngine,
        from: &str,
        to: &str,
        amount: Decimal,
        id: TransferId,
    ) -> (TransferOutcome, TransferOutcome) {
        let dot = TokenSymbol::new("DOT");
        let store = engine.store();
        let now = Utc::now();

        let mut sender = store
            .get_or_create_balance(&AccountId::new(from), &dot)
            .await
            .unwrap();
        let debit = engine
            .apply_transfer(&mut sender, TransferDirection::From, amount, id, now)
            .await
            .unwrap();

        let mut receiver = store
            .get_or_create_balance(&AccountId::new(to), &dot)
            .await
            .unwrap();
        let credit = engine
            .apply_transfer(&mut receiver, TransferDirection::To, amount, id, now)
            .await
            .unwrap();

        (debit, credit)
    }

    #[tokio::test]
    async fn test_transfer_scenario() {
        let (memory, engine) = engine();

        let (debit, credit) = transfer(&engine, "X", "Y", dec!(100), EventId::new(10, 0)).await;
        assert_eq!(debit, TransferOutcome::Applied { balance: dec!(-100) });
        assert_eq!(credit, TransferOutcome::Applied { balance: dec!(100) });

        let records = memory.transfers();
        let ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["10-0-from", "10-0-to"]);
        assert_eq!(records[0].amount, dec!(-100));
        assert_eq!(records[1].amount, dec!(100));
        assert!(crate::journal::is_balanced(&records));
    }

    #[tokio::test]
    async fn test_redelivered_transfer_is_skipped() {
        let (memory, engine) = engine();
        let id = EventId::new(10, 0);

        transfer(&engine, "X", "Y", dec!(100), id).await;
        let before = memory.balances();

        let (debit, credit) = transfer(&engine, "X", "Y", dec!(100), id).await;
        assert_eq!(debit, TransferOutcome::AlreadyApplied);
        assert_eq!(credit, TransferOutcome::AlreadyApplied);
        assert_eq!(memory.balances(), before);
        assert_eq!(memory.transfers().len(), 2);
    }

    #[tokio::test]
    async fn test_self_transfer_nets_to_zero() {
        let (memory, engine) = engine();
        let dot = TokenSymbol::new("DOT");
        let id = EventId::new(3, 2);

        let mut balance = engine
            .store()
            .get_or_create_balance(&AccountId::new("X"), &dot)
            .await
            .unwrap();
        engine
            .apply_transfer(&mut balance, TransferDirection::From, dec!(5), id, Utc::now())
            .await
            .unwrap();
        engine
            .apply_transfer(&mut balance, TransferDirection::To, dec!(5), id, Utc::now())
            .await
            .unwrap();

        assert_eq!(balance.balance, dec!(0));
        assert_eq!(memory.balances()[0].balance, dec!(0));
        assert_eq!(memory.transfers().len(), 2);
    }

    #[tokio::test]
    async fn test_overflow_leaves_state_untouched() {
        let (memory, engine) = engine();
        let mut balance = engine
            .store()
            .get_or_create_balance(&AccountId::new("X"), &TokenSymbol::new("DOT"))
            .await
            .unwrap();
        balance.balance = Decimal::MAX;

        let err = engine
            .apply_transfer(
                &mut balance,
                TransferDirection::To,
                dec!(1),
                EventId::new(1, 0),
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "ARITHMETIC_OVERFLOW");
        assert_eq!(balance.balance, Decimal::MAX);
        assert!(memory.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_negative_amount_rejected() {
        let (_memory, engine) = engine();
        let mut balance = AccountBalance::zero(chainledger_common::BalanceKey::new(
            AccountId::new("X"),
            TokenSymbol::new("DOT"),
        ));

        let err = engine
            .apply_transfer(
                &mut balance,
                TransferDirection::To,
                dec!(-1),
                EventId::new(1, 0),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_AMOUNT");
    }

    #[tokio::test]
    async fn test_liquidity_day_scenario() {
        let (memory, engine) = engine();
        let day = DayKey::parse("20230615").unwrap();
        let (dot, aca) = (TokenSymbol::new("DOT"), TokenSymbol::new("ACA"));
        let mut summary = engine
            .store()
            .get_or_create_liquidity_summary(&dot, &aca, &day)
            .await
            .unwrap();

        let outcome = engine
            .apply_liquidity_delta(
                &mut summary,
                &BigInt::from(500),
                &BigInt::from(1000),
                LiquidityDirection::Add,
                EventId::new(20, 1),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, LiquidityOutcome::Applied);

        engine
            .apply_liquidity_delta(
                &mut summary,
                &BigInt::from(200),
                &BigInt::from(400),
                LiquidityDirection::Remove,
                EventId::new(21, 0),
                Utc::now(),
            )
            .await
            .unwrap();

        let stored = &memory.liquidity_summaries()[0];
        assert_eq!(stored.key.to_string(), "DOT|ACA|20230615");
        assert_eq!(stored.token0_daily_total, BigInt::from(300));
        assert_eq!(stored.token1_daily_total, BigInt::from(600));
        assert_eq!(memory.liquidity_changes().len(), 2);
    }

    #[tokio::test]
    async fn test_redelivered_liquidity_is_skipped() {
        let (memory, engine) = engine();
        let day = DayKey::parse("20230615").unwrap();
        let mut summary = engine
            .store()
            .get_or_create_liquidity_summary(&"DOT".into(), &"ACA".into(), &day)
            .await
            .unwrap();

        for expected in [LiquidityOutcome::Applied, LiquidityOutcome::AlreadyApplied] {
            let outcome = engine
                .apply_liquidity_delta(
                    &mut summary,
                    &BigInt::from(7),
                    &BigInt::from(9),
                    LiquidityDirection::Add,
                    EventId::new(5, 0),
                    Utc::now(),
                )
                .await
                .unwrap();
            assert_eq!(outcome, expected);
        }

        assert_eq!(memory.liquidity_summaries()[0].token0_daily_total, BigInt::from(7));
    }

    /// Store whose batch writes always fail.
    struct FailingBatches(MemoryStore);

    #[async_trait]
    impl EntityStore for FailingBatches {
        async fn get(&self, key: &EntityKey) -> Result<Option<Entity>> {
            self.0.get(key).await
        }
        async fn save(&self, entity: Entity) -> Result<()> {
            self.0.save(entity).await
        }
        async fn save_batch(&self, _entities: Vec<Entity>) -> Result<()> {
            Err(LedgerError::StoreError("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_batch_counts_as_not_applied() {
        let engine = LedgerEngine::new(LedgerStore::new(Arc::new(FailingBatches(
            MemoryStore::new(),
        ))));
        let mut balance = engine
            .store()
            .get_or_create_balance(&AccountId::new("X"), &TokenSymbol::new("DOT"))
            .await
            .unwrap();

        let err = engine
            .apply_transfer(
                &mut balance,
                TransferDirection::From,
                dec!(1),
                EventId::new(1, 0),
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(balance.balance, dec!(0));
        let record = TransferRecordId::new(EventId::new(1, 0), TransferDirection::From);
        assert!(engine.store().transfer(&record).await.unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_transfer_conserves(cents in 0i64..1_000_000_000_000, block in 0u64..10_000) {
            let amount = Decimal::new(cents, 2);
            let (memory, engine) = engine();
            tokio_test::block_on(transfer(&engine, "A", "B", amount, EventId::new(block, 0)));

            let net = net_by_currency(memory.transfers().iter());
            prop_assert_eq!(net.get(&TokenSymbol::new("DOT")).copied(), Some(Decimal::ZERO));
        }

        #[test]
        fn prop_add_then_remove_returns_to_zero(a in 0u128.., b in 0u128..) {
            let (memory, engine) = engine();
            tokio_test::block_on(async {
                let day = DayKey::parse("20240101").unwrap();
                let mut summary = engine
                    .store()
                    .get_or_create_liquidity_summary(&"DOT".into(), &"ACA".into(), &day)
                    .await
                    .unwrap();
                let (a, b) = (BigInt::from(a), BigInt::from(b));
                engine
                    .apply_liquidity_delta(&mut summary, &a, &b, LiquidityDirection::Add, EventId::new(1, 0), Utc::now())
                    .await
                    .unwrap();
                engine
                    .apply_liquidity_delta(&mut summary, &a, &b, LiquidityDirection::Remove, EventId::new(1, 1), Utc::now())
                    .await
                    .unwrap();
            });

            let stored = &memory.liquidity_summaries()[0];
            prop_assert_eq!(&stored.token0_daily_total, &BigInt::from(0));
            prop_assert_eq!(&stored.token1_daily_total, &BigInt::from(0));
        }
    }
}
