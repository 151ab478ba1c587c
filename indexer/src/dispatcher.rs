//! Event dispatcher: routes each chain event to the ledger.

use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use chainledger_common::{
    day_key, LiquidityDirection, Result, TokenResolver, TransferDirection, TransferRecordId,
};
use chainledger_ledger::{AccountBalance, LedgerEngine, LedgerStore};

use crate::chain_state::ChainStateReader;
use crate::event::{ChainEvent, EventKind};

/// What dispatching one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one side of a transfer was applied.
    TransferApplied {
        /// Touched balances that disagree with chain state.
        drifted: usize,
    },
    LiquidityApplied,
    /// The event had been applied before; nothing changed.
    Duplicate,
    /// Not an event the ledger tracks.
    Ignored,
}

/// Stateless router from chain events to ledger mutations.
#[derive(Clone)]
pub struct EventDispatcher {
    engine: LedgerEngine,
    resolver: TokenResolver,
    chain_state: Option<Arc<dyn ChainStateReader>>,
}

impl EventDispatcher {
    pub fn new(engine: LedgerEngine) -> Self {
        Self {
            engine,
            resolver: TokenResolver::new(),
            chain_state: None,
        }
    }

    /// Compare touched balances with chain state after each transfer.
    pub fn with_reconciliation(mut self, reader: Arc<dyn ChainStateReader>) -> Self {
        self.chain_state = Some(reader);
        self
    }

    pub fn store(&self) -> &LedgerStore {
        self.engine.store()
    }

    /// Apply one event.
    #[instrument(
        skip(self, event),
        fields(block = event.block_number, index = event.event_index, section = %event.section, method = %event.method)
    )]
    pub async fn dispatch(&self, event: &ChainEvent) -> Result<DispatchOutcome> {
        match event.kind() {
            EventKind::Transfer => self.handle_transfer(event).await,
            EventKind::Liquidity(direction) => self.handle_liquidity(event, direction).await,
            EventKind::Ignored => {
                trace!("Ignoring event");
                Ok(DispatchOutcome::Ignored)
            }
        }
    }

    async fn handle_transfer(&self, event: &ChainEvent) -> Result<DispatchOutcome> {
        let payload = event.transfer_payload()?;
        let (from_token, to_token) = self.resolver.resolve_transfer_tokens(&payload.currency);
        let store = self.engine.store();
        let transfer_id = event.id();

        store.get_or_create_account(&payload.from).await?;
        store.get_or_create_account(&payload.to).await?;

        let mut sender = store.get_or_create_balance(&payload.from, &from_token).await?;
        // A self-transfer in one token touches a single balance; both sides
        // must see each other's update.
        let mut receiver = if payload.from == payload.to && from_token == to_token {
            None
        } else {
            Some(store.get_or_create_balance(&payload.to, &to_token).await?)
        };

        self.check_transfer_fits(&sender, receiver.as_ref(), payload.amount, event)
            .await?;

        let debit = self
            .engine
            .apply_transfer(
                &mut sender,
                TransferDirection::From,
                payload.amount,
                transfer_id,
                event.timestamp,
            )
            .await?;
        let credit = self
            .engine
            .apply_transfer(
                receiver.as_mut().unwrap_or(&mut sender),
                TransferDirection::To,
                payload.amount,
                transfer_id,
                event.timestamp,
            )
            .await?;

        if !debit.is_applied() && !credit.is_applied() {
            debug!(transfer = %transfer_id, "Transfer already applied");
            return Ok(DispatchOutcome::Duplicate);
        }

        let mut drifted = self.reconcile(&sender).await;
        if let Some(receiver) = &receiver {
            drifted += self.reconcile(receiver).await;
        }

        Ok(DispatchOutcome::TransferApplied { drifted })
    }

    /// Fails with the overflow before either side of the transfer is
    /// written. Sides already recorded are not applied again, so they are
    /// not checked.
    async fn check_transfer_fits(
        &self,
        sender: &AccountBalance,
        receiver: Option<&AccountBalance>,
        amount: rust_decimal::Decimal,
        event: &ChainEvent,
    ) -> Result<()> {
        let store = self.engine.store();
        let transfer_id = event.id();
        let debit_id = TransferRecordId::new(transfer_id, TransferDirection::From);
        let credit_id = TransferRecordId::new(transfer_id, TransferDirection::To);

        let mut projected = sender.clone();
        if store.transfer(&debit_id).await?.is_none() {
            projected.balance = sender.checked_apply(TransferDirection::From.signed(amount))?;
        }
        if store.transfer(&credit_id).await?.is_none() {
            receiver
                .unwrap_or(&projected)
                .checked_apply(TransferDirection::To.signed(amount))?;
        }
        Ok(())
    }

    async fn handle_liquidity(
        &self,
        event: &ChainEvent,
        direction: LiquidityDirection,
    ) -> Result<DispatchOutcome> {
        let payload = event.liquidity_payload()?;
        let token0 = self.resolver.resolve_liquidity_token(&payload.currency0);
        let token1 = self.resolver.resolve_liquidity_token(&payload.currency1);
        let day = day_key(event.timestamp)?;

        let mut summary = self
            .engine
            .store()
            .get_or_create_liquidity_summary(&token0, &token1, &day)
            .await?;

        let outcome = self
            .engine
            .apply_liquidity_delta(
                &mut summary,
                &payload.amount0,
                &payload.amount1,
                direction,
                event.id(),
                event.timestamp,
            )
            .await?;

        if outcome.is_applied() {
            Ok(DispatchOutcome::LiquidityApplied)
        } else {
            Ok(DispatchOutcome::Duplicate)
        }
    }

    /// Returns 1 when the chain reports a different balance, 0 otherwise.
    /// Never fails the event.
    async fn reconcile(&self, balance: &AccountBalance) -> usize {
        let Some(reader) = &self.chain_state else {
            return 0;
        };

        match reader.free_balance(balance.account_id(), balance.currency()).await {
            Ok(Some(chain)) if chain != balance.balance => {
                warn!(
                    balance = %balance.key,
                    ledger = %balance.balance,
                    chain = %chain,
                    "Balance drift against chain state"
                );
                1
            }
            Ok(_) => 0,
            Err(e) => {
                warn!(balance = %balance.key, error = %e, "Chain state query failed");
                0
            }
        }
    }
}
