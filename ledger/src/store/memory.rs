//! In-memory entity store.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use chainledger_common::{
    AccountId, BalanceKey, EventId, LiquiditySummaryKey, Result, TransferRecordId,
};

use super::{Entity, EntityKey, EntityStore};
use crate::account::Account;
use crate::balance::AccountBalance;
use crate::journal::CurrencyTransfer;
use crate::liquidity::{DailyLiquiditySummary, LiquidityChange};

/// Entity store backed by concurrent hash maps, one per entity kind.
///
/// Batches are applied under an exclusive commit guard so readers never see
/// half of a batch.
#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<AccountId, Account>,
    balances: DashMap<BalanceKey, AccountBalance>,
    transfers: DashMap<TransferRecordId, CurrencyTransfer>,
    summaries: DashMap<LiquiditySummaryKey, DailyLiquiditySummary>,
    changes: DashMap<EventId, LiquidityChange>,
    commit: RwLock<()>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: &EntityKey) -> Option<Entity> {
        match key {
            EntityKey::Account(id) => self.accounts.get(id).map(|a| a.clone().into()),
            EntityKey::AccountBalance(key) => self.balances.get(key).map(|b| b.clone().into()),
            EntityKey::CurrencyTransfer(id) => self.transfers.get(id).map(|t| t.clone().into()),
            EntityKey::DailyLiquiditySummary(key) => {
                self.summaries.get(key).map(|s| s.clone().into())
            }
            EntityKey::LiquidityChange(id) => self.changes.get(id).map(|c| c.clone().into()),
        }
    }

    fn write(&self, entity: Entity) {
        match entity {
            Entity::Account(a) => {
                self.accounts.insert(a.id.clone(), a);
            }
            Entity::AccountBalance(b) => {
                self.balances.insert(b.key.clone(), b);
            }
            Entity::CurrencyTransfer(t) => {
                self.transfers.insert(t.id, t);
            }
            Entity::DailyLiquiditySummary(s) => {
                self.summaries.insert(s.key.clone(), s);
            }
            Entity::LiquidityChange(c) => {
                self.changes.insert(c.id, c);
            }
        }
    }

    /// Total number of stored entities.
    pub fn len(&self) -> usize {
        self.accounts.len()
            + self.balances.len()
            + self.transfers.len()
            + self.summaries.len()
            + self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// All balances, ordered by key.
    pub fn balances(&self) -> Vec<AccountBalance> {
        let mut all: Vec<_> = self.balances.iter().map(|b| b.value().clone()).collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// All transfer records, in chain order.
    pub fn transfers(&self) -> Vec<CurrencyTransfer> {
        let mut all: Vec<_> = self.transfers.iter().map(|t| t.value().clone()).collect();
        all.sort_by_key(|t| (t.id.transfer_id, t.id.direction.as_str()));
        all
    }

    /// All liquidity summaries, ordered by key.
    pub fn liquidity_summaries(&self) -> Vec<DailyLiquiditySummary> {
        let mut all: Vec<_> = self.summaries.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// All liquidity changes, in chain order.
    pub fn liquidity_changes(&self) -> Vec<LiquidityChange> {
        let mut all: Vec<_> = self.changes.iter().map(|c| c.value().clone()).collect();
        all.sort_by_key(|c| c.id);
        all
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<Entity>> {
        let _guard = self.commit.read();
        Ok(self.read(key))
    }

    async fn save(&self, entity: Entity) -> Result<()> {
        let _guard = self.commit.read();
        self.write(entity);
        Ok(())
    }

    async fn save_batch(&self, entities: Vec<Entity>) -> Result<()> {
        let _guard = self.commit.write();
        for entity in entities {
            self.write(entity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainledger_common::{TokenSymbol, TransferDirection};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_save_and_get() {
        let store = MemoryStore::new();
        let account = Account::new(AccountId::new("X"));

        assert!(store
            .get(&EntityKey::Account(account.id.clone()))
            .await
            .unwrap()
            .is_none());

        store.save(account.clone().into()).await.unwrap();

        let loaded = store
            .get(&EntityKey::Account(account.id.clone()))
            .await
            .unwrap();
        assert_eq!(loaded, Some(Entity::Account(account)));
    }

    #[tokio::test]
    async fn test_save_batch_and_listing() {
        let store = MemoryStore::new();
        let key = BalanceKey::new(AccountId::new("X"), TokenSymbol::new("DOT"));
        let mut balance = AccountBalance::zero(key.clone());
        balance.balance = dec!(-3);
        let record = CurrencyTransfer::new(
            EventId::new(1, 0),
            TransferDirection::From,
            key,
            dec!(3),
            Utc::now(),
        );

        store
            .save_batch(vec![record.clone().into(), balance.clone().into()])
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.balances(), vec![balance]);
        assert_eq!(store.transfers(), vec![record]);
    }

    #[tokio::test]
    async fn test_keys_with_delimiters_stay_distinct() {
        let store = MemoryStore::new();
        let a = AccountBalance::zero(BalanceKey::new(AccountId::new("ab"), TokenSymbol::new("c")));
        let b = AccountBalance::zero(BalanceKey::new(AccountId::new("a"), TokenSymbol::new("bc")));

        store.save(a.into()).await.unwrap();
        store.save(b.into()).await.unwrap();

        assert_eq!(store.balances().len(), 2);
    }
}
