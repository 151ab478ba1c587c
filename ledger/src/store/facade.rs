//! Typed get-or-create accessors over an [`EntityStore`].

use std::sync::Arc;

use tracing::debug;

use chainledger_common::{
    AccountId, BalanceKey, DayKey, EventId, LedgerError, LiquiditySummaryKey, Result, TokenSymbol,
    TransferRecordId,
};

use super::{EntityKey, EntityStore, StoredEntity};
use crate::account::Account;
use crate::balance::AccountBalance;
use crate::journal::CurrencyTransfer;
use crate::liquidity::{DailyLiquiditySummary, LiquidityChange};

/// Ledger view of the entity store.
///
/// Get-or-create calls persist new entities immediately, so later reads in
/// the same event observe them. Repeating a call returns the stored entity
/// unchanged.
#[derive(Clone)]
pub struct LedgerStore {
    store: Arc<dyn EntityStore>,
}

impl LedgerStore {
    /// Wrap an entity store.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// The underlying entity store.
    pub fn inner(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    async fn load<T: StoredEntity>(&self, key: EntityKey) -> Result<Option<T>> {
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(entity) => T::from_entity(entity).map(Some).ok_or_else(|| {
                LedgerError::EntityMismatch {
                    key: key.to_string(),
                    expected: T::KIND.name(),
                }
            }),
        }
    }

    async fn get_or_create<T, F>(&self, key: EntityKey, create: F) -> Result<T>
    where
        T: StoredEntity + Clone,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.load::<T>(key.clone()).await? {
            return Ok(existing);
        }

        let created = create();
        self.store.save(created.clone().into_entity()).await?;
        debug!(key = %key, "Created entity");
        Ok(created)
    }

    /// Load or create the account for an address.
    pub async fn get_or_create_account(&self, address: &AccountId) -> Result<Account> {
        self.get_or_create(EntityKey::Account(address.clone()), || {
            Account::new(address.clone())
        })
        .await
    }

    /// Load or create an account's balance in a currency, starting at zero.
    pub async fn get_or_create_balance(
        &self,
        address: &AccountId,
        currency: &TokenSymbol,
    ) -> Result<AccountBalance> {
        let key = BalanceKey::new(address.clone(), currency.clone());
        self.get_or_create(EntityKey::AccountBalance(key.clone()), || {
            AccountBalance::zero(key)
        })
        .await
    }

    /// Load or create the liquidity bucket of a token pair on a day.
    pub async fn get_or_create_liquidity_summary(
        &self,
        token0: &TokenSymbol,
        token1: &TokenSymbol,
        day: &DayKey,
    ) -> Result<DailyLiquiditySummary> {
        let key = LiquiditySummaryKey::new(token0.clone(), token1.clone(), day.clone());
        self.get_or_create(EntityKey::DailyLiquiditySummary(key.clone()), || {
            DailyLiquiditySummary::zero(key)
        })
        .await
    }

    pub async fn account(&self, address: &AccountId) -> Result<Option<Account>> {
        self.load(EntityKey::Account(address.clone())).await
    }

    pub async fn balance(&self, key: &BalanceKey) -> Result<Option<AccountBalance>> {
        self.load(EntityKey::AccountBalance(key.clone())).await
    }

    pub async fn transfer(&self, id: &TransferRecordId) -> Result<Option<CurrencyTransfer>> {
        self.load(EntityKey::CurrencyTransfer(*id)).await
    }

    pub async fn liquidity_summary(
        &self,
        key: &LiquiditySummaryKey,
    ) -> Result<Option<DailyLiquiditySummary>> {
        self.load(EntityKey::DailyLiquiditySummary(key.clone())).await
    }

    pub async fn liquidity_change(&self, id: &EventId) -> Result<Option<LiquidityChange>> {
        self.load(EntityKey::LiquidityChange(*id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Entity, MemoryStore};
    use rust_decimal_macros::dec;

    fn ledger_store() -> (Arc<MemoryStore>, LedgerStore) {
        let memory = Arc::new(MemoryStore::new());
        (memory.clone(), LedgerStore::new(memory))
    }

    #[tokio::test]
    async fn test_get_or_create_account_is_idempotent() {
        let (memory, store) = ledger_store();
        let address = AccountId::new("X");

        let first = store.get_or_create_account(&address).await.unwrap();
        let second = store.get_or_create_account(&address).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_balance_keeps_mutations() {
        let (memory, store) = ledger_store();
        let address = AccountId::new("X");
        let dot = TokenSymbol::new("DOT");

        let mut balance = store.get_or_create_balance(&address, &dot).await.unwrap();
        assert_eq!(balance.balance, dec!(0));

        balance.balance = dec!(42);
        memory.save(Entity::AccountBalance(balance)).await.unwrap();

        let again = store.get_or_create_balance(&address, &dot).await.unwrap();
        assert_eq!(again.balance, dec!(42));
    }

    #[tokio::test]
    async fn test_get_or_create_summary_persists_immediately() {
        let (_memory, store) = ledger_store();
        let day = DayKey::parse("20230615").unwrap();
        let (dot, aca) = (TokenSymbol::new("DOT"), TokenSymbol::new("ACA"));

        let created = store
            .get_or_create_liquidity_summary(&dot, &aca, &day)
            .await
            .unwrap();

        let loaded = store.liquidity_summary(&created.key).await.unwrap();
        assert_eq!(loaded, Some(created));
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_reported() {
        // A store that answers every read with an account.
        struct Confused;

        #[async_trait::async_trait]
        impl EntityStore for Confused {
            async fn get(&self, _key: &EntityKey) -> Result<Option<Entity>> {
                Ok(Some(Account::new(AccountId::new("Z")).into()))
            }
            async fn save(&self, _entity: Entity) -> Result<()> {
                Ok(())
            }
            async fn save_batch(&self, _entities: Vec<Entity>) -> Result<()> {
                Ok(())
            }
        }

        let store = LedgerStore::new(Arc::new(Confused));
        let key = BalanceKey::new(AccountId::new("X"), TokenSymbol::new("DOT"));
        let err = store.balance(&key).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::EntityMismatch { expected: "AccountBalance", .. }
        ));
    }
}
