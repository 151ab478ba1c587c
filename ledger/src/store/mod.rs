//! Entity persistence.
//!
//! [`EntityStore`] is the key-value port the ledger writes through.
//! [`LedgerStore`] layers the typed get-or-create accessors on top of it.

mod facade;
mod memory;
mod postgres;

use async_trait::async_trait;
use std::fmt;

use chainledger_common::{
    AccountId, BalanceKey, EventId, LiquiditySummaryKey, Result, TransferRecordId,
};

use crate::account::Account;
use crate::balance::AccountBalance;
use crate::journal::CurrencyTransfer;
use crate::liquidity::{DailyLiquiditySummary, LiquidityChange};

pub use facade::LedgerStore;
pub use memory::MemoryStore;
pub use postgres::PgEntityStore;

/// Kind of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Account,
    AccountBalance,
    CurrencyTransfer,
    DailyLiquiditySummary,
    LiquidityChange,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Account => "Account",
            EntityKind::AccountBalance => "AccountBalance",
            EntityKind::CurrencyTransfer => "CurrencyTransfer",
            EntityKind::DailyLiquiditySummary => "DailyLiquiditySummary",
            EntityKind::LiquidityChange => "LiquidityChange",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed key of a stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Account(AccountId),
    AccountBalance(BalanceKey),
    CurrencyTransfer(TransferRecordId),
    DailyLiquiditySummary(LiquiditySummaryKey),
    LiquidityChange(EventId),
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityKey::Account(_) => EntityKind::Account,
            EntityKey::AccountBalance(_) => EntityKind::AccountBalance,
            EntityKey::CurrencyTransfer(_) => EntityKind::CurrencyTransfer,
            EntityKey::DailyLiquiditySummary(_) => EntityKind::DailyLiquiditySummary,
            EntityKey::LiquidityChange(_) => EntityKind::LiquidityChange,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Account(id) => write!(f, "{}:{}", self.kind(), id),
            EntityKey::AccountBalance(key) => write!(f, "{}:{}", self.kind(), key),
            EntityKey::CurrencyTransfer(id) => write!(f, "{}:{}", self.kind(), id),
            EntityKey::DailyLiquiditySummary(key) => write!(f, "{}:{}", self.kind(), key),
            EntityKey::LiquidityChange(id) => write!(f, "{}:{}", self.kind(), id),
        }
    }
}

/// Any stored entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Account(Account),
    AccountBalance(AccountBalance),
    CurrencyTransfer(CurrencyTransfer),
    DailyLiquiditySummary(DailyLiquiditySummary),
    LiquidityChange(LiquidityChange),
}

impl Entity {
    /// Key the entity is stored under.
    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Account(a) => EntityKey::Account(a.id.clone()),
            Entity::AccountBalance(b) => EntityKey::AccountBalance(b.key.clone()),
            Entity::CurrencyTransfer(t) => EntityKey::CurrencyTransfer(t.id),
            Entity::DailyLiquiditySummary(s) => EntityKey::DailyLiquiditySummary(s.key.clone()),
            Entity::LiquidityChange(c) => EntityKey::LiquidityChange(c.id),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Account(_) => EntityKind::Account,
            Entity::AccountBalance(_) => EntityKind::AccountBalance,
            Entity::CurrencyTransfer(_) => EntityKind::CurrencyTransfer,
            Entity::DailyLiquiditySummary(_) => EntityKind::DailyLiquiditySummary,
            Entity::LiquidityChange(_) => EntityKind::LiquidityChange,
        }
    }
}

/// Conversion between a concrete entity type and [`Entity`].
pub trait StoredEntity: Sized {
    const KIND: EntityKind;

    fn into_entity(self) -> Entity;

    fn from_entity(entity: Entity) -> Option<Self>;
}

macro_rules! stored_entity {
    ($ty:ty, $variant:ident) => {
        impl StoredEntity for $ty {
            const KIND: EntityKind = EntityKind::$variant;

            fn into_entity(self) -> Entity {
                Entity::$variant(self)
            }

            fn from_entity(entity: Entity) -> Option<Self> {
                match entity {
                    Entity::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Entity {
            fn from(value: $ty) -> Self {
                Entity::$variant(value)
            }
        }
    };
}

stored_entity!(Account, Account);
stored_entity!(AccountBalance, AccountBalance);
stored_entity!(CurrencyTransfer, CurrencyTransfer);
stored_entity!(DailyLiquiditySummary, DailyLiquiditySummary);
stored_entity!(LiquidityChange, LiquidityChange);

/// Key-value persistence for ledger entities.
///
/// Reads must observe every write acknowledged earlier. Errors are
/// [`LedgerError::StoreError`](chainledger_common::LedgerError::StoreError)
/// or [`LedgerError::Timeout`](chainledger_common::LedgerError::Timeout)
/// and may be transient.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Load an entity by key.
    async fn get(&self, key: &EntityKey) -> Result<Option<Entity>>;

    /// Insert or replace an entity.
    async fn save(&self, entity: Entity) -> Result<()>;

    /// Insert or replace several entities atomically: after an error none
    /// of them is visible.
    async fn save_batch(&self, entities: Vec<Entity>) -> Result<()>;
}
