//! ChainLedger Ledger Engine
//!
//! Double-entry balance ledger and daily liquidity aggregation over a
//! pluggable entity store. Every mutation is deduplicated on its source
//! event so replays leave state unchanged.

pub mod engine;
pub mod account;
pub mod journal;
pub mod balance;
pub mod liquidity;
pub mod store;

pub use engine::{LedgerEngine, LiquidityOutcome, TransferOutcome};
pub use account::Account;
pub use journal::CurrencyTransfer;
pub use balance::AccountBalance;
pub use liquidity::{DailyLiquiditySummary, LiquidityChange};
pub use store::{Entity, EntityKey, EntityKind, EntityStore, LedgerStore, MemoryStore, PgEntityStore};
