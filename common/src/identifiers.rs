//! Identifier and composite key types for ChainLedger entities.
//!
//! Composite keys are structured values. Stores key on the structure itself,
//! so component values containing `-` or `|` cannot collide.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::monetary::TransferDirection;
use crate::time::DayKey;

/// Chain address of an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new account ID.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Canonical token symbol, e.g. `DOT` or `DOT<>ACA LP`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenSymbol(String);

impl TokenSymbol {
    /// Symbol assigned to descriptors the resolver does not recognize.
    pub const UNKNOWN: &'static str = "UNKNOWN";

    /// Create a new token symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// The unknown-token sentinel.
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    /// Check if this is the unknown-token sentinel.
    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    /// Get the symbol as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TokenSymbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Position of an event in the chain: block number, then index within block.
///
/// Ordering follows chain order. Transfer ids are event ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EventId {
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Index of the event within the block.
    pub event_index: u32,
}

impl EventId {
    /// Create a new event ID.
    pub fn new(block_number: u64, event_index: u32) -> Self {
        Self {
            block_number,
            event_index,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.block_number, self.event_index)
    }
}

/// Identifier of a transfer: the event that carried it.
pub type TransferId = EventId;

/// Key of a single CurrencyTransfer record: one side of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferRecordId {
    /// Transfer this record belongs to.
    pub transfer_id: TransferId,
    /// Side of the transfer.
    pub direction: TransferDirection,
}

impl TransferRecordId {
    /// Create a new transfer record ID.
    pub fn new(transfer_id: TransferId, direction: TransferDirection) -> Self {
        Self {
            transfer_id,
            direction,
        }
    }
}

impl fmt::Display for TransferRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.transfer_id, self.direction)
    }
}

/// Key of an AccountBalance: one account's holding of one currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    /// Owning account.
    pub address: AccountId,
    /// Currency held.
    pub currency: TokenSymbol,
}

impl BalanceKey {
    /// Create a new balance key.
    pub fn new(address: AccountId, currency: TokenSymbol) -> Self {
        Self { address, currency }
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.currency)
    }
}

/// Key of a DailyLiquiditySummary: one token pair on one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LiquiditySummaryKey {
    pub token0: TokenSymbol,
    pub token1: TokenSymbol,
    pub day: DayKey,
}

impl LiquiditySummaryKey {
    /// Create a new summary key.
    pub fn new(token0: TokenSymbol, token1: TokenSymbol, day: DayKey) -> Self {
        Self {
            token0,
            token1,
            day,
        }
    }
}

impl fmt::Display for LiquiditySummaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.token0, self.token1, self.day)
    }
}
