//! Account definitions for ledger.

use chainledger_common::AccountId;
use serde::{Deserialize, Serialize};

/// A chain account seen by the indexer.
///
/// Carries no state beyond its existence; created on first reference and
/// never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Chain address.
    pub id: AccountId,
}

impl Account {
    /// Create a new account.
    pub fn new(id: AccountId) -> Self {
        Self { id }
    }
}
