//! Transfer records: the append-only audit trail of balance mutations.

use chainledger_common::{
    BalanceKey, Timestamp, TokenSymbol, TransferDirection, TransferId, TransferRecordId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One side of a transfer applied to one balance. Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyTransfer {
    /// Transfer id and side.
    pub id: TransferRecordId,
    /// Balance this record was applied to.
    pub balance: BalanceKey,
    /// Signed amount: negative for debits, positive for credits.
    pub amount: Decimal,
    /// Event time.
    pub timestamp: Timestamp,
}

impl CurrencyTransfer {
    /// Build the record for one side of a transfer.
    pub fn new(
        transfer_id: TransferId,
        direction: TransferDirection,
        balance: BalanceKey,
        amount: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: TransferRecordId::new(transfer_id, direction),
            balance,
            amount: direction.signed(amount),
            timestamp,
        }
    }

    pub fn direction(&self) -> TransferDirection {
        self.id.direction
    }

    pub fn transfer_id(&self) -> TransferId {
        self.id.transfer_id
    }
}

/// Net signed amount per currency across a set of records.
///
/// Both sides of a plain-token transfer net to zero.
pub fn net_by_currency<'a>(
    records: impl IntoIterator<Item = &'a CurrencyTransfer>,
) -> HashMap<TokenSymbol, Decimal> {
    let mut totals: HashMap<TokenSymbol, Decimal> = HashMap::new();
    for record in records {
        *totals
            .entry(record.balance.currency.clone())
            .or_insert(Decimal::ZERO) += record.amount;
    }
    totals
}

/// Check that records net to zero in every currency.
pub fn is_balanced<'a>(records: impl IntoIterator<Item = &'a CurrencyTransfer>) -> bool {
    net_by_currency(records)
        .values()
        .all(|total| total.is_zero())
}
