//! Account balance tracking.

use chainledger_common::{AccountId, BalanceKey, LedgerError, Result, TokenSymbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One account's balance in one currency.
///
/// The balance always equals the signed sum of the
/// [`CurrencyTransfer`](crate::CurrencyTransfer) records referencing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Owning account and currency.
    pub key: BalanceKey,
    /// Current balance. May go negative when the indexer starts mid-history.
    pub balance: Decimal,
}

impl AccountBalance {
    /// Create a new zero balance.
    pub fn zero(key: BalanceKey) -> Self {
        Self {
            key,
            balance: Decimal::ZERO,
        }
    }

    /// Owning account.
    pub fn account_id(&self) -> &AccountId {
        &self.key.address
    }

    /// Currency of the balance.
    pub fn currency(&self) -> &TokenSymbol {
        &self.key.currency
    }

    /// Balance after adding a signed delta, without mutating.
    pub fn checked_apply(&self, delta: Decimal) -> Result<Decimal> {
        self.balance.checked_add(delta).ok_or_else(|| {
            LedgerError::ArithmeticOverflow(format!("applying {delta} to balance {}", self.key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key() -> BalanceKey {
        BalanceKey::new(AccountId::new("X"), TokenSymbol::new("DOT"))
    }

    #[test]
    fn test_zero_balance() {
        let balance = AccountBalance::zero(key());
        assert_eq!(balance.balance, Decimal::ZERO);
        assert_eq!(balance.account_id().as_str(), "X");
        assert_eq!(balance.currency().as_str(), "DOT");
    }

    #[test]
    fn test_checked_apply() {
        let mut balance = AccountBalance::zero(key());
        balance.balance = dec!(10.5);
        assert_eq!(balance.checked_apply(dec!(-20)).unwrap(), dec!(-9.5));

        balance.balance = Decimal::MAX;
        let err = balance.checked_apply(dec!(1)).unwrap_err();
        assert_eq!(err.error_code(), "ARITHMETIC_OVERFLOW");
    }
}
