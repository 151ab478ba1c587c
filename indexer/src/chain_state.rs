//! Read access to on-chain account state, used for balance reconciliation.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use chainledger_common::{AccountId, BalanceKey, Result, TokenSymbol};

/// Query capability for the chain's own view of balances.
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// Free balance the chain reports for an account, if it knows one.
    async fn free_balance(&self, address: &AccountId, token: &TokenSymbol)
        -> Result<Option<Decimal>>;
}

/// Reader that never knows a balance.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChainState;

#[async_trait]
impl ChainStateReader for NoChainState {
    async fn free_balance(
        &self,
        _address: &AccountId,
        _token: &TokenSymbol,
    ) -> Result<Option<Decimal>> {
        Ok(None)
    }
}

/// One balance the chain reported at some point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub address: AccountId,
    pub token: TokenSymbol,
    pub balance: Decimal,
}

/// Reader serving balances set up front.
#[derive(Debug, Default)]
pub struct StaticChainState {
    balances: DashMap<BalanceKey, Decimal>,
}

impl StaticChainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of snapshots; later entries win.
    pub fn from_snapshots(snapshots: impl IntoIterator<Item = BalanceSnapshot>) -> Self {
        let state = Self::new();
        for s in snapshots {
            state.set(s.address, s.token, s.balance);
        }
        state
    }

    /// Set the balance the chain reports for an account and token.
    pub fn set(&self, address: AccountId, token: TokenSymbol, balance: Decimal) {
        self.balances.insert(BalanceKey::new(address, token), balance);
    }
}

#[async_trait]
impl ChainStateReader for StaticChainState {
    async fn free_balance(
        &self,
        address: &AccountId,
        token: &TokenSymbol,
    ) -> Result<Option<Decimal>> {
        let key = BalanceKey::new(address.clone(), token.clone());
        Ok(self.balances.get(&key).map(|b| *b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_static_chain_state() {
        let state = StaticChainState::new();
        let (x, dot) = (AccountId::new("X"), TokenSymbol::new("DOT"));
        state.set(x.clone(), dot.clone(), dec!(7));

        assert_eq!(state.free_balance(&x, &dot).await.unwrap(), Some(dec!(7)));
        assert_eq!(
            state.free_balance(&AccountId::new("Y"), &dot).await.unwrap(),
            None
        );
        assert_eq!(NoChainState.free_balance(&x, &dot).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_from_snapshot_json() {
        let snapshots: Vec<BalanceSnapshot> = serde_json::from_str(
            r#"[{"address": "X", "token": "DOT", "balance": "1.5"},
                {"address": "X", "token": "DOT", "balance": "2"}]"#,
        )
        .unwrap();
        let state = StaticChainState::from_snapshots(snapshots);

        assert_eq!(
            state
                .free_balance(&AccountId::new("X"), &TokenSymbol::new("DOT"))
                .await
                .unwrap(),
            Some(dec!(2))
        );
    }
}
