//! Chain event model and payload decoding.

use num_bigint::BigInt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainledger_common::{
    parse_decimal_amount, parse_raw_amount, AccountId, EventId, LedgerError, LiquidityDirection,
    Result, Timestamp,
};

/// A decoded chain event as delivered by an event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    /// Pallet that emitted the event, e.g. `currencies`.
    pub section: String,
    /// Event name, e.g. `Transferred`.
    pub method: String,
    /// Positional payload.
    #[serde(default)]
    pub data: Vec<Value>,
    pub block_number: u64,
    pub event_index: u32,
    /// Block time; unix milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: Timestamp,
}

impl ChainEvent {
    /// Position of the event in the chain; also the transfer id.
    pub fn id(&self) -> EventId {
        EventId::new(self.block_number, self.event_index)
    }

    pub fn kind(&self) -> EventKind {
        EventKind::classify(&self.section, &self.method)
    }

    fn field(&self, position: usize, name: &str) -> Result<&Value> {
        self.data
            .get(position)
            .ok_or_else(|| self.malformed(format!("missing {name} at position {position}")))
    }

    fn address(&self, position: usize, name: &str) -> Result<AccountId> {
        match self.field(position, name)? {
            Value::String(s) if !s.is_empty() => Ok(AccountId::new(s.as_str())),
            other => Err(self.malformed(format!("{name} must be an address string, got {other}"))),
        }
    }

    fn malformed(&self, reason: String) -> LedgerError {
        LedgerError::malformed(self.section.as_str(), self.method.as_str(), reason)
    }

    /// Decode a `currencies.Transferred` payload: `[currency, from, to, amount]`.
    pub fn transfer_payload(&self) -> Result<TransferPayload> {
        Ok(TransferPayload {
            currency: self.field(0, "currency")?.clone(),
            from: self.address(1, "from")?,
            to: self.address(2, "to")?,
            amount: parse_decimal_amount(self.field(3, "amount")?)?,
        })
    }

    /// Decode a liquidity payload: `[who, currency0, amount0, currency1, amount1]`.
    pub fn liquidity_payload(&self) -> Result<LiquidityPayload> {
        Ok(LiquidityPayload {
            who: self.address(0, "who")?,
            currency0: self.field(1, "currency0")?.clone(),
            amount0: parse_raw_amount(self.field(2, "amount0")?)?,
            currency1: self.field(3, "currency1")?.clone(),
            amount1: parse_raw_amount(self.field(4, "amount1")?)?,
        })
    }
}

/// How the dispatcher treats an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Transfer,
    Liquidity(LiquidityDirection),
    Ignored,
}

impl EventKind {
    /// Classify by `(section, method)`.
    pub fn classify(section: &str, method: &str) -> Self {
        match (section, method) {
            ("currencies", "Transferred") => EventKind::Transfer,
            ("dex", "AddLiquidity" | "AddLiquidityEvent") => {
                EventKind::Liquidity(LiquidityDirection::Add)
            }
            ("dex", "RemoveLiquidity" | "RemoveLiquidityEvent") => {
                EventKind::Liquidity(LiquidityDirection::Remove)
            }
            _ => EventKind::Ignored,
        }
    }
}

/// Decoded transfer event payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPayload {
    /// Raw currency descriptor.
    pub currency: Value,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Decimal,
}

/// Decoded liquidity event payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityPayload {
    /// Liquidity provider.
    pub who: AccountId,
    pub currency0: Value,
    pub amount0: BigInt,
    pub currency1: Value,
    pub amount1: BigInt,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn event(section: &str, method: &str, data: Value) -> ChainEvent {
        serde_json::from_value(json!({
            "section": section,
            "method": method,
            "data": data,
            "block_number": 10,
            "event_index": 0,
            "timestamp": 1686787200000i64,
        }))
        .unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(EventKind::classify("currencies", "Transferred"), EventKind::Transfer);
        assert_eq!(
            EventKind::classify("dex", "AddLiquidity"),
            EventKind::Liquidity(LiquidityDirection::Add)
        );
        assert_eq!(
            EventKind::classify("dex", "RemoveLiquidityEvent"),
            EventKind::Liquidity(LiquidityDirection::Remove)
        );
        assert_eq!(EventKind::classify("balances", "Transfer"), EventKind::Ignored);
        assert_eq!(EventKind::classify("currencies", "Deposited"), EventKind::Ignored);
    }

    #[test]
    fn test_event_json_uses_millis() {
        let e = event("currencies", "Transferred", json!([]));
        assert_eq!(e.id(), EventId::new(10, 0));
        assert_eq!(e.timestamp.to_rfc3339(), "2023-06-15T00:00:00+00:00");
        assert_eq!(serde_json::to_value(&e).unwrap()["timestamp"], 1686787200000i64);
    }

    #[test]
    fn test_transfer_payload() {
        let e = event(
            "currencies",
            "Transferred",
            json!([{"token": "DOT"}, "X", "Y", "100"]),
        );
        let payload = e.transfer_payload().unwrap();
        assert_eq!(payload.from, AccountId::new("X"));
        assert_eq!(payload.to, AccountId::new("Y"));
        assert_eq!(payload.amount, dec!(100));
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let e = event("currencies", "Transferred", json!([{"token": "DOT"}, "X"]));
        assert_eq!(e.transfer_payload().unwrap_err().error_code(), "MALFORMED_EVENT");

        let e = event("currencies", "Transferred", json!([{"token": "DOT"}, 5, "Y", "1"]));
        assert_eq!(e.transfer_payload().unwrap_err().error_code(), "MALFORMED_EVENT");
    }

    #[test]
    fn test_liquidity_payload_bad_amount() {
        let e = event(
            "dex",
            "AddLiquidity",
            json!(["W", {"token": "DOT"}, "1.5", {"token": "ACA"}, "2"]),
        );
        assert_eq!(e.liquidity_payload().unwrap_err().error_code(), "INVALID_AMOUNT");
    }
}
