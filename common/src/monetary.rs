//! Amount parsing and signed-delta rules.
//!
//! Balances are `rust_decimal::Decimal`; liquidity totals are raw chain units
//! held in `num_bigint::BigInt`. Nothing here goes through floating point.

use num_bigint::BigInt;
use num_traits::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{LedgerError, Result};

/// Side of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Sender side, debited.
    From,
    /// Receiver side, credited.
    To,
}

impl TransferDirection {
    /// Signed delta for an unsigned amount: negative for `From`.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            TransferDirection::From => -amount,
            TransferDirection::To => amount,
        }
    }

    /// Lowercase name used in record ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::From => "from",
            TransferDirection::To => "to",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a liquidity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityDirection {
    /// Liquidity added to the pool.
    Add,
    /// Liquidity removed from the pool.
    Remove,
}

impl LiquidityDirection {
    /// Sign factor: +1 for add, -1 for remove.
    pub fn factor(&self) -> i8 {
        match self {
            LiquidityDirection::Add => 1,
            LiquidityDirection::Remove => -1,
        }
    }

    /// Signed delta for an unsigned raw amount.
    pub fn signed(&self, amount: &BigInt) -> BigInt {
        match self {
            LiquidityDirection::Add => amount.clone(),
            LiquidityDirection::Remove => -amount,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LiquidityDirection::Add => "add",
            LiquidityDirection::Remove => "remove",
        }
    }
}

impl fmt::Display for LiquidityDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a decoded event value into a non-negative decimal amount.
///
/// Accepts decimal strings (`"100"`, `"0.5"`), `0x`-prefixed hex strings and
/// JSON numbers.
pub fn parse_decimal_amount(value: &Value) -> Result<Decimal> {
    let amount = match value {
        Value::String(s) => parse_decimal_str(s)?,
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Decimal::from(v)
            } else {
                parse_decimal_str(&n.to_string())?
            }
        }
        other => {
            return Err(LedgerError::invalid_amount(
                other.to_string(),
                "expected a string or number",
            ))
        }
    };

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::invalid_amount(
            value.to_string(),
            "amount must not be negative",
        ));
    }

    Ok(amount)
}

fn parse_decimal_str(s: &str) -> Result<Decimal> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid_amount(s, "empty amount"));
    }

    if let Some(hex) = strip_hex_prefix(trimmed) {
        let raw = parse_hex(hex).ok_or_else(|| LedgerError::invalid_amount(s, "invalid hex"))?;
        return Decimal::from_str_exact(&raw.to_string())
            .map_err(|e| LedgerError::invalid_amount(s, e.to_string()));
    }

    Decimal::from_str_exact(trimmed).map_err(|e| LedgerError::invalid_amount(s, e.to_string()))
}

/// Parse a decoded event value into a non-negative raw integer amount.
///
/// Accepts decimal digit strings, `0x`-prefixed hex strings and unsigned JSON
/// integers. Fractional values are rejected.
pub fn parse_raw_amount(value: &Value) -> Result<BigInt> {
    let amount = match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(LedgerError::invalid_amount(s.as_str(), "empty amount"));
            }
            match strip_hex_prefix(trimmed) {
                Some(hex) => parse_hex(hex),
                None if trimmed.bytes().all(|b| b.is_ascii_digit()) => {
                    trimmed.parse::<BigInt>().ok()
                }
                None => None,
            }
            .ok_or_else(|| LedgerError::invalid_amount(s.as_str(), "not an unsigned integer"))?
        }
        Value::Number(n) => n.as_u64().map(BigInt::from).ok_or_else(|| {
            LedgerError::invalid_amount(n.to_string(), "not an unsigned integer")
        })?,
        other => {
            return Err(LedgerError::invalid_amount(
                other.to_string(),
                "expected a string or number",
            ))
        }
    };

    debug_assert!(!amount.is_negative());
    Ok(amount)
}

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

fn parse_hex(hex: &str) -> Option<BigInt> {
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    BigInt::parse_bytes(hex.as_bytes(), 16)
}

/// Serde module storing a `BigInt` as its decimal string.
///
/// Use with `#[serde(with = "bigint_string")]`.
pub mod bigint_string {
    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigInt, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<BigInt, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<BigInt>().map_err(serde::de::Error::custom)
    }
}
