//! Currency descriptor decoding.
//!
//! A descriptor is the chain's JSON encoding of a currency: either a plain
//! token (`{"token": "DOT"}`) or a dex share over two sub-descriptors
//! (`{"dexShare": [{"token": "DOT"}, {"token": "ACA"}]}`). Anything else maps
//! to the [`TokenSymbol::UNKNOWN`] sentinel so new chain variants never stop
//! the stream.

use serde_json::Value;
use tracing::warn;

use crate::identifiers::TokenSymbol;

/// Decoded currency descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrencyDescriptor {
    /// A plain token.
    Token(TokenSymbol),
    /// Liquidity-pool share over two underlying tokens.
    DexShare(TokenSymbol, TokenSymbol),
    /// A shape the resolver does not recognize.
    Unknown,
}

impl CurrencyDescriptor {
    /// Decode a descriptor from an event value.
    pub fn from_value(value: &Value) -> Self {
        if let Some(symbol) = value.get("token").and_then(Value::as_str) {
            return CurrencyDescriptor::Token(TokenSymbol::new(symbol));
        }

        if let Some(pair) = value.get("dexShare").and_then(Value::as_array) {
            if let [a, b] = pair.as_slice() {
                return CurrencyDescriptor::DexShare(sub_symbol(a), sub_symbol(b));
            }
        }

        // Some codecs hand over the descriptor as JSON text.
        if let Value::String(text) = value {
            if let Ok(inner @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
                return Self::from_value(&inner);
            }
        }

        CurrencyDescriptor::Unknown
    }

    /// Decode a descriptor from JSON text.
    pub fn from_json(text: &str) -> Self {
        serde_json::from_str::<Value>(text)
            .map(|v| Self::from_value(&v))
            .unwrap_or(CurrencyDescriptor::Unknown)
    }
}

/// Symbol of a dex-share component: a `{"token": ..}` object or a bare string.
fn sub_symbol(value: &Value) -> TokenSymbol {
    match value {
        Value::String(s) if !s.is_empty() => TokenSymbol::new(s.as_str()),
        _ => match CurrencyDescriptor::from_value(value) {
            CurrencyDescriptor::Token(symbol) => symbol,
            _ => TokenSymbol::unknown(),
        },
    }
}

/// Resolves currency descriptors into canonical token symbols.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenResolver;

impl TokenResolver {
    /// Create a new resolver.
    pub fn new() -> Self {
        Self
    }

    /// Tokens debited and credited by a transfer of this currency.
    ///
    /// A plain token moves on both sides. A dex share debits its first
    /// underlying token and credits its second.
    pub fn resolve_transfer_tokens(&self, descriptor: &Value) -> (TokenSymbol, TokenSymbol) {
        match CurrencyDescriptor::from_value(descriptor) {
            CurrencyDescriptor::Token(symbol) => (symbol.clone(), symbol),
            CurrencyDescriptor::DexShare(a, b) => (a, b),
            CurrencyDescriptor::Unknown => {
                warn!(descriptor = %descriptor, "Unrecognized currency descriptor");
                (TokenSymbol::unknown(), TokenSymbol::unknown())
            }
        }
    }

    /// Token label used for liquidity aggregation.
    ///
    /// A dex share becomes the pair's LP label, e.g. `DOT<>ACA LP`.
    pub fn resolve_liquidity_token(&self, descriptor: &Value) -> TokenSymbol {
        match CurrencyDescriptor::from_value(descriptor) {
            CurrencyDescriptor::Token(symbol) => symbol,
            CurrencyDescriptor::DexShare(a, b) => lp_label(&a, &b),
            CurrencyDescriptor::Unknown => {
                warn!(descriptor = %descriptor, "Unrecognized liquidity descriptor");
                TokenSymbol::unknown()
            }
        }
    }
}

/// Label of the share token of a liquidity pair.
pub fn lp_label(token_a: &TokenSymbol, token_b: &TokenSymbol) -> TokenSymbol {
    TokenSymbol::new(format!("{token_a}<>{token_b} LP"))
}
