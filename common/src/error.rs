//! Error types for ChainLedger.

use thiserror::Error;

/// Main error type for ChainLedger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Amount could not be parsed as a non-negative chain amount.
    #[error("Invalid amount {value:?}: {reason}")]
    InvalidAmount { value: String, reason: String },

    /// Event payload does not have the expected shape.
    #[error("Malformed {section}.{method} event: {reason}")]
    MalformedEvent {
        section: String,
        method: String,
        reason: String,
    },

    /// Event timestamp outside the representable calendar range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// Balance or aggregate arithmetic overflowed.
    #[error("Arithmetic overflow while {0}")]
    ArithmeticOverflow(String),

    /// Store returned an entity of a different kind than requested.
    #[error("Entity mismatch for {key}: expected {expected}")]
    EntityMismatch { key: String, expected: &'static str },

    /// Store read or write failed.
    #[error("Store error: {0}")]
    StoreError(String),

    /// Chain state query failed.
    #[error("Chain state error: {0}")]
    ChainStateError(String),

    /// Event source failed to deliver.
    #[error("Event source error: {0}")]
    SourceError(String),

    /// Timeout.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    /// Build an [`LedgerError::InvalidAmount`].
    pub fn invalid_amount(value: impl Into<String>, reason: impl Into<String>) -> Self {
        LedgerError::InvalidAmount {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`LedgerError::MalformedEvent`].
    pub fn malformed(
        section: impl Into<String>,
        method: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        LedgerError::MalformedEvent {
            section: section.into(),
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Retryable errors leave the event unapplied; the whole event can be
    /// delivered again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::StoreError(_)
                | LedgerError::Timeout(_)
                | LedgerError::SourceError(_)
                | LedgerError::ChainStateError(_)
        )
    }

    /// Check if the error is confined to a single event and the stream can
    /// move on past it.
    pub fn is_event_local(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount { .. }
                | LedgerError::MalformedEvent { .. }
                | LedgerError::InvalidTimestamp(_)
                | LedgerError::ArithmeticOverflow(_)
        )
    }

    /// Get error code for logs and metrics labels.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount { .. } => "INVALID_AMOUNT",
            LedgerError::MalformedEvent { .. } => "MALFORMED_EVENT",
            LedgerError::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            LedgerError::ArithmeticOverflow(_) => "ARITHMETIC_OVERFLOW",
            LedgerError::EntityMismatch { .. } => "ENTITY_MISMATCH",
            LedgerError::StoreError(_) => "STORE_ERROR",
            LedgerError::ChainStateError(_) => "CHAIN_STATE_ERROR",
            LedgerError::SourceError(_) => "SOURCE_ERROR",
            LedgerError::Timeout(_) => "TIMEOUT",
            LedgerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for ChainLedger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(LedgerError::StoreError("connection reset".into()).is_retryable());
        assert!(LedgerError::Timeout("save".into()).is_retryable());
        assert!(!LedgerError::invalid_amount("abc", "not a number").is_retryable());
        assert!(LedgerError::invalid_amount("abc", "not a number").is_event_local());
        assert!(!LedgerError::StoreError("x".into()).is_event_local());
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::malformed("currencies", "Transferred", "missing amount");
        assert_eq!(
            err.to_string(),
            "Malformed currencies.Transferred event: missing amount"
        );
        assert_eq!(err.error_code(), "MALFORMED_EVENT");
    }
}
