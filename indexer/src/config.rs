//! Indexer configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Retry policy for retryable store and source failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first failure before the stream halts.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between attempts.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (starting at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Main indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// JSON-lines file of chain events to index.
    pub events_path: Option<PathBuf>,
    /// PostgreSQL URL. The in-memory store is used when unset.
    pub database_url: Option<String>,
    /// Connection pool size for PostgreSQL.
    pub db_max_connections: u32,
    /// Retry policy.
    pub retry: RetryConfig,
    /// Compare touched balances with chain state after each transfer.
    pub reconcile: bool,
    /// JSON file of chain balance snapshots used for reconciliation.
    pub chain_state_path: Option<PathBuf>,
    /// Log level.
    pub log_level: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            events_path: None,
            database_url: None,
            db_max_connections: 5,
            retry: RetryConfig::default(),
            reconcile: false,
            chain_state_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl IndexerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("INDEXER_EVENTS_PATH") {
            config.events_path = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }

        if let Ok(size) = std::env::var("INDEXER_DB_MAX_CONNECTIONS") {
            if let Ok(size) = size.parse() {
                config.db_max_connections = size;
            }
        }

        if let Ok(retries) = std::env::var("INDEXER_MAX_RETRIES") {
            if let Ok(retries) = retries.parse() {
                config.retry.max_retries = retries;
            }
        }

        if let Ok(ms) = std::env::var("INDEXER_RETRY_BACKOFF_MS") {
            if let Ok(ms) = ms.parse() {
                config.retry.initial_backoff = Duration::from_millis(ms);
            }
        }

        if let Ok(flag) = std::env::var("INDEXER_RECONCILE") {
            config.reconcile = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        if let Ok(path) = std::env::var("INDEXER_CHAIN_STATE_PATH") {
            config.chain_state_path = Some(PathBuf::from(path));
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.database_url {
            if url.is_empty() {
                return Err("Database URL cannot be empty when set".to_string());
            }
            if self.db_max_connections == 0 {
                return Err("Database pool needs at least one connection".to_string());
            }
        }

        if self.reconcile && self.chain_state_path.is_none() {
            return Err("Reconciliation needs a chain state snapshot path".to_string());
        }

        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err("Initial retry backoff cannot exceed max backoff".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IndexerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 5);
        assert!(!config.reconcile);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = IndexerConfig::default();
        config.database_url = Some(String::new());
        assert!(config.validate().is_err());

        let mut config = IndexerConfig::default();
        config.retry.initial_backoff = Duration::from_secs(60);
        assert!(config.validate().is_err());

        let mut config = IndexerConfig::default();
        config.reconcile = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(400));
        assert_eq!(retry.backoff(4), Duration::from_millis(500));
        assert_eq!(retry.backoff(40), Duration::from_millis(500));
    }
}
