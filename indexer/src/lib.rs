//! ChainLedger Indexer
//!
//! Consumes an ordered stream of chain events and applies the ones the
//! ledger tracks: currency transfers become balance mutations and dex
//! liquidity events feed the daily liquidity summaries.

pub mod chain_state;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod metrics;
pub mod runtime;
pub mod source;
pub mod state;

pub use chain_state::{BalanceSnapshot, ChainStateReader, NoChainState, StaticChainState};
pub use config::{IndexerConfig, RetryConfig};
pub use dispatcher::{DispatchOutcome, EventDispatcher};
pub use event::{ChainEvent, EventKind};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use runtime::Indexer;
pub use source::{ChannelEventSource, EventSource, JsonLinesSource};
pub use state::IndexerState;
