//! Indexer runtime: drains an event source through the dispatcher.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use chainledger_common::{EventId, Result};

use crate::config::IndexerConfig;
use crate::dispatcher::{DispatchOutcome, EventDispatcher};
use crate::event::ChainEvent;
use crate::metrics::{Metrics, SharedMetrics};
use crate::source::EventSource;
use crate::state::IndexerState;

/// Sequential event processor.
///
/// Events are handled one at a time in arrival order; each event's writes
/// are durable before the next is read. Transient failures retry the whole
/// event with exponential backoff; exhausting the retries halts the stream
/// so no unpersisted event is skipped.
pub struct Indexer {
    config: IndexerConfig,
    run_id: String,
    dispatcher: EventDispatcher,
    metrics: SharedMetrics,
    state: Arc<RwLock<IndexerState>>,
    /// Last processed event.
    cursor: Arc<RwLock<Option<EventId>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Indexer {
    /// Create a new indexer.
    pub fn new(config: IndexerConfig, run_id: String, dispatcher: EventDispatcher) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            run_id,
            dispatcher,
            metrics: Arc::new(Metrics::new()),
            state: Arc::new(RwLock::new(IndexerState::Starting)),
            cursor: Arc::new(RwLock::new(None)),
            shutdown_tx,
        }
    }

    /// Start accepting events.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        info!(run_id = %self.run_id, "Starting indexer");
        *self.state.write() = IndexerState::Running;
        Ok(())
    }

    /// Stop after the event in progress.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        info!(run_id = %self.run_id, "Stopping indexer");

        {
            let mut state = self.state.write();
            if !state.is_terminal() {
                *state = IndexerState::ShuttingDown;
            }
        }
        self.shutdown_tx.send_replace(true);
        Ok(())
    }

    /// Process events until the source ends, [`stop`](Self::stop) is called
    /// or a non-recoverable error halts the stream.
    #[instrument(skip(self, source), fields(run_id = %self.run_id))]
    pub async fn run(&self, source: &mut dyn EventSource) -> Result<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        if self.state() == IndexerState::Starting {
            self.start().await?;
        }

        let result = loop {
            if !self.state().is_operational() {
                break Ok(());
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break Ok(()),
                next = self.next_event(source) => next,
            };

            match next {
                Ok(Some(event)) => {
                    if let Err(e) = self.process(&event).await {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    info!("Event source drained");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        *self.state.write() = IndexerState::Stopped;
        info!(
            run_id = %self.run_id,
            cursor = ?self.cursor(),
            events = self.metrics.snapshot().events_total,
            "Indexer stopped"
        );
        result
    }

    /// Process a single event, retrying transient failures.
    ///
    /// Returns `None` when the event was dropped on an event-local error.
    #[instrument(skip(self, event), fields(block = event.block_number, index = event.event_index))]
    pub async fn process(&self, event: &ChainEvent) -> Result<Option<DispatchOutcome>> {
        self.metrics.event_received();

        let id = event.id();
        let cursor = self.cursor();
        if let Some(cursor) = cursor {
            if id <= cursor {
                warn!(event = %id, cursor = %cursor, "Event at or behind cursor");
            }
        }

        let mut attempt = 0;
        let outcome = loop {
            match self.dispatcher.dispatch(event).await {
                Ok(outcome) => {
                    self.metrics.record(outcome);
                    break Some(outcome);
                }
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry.backoff(attempt);
                    warn!(
                        event = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying event"
                    );
                    self.metrics.retry();
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_event_local() => {
                    error!(event = %id, code = e.error_code(), error = %e, "Dropping event");
                    self.metrics.event_failed();
                    break None;
                }
                Err(e) => {
                    error!(event = %id, code = e.error_code(), error = %e, "Halting on event");
                    return Err(e);
                }
            }
        };

        let mut cursor = self.cursor.write();
        if cursor.map_or(true, |c| id > c) {
            *cursor = Some(id);
        }
        Ok(outcome)
    }

    async fn next_event(&self, source: &mut dyn EventSource) -> Result<Option<ChainEvent>> {
        let mut attempt = 0;
        loop {
            match source.next_event().await {
                Ok(event) => return Ok(event),
                Err(e) if e.is_event_local() => {
                    error!(error = %e, "Skipping undecodable event");
                    self.metrics.event_failed();
                }
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Retrying event source");
                    self.metrics.retry();
                    tokio::time::sleep(self.config.retry.backoff(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Get the current indexer state.
    pub fn state(&self) -> IndexerState {
        *self.state.read()
    }

    /// Last processed event.
    pub fn cursor(&self) -> Option<EventId> {
        *self.cursor.read()
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}
