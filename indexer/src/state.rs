//! Indexer state definitions.

/// Indexer operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    /// Created, not yet consuming events.
    Starting,
    /// Consuming events.
    Running,
    /// Finishing the current event, then stopping.
    ShuttingDown,
    /// Stream drained, stopped or halted on an error.
    Stopped,
}

impl IndexerState {
    /// Check if the indexer should keep consuming events.
    pub fn is_operational(&self) -> bool {
        matches!(self, IndexerState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IndexerState::Stopped)
    }
}
