//! Event sources feeding the indexer.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

use chainledger_common::{LedgerError, Result};

use crate::event::ChainEvent;

/// Ordered, at-least-once stream of chain events.
#[async_trait]
pub trait EventSource: Send {
    /// Next event in chain order, or `None` once the stream ends.
    ///
    /// Event-local errors (an undecodable entry) skip that entry; other
    /// errors may be retried.
    async fn next_event(&mut self) -> Result<Option<ChainEvent>>;
}

/// Events pushed through a tokio channel.
pub struct ChannelEventSource {
    rx: mpsc::Receiver<ChainEvent>,
}

impl ChannelEventSource {
    /// Create a bounded channel and the source draining it.
    pub fn channel(buffer: usize) -> (mpsc::Sender<ChainEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_event(&mut self) -> Result<Option<ChainEvent>> {
        Ok(self.rx.recv().await)
    }
}

/// One JSON-encoded [`ChainEvent`] per line. Blank lines are skipped.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line_number: usize,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a JSON-lines file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| LedgerError::SourceError(format!("opening {}: {e}", path.display())))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for JsonLinesSource<R> {
    async fn next_event(&mut self) -> Result<Option<ChainEvent>> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(line) => line,
                // The reader has already moved past an undecodable line.
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    self.line_number += 1;
                    return Err(LedgerError::malformed(
                        "source",
                        format!("line {}", self.line_number),
                        e.to_string(),
                    ));
                }
                Err(e) => return Err(LedgerError::SourceError(e.to_string())),
            };
            let Some(line) = line else {
                return Ok(None);
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            return serde_json::from_str(&line).map(Some).map_err(|e| {
                LedgerError::malformed("source", format!("line {}", self.line_number), e.to_string())
            });
        }
    }
}
