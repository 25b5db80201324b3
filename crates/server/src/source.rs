//! Record sources: where raw payloads come from.
//!
//! The message bus itself is an external collaborator; the server models it
//! as an ingest hub (producers publish raw lines, consumers subscribe) with
//! at-least-once, no-global-ordering semantics. A slow consumer drops the
//! oldest records rather than growing without bound, which is surfaced as
//! lag, not an error.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{timeout_at, Duration, Instant};

/// Errors from a record source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The bus is gone. Fatal to the consumer session; the caller must
    /// drain its engine before propagating.
    #[error("record source closed")]
    Closed,
}

/// A source of raw per-record byte payloads.
///
/// Implementations deliver records in some order, at least once, with no
/// global sequencing promised.
#[async_trait]
pub trait RecordSource: Send {
    /// Pull up to `max` records, waiting at most `wait` for the first one.
    /// An empty batch after a full wait is normal.
    async fn next_batch(&mut self, max: usize, wait: Duration) -> Result<Vec<Bytes>, SourceError>;

    /// Records dropped since the last call because this consumer lagged.
    fn take_lagged(&mut self) -> u64 {
        0
    }
}

/// Fan-out point between record producers and stream consumers.
///
/// Publishing never blocks; each subscriber owns a bounded view of the
/// stream and drops oldest-first when it falls behind.
pub struct IngestHub {
    tx: broadcast::Sender<Bytes>,
}

impl IngestHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish one raw record. Returns the number of consumers that will
    /// see it (zero when nobody is connected, which is fine).
    pub fn publish(&self, record: Bytes) -> usize {
        self.tx.send(record).unwrap_or(0)
    }

    pub fn subscribe(&self) -> HubSource {
        HubSource {
            rx: self.tx.subscribe(),
            lagged: 0,
        }
    }
}

/// A consumer's subscription to the ingest hub.
pub struct HubSource {
    rx: broadcast::Receiver<Bytes>,
    lagged: u64,
}

#[async_trait]
impl RecordSource for HubSource {
    async fn next_batch(&mut self, max: usize, wait: Duration) -> Result<Vec<Bytes>, SourceError> {
        let deadline = Instant::now() + wait;
        let mut batch = Vec::new();

        while batch.len() < max {
            match timeout_at(deadline, self.rx.recv()).await {
                Ok(Ok(record)) => batch.push(record),
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    self.lagged += n;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    if batch.is_empty() {
                        return Err(SourceError::Closed);
                    }
                    // Deliver what we have; the next call reports closure.
                    break;
                }
                Err(_elapsed) => break,
            }
        }
        Ok(batch)
    }

    fn take_lagged(&mut self) -> u64 {
        std::mem::take(&mut self.lagged)
    }
}
