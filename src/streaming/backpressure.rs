//! Bounded queue between the produce and write stages

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Why a record was not queued or received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueClosed {
    /// The run's cancellation token fired
    Cancelled,
    /// The other stage is gone; for the receiver, the queue is also drained
    Disconnected,
}

/// Create a FIFO queue holding at most `capacity` records.
///
/// Both ends observe `cancel` at every blocking point. The queue is closed
/// when the [`RecordSender`] is dropped, which only the produce stage owns.
pub fn bounded(capacity: usize, cancel: CancellationToken) -> (RecordSender, RecordReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        RecordSender {
            tx,
            cancel: cancel.clone(),
        },
        RecordReceiver { rx, cancel },
    )
}

/// Produce-stage end of the queue
#[derive(Debug)]
pub struct RecordSender {
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl RecordSender {
    /// Queue a record, waiting for space while the queue is full
    pub async fn send(&self, record: String) -> Result<(), QueueClosed> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueueClosed::Cancelled),
            sent = self.tx.send(record) => sent.map_err(|_| QueueClosed::Disconnected),
        }
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the whole run, e.g. after a fatal read error
    pub fn cancel(&self) {
        self.cancel.cancel()
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Write-stage end of the queue
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl RecordReceiver {
    /// Next record in FIFO order. Fails with [`QueueClosed::Disconnected`]
    /// once the queue is closed and drained, or with
    /// [`QueueClosed::Cancelled`] as soon as the run is cancelled.
    pub async fn recv(&mut self) -> Result<String, QueueClosed> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueueClosed::Cancelled),
            record = self.rx.recv() => record.ok_or(QueueClosed::Disconnected),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}
