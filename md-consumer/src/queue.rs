//! Bounded hand-off queues between the read loop and the worker loops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use md_core::RawRecord;
use tokio::sync::mpsc;

/// Default queue depth. Large enough that the read loop practically never
/// waits on a healthy worker; a permanently stalled worker grows memory
/// up to this bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000_000;

/// What the read loop does when a worker queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for room. The read loop stalls with the slowest worker.
    #[default]
    Block,
    /// Drop the incoming record and count it.
    DropNewest,
}

pub type RecordReceiver = mpsc::Receiver<Arc<RawRecord>>;

/// Sending half of a worker queue.
pub struct RecordQueue {
    name: &'static str,
    tx: mpsc::Sender<Arc<RawRecord>>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

/// The worker behind this queue has exited.
#[derive(Debug)]
pub struct QueueClosed;

impl RecordQueue {
    /// Create a queue; a zero capacity is raised to one.
    pub fn bounded(
        name: &'static str,
        capacity: usize,
        policy: OverflowPolicy,
        dropped: Arc<AtomicU64>,
    ) -> (Self, RecordReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name,
                tx,
                policy,
                dropped,
            },
            rx,
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Hand a record to the worker according to the overflow policy.
    pub async fn push(&self, record: Arc<RawRecord>) -> Result<(), QueueClosed> {
        match self.policy {
            OverflowPolicy::Block => self.tx.send(record).await.map_err(|_| QueueClosed),
            OverflowPolicy::DropNewest => match self.tx.try_send(record) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(record)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        queue = self.name,
                        offset = record.offset,
                        "queue full, dropping record"
                    );
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueClosed),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset: i64) -> Arc<RawRecord> {
        Arc::new(RawRecord::new("order", "{}", offset))
    }

    #[tokio::test]
    async fn test_drop_newest_when_full() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (queue, mut rx) =
            RecordQueue::bounded("order", 2, OverflowPolicy::DropNewest, dropped.clone());

        for offset in 0..4 {
            queue.push(record(offset)).await.unwrap();
        }
        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(queue.len(), 2);

        assert_eq!(rx.recv().await.unwrap().offset, 0);
        assert_eq!(rx.recv().await.unwrap().offset, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_block_waits_for_room() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (queue, mut rx) = RecordQueue::bounded("md", 1, OverflowPolicy::Block, dropped);
        queue.push(record(0)).await.unwrap();

        let pending = tokio::spawn(async move {
            queue.push(record(1)).await.unwrap();
        });
        assert_eq!(rx.recv().await.unwrap().offset, 0);
        pending.await.unwrap();
        assert_eq!(rx.recv().await.unwrap().offset, 1);
    }

    #[tokio::test]
    async fn test_push_after_worker_exit() {
        let (queue, rx) = RecordQueue::bounded(
            "snapshot",
            0,
            OverflowPolicy::Block,
            Arc::new(AtomicU64::new(0)),
        );
        drop(rx);
        assert!(queue.push(record(0)).await.is_err());
    }
}
