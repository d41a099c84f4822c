use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use md_core::RawRecord;
use tokio::sync::mpsc;

use super::{Broker, BrokerError};

/// In-process broker backed by an unbounded channel.
///
/// Reads return [`BrokerError::Closed`] once every [`MemoryPublisher`] has
/// been dropped and the backlog is empty.
pub struct MemoryBroker {
    rx: mpsc::UnboundedReceiver<Result<RawRecord, BrokerError>>,
    partition: i32,
}

/// Producer side of a [`MemoryBroker`]. Assigns consecutive offsets.
#[derive(Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<Result<RawRecord, BrokerError>>,
    next_offset: Arc<AtomicI64>,
    partition: i32,
}

impl MemoryBroker {
    pub fn channel() -> (MemoryPublisher, MemoryBroker) {
        Self::channel_on(0)
    }

    pub fn channel_on(partition: i32) -> (MemoryPublisher, MemoryBroker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let publisher = MemoryPublisher {
            tx,
            next_offset: Arc::new(AtomicI64::new(0)),
            partition,
        };
        (publisher, MemoryBroker { rx, partition })
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl MemoryPublisher {
    /// Publish a record and return the offset it was assigned.
    pub fn publish(&self, key: &str, value: impl Into<Vec<u8>>) -> Result<i64, BrokerError> {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let record = RawRecord::new(key, value, offset).with_partition(self.partition);
        self.tx.send(Ok(record)).map_err(|_| BrokerError::Closed)?;
        Ok(offset)
    }

    /// Deliver a read failure to the consumer in place of a record.
    pub fn publish_error(&self, error: BrokerError) -> Result<(), BrokerError> {
        self.tx.send(Err(error)).map_err(|_| BrokerError::Closed)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn read_next(&mut self) -> Result<RawRecord, BrokerError> {
        match self.rx.recv().await {
            Some(next) => next,
            None => Err(BrokerError::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.rx.close();
        Ok(())
    }
}
