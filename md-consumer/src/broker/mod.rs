//! Broker collaborators.
//!
//! The dispatcher only needs a cancellable "read the next record" call and
//! a close. [`MemoryBroker`] serves in-process producers and tests,
//! [`LineBroker`] reads newline-delimited JSON frames from a file or a TCP
//! feed.

pub mod line;
pub mod memory;

pub use line::LineBroker;
pub use memory::{MemoryBroker, MemoryPublisher};

use async_trait::async_trait;
use md_core::RawRecord;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame at line {line}: {source}")]
    Frame {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("broker closed")]
    Closed,
}

impl BrokerError {
    /// Errors after which reading again cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrokerError::Closed | BrokerError::Auth(_))
    }
}

/// Source of raw records, read one at a time in delivery order.
#[async_trait]
pub trait Broker: Send {
    /// Wait for the next record. Must tolerate being dropped mid-wait.
    async fn read_next(&mut self) -> Result<RawRecord, BrokerError>;

    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// Where to start reading a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Offset {
    Earliest,
    #[default]
    Latest,
    At(i64),
}

impl Offset {
    /// Wire value: -2 earliest, -1 latest, otherwise the absolute offset.
    pub fn as_wire(self) -> i64 {
        match self {
            Offset::Earliest => -2,
            Offset::Latest => -1,
            Offset::At(offset) => offset,
        }
    }

    pub fn from_wire(value: i64) -> Self {
        match value {
            -2 => Offset::Earliest,
            v if v < 0 => Offset::Latest,
            v => Offset::At(v),
        }
    }

    /// True if a record at `offset` is at or past the start position.
    pub fn admits(self, offset: i64) -> bool {
        match self {
            Offset::At(start) => offset >= start,
            Offset::Earliest | Offset::Latest => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Connection settings supplied when a broker is constructed.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub address: String,
    pub topic: String,
    pub partition: i32,
    pub offset: Offset,
    pub credentials: Option<Credentials>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9092".to_string(),
            topic: "md".to_string(),
            partition: 0,
            offset: Offset::Latest,
            credentials: None,
        }
    }
}

impl BrokerConfig {
    pub fn new(address: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}
