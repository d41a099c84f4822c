pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod queue;
pub mod tracker;

// Re-export commonly used items
pub use broker::{
    Broker, BrokerConfig, BrokerError, Credentials, LineBroker, MemoryBroker, MemoryPublisher,
    Offset,
};
pub use config::ConsumerConfig;
pub use consumer::{
    Callback, Consumer, ConsumerBuilder, ConsumerStats, StatsSnapshot, StopHandle,
};
pub use error::ConsumerError;
pub use queue::{OverflowPolicy, DEFAULT_QUEUE_CAPACITY};
pub use tracker::{TickCallback, TickTracker, TickTrackerBuilder, TrackerError};
