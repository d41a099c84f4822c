use thiserror::Error;

use crate::broker::BrokerError;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}
