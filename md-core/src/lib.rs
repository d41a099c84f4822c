//! Core market-data types shared by the consumer SDK.
//!
//! Holds the wire records (snapshot, order, transaction), the typed
//! envelope, the record parsers and the session [`TimeScale`].

pub mod codec;
pub mod error;
pub mod timescale;
pub mod types;

pub use codec::{parse_market_data, parse_order, parse_snapshot, parse_transaction};
pub use error::{ParseError, ParseErrorKind, TimeScaleError};
pub use timescale::{decode_time, encode_time, TimeScale};
pub use types::{
    MarketData, MdKey, MdType, Meta, Order, RawRecord, Side, Snapshot, Transaction,
};
