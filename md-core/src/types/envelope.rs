use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::{EncodedTime, Order, Snapshot, Transaction};

/// Payload type tag carried in the `type` field of every wire envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MdType {
    Unknown,
    Snapshot,
    Order,
    Transaction,
}

impl MdType {
    /// Map a wire tag onto a type. Unassigned tags map to `Unknown`.
    pub fn from_tag(tag: i64) -> Self {
        match tag {
            1 => MdType::Snapshot,
            2 => MdType::Order,
            3 => MdType::Transaction,
            _ => MdType::Unknown,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            MdType::Unknown => 0,
            MdType::Snapshot => 1,
            MdType::Order => 2,
            MdType::Transaction => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MdType::Unknown => "unknown",
            MdType::Snapshot => "snapshot",
            MdType::Order => "order",
            MdType::Transaction => "transaction",
        }
    }
}

impl fmt::Display for MdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Out-of-band routing key attached to each broker record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MdKey {
    Snapshot,
    Order,
    Transaction,
}

impl MdKey {
    pub const ALL: [MdKey; 3] = [MdKey::Snapshot, MdKey::Order, MdKey::Transaction];

    pub fn as_str(self) -> &'static str {
        match self {
            MdKey::Snapshot => "snapshot",
            MdKey::Order => "order",
            MdKey::Transaction => "transaction",
        }
    }

    /// The envelope type a record with this key must declare.
    pub fn expected_type(self) -> MdType {
        match self {
            MdKey::Snapshot => MdType::Snapshot,
            MdKey::Order => MdType::Order,
            MdKey::Transaction => MdType::Transaction,
        }
    }
}

impl FromStr for MdKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(MdKey::Snapshot),
            "order" => Ok(MdKey::Order),
            "transaction" => Ok(MdKey::Transaction),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for MdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed market-data envelope.
///
/// The variant *is* the type tag, so a payload can never disagree with the
/// type it is filed under.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketData {
    Snapshot(Snapshot),
    Order(Order),
    Transaction(Transaction),
}

#[derive(Serialize)]
struct WireEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: u8,
    data: &'a T,
}

impl MarketData {
    pub fn md_type(&self) -> MdType {
        match self {
            MarketData::Snapshot(_) => MdType::Snapshot,
            MarketData::Order(_) => MdType::Order,
            MarketData::Transaction(_) => MdType::Transaction,
        }
    }

    pub fn key(&self) -> MdKey {
        match self {
            MarketData::Snapshot(_) => MdKey::Snapshot,
            MarketData::Order(_) => MdKey::Order,
            MarketData::Transaction(_) => MdKey::Transaction,
        }
    }

    pub fn stock_id(&self) -> &str {
        match self {
            MarketData::Snapshot(s) => &s.stock_id,
            MarketData::Order(o) => &o.stock_id,
            MarketData::Transaction(t) => &t.stock_id,
        }
    }

    /// Encoded `HHMMSSmmm` time of the payload.
    pub fn time(&self) -> EncodedTime {
        match self {
            MarketData::Snapshot(s) => s.time,
            MarketData::Order(o) => o.time,
            MarketData::Transaction(t) => t.time,
        }
    }

    /// Encode as a `{"type": n, "data": {...}}` wire envelope.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let kind = self.md_type().tag();
        match self {
            MarketData::Snapshot(data) => serde_json::to_vec(&WireEnvelope { kind, data }),
            MarketData::Order(data) => serde_json::to_vec(&WireEnvelope { kind, data }),
            MarketData::Transaction(data) => serde_json::to_vec(&WireEnvelope { kind, data }),
        }
    }
}

impl From<Snapshot> for MarketData {
    fn from(value: Snapshot) -> Self {
        MarketData::Snapshot(value)
    }
}

impl From<Order> for MarketData {
    fn from(value: Order) -> Self {
        MarketData::Order(value)
    }
}

impl From<Transaction> for MarketData {
    fn from(value: Transaction) -> Self {
        MarketData::Transaction(value)
    }
}
