use super::EncodedTime;

/// One record as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub key: String,
    pub value: Vec<u8>,
    pub offset: i64,
    pub partition: i32,
}

impl RawRecord {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>, offset: i64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            offset,
            partition: 0,
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }
}

/// Provenance of a parsed payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub key: String,
    pub offset: i64,
    pub partition: i32,
    /// Encoded `HHMMSSmmm` time taken from the payload; 0 until decoded.
    pub event_time: EncodedTime,
}

impl Meta {
    pub fn from_record(record: &RawRecord) -> Self {
        Self {
            key: record.key.clone(),
            offset: record.offset,
            partition: record.partition,
            event_time: 0,
        }
    }
}
