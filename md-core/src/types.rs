pub mod envelope;
pub mod order;
pub mod record;
pub mod snapshot;
pub mod transaction;

// Re-export common types
pub use envelope::{MarketData, MdKey, MdType};
pub use order::Order;
pub use record::{Meta, RawRecord};
pub use snapshot::Snapshot;
pub use transaction::Transaction;

/// Time of day encoded as a decimal `HHMMSSmmm` integer (e.g. `92018000`).
pub type EncodedTime = i64;

/// Trading or action day encoded as `YYYYMMDD`.
pub type EncodedDate = i32;

/// Buy/sell direction shared by orders and trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
    Unknown,
}

impl Side {
    /// Map a wire flag (`"B"`, `"S"`, anything else) onto a side.
    pub fn from_flag(flag: &str) -> Self {
        match flag.trim() {
            "B" => Side::Buy,
            "S" => Side::Sell,
            _ => Side::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_from_flag() {
        assert_eq!(Side::from_flag("B"), Side::Buy);
        assert_eq!(Side::from_flag("S"), Side::Sell);
        assert_eq!(Side::from_flag(" "), Side::Unknown);
        assert_eq!(Side::from_flag("N"), Side::Unknown);
        assert_eq!(Side::from_flag("C"), Side::Unknown);
    }
}
