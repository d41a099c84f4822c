use serde::{Deserialize, Serialize};

use super::{EncodedDate, EncodedTime, Side};

/// Function code for a cancellation.
pub const TRANSACTION_FUNC_CANCEL: &str = "C";
/// Function code for a fill.
pub const TRANSACTION_FUNC_FILL: &str = "F";

/// A single trade or cancellation.
///
/// ```text
/// {"stock_id":"002672.SZ","action_day":20230823,"time":93331810,"index":2535299,
///  "price":0.0,"volume":11700,"turnover":0,"bsflag":" ","order_kind":"0",
///  "function_code":"C","ask_order":0,"bid_order":2096531,"channel":2014,"biz_index":0}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transaction {
    pub stock_id: String,
    pub action_day: EncodedDate,
    pub time: EncodedTime,
    pub index: i64,
    pub price: f64,
    pub volume: i64,
    pub turnover: i64,
    #[serde(rename = "bsflag")]
    pub bs_flag: String, // 'B', 'S', ' ' when unknown
    pub order_kind: String,
    pub function_code: String,
    pub ask_order: i64,
    pub bid_order: i64,
    pub channel: i32,
    pub biz_index: i64,
}

impl Transaction {
    /// Aggressor side of the trade.
    pub fn side(&self) -> Side {
        Side::from_flag(&self.bs_flag)
    }

    pub fn is_cancel(&self) -> bool {
        self.function_code == TRANSACTION_FUNC_CANCEL
    }

    pub fn is_fill(&self) -> bool {
        // some venues leave the code blank on fills
        !self.is_cancel()
    }
}
