use serde::{Deserialize, Serialize};

use super::{EncodedDate, EncodedTime, Side};

/// Order kind: market.
pub const ORDER_KIND_MARKET: &str = "1";
/// Order kind: limit.
pub const ORDER_KIND_LIMIT: &str = "2";
/// Order kind: best price on own side.
pub const ORDER_KIND_OWN_BEST: &str = "U";
/// Order kind: best price on counterparty side.
pub const ORDER_KIND_COUNTER_BEST: &str = "Y";

/// Function code for a cancel order.
pub const ORDER_FUNC_CANCEL: &str = "C";

/// Single order-book entry (tick-by-tick order).
///
/// ```text
/// {"stock_id":"001324.SZ","action_day":20230823,"time":92048490,"order":243233,
///  "price":33.3,"volume":200.0,"order_kind":"0","function_code":"B",
///  "channel":2013,"order_ori_no":0,"biz_index":0}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub stock_id: String,
    pub action_day: EncodedDate,
    pub time: EncodedTime,
    #[serde(rename = "order")]
    pub order_no: i64,
    pub price: f64,
    pub volume: f64,
    pub order_kind: String,
    pub function_code: String, // 'B', 'S', 'C'
    pub channel: i32,
    pub order_ori_no: i64,
    pub biz_index: i64,
}

impl Order {
    pub fn side(&self) -> Side {
        Side::from_flag(&self.function_code)
    }

    pub fn is_cancel(&self) -> bool {
        self.function_code == ORDER_FUNC_CANCEL
    }

    pub fn is_market(&self) -> bool {
        self.order_kind == ORDER_KIND_MARKET
    }
}
