use serde::{Deserialize, Serialize};

use super::{EncodedDate, EncodedTime};

/// Level-2 order book snapshot for one instrument.
///
/// Wire example:
///
/// ```text
/// {"stock_id":"000001.SZ","trading_day":20230823,"time":92018000,"status":"I",
///  "prevclose":11.37,"ask_prices":[11.37,...],"bid_prices":[11.37,...], ...}
/// ```
///
/// Missing fields fall back to their defaults so that publishers may omit
/// zeroed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    // ═══════════════════════════════════════════════════
    // IDENTIFICATION
    // ═══════════════════════════════════════════════════
    pub stock_id: String,         // 000001.SZ, 600000.SH
    pub trading_day: EncodedDate, // YYYYMMDD
    pub time: EncodedTime,        // HHMMSSmmm
    pub status: String,

    // ═══════════════════════════════════════════════════
    // PRICES
    // ═══════════════════════════════════════════════════
    #[serde(rename = "prevclose")]
    pub prev_close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    #[serde(rename = "match")]
    pub last: f64, // latest traded price

    // ═══════════════════════════════════════════════════
    // DEPTH (parallel arrays, level 0 is best)
    // ═══════════════════════════════════════════════════
    pub ask_prices: Vec<f64>,
    pub ask_volumes: Vec<f64>,
    pub bid_prices: Vec<f64>,
    pub bid_volumes: Vec<f64>,

    // ═══════════════════════════════════════════════════
    // AGGREGATES
    // ═══════════════════════════════════════════════════
    #[serde(alias = "trading_num")]
    pub trades_num: i64,
    pub volume: i64,
    pub turnover: i64,
    pub total_ask_volume: i64,
    pub total_bid_volume: i64,
    pub weighted_avg_ask_price: f64,
    pub weighted_avg_bid_price: f64,
    pub iopv: i64,

    // ═══════════════════════════════════════════════════
    // PRICE LIMITS
    // ═══════════════════════════════════════════════════
    #[serde(rename = "high_limited")]
    pub limit_up: f64,
    #[serde(rename = "low_limited")]
    pub limit_down: f64,
}

/// One price level of the book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub price: f64,
    pub volume: f64,
}

impl Snapshot {
    /// True when the ask and bid price/volume arrays are pairwise aligned.
    pub fn has_consistent_depth(&self) -> bool {
        self.ask_prices.len() == self.ask_volumes.len()
            && self.bid_prices.len() == self.bid_volumes.len()
    }

    /// Ask levels, best first. `None` if the arrays are misaligned.
    pub fn asks(&self) -> Option<Vec<Level>> {
        zip_levels(&self.ask_prices, &self.ask_volumes)
    }

    /// Bid levels, best first. `None` if the arrays are misaligned.
    pub fn bids(&self) -> Option<Vec<Level>> {
        zip_levels(&self.bid_prices, &self.bid_volumes)
    }

    /// Midpoint of the best ask and bid, when both sides are quoted.
    pub fn mid_price(&self) -> Option<f64> {
        let ask = self.ask_prices.first().copied().filter(|p| *p > 0.0)?;
        let bid = self.bid_prices.first().copied().filter(|p| *p > 0.0)?;
        Some((ask + bid) / 2.0)
    }
}

fn zip_levels(prices: &[f64], volumes: &[f64]) -> Option<Vec<Level>> {
    if prices.len() != volumes.len() {
        return None;
    }
    Some(
        prices
            .iter()
            .zip(volumes)
            .map(|(&price, &volume)| Level { price, volume })
            .collect(),
    )
}
