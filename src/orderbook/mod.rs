//! Order book module
//!
//! Maintains per-symbol L3 (order-by-order) book state from exchange
//! feed events, with aggregated level snapshots for consumers.

mod book;
mod level;
mod metrics;
mod order;
mod registry;

pub use book::{OrderBook, UpdateCallback};
pub use level::PriceLevel;
pub use metrics::{compute_metrics, BookMetrics};
pub use order::Order;
pub use registry::BookRegistry;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }

    /// Prefix used for synthetic L2 order ids
    pub fn synthetic_prefix(self) -> &'static str {
        match self {
            Side::Buy => "bid",
            Side::Sell => "ask",
        }
    }
}

/// A single aggregated level in the order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Cached top-of-book quote from ticker messages. Informational only;
/// never drives the depth book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub bid: Decimal,
    pub bid_size: Decimal,
    pub ask: Decimal,
    pub ask_size: Decimal,
    pub sequence: u64,
}

/// One entry of a full book snapshot. The order id is absent on pure
/// L2 feeds; a synthetic id is derived from the side and price.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotLevel {
    pub price: Decimal,
    pub size: Decimal,
    pub order_id: Option<String>,
}

/// Consistent view of a book, taken under a single lock acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub metrics: BookMetrics,
}

/// Normalized L3 event vocabulary applied to a book
#[derive(Debug, Clone, PartialEq)]
pub enum L3Event {
    /// `open` / `received`: a new resting order
    Open {
        id: String,
        side: Side,
        price: Decimal,
        size: Decimal,
    },
    /// `done`: the order left the book; side and price are advisory
    Done { id: String },
    /// `change`: the order's size was amended in place
    Change { id: String, new_size: Decimal },
    /// `match`: the maker order was filled for `filled`; the taker
    /// never rested and is not tracked
    Match { maker_id: String, filled: Decimal },
}

/// Nanoseconds since the Unix epoch, used as ingestion timestamps
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
