//! bookfeed - L3 order book replica
//!
//! This crate maintains precise per-symbol order book state from a
//! streaming exchange feed and exposes consistent snapshots and
//! microstructure metrics to downstream consumers.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod normalizer;
pub mod orderbook;
pub mod parser;
pub mod publisher;
pub mod websocket;

pub use config::Config;
pub use error::{BookError, FeedError, Result};
pub use normalizer::{FeedNormalizer, StatsSnapshot};
pub use orderbook::{
    BookLevel, BookMetrics, BookRegistry, BookSnapshot, L3Event, Order, OrderBook, PriceLevel,
    Side, TopOfBook,
};
pub use parser::{parse_frame, FeedMessage};
pub use publisher::{PublishOutcome, Publisher};
pub use websocket::{FeedSession, SessionHandle, SessionState};

/// Application state shared across components
pub struct AppState {
    pub normalizer: Arc<FeedNormalizer>,
    pub config: Arc<Config>,
}
