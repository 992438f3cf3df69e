//! Feed normalizer
//!
//! Takes decoded text frames from the transport, parses them, and
//! applies them to the per-symbol books. Parse failures and frames for
//! unsubscribed symbols are dropped and counted; the book is never
//! partially updated.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::orderbook::{BookRegistry, L3Event, OrderBook, SnapshotLevel, TopOfBook};
use crate::parser::{parse_frame, FeedMessage, SnapshotEntry};

/// Counters kept across the life of a session
#[derive(Debug, Default)]
pub struct FeedStats {
    frames: AtomicU64,
    parse_errors: AtomicU64,
    dropped: AtomicU64,
    applied: AtomicU64,
    heartbeats: AtomicU64,
    feed_errors: AtomicU64,
    resyncs: AtomicU64,
}

/// Point-in-time copy of the counters, for the health surface
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub parse_errors: u64,
    pub dropped: u64,
    pub applied: u64,
    pub heartbeats: u64,
    pub feed_errors: u64,
    pub resyncs: u64,
}

impl FeedStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            feed_errors: self.feed_errors.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }
}

/// Maps feed frames onto the normalized book vocabulary and routes
/// them to the right book
pub struct FeedNormalizer {
    registry: Arc<BookRegistry>,
    stats: FeedStats,
    ready: AtomicBool,
}

impl FeedNormalizer {
    pub fn new(registry: Arc<BookRegistry>) -> Self {
        Self {
            registry,
            stats: FeedStats::default(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<BookRegistry> {
        &self.registry
    }

    /// True once the feed has acknowledged a subscription
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Process one text frame. Returns the symbol whose book changed,
    /// so the caller can publish it.
    pub fn handle_frame(&self, raw: &str) -> Option<String> {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);

        let message = match parse_frame(raw) {
            Ok(message) => message,
            Err(e) => {
                self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "dropping unparseable frame");
                return None;
            }
        };

        match message {
            FeedMessage::Subscriptions { channels } => {
                if !self.ready.swap(true, Ordering::AcqRel) {
                    info!(channels = %channels, "feed subscription acknowledged");
                }
                None
            }

            FeedMessage::Heartbeat {
                product_id,
                sequence,
            } => {
                self.stats.heartbeats.fetch_add(1, Ordering::Relaxed);
                trace!(symbol = %product_id, sequence, "heartbeat");
                None
            }

            FeedMessage::Snapshot {
                product_id,
                bids,
                asks,
            } => {
                let book = self.book_for(&product_id)?;
                book.apply_snapshot(&to_snapshot_levels(bids), &to_snapshot_levels(asks));
                self.stats.applied.fetch_add(1, Ordering::Relaxed);
                self.check_integrity(&book);
                Some(product_id)
            }

            FeedMessage::L2update {
                product_id,
                changes,
            } => {
                let book = self.book_for(&product_id)?;
                let mut changed = false;
                for change in &changes {
                    changed |= book.apply_l2(change.side(), change.price(), change.size());
                }
                if changed {
                    self.stats.applied.fetch_add(1, Ordering::Relaxed);
                    self.check_integrity(&book);
                    Some(product_id)
                } else {
                    None
                }
            }

            FeedMessage::Ticker {
                product_id,
                best_bid,
                best_bid_size,
                best_ask,
                best_ask_size,
                sequence,
            } => {
                let book = self.book_for(&product_id)?;
                book.record_quote(TopOfBook {
                    bid: best_bid,
                    bid_size: best_bid_size,
                    ask: best_ask,
                    ask_size: best_ask_size,
                    sequence,
                });
                self.stats.applied.fetch_add(1, Ordering::Relaxed);
                Some(product_id)
            }

            FeedMessage::Open {
                product_id,
                order_id,
                side,
                price,
                size,
            }
            | FeedMessage::Received {
                product_id,
                order_id,
                side,
                price,
                size,
            } => self.apply_l3(
                product_id,
                L3Event::Open {
                    id: order_id,
                    side,
                    price,
                    size,
                },
            ),

            FeedMessage::Done {
                product_id,
                order_id,
            } => self.apply_l3(product_id, L3Event::Done { id: order_id }),

            FeedMessage::Match {
                product_id,
                maker_order_id,
                size,
            } => self.apply_l3(
                product_id,
                L3Event::Match {
                    maker_id: maker_order_id,
                    filled: size,
                },
            ),

            FeedMessage::Change {
                product_id,
                order_id,
                new_size,
            } => self.apply_l3(
                product_id,
                L3Event::Change {
                    id: order_id,
                    new_size,
                },
            ),

            FeedMessage::Error { message } => {
                self.stats.feed_errors.fetch_add(1, Ordering::Relaxed);
                warn!(message = %message, "feed reported an error");
                None
            }

            FeedMessage::Unknown => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("unrecognized frame type");
                None
            }
        }
    }

    fn apply_l3(&self, product_id: String, event: L3Event) -> Option<String> {
        let book = self.book_for(&product_id)?;
        if book.apply_l3(event) {
            self.stats.applied.fetch_add(1, Ordering::Relaxed);
            self.check_integrity(&book);
            Some(product_id)
        } else {
            None
        }
    }

    fn book_for(&self, symbol: &str) -> Option<Arc<OrderBook>> {
        match self.registry.get(symbol) {
            Some(book) => Some(book),
            None => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(symbol = %symbol, "frame for unsubscribed symbol dropped");
                None
            }
        }
    }

    /// A crossed book means upstream and replica disagree; wipe it and
    /// let the next snapshot re-establish ground truth.
    fn check_integrity(&self, book: &OrderBook) {
        if book.is_crossed() {
            warn!(symbol = %book.symbol(), "book crossed, clearing for resync");
            book.clear();
            self.stats.resyncs.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn to_snapshot_levels(entries: Vec<SnapshotEntry>) -> Vec<SnapshotLevel> {
    entries
        .into_iter()
        .map(|e| SnapshotLevel {
            price: e.price,
            size: e.size,
            order_id: e.order_id,
        })
        .collect()
}
