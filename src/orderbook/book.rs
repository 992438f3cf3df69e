//! Core order book implementation
//!
//! Price-sorted levels over BTreeMap with per-level FIFO order queues
//! and an id index for locating resting orders. A single mutex guards
//! the maps and index; every public operation is safe under concurrent
//! readers.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

use super::{
    compute_metrics, now_nanos, BookLevel, BookMetrics, BookSnapshot, L3Event, Order, PriceLevel,
    Side, SnapshotLevel, TopOfBook,
};
use crate::error::BookError;

/// Invoked with the new sequence number after every observable
/// mutation. Runs on the applying thread and must not re-enter the
/// book.
pub type UpdateCallback = Box<dyn Fn(u64) + Send + Sync>;

/// L3 order book for a single symbol
pub struct OrderBook {
    symbol: String,
    inner: Mutex<BookInner>,
    /// Bumped on every mutation so consumers can detect staleness
    sequence: AtomicU64,
    callback: Mutex<Option<UpdateCallback>>,
}

#[derive(Default)]
struct BookInner {
    /// Bids keyed for price-descending iteration (highest first)
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Asks keyed for price-ascending iteration (lowest first)
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Order id -> (side, price); the sole locator for removals
    index: HashMap<String, (Side, Decimal)>,
    /// Cached ticker quote; never drives the depth book
    quote: Option<TopOfBook>,
}

impl BookInner {
    fn add_order(&mut self, order: Order) -> Result<(), BookError> {
        if self.index.contains_key(order.id()) {
            return Err(BookError::DuplicateOrder(order.id().to_string()));
        }

        let id = order.id().to_string();
        let side = order.side();
        let price = order.price();

        match side {
            Side::Buy => self
                .bids
                .entry(Reverse(price))
                .or_insert_with(|| PriceLevel::new(price))
                .add(order)?,
            Side::Sell => self
                .asks
                .entry(price)
                .or_insert_with(|| PriceLevel::new(price))
                .add(order)?,
        }

        self.index.insert(id, (side, price));
        Ok(())
    }

    fn remove_order(&mut self, order_id: &str) -> Result<Order, BookError> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;

        match side {
            Side::Buy => {
                let level = self
                    .bids
                    .get_mut(&Reverse(price))
                    .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;
                let order = level.remove(order_id)?;
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                Ok(order)
            }
            Side::Sell => {
                let level = self
                    .asks
                    .get_mut(&price)
                    .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;
                let order = level.remove(order_id)?;
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                Ok(order)
            }
        }
    }

    fn modify_order(&mut self, order_id: &str, new_size: Decimal) -> Result<(), BookError> {
        if new_size <= Decimal::ZERO {
            return self.remove_order(order_id).map(|_| ());
        }

        let (side, price) = *self
            .index
            .get(order_id)
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;

        let level = match side {
            Side::Buy => self.bids.get_mut(&Reverse(price)),
            Side::Sell => self.asks.get_mut(&price),
        }
        .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;

        level.update_size(order_id, new_size)
    }

    fn order_size(&self, order_id: &str) -> Option<Decimal> {
        let (side, price) = *self.index.get(order_id)?;
        let level = match side {
            Side::Buy => self.bids.get(&Reverse(price)),
            Side::Sell => self.asks.get(&price),
        }?;
        level.find(order_id).map(|o| o.size())
    }

    /// Drop an entire level, unindexing its orders. Returns false if
    /// no level rests at this price.
    fn remove_level(&mut self, side: Side, price: Decimal) -> bool {
        let level = match side {
            Side::Buy => self.bids.remove(&Reverse(price)),
            Side::Sell => self.asks.remove(&price),
        };
        match level {
            Some(level) => {
                for order in level.iter() {
                    self.index.remove(order.id());
                }
                true
            }
            None => false,
        }
    }

    fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    fn bid_levels(&self, depth: usize) -> Vec<BookLevel> {
        self.bids
            .values()
            .take(depth)
            .map(|level| BookLevel {
                price: level.price(),
                size: level.total_size(),
            })
            .collect()
    }

    fn ask_levels(&self, depth: usize) -> Vec<BookLevel> {
        self.asks
            .values()
            .take(depth)
            .map(|level| BookLevel {
                price: level.price(),
                size: level.total_size(),
            })
            .collect()
    }

    fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.index.clear();
        self.quote = None;
    }
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            inner: Mutex::new(BookInner::default()),
            sequence: AtomicU64::new(0),
            callback: Mutex::new(None),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Current mutation sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Register the update callback, replacing any prior one
    pub fn set_update_callback(&self, callback: UpdateCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    /// Bump the sequence and notify, after the book lock is released
    fn touch(&self) {
        let seq = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb(seq);
        }
    }

    /// Insert a new resting order. Returns false on a duplicate id.
    pub fn add_order(&self, order: Order) -> bool {
        let result = self.inner.lock().unwrap().add_order(order);
        match result {
            Ok(()) => {
                self.touch();
                true
            }
            Err(e) => {
                debug!(symbol = %self.symbol, error = %e, "add_order rejected");
                false
            }
        }
    }

    /// Remove a resting order by id. Returns false if unknown.
    pub fn remove_order(&self, order_id: &str) -> bool {
        let result = self.inner.lock().unwrap().remove_order(order_id);
        match result {
            Ok(_) => {
                self.touch();
                true
            }
            Err(e) => {
                debug!(symbol = %self.symbol, error = %e, "remove_order rejected");
                false
            }
        }
    }

    /// Set an order's size; non-positive sizes remove it. Returns
    /// false if unknown.
    pub fn modify_order(&self, order_id: &str, new_size: Decimal) -> bool {
        let result = self.inner.lock().unwrap().modify_order(order_id, new_size);
        match result {
            Ok(()) => {
                self.touch();
                true
            }
            Err(e) => {
                debug!(symbol = %self.symbol, error = %e, "modify_order rejected");
                false
            }
        }
    }

    /// Apply a normalized L3 event
    pub fn apply_l3(&self, event: L3Event) -> bool {
        match event {
            L3Event::Open {
                id,
                side,
                price,
                size,
            } => self.add_order(Order::new(id, side, price, size, now_nanos())),
            L3Event::Done { id } => self.remove_order(&id),
            L3Event::Change { id, new_size } => self.modify_order(&id, new_size),
            L3Event::Match { maker_id, filled } => self.apply_match(&maker_id, filled),
        }
    }

    /// Maker-side fill: reduce the resting order, removing it when the
    /// fill consumes it. An unknown maker never rested here (or the
    /// book is mid-resync) and is ignored.
    fn apply_match(&self, maker_id: &str, filled: Decimal) -> bool {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            match inner.order_size(maker_id) {
                Some(old_size) => inner.modify_order(maker_id, old_size - filled),
                None => Err(BookError::UnknownOrder(maker_id.to_string())),
            }
        };
        match result {
            Ok(()) => {
                self.touch();
                true
            }
            Err(e) => {
                debug!(symbol = %self.symbol, error = %e, "match ignored");
                false
            }
        }
    }

    /// Apply one aggregated L2 change: zero size deletes the level,
    /// any other size replaces it with a single synthetic order whose
    /// id is derived from the side and price.
    pub fn apply_l2(&self, side: Side, price: Decimal, size: Decimal) -> bool {
        let changed = {
            let mut inner = self.inner.lock().unwrap();
            if size <= Decimal::ZERO {
                inner.remove_level(side, price)
            } else {
                inner.remove_level(side, price);
                let id = format!("{}-{}", side.synthetic_prefix(), price);
                inner
                    .add_order(Order::new(id, side, price, size, now_nanos()))
                    .is_ok()
            }
        };
        if changed {
            self.touch();
        }
        changed
    }

    /// Replace the entire book with a feed snapshot, atomically.
    /// Entries without an order id get a synthetic one; duplicate ids
    /// within the snapshot are dropped.
    pub fn apply_snapshot(&self, bids: &[SnapshotLevel], asks: &[SnapshotLevel]) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.clear();
            for (side, entries) in [(Side::Buy, bids), (Side::Sell, asks)] {
                for entry in entries {
                    let id = entry.order_id.clone().unwrap_or_else(|| {
                        format!("{}-{}", side.synthetic_prefix(), entry.price)
                    });
                    let order = Order::new(id, side, entry.price, entry.size, now_nanos());
                    if let Err(e) = inner.add_order(order) {
                        debug!(symbol = %self.symbol, error = %e, "snapshot entry dropped");
                    }
                }
            }
        }
        self.touch();
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.inner.lock().unwrap().best_bid()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.inner.lock().unwrap().best_ask()
    }

    pub fn spread(&self) -> Option<Decimal> {
        let inner = self.inner.lock().unwrap();
        match (inner.best_bid(), inner.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn midpoint(&self) -> Option<Decimal> {
        let inner = self.inner.lock().unwrap();
        match (inner.best_bid(), inner.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// True when the bid side reaches into the ask side; a resync
    /// trigger for the normalizer
    pub fn is_crossed(&self) -> bool {
        self.inner.lock().unwrap().is_crossed()
    }

    /// Top `depth` bid levels, highest price first
    pub fn bid_levels(&self, depth: usize) -> Vec<BookLevel> {
        self.inner.lock().unwrap().bid_levels(depth)
    }

    /// Top `depth` ask levels, lowest price first
    pub fn ask_levels(&self, depth: usize) -> Vec<BookLevel> {
        self.inner.lock().unwrap().ask_levels(depth)
    }

    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        let inner = self.inner.lock().unwrap();
        let (side, price) = *inner.index.get(order_id)?;
        let level = match side {
            Side::Buy => inner.bids.get(&Reverse(price)),
            Side::Sell => inner.asks.get(&price),
        }?;
        level.find(order_id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.inner.lock().unwrap().index.len()
    }

    pub fn bid_level_count(&self) -> usize {
        self.inner.lock().unwrap().bids.len()
    }

    pub fn ask_level_count(&self) -> usize {
        self.inner.lock().unwrap().asks.len()
    }

    /// Remove all state. An already-empty book stays untouched.
    pub fn clear(&self) {
        let cleared = {
            let mut inner = self.inner.lock().unwrap();
            let had_state =
                !inner.index.is_empty() || !inner.bids.is_empty() || inner.quote.is_some();
            inner.clear();
            had_state
        };
        if cleared {
            self.touch();
        }
    }

    /// Cache the latest ticker quote
    pub fn record_quote(&self, quote: TopOfBook) {
        self.inner.lock().unwrap().quote = Some(quote);
        self.touch();
    }

    pub fn top_of_book(&self) -> Option<TopOfBook> {
        self.inner.lock().unwrap().quote.clone()
    }

    /// Consistent view of the top `depth` levels plus metrics, taken
    /// under a single lock acquisition. Consumers needing related
    /// values together must use this rather than composing getters.
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let (bids, asks) = {
            let inner = self.inner.lock().unwrap();
            (inner.bid_levels(depth), inner.ask_levels(depth))
        };
        let metrics = compute_metrics(&bids, &asks);
        BookSnapshot {
            symbol: self.symbol.clone(),
            sequence: self.sequence(),
            timestamp_ns: now_nanos(),
            bids,
            asks,
            metrics,
        }
    }

    /// Metrics over the top `depth` levels
    pub fn compute_metrics(&self, depth: usize) -> BookMetrics {
        let (bids, asks) = {
            let inner = self.inner.lock().unwrap();
            (inner.bid_levels(depth), inner.ask_levels(depth))
        };
        compute_metrics(&bids, &asks)
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol", &self.symbol)
            .field("sequence", &self.sequence())
            .field("orders", &self.order_count())
            .finish()
    }
}
