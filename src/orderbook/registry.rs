//! Book registry
//!
//! Maps symbols to their order books. Handles are reference counted so
//! a reader holding a book survives a concurrent unsubscribe.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{BookSnapshot, OrderBook};

/// Registry of order books, one per subscribed symbol
#[derive(Debug, Default)]
pub struct BookRegistry {
    books: RwLock<HashMap<String, Arc<OrderBook>>>,
}

impl BookRegistry {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Get the book for `symbol`, creating it on first use
    pub fn ensure(&self, symbol: &str) -> Arc<OrderBook> {
        if let Some(book) = self.get(symbol) {
            return book;
        }
        let mut books = self.books.write().unwrap();
        books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(OrderBook::new(symbol)))
            .clone()
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<OrderBook>> {
        self.books.read().unwrap().get(symbol).cloned()
    }

    /// Drop the book for `symbol`. Readers holding the handle keep a
    /// valid (frozen-out) book.
    pub fn remove(&self, symbol: &str) -> Option<Arc<OrderBook>> {
        self.books.write().unwrap().remove(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.books.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.books.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.read().unwrap().is_empty()
    }

    /// Clear every registered book's state (reconnect path)
    pub fn clear_all(&self) {
        let books: Vec<Arc<OrderBook>> = self.books.read().unwrap().values().cloned().collect();
        for book in books {
            book.clear();
        }
    }

    /// Snapshots of every registered book at the given depth
    pub fn snapshot_all(&self, depth: usize) -> Vec<BookSnapshot> {
        let books: Vec<Arc<OrderBook>> = self.books.read().unwrap().values().cloned().collect();
        books.iter().map(|book| book.snapshot(depth)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{L3Event, Side};
    use rust_decimal_macros::dec;

    #[test]
    fn test_ensure_creates_once() {
        let registry = BookRegistry::new();
        let a = registry.ensure("BTC-USD");
        let b = registry.ensure("BTC-USD");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_handle_survives_removal() {
        let registry = BookRegistry::new();
        let book = registry.ensure("ETH-USD");
        book.apply_l3(L3Event::Open {
            id: "x".to_string(),
            side: Side::Buy,
            price: dec!(10),
            size: dec!(1),
        });

        registry.remove("ETH-USD");
        assert!(registry.get("ETH-USD").is_none());
        // The held handle still answers queries
        assert_eq!(book.best_bid(), Some(dec!(10)));
    }

    #[test]
    fn test_clear_all_empties_books() {
        let registry = BookRegistry::new();
        let book = registry.ensure("BTC-USD");
        book.apply_l3(L3Event::Open {
            id: "x".to_string(),
            side: Side::Sell,
            price: dec!(20),
            size: dec!(2),
        });
        registry.clear_all();
        assert_eq!(book.order_count(), 0);
    }
}
