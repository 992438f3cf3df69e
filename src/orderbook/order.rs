//! A single resting order

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;
use crate::error::BookError;

/// One order resting in the book. The id and price are fixed for the
/// order's lifetime; a price change arrives from the feed as
/// cancel-plus-insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: String,
    side: Side,
    price: Decimal,
    size: Decimal,
    timestamp_ns: u64,
}

impl Order {
    pub fn new(id: String, side: Side, price: Decimal, size: Decimal, timestamp_ns: u64) -> Self {
        Self {
            id,
            side,
            price,
            size,
            timestamp_ns,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn size(&self) -> Decimal {
        self.size
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Overwrite the size; used by `change` events
    pub fn set_size(&mut self, size: Decimal) {
        self.size = size;
    }

    /// Reduce the size by `amount` (partial fill). Rejects non-positive
    /// amounts and reductions past zero.
    pub fn reduce_size(&mut self, amount: Decimal) -> Result<(), BookError> {
        if amount <= Decimal::ZERO || amount > self.size {
            return Err(BookError::InvalidReduction(amount));
        }
        self.size -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy_order() -> Order {
        Order::new("o-1".to_string(), Side::Buy, dec!(100.0), dec!(1.5), 0)
    }

    #[test]
    fn test_basic_properties() {
        let order = buy_order();
        assert_eq!(order.id(), "o-1");
        assert_eq!(order.side(), Side::Buy);
        assert_eq!(order.price(), dec!(100.0));
        assert_eq!(order.size(), dec!(1.5));
    }

    #[test]
    fn test_reduce_size() {
        let mut order = buy_order();
        assert!(order.reduce_size(dec!(0.5)).is_ok());
        assert_eq!(order.size(), dec!(1.0));

        // Too much
        assert_eq!(
            order.reduce_size(dec!(2.0)),
            Err(BookError::InvalidReduction(dec!(2.0)))
        );
        assert_eq!(order.size(), dec!(1.0));

        // Non-positive
        assert!(order.reduce_size(dec!(-0.5)).is_err());
        assert!(order.reduce_size(Decimal::ZERO).is_err());
        assert_eq!(order.size(), dec!(1.0));
    }

    #[test]
    fn test_set_size() {
        let mut order = buy_order();
        order.set_size(dec!(3.25));
        assert_eq!(order.size(), dec!(3.25));
    }
}
