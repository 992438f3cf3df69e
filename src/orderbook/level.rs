//! All orders resting at a single price
//!
//! The queue preserves arrival order (FIFO) and the aggregate size is
//! maintained incrementally, so `total_size` is O(1).

use rust_decimal::Decimal;
use std::collections::VecDeque;

use super::Order;
use crate::error::BookError;

/// Orders at one price point. Invariant: `total_size` equals the sum
/// of member order sizes at every return from a public method.
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    price: Decimal,
    orders: VecDeque<Order>,
    total_size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_size: Decimal::ZERO,
        }
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn total_size(&self) -> Decimal {
        self.total_size
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Append an order to the queue. Rejects orders priced off this
    /// level and duplicate ids.
    pub fn add(&mut self, order: Order) -> Result<(), BookError> {
        if order.price() != self.price {
            return Err(BookError::PriceMismatch {
                order: order.price(),
                level: self.price,
            });
        }
        if self.find(order.id()).is_some() {
            return Err(BookError::DuplicateOrder(order.id().to_string()));
        }

        self.total_size += order.size();
        self.orders.push_back(order);
        Ok(())
    }

    /// Remove an order by id, returning it
    pub fn remove(&mut self, order_id: &str) -> Result<Order, BookError> {
        let pos = self
            .orders
            .iter()
            .position(|o| o.id() == order_id)
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;

        let order = self
            .orders
            .remove(pos)
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;
        self.total_size -= order.size();
        Ok(order)
    }

    /// Set an order's size in place. A non-positive size removes the
    /// order instead.
    pub fn update_size(&mut self, order_id: &str, new_size: Decimal) -> Result<(), BookError> {
        if new_size <= Decimal::ZERO {
            return self.remove(order_id).map(|_| ());
        }

        let order = self
            .orders
            .iter_mut()
            .find(|o| o.id() == order_id)
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;

        let old_size = order.size();
        order.set_size(new_size);
        self.total_size += new_size - old_size;
        Ok(())
    }

    pub fn find(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id() == order_id)
    }

    /// Orders in arrival (priority) order
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }
}
