//! Price level implementation with FIFO queue
//!
//! A price level holds the ids of all orders resting at one price, in
//! arrival order. Remaining quantities live in the book's order map; the
//! level tracks only the queue and the aggregate quantity, so callers pass
//! the affected remaining quantity on removal.

use std::collections::VecDeque;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Side;

/// FIFO queue of orders at a single price.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    side: Side,
    /// Order ids in arrival order (front = oldest).
    queue: VecDeque<OrderId>,
    /// Sum of remaining quantity across queued orders.
    total_quantity: Quantity,
}

impl PriceLevel {
    pub fn new(price: Price, side: Side) -> Self {
        Self {
            price,
            side,
            queue: VecDeque::new(),
            total_quantity: Quantity::ZERO,
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Append an order at the back of the queue (time priority).
    pub fn push(&mut self, id: OrderId, remaining: Quantity) {
        self.queue.push_back(id);
        self.total_quantity += remaining;
    }

    /// Unlink an order wherever it sits in the queue.
    ///
    /// `remaining` must be the order's current resting quantity.
    pub fn remove(&mut self, id: OrderId, remaining: Quantity) -> bool {
        if let Some(pos) = self.queue.iter().position(|queued| *queued == id) {
            self.queue.remove(pos);
            self.total_quantity = self.total_quantity.saturating_sub(remaining);
            true
        } else {
            false
        }
    }

    /// Shrink the aggregate quantity in place. Queue positions are untouched,
    /// so this is only valid for non-increasing changes.
    pub fn reduce(&mut self, delta: Quantity) {
        self.total_quantity = self.total_quantity.saturating_sub(delta);
    }

    /// Oldest resting order at this price.
    pub fn front(&self) -> Option<OrderId> {
        self.queue.front().copied()
    }

    /// Drop the front order from the queue without adjusting the aggregate
    /// (the caller has already accounted for its quantity via `reduce`).
    pub fn pop_front(&mut self) -> Option<OrderId> {
        self.queue.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.queue.iter().copied()
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn order_count(&self) -> u32 {
        self.queue.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
