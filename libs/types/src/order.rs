//! Order lifecycle types
//!
//! An order is created by its owning book (or reconstructed from a replay
//! feed), mutated only by that book, and destroyed when it reaches a
//! terminal state.

use crate::ids::OrderId;
use crate::numeric::{Price, Quantity, Timestamp};
use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy side
    Bid,
    /// Sell side
    Ask,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    StopLimit,
}

/// Time-in-force policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TimeInForce {
    /// Good-Till-Cancel: remains until filled or explicitly cancelled
    Gtc,
    /// Immediate-Or-Cancel: match immediately, discard remainder
    Ioc,
    /// Fill-Or-Kill: full match or reject entirely
    Fok,
    /// Good-Till-Date: expire at the given timestamp
    Gtd(Timestamp),
}

/// Order status.
///
/// `New → PartiallyFilled → {Filled | Cancelled}`; terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// A single order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    /// Limit price in ticks; ignored for market orders.
    pub price: Price,
    /// Original quantity.
    pub quantity: Quantity,
    /// Resting quantity; `0 <= remaining <= quantity`.
    pub remaining: Quantity,
    pub status: OrderStatus,
    /// Arrival time, taken from the event stream.
    pub timestamp: Timestamp,
    /// Opaque client tag.
    pub client_id: String,
}

impl Order {
    pub fn new(
        id: OrderId,
        side: Side,
        order_type: OrderType,
        price: Price,
        quantity: Quantity,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            side,
            order_type,
            time_in_force: TimeInForce::Gtc,
            price,
            quantity,
            remaining: quantity,
            status: OrderStatus::New,
            timestamp,
            client_id: String::new(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Bid
    }

    pub fn filled_quantity(&self) -> Quantity {
        self.quantity - self.remaining
    }

    pub fn is_filled(&self) -> bool {
        self.remaining.is_zero()
    }

    /// An order is active while it can still be matched.
    pub fn is_active(&self) -> bool {
        !self.remaining.is_zero()
            && matches!(self.status, OrderStatus::New | OrderStatus::PartiallyFilled)
    }

    /// Decrement the resting quantity by a match and advance the status
    /// machine. The fill is clamped to the remaining quantity so the
    /// `remaining <= quantity` invariant holds for any input.
    pub fn fill(&mut self, quantity: Quantity) {
        self.remaining = self.remaining.saturating_sub(quantity);
        if self.remaining.is_zero() {
            self.status = OrderStatus::Filled;
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
    }
}
