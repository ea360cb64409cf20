//! Execution records
//!
//! One `Execution` is emitted per match between an aggressing order and a
//! passive resting order. The price is always the resting order's price,
//! and the timestamp is the later of the two orders' arrival times.

use crate::ids::OrderId;
use crate::numeric::{Price, Quantity, Timestamp};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single match between an aggressor and a passive order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Order that initiated the match. Null for feed-reported trades.
    pub aggressor_id: OrderId,
    /// Resting counterparty. Null for feed-reported trades.
    pub passive_id: OrderId,
    pub symbol: String,
    pub aggressor_side: Side,
    /// Execution price in ticks (the resting order's price).
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
}

impl Execution {
    pub fn new(
        aggressor_id: OrderId,
        passive_id: OrderId,
        symbol: impl Into<String>,
        aggressor_side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            aggressor_id,
            passive_id,
            symbol: symbol.into(),
            aggressor_side,
            price,
            quantity,
            timestamp,
        }
    }

    /// Traded notional in currency units.
    pub fn notional(&self) -> Decimal {
        self.price.to_decimal() * self.quantity.to_decimal()
    }
}
