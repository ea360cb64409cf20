//! Market data feed updates
//!
//! The add/modify/cancel stream is authoritative for book reconstruction.
//! `Trade` and `Snapshot` rows are informational and never mutate a
//! reconstructed book.

use crate::ids::OrderId;
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use serde::{Deserialize, Serialize};

/// One L3 feed update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketDataUpdate {
    /// A new resting order entered the book.
    AddOrder {
        order_id: OrderId,
        side: Side,
        price: Price,
        quantity: Quantity,
    },
    /// A resting order changed size (and possibly price).
    ModifyOrder {
        order_id: OrderId,
        new_quantity: Quantity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_price: Option<Price>,
    },
    /// A resting order left the book.
    CancelOrder { order_id: OrderId },
    /// A trade print. Informational; the side is the aggressor side.
    Trade {
        side: Side,
        price: Price,
        quantity: Quantity,
    },
    /// Wipe all book state for the symbol.
    Clear,
    /// A depth snapshot marker. Informational.
    Snapshot,
    /// A feed row the source could not classify. Treated as a no-op.
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serialization() {
        let update = MarketDataUpdate::AddOrder {
            order_id: OrderId::new(9),
            side: Side::Bid,
            price: Price::from_ticks(10000),
            quantity: Quantity::new(50),
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"ADD_ORDER\""));

        let back: MarketDataUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(update, back);
    }

    #[test]
    fn test_modify_without_price_omits_field() {
        let update = MarketDataUpdate::ModifyOrder {
            order_id: OrderId::new(9),
            new_quantity: Quantity::new(10),
            new_price: None,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(!json.contains("new_price"));
    }
}
