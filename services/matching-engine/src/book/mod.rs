//! Order book infrastructure module
//!
//! Contains price levels and the bid/ask book sides.

pub mod price_level;
pub mod bid_book;
pub mod ask_book;

pub use price_level::PriceLevel;
pub use bid_book::BidBook;
pub use ask_book::AskBook;

use serde::{Deserialize, Serialize};
use types::numeric::{Price, Quantity};

/// Aggregated view of one price level, for depth queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelView {
    pub price: Price,
    pub quantity: Quantity,
    pub orders: u32,
}
