//! Bid (buy-side) order book
//!
//! Price levels sorted by price descending, so the highest bid is first.
//! Uses `BTreeMap` for deterministic iteration; iteration is reversed to
//! walk from the best price outward.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Side;

use super::price_level::PriceLevel;
use super::LevelView;

/// Buy side of the book.
#[derive(Debug, Clone, Default)]
pub struct BidBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Append an order at the tail of its price level, creating the level
    /// on first use.
    pub fn insert(&mut self, id: OrderId, price: Price, remaining: Quantity) {
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price, Side::Bid))
            .push(id, remaining);
    }

    /// Unlink an order from its level, erasing the level if it empties.
    pub fn remove(&mut self, id: OrderId, price: Price, remaining: Quantity) -> bool {
        if let Some(level) = self.levels.get_mut(&price) {
            if level.remove(id, remaining) {
                if level.is_empty() {
                    self.levels.remove(&price);
                }
                return true;
            }
        }
        false
    }

    /// Best (highest) bid price.
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Front order of the best level.
    pub fn best_front(&self) -> Option<OrderId> {
        self.levels.values().next_back().and_then(|level| level.front())
    }

    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    pub fn level_mut(&mut self, price: Price) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    /// Erase a level outright; callers use this after draining it.
    pub fn remove_level(&mut self, price: Price) {
        self.levels.remove(&price);
    }

    /// Up to `depth` aggregated levels from the best outward.
    pub fn levels(&self, depth: usize) -> Vec<LevelView> {
        self.levels
            .values()
            .rev()
            .take(depth)
            .map(|level| LevelView {
                price: level.price(),
                quantity: level.total_quantity(),
                orders: level.order_count(),
            })
            .collect()
    }

    /// Iterate levels from the best price outward.
    pub fn iter_best_first(&self) -> impl Iterator<Item = &PriceLevel> {
        self.levels.values().rev()
    }

    pub fn total_quantity(&self) -> Quantity {
        self.levels
            .values()
            .fold(Quantity::ZERO, |acc, level| acc + level.total_quantity())
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }
}
