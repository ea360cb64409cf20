//! Stateless book analytics
//!
//! `BookAnalytics` borrows a book and derives microstructure metrics from
//! its current state and trade log. Prices are expressed in ticks unless a
//! metric is explicitly a ratio.

use matching_engine::OrderBook;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use types::numeric::{Price, Quantity};
use types::order::Side;

/// Number of levels walked when estimating market-order impact.
const IMPACT_WALK_LEVELS: usize = 20;

/// Levels of near-touch depth considered for resilience.
const RESILIENCE_LEVELS: usize = 3;

/// Comprehensive market quality snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuality {
    /// Quoted spread in basis points of the midpoint.
    pub spread_bps: f64,
    /// Total depth at the touch (both sides).
    pub depth: f64,
    pub imbalance: f64,
    pub microprice: f64,
    pub effective_spread: f64,
    pub resilience: f64,
    pub pressure: f64,
    /// High-frequency volatility proxy: spread widened by book balance.
    pub volatility_proxy: f64,
}

/// Read-only analytics over a single book.
pub struct BookAnalytics<'a> {
    book: &'a OrderBook,
}

impl<'a> BookAnalytics<'a> {
    pub fn new(book: &'a OrderBook) -> Self {
        Self { book }
    }

    /// Top-of-book imbalance `I = Q_bid / (Q_bid + Q_ask)` in `[0, 1]`.
    ///
    /// `0.5` is a balanced (or empty) book; above `0.5` means more resting
    /// buy interest.
    pub fn order_imbalance(&self) -> f64 {
        let bid = self.book.best_bid_quantity().raw();
        let ask = self.book.best_ask_quantity().raw();
        if bid == 0 && ask == 0 {
            return 0.5;
        }
        bid as f64 / (bid + ask) as f64
    }

    /// Stoikov microprice, in ticks:
    /// `mid + (2/π)·atan(2I − 1)·spread/2`.
    ///
    /// A better short-horizon predictor than the midpoint; `0.0` when the
    /// book has no mid.
    pub fn microprice(&self) -> f64 {
        let mid = self.book.mid_price();
        if mid.is_zero() {
            return 0.0;
        }
        let imbalance = self.order_imbalance();
        let spread = self.book.spread().ticks() as f64;

        let symmetric = 2.0 * imbalance - 1.0;
        let adjustment = (2.0 / PI) * symmetric.atan() * spread / 2.0;
        mid.ticks() as f64 + adjustment
    }

    /// Weighted mid `I·ask + (1−I)·bid` in ticks; `0.0` on a one-sided book.
    pub fn weighted_mid_price(&self) -> f64 {
        let bid = self.book.best_bid();
        let ask = self.book.best_ask();
        if bid.is_zero() || ask.is_zero() {
            return 0.0;
        }
        let imbalance = self.order_imbalance();
        imbalance * ask.ticks() as f64 + (1.0 - imbalance) * bid.ticks() as f64
    }

    /// Depth-weighted imbalance over up to `levels` per side, deeper levels
    /// discounted by `decay^k`. Returns the bid share in `[0, 1]`, `0.5`
    /// for an empty book.
    pub fn book_pressure(&self, levels: usize, decay: f64) -> f64 {
        let bids = self.book.bid_levels(levels);
        let asks = self.book.ask_levels(levels);

        let mut weighted_bid = 0.0;
        let mut weighted_ask = 0.0;
        let mut weight = 1.0;

        for i in 0..bids.len().max(asks.len()) {
            if let Some(view) = bids.get(i) {
                weighted_bid += view.quantity.raw() as f64 * weight;
            }
            if let Some(view) = asks.get(i) {
                weighted_ask += view.quantity.raw() as f64 * weight;
            }
            weight *= decay;
        }

        if weighted_bid == 0.0 && weighted_ask == 0.0 {
            return 0.5;
        }
        weighted_bid / (weighted_bid + weighted_ask)
    }

    /// Relative price impact of a hypothetical market order of `size`:
    /// walk the opposite side consuming levels and report
    /// `|last_touched − initial_touch| / initial_touch`.
    pub fn price_impact(&self, side: Side, size: Quantity) -> f64 {
        let initial = match side {
            Side::Bid => self.book.best_ask(),
            Side::Ask => self.book.best_bid(),
        };
        if initial.is_zero() {
            return 0.0;
        }

        let levels = match side {
            Side::Bid => self.book.ask_levels(IMPACT_WALK_LEVELS),
            Side::Ask => self.book.bid_levels(IMPACT_WALK_LEVELS),
        };

        let mut remaining = size;
        let mut last = initial;
        for view in levels {
            if remaining <= view.quantity {
                break;
            }
            remaining -= view.quantity;
            last = view.price;
        }

        (last.ticks() - initial.ticks()).abs() as f64 / initial.ticks() as f64
    }

    /// Round-trip cost as a fraction of the midpoint: `(ask − bid) / mid`.
    pub fn effective_spread(&self) -> f64 {
        let bid = self.book.best_bid();
        let ask = self.book.best_ask();
        let mid = self.book.mid_price();
        if bid.is_zero() || ask.is_zero() || mid.is_zero() {
            return 0.0;
        }
        (ask.ticks() - bid.ticks()) as f64 / mid.ticks() as f64
    }

    /// Volume-synchronized probability of informed trading over the last
    /// `lookback` executions: `|Σbuy − Σsell| / Σqty`.
    pub fn order_flow_toxicity(&self, lookback: usize) -> f64 {
        let trades = self.book.trades();
        if trades.len() < 2 {
            return 0.0;
        }

        let start = trades.len().saturating_sub(lookback);
        let mut buy_volume = 0u64;
        let mut sell_volume = 0u64;
        for execution in &trades[start..] {
            match execution.aggressor_side {
                Side::Bid => buy_volume += execution.quantity.raw(),
                Side::Ask => sell_volume += execution.quantity.raw(),
            }
        }

        let total = buy_volume + sell_volume;
        if total == 0 {
            return 0.0;
        }
        (buy_volume as f64 - sell_volume as f64).abs() / total as f64
    }

    /// Liquidity-provision profit of an execution against a later midpoint,
    /// in ticks. Positive when the market moved with the liquidity taker.
    pub fn realized_spread(&self, execution_price: Price, execution_side: Side, future_mid: Price) -> f64 {
        if future_mid.is_zero() {
            return 0.0;
        }
        let mid = self.book.mid_price().ticks() as f64;
        let mid_change = future_mid.ticks() as f64 - mid;
        let price_diff = execution_price.ticks() as f64 - mid;
        let sign = match execution_side {
            Side::Bid => 1.0,
            Side::Ask => -1.0,
        };
        sign * (price_diff - mid_change)
    }

    /// Near-touch depth across three levels per side divided by the spread.
    /// Deeper books at tighter spreads recover faster from large trades.
    pub fn book_resilience(&self) -> f64 {
        let bids = self.book.bid_levels(RESILIENCE_LEVELS);
        let asks = self.book.ask_levels(RESILIENCE_LEVELS);
        if bids.is_empty() || asks.is_empty() {
            return 0.0;
        }

        let near_touch: u64 = bids
            .iter()
            .chain(asks.iter())
            .map(|view| view.quantity.raw())
            .sum();

        let spread = self.book.spread().ticks();
        if spread == 0 {
            return 0.0;
        }
        near_touch as f64 / spread as f64
    }

    /// Queue position (1-based) for a hypothetical order at `(side, price)`:
    /// `1` if it would better the touch, else behind every resting order at
    /// that price.
    pub fn queue_position(&self, side: Side, price: Price) -> usize {
        let betters_touch = match side {
            Side::Bid => {
                let best = self.book.best_bid();
                best.is_zero() || price > best
            }
            Side::Ask => {
                let best = self.book.best_ask();
                best.is_zero() || price < best
            }
        };
        if betters_touch {
            return 1;
        }
        self.book.orders_at(price, side).len() + 1
    }

    /// Proxy for order arrival intensity: resting order count at the touch.
    pub fn order_arrival_rate(&self) -> f64 {
        let bid_orders = self
            .book
            .bid_levels(1)
            .first()
            .map(|view| view.orders)
            .unwrap_or(0);
        let ask_orders = self
            .book
            .ask_levels(1)
            .first()
            .map(|view| view.orders)
            .unwrap_or(0);
        (bid_orders + ask_orders) as f64
    }

    /// Bundle of market quality metrics.
    pub fn market_quality(&self) -> MarketQuality {
        let mid = self.book.mid_price();
        let spread = self.book.spread();

        let spread_bps = if mid.ticks() > 0 {
            spread.ticks() as f64 / mid.ticks() as f64 * 10_000.0
        } else {
            0.0
        };
        let imbalance = self.order_imbalance();

        MarketQuality {
            spread_bps,
            depth: (self.book.best_bid_quantity().raw() + self.book.best_ask_quantity().raw())
                as f64,
            imbalance,
            microprice: self.microprice(),
            effective_spread: self.effective_spread(),
            resilience: self.book_resilience(),
            pressure: self.book_pressure(5, 0.5),
            volatility_proxy: spread_bps * (1.0 - (0.5 - imbalance).abs()),
        }
    }
}
