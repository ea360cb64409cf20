//! Strategy interface and reference implementations
//!
//! Strategies run synchronously inside engine callbacks over a read-only
//! book and portfolio. Orders they emit carry the null id; the engine
//! stamps ids and timestamps when it processes them.

use matching_engine::OrderBook;
use signals::stats;
use std::collections::HashMap;
use types::ids::OrderId;
use types::market_data::MarketDataUpdate;
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderType, Side};
use types::signal::Signal;
use types::trade::Execution;

use crate::portfolio::Portfolio;

/// String-to-double parameter map with defaults.
#[derive(Debug, Clone, Default)]
pub struct Params(HashMap<String, f64>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str, default: f64) -> f64 {
        self.0.get(name).copied().unwrap_or(default)
    }
}

/// Callbacks every strategy implements. All callbacks are total: they must
/// not panic, block, or spawn.
pub trait Strategy {
    fn name(&self) -> &str;

    fn initialize(&mut self) {}

    fn on_start(&mut self) {}

    fn on_market_data(
        &mut self,
        update: &MarketDataUpdate,
        book: &OrderBook,
        portfolio: &Portfolio,
    );

    fn on_signal(&mut self, _signal: &Signal, _book: &OrderBook, _portfolio: &Portfolio) {}

    fn on_fill(&mut self, _execution: &Execution, _portfolio: &Portfolio) {}

    fn on_end(&mut self, _portfolio: &Portfolio) {}

    /// Orders to submit after the current callback completes. Ids are
    /// assigned by the engine.
    fn generate_orders(&mut self, _book: &OrderBook, _portfolio: &Portfolio) -> Vec<Order> {
        Vec::new()
    }

    fn set_parameters(&mut self, _params: Params) {}
}

// ---------------------------------------------------------------------------
// Market maker
// ---------------------------------------------------------------------------

/// Quotes both sides around the midpoint with an inventory skew.
///
/// Parameters: `spread_bps` (default 10), `order_size` (default 100),
/// `max_inventory` (default 1000).
pub struct MarketMakerStrategy {
    spread_bps: f64,
    order_size: u64,
    max_inventory: i64,
    pending: Vec<Order>,
}

impl MarketMakerStrategy {
    pub fn new() -> Self {
        Self {
            spread_bps: 10.0,
            order_size: 100,
            max_inventory: 1_000,
            pending: Vec::new(),
        }
    }

    fn requote(&mut self, book: &OrderBook, portfolio: &Portfolio) {
        self.pending.clear();

        let mid = book.mid_price();
        if mid.is_zero() {
            return;
        }

        let half_spread = (mid.ticks() as f64 * self.spread_bps * 1e-4).max(1.0);
        let inventory = portfolio.net_position(book.symbol());
        // Long inventory shades both quotes down to encourage selling.
        let skew = inventory as f64 / self.max_inventory.max(1) as f64 * half_spread;

        let bid_price = Price::from_ticks((mid.ticks() as f64 - half_spread - skew).round() as i64);
        let ask_price = Price::from_ticks((mid.ticks() as f64 + half_spread - skew).round() as i64);

        if inventory < self.max_inventory && bid_price.ticks() > 0 {
            self.pending.push(
                Order::new(
                    OrderId::NULL,
                    Side::Bid,
                    OrderType::Limit,
                    bid_price,
                    Quantity::new(self.order_size),
                    0,
                )
                .with_client_id(self.name()),
            );
        }
        if inventory > -self.max_inventory && ask_price.ticks() > 0 {
            self.pending.push(
                Order::new(
                    OrderId::NULL,
                    Side::Ask,
                    OrderType::Limit,
                    ask_price,
                    Quantity::new(self.order_size),
                    0,
                )
                .with_client_id(self.name()),
            );
        }
    }
}

impl Default for MarketMakerStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MarketMakerStrategy {
    fn name(&self) -> &str {
        "market_maker"
    }

    fn on_market_data(
        &mut self,
        _update: &MarketDataUpdate,
        book: &OrderBook,
        portfolio: &Portfolio,
    ) {
        self.requote(book, portfolio);
    }

    fn on_signal(&mut self, _signal: &Signal, book: &OrderBook, portfolio: &Portfolio) {
        self.requote(book, portfolio);
    }

    fn generate_orders(&mut self, _book: &OrderBook, _portfolio: &Portfolio) -> Vec<Order> {
        std::mem::take(&mut self.pending)
    }

    fn set_parameters(&mut self, params: Params) {
        self.spread_bps = params.get("spread_bps", 10.0);
        self.order_size = params.get("order_size", 100.0).max(1.0) as u64;
        self.max_inventory = params.get("max_inventory", 1_000.0).max(1.0) as i64;
    }
}

// ---------------------------------------------------------------------------
// Momentum
// ---------------------------------------------------------------------------

/// Rolling z-score momentum: enter long on strong upward deviation, flatten
/// once it fades.
///
/// Parameters: `lookback` (default 20), `entry_z` (default 2.0), `exit_z`
/// (default 0.5), `order_size` (default 100).
pub struct MomentumStrategy {
    lookback: usize,
    entry_z: f64,
    exit_z: f64,
    order_size: u64,
    mid_history: Vec<f64>,
}

impl MomentumStrategy {
    pub fn new() -> Self {
        Self {
            lookback: 20,
            entry_z: 2.0,
            exit_z: 0.5,
            order_size: 100,
            mid_history: Vec::new(),
        }
    }

    fn z_score(&self) -> f64 {
        if self.mid_history.len() < self.lookback {
            return 0.0;
        }
        let last = match self.mid_history.last() {
            Some(&last) => last,
            None => return 0.0,
        };
        stats::z_score(
            last,
            stats::mean(&self.mid_history),
            stats::stddev(&self.mid_history),
        )
    }
}

impl Default for MomentumStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        "momentum"
    }

    fn on_market_data(
        &mut self,
        _update: &MarketDataUpdate,
        book: &OrderBook,
        _portfolio: &Portfolio,
    ) {
        let mid = book.mid_price();
        if !mid.is_zero() {
            self.mid_history.push(mid.ticks() as f64);
            if self.mid_history.len() > self.lookback {
                self.mid_history.remove(0);
            }
        }
    }

    fn generate_orders(&mut self, book: &OrderBook, portfolio: &Portfolio) -> Vec<Order> {
        let z = self.z_score();
        let position = portfolio.net_position(book.symbol());

        if position == 0 && z > self.entry_z {
            return vec![Order::new(
                OrderId::NULL,
                Side::Bid,
                OrderType::Market,
                Price::ZERO,
                Quantity::new(self.order_size),
                0,
            )
            .with_client_id(self.name())];
        }
        if position > 0 && z.abs() < self.exit_z {
            return vec![Order::new(
                OrderId::NULL,
                Side::Ask,
                OrderType::Market,
                Price::ZERO,
                Quantity::new(position.unsigned_abs()),
                0,
            )
            .with_client_id(self.name())];
        }
        Vec::new()
    }

    fn set_parameters(&mut self, params: Params) {
        self.lookback = params.get("lookback", 20.0).max(2.0) as usize;
        self.entry_z = params.get("entry_z", 2.0);
        self.exit_z = params.get("exit_z", 0.5);
        self.order_size = params.get("order_size", 100.0).max(1.0) as u64;
    }
}
