//! Per-symbol matching engine
//!
//! Owns both book sides, the live order map, the trade log, and the cached
//! top-of-book. Matching follows strict price-time priority: best price
//! first, FIFO within a level, execution at the resting order's price.
//!
//! All operations are total. Invalid input yields the null order id or
//! `false`; nothing panics and nothing is thrown.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use types::ids::OrderId;
use types::numeric::{Price, Quantity, Timestamp};
use types::order::{Order, OrderType, Side};
use types::trade::Execution;

use crate::book::{AskBook, BidBook, LevelView};

/// Operational counters, maintained across every operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMetrics {
    pub orders_added: u64,
    pub orders_modified: u64,
    pub orders_cancelled: u64,
    pub orders_matched: u64,
    /// Total matched volume across all executions.
    pub total_volume: u64,
    /// Cumulative wall time spent in add/modify/cancel.
    pub total_latency: Duration,
}

/// Aggregate book statistics for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookStats {
    pub best_bid: Price,
    pub best_ask: Price,
    pub bid_volume: Quantity,
    pub ask_volume: Quantity,
    pub spread: Price,
    pub mid_price: Price,
    pub microprice: f64,
    pub imbalance: f64,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub total_orders: usize,
    pub total_trades: usize,
}

/// Cached best prices; `0` marks an empty side.
#[derive(Debug, Clone, Copy)]
struct TopOfBook {
    bid: Price,
    ask: Price,
}

/// Price-time-priority limit order book for a single symbol.
#[derive(Debug)]
pub struct OrderBook {
    symbol: String,
    tick_size: Price,
    bids: BidBook,
    asks: AskBook,
    /// Every live resting order, keyed by id.
    orders: HashMap<OrderId, Order>,
    /// Parked stop orders awaiting activation by the simulation layer.
    stops: BTreeMap<OrderId, Order>,
    next_id: u64,
    trades: Vec<Execution>,
    /// Lazily recomputed top-of-book; `None` marks the cache dirty.
    cache: Cell<Option<TopOfBook>>,
    metrics: BookMetrics,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size: Price::from_ticks(1),
            bids: BidBook::new(),
            asks: AskBook::new(),
            orders: HashMap::new(),
            stops: BTreeMap::new(),
            next_id: 1,
            trades: Vec::new(),
            cache: Cell::new(None),
            metrics: BookMetrics::default(),
        }
    }

    pub fn with_tick_size(mut self, tick_size: Price) -> Self {
        self.tick_size = tick_size;
        self
    }

    // -- submissions --------------------------------------------------------

    /// Submit a new order and return its freshly allocated id.
    ///
    /// Returns `OrderId::NULL` for zero quantity, or for a non-positive
    /// limit price. Market orders sweep the opposite side up to `quantity`
    /// and discard any remainder; Stop and StopLimit orders are parked
    /// until the simulation layer activates them.
    pub fn add_order(
        &mut self,
        side: Side,
        price: Price,
        quantity: Quantity,
        order_type: OrderType,
        timestamp: Timestamp,
        client_id: &str,
    ) -> OrderId {
        let start = Instant::now();
        if quantity.is_zero() {
            return OrderId::NULL;
        }

        let id = match order_type {
            OrderType::Market => {
                let id = self.allocate_id();
                self.sweep_market(id, side, quantity, timestamp);
                id
            }
            OrderType::Stop | OrderType::StopLimit => {
                if price.ticks() <= 0 {
                    return OrderId::NULL;
                }
                let id = self.allocate_id();
                let order = Order::new(id, side, order_type, price, quantity, timestamp)
                    .with_client_id(client_id);
                self.stops.insert(id, order);
                self.metrics.orders_added += 1;
                id
            }
            OrderType::Limit => {
                if price.ticks() <= 0 {
                    return OrderId::NULL;
                }
                let id = self.allocate_id();
                let order = Order::new(id, side, OrderType::Limit, price, quantity, timestamp)
                    .with_client_id(client_id);
                self.rest_order(order);
                self.metrics.orders_added += 1;
                self.resolve_crossing();
                id
            }
        };

        self.invalidate_cache();
        self.metrics.total_latency += start.elapsed();
        id
    }

    /// Insert a fully-formed order from a replay stream.
    ///
    /// Returns `false` for a zero quantity, a null or duplicate id, or a
    /// non-positive limit price; the book is unchanged in those cases.
    /// Crossing is resolved before return; any executions are appended to
    /// the trade log.
    pub fn insert_order(&mut self, order: Order) -> bool {
        let start = Instant::now();
        if order.remaining.is_zero() || order.id.is_null() {
            return false;
        }
        if self.orders.contains_key(&order.id) || self.stops.contains_key(&order.id) {
            return false;
        }

        // Keep internally minted ids disjoint from feed-supplied ones.
        if order.id.raw() >= self.next_id {
            self.next_id = order.id.raw() + 1;
        }

        match order.order_type {
            OrderType::Market => {
                self.sweep_market(order.id, order.side, order.remaining, order.timestamp);
            }
            OrderType::Stop | OrderType::StopLimit => {
                if order.price.ticks() <= 0 {
                    return false;
                }
                self.stops.insert(order.id, order);
                self.metrics.orders_added += 1;
            }
            OrderType::Limit => {
                if order.price.ticks() <= 0 {
                    return false;
                }
                self.rest_order(order);
                self.metrics.orders_added += 1;
                self.resolve_crossing();
            }
        }

        self.invalidate_cache();
        self.metrics.total_latency += start.elapsed();
        true
    }

    /// Cancel a resting or parked order. Returns `false` for unknown ids.
    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        let start = Instant::now();

        if self.stops.remove(&id).is_some() {
            self.metrics.orders_cancelled += 1;
            self.metrics.total_latency += start.elapsed();
            return true;
        }

        let Some(order) = self.orders.get(&id) else {
            return false;
        };
        let (price, side, remaining) = (order.price, order.side, order.remaining);

        let removed = match side {
            Side::Bid => self.bids.remove(id, price, remaining),
            Side::Ask => self.asks.remove(id, price, remaining),
        };
        if removed {
            self.orders.remove(&id);
            self.metrics.orders_cancelled += 1;
            self.invalidate_cache();
        }
        self.metrics.total_latency += start.elapsed();
        removed
    }

    /// Modify a resting order.
    ///
    /// Shrinking the quantity at an unchanged price keeps the queue
    /// position. Growing the quantity, or changing the price, re-queues the
    /// order at the tail of its (new) level. Shrinking to zero cancels.
    pub fn modify_order(
        &mut self,
        id: OrderId,
        new_price: Option<Price>,
        new_quantity: Quantity,
    ) -> bool {
        let start = Instant::now();

        if new_quantity.is_zero() {
            return self.cancel_order(id);
        }

        if let Some(stop) = self.stops.get_mut(&id) {
            if let Some(price) = new_price {
                stop.price = price;
            }
            stop.quantity = new_quantity;
            stop.remaining = new_quantity;
            self.metrics.orders_modified += 1;
            self.metrics.total_latency += start.elapsed();
            return true;
        }

        let Some(order) = self.orders.get(&id) else {
            return false;
        };
        let (old_price, old_remaining, side) = (order.price, order.remaining, order.side);
        let price = new_price.unwrap_or(old_price);

        if price == old_price && new_quantity <= old_remaining {
            let delta = old_remaining - new_quantity;
            if let Some(order) = self.orders.get_mut(&id) {
                order.remaining = new_quantity;
            }
            let level = match side {
                Side::Bid => self.bids.level_mut(old_price),
                Side::Ask => self.asks.level_mut(old_price),
            };
            if let Some(level) = level {
                level.reduce(delta);
            }
        } else {
            if price.ticks() <= 0 {
                return false;
            }
            // Re-queue at the tail; queue position is forfeited.
            match side {
                Side::Bid => self.bids.remove(id, old_price, old_remaining),
                Side::Ask => self.asks.remove(id, old_price, old_remaining),
            };
            if let Some(order) = self.orders.get_mut(&id) {
                order.price = price;
                order.quantity = new_quantity;
                order.remaining = new_quantity;
            }
            match side {
                Side::Bid => self.bids.insert(id, price, new_quantity),
                Side::Ask => self.asks.insert(id, price, new_quantity),
            }
            self.resolve_crossing();
        }

        self.metrics.orders_modified += 1;
        self.invalidate_cache();
        self.metrics.total_latency += start.elapsed();
        true
    }

    /// Execute a market order against the opposite side.
    ///
    /// IOC semantics: any quantity the opposite side cannot absorb is
    /// discarded. Executions are returned and appended to the trade log.
    pub fn process_market_order(
        &mut self,
        side: Side,
        quantity: Quantity,
        timestamp: Timestamp,
    ) -> Vec<Execution> {
        if quantity.is_zero() {
            return Vec::new();
        }
        let id = self.allocate_id();
        let mark = self.trades.len();
        self.sweep_market(id, side, quantity, timestamp);
        self.invalidate_cache();
        self.trades[mark..].to_vec()
    }

    /// Remove and return parked stop orders whose trigger is touched.
    ///
    /// A Bid stop triggers once the best ask rises to its price; an Ask
    /// stop once the best bid falls to it.
    pub fn take_triggered_stops(&mut self) -> Vec<Order> {
        let best_bid = self.best_bid();
        let best_ask = self.best_ask();

        let triggered: Vec<OrderId> = self
            .stops
            .values()
            .filter(|stop| match stop.side {
                Side::Bid => !best_ask.is_zero() && best_ask >= stop.price,
                Side::Ask => !best_bid.is_zero() && best_bid <= stop.price,
            })
            .map(|stop| stop.id)
            .collect();

        triggered
            .into_iter()
            .filter_map(|id| self.stops.remove(&id))
            .collect()
    }

    // -- matching -----------------------------------------------------------

    /// Drain the crossed region of the book.
    ///
    /// Matches best bid level against best ask level, FIFO within each, at
    /// the earlier-timestamped (resting) order's price. The later arrival
    /// is the aggressor; on equal timestamps the bid is.
    fn resolve_crossing(&mut self) {
        loop {
            let (bid_price, ask_price) = match (self.bids.best_price(), self.asks.best_price()) {
                (Some(bid), Some(ask)) if bid >= ask => (bid, ask),
                _ => break,
            };
            let (Some(bid_id), Some(ask_id)) = (self.bids.best_front(), self.asks.best_front())
            else {
                break;
            };
            let Some((bid_ts, bid_remaining)) =
                self.orders.get(&bid_id).map(|o| (o.timestamp, o.remaining))
            else {
                break;
            };
            let Some((ask_ts, ask_remaining)) =
                self.orders.get(&ask_id).map(|o| (o.timestamp, o.remaining))
            else {
                break;
            };

            let quantity = bid_remaining.min(ask_remaining);
            let price = if bid_ts < ask_ts { bid_price } else { ask_price };
            let (aggressor_id, passive_id, aggressor_side) = if bid_ts >= ask_ts {
                (bid_id, ask_id, Side::Bid)
            } else {
                (ask_id, bid_id, Side::Ask)
            };

            let execution = Execution::new(
                aggressor_id,
                passive_id,
                self.symbol.clone(),
                aggressor_side,
                price,
                quantity,
                bid_ts.max(ask_ts),
            );

            self.fill_resting(bid_id, quantity);
            self.fill_resting(ask_id, quantity);
            self.metrics.orders_matched += 1;
            self.metrics.total_volume += quantity.raw();
            self.trades.push(execution);
        }
        self.invalidate_cache();
    }

    /// Sweep the opposite side for a market-order aggressor.
    fn sweep_market(
        &mut self,
        aggressor_id: OrderId,
        side: Side,
        quantity: Quantity,
        timestamp: Timestamp,
    ) {
        let mut remaining = quantity;
        while !remaining.is_zero() {
            let front = match side {
                Side::Bid => self.asks.best_price().zip(self.asks.best_front()),
                Side::Ask => self.bids.best_price().zip(self.bids.best_front()),
            };
            let Some((best_price, passive_id)) = front else {
                break;
            };
            let Some(passive_remaining) = self.orders.get(&passive_id).map(|o| o.remaining) else {
                break;
            };

            let fill = remaining.min(passive_remaining);
            let execution = Execution::new(
                aggressor_id,
                passive_id,
                self.symbol.clone(),
                side,
                best_price,
                fill,
                timestamp,
            );

            self.fill_resting(passive_id, fill);
            self.metrics.orders_matched += 1;
            self.metrics.total_volume += fill.raw();
            self.trades.push(execution);
            remaining -= fill;
        }
    }

    /// Apply a fill to a resting order: decrement it and its level, and
    /// destroy both order and level once empty.
    fn fill_resting(&mut self, id: OrderId, quantity: Quantity) {
        let Some(order) = self.orders.get_mut(&id) else {
            return;
        };
        order.fill(quantity);
        let (price, side, filled) = (order.price, order.side, order.is_filled());

        let emptied = {
            let level = match side {
                Side::Bid => self.bids.level_mut(price),
                Side::Ask => self.asks.level_mut(price),
            };
            match level {
                Some(level) => {
                    level.reduce(quantity);
                    if filled {
                        level.pop_front();
                    }
                    level.is_empty()
                }
                None => false,
            }
        };
        if emptied {
            match side {
                Side::Bid => self.bids.remove_level(price),
                Side::Ask => self.asks.remove_level(price),
            }
        }
        if filled {
            self.orders.remove(&id);
        }
    }

    fn rest_order(&mut self, order: Order) {
        match order.side {
            Side::Bid => self.bids.insert(order.id, order.price, order.remaining),
            Side::Ask => self.asks.insert(order.id, order.price, order.remaining),
        }
        self.orders.insert(order.id, order);
    }

    fn allocate_id(&mut self) -> OrderId {
        let id = OrderId::new(self.next_id);
        self.next_id += 1;
        id
    }

    // -- queries ------------------------------------------------------------

    fn top_of_book(&self) -> TopOfBook {
        if let Some(top) = self.cache.get() {
            return top;
        }
        let top = TopOfBook {
            bid: self.bids.best_price().unwrap_or(Price::ZERO),
            ask: self.asks.best_price().unwrap_or(Price::ZERO),
        };
        self.cache.set(Some(top));
        top
    }

    fn invalidate_cache(&mut self) {
        self.cache.set(None);
    }

    /// Best bid price, `0` when the bid side is empty.
    pub fn best_bid(&self) -> Price {
        self.top_of_book().bid
    }

    /// Best ask price, `0` when the ask side is empty.
    pub fn best_ask(&self) -> Price {
        self.top_of_book().ask
    }

    /// Midpoint in ticks; `0` unless both sides are populated.
    pub fn mid_price(&self) -> Price {
        let top = self.top_of_book();
        if top.bid.ticks() > 0 && top.ask.ticks() > 0 {
            Price::from_ticks((top.bid.ticks() + top.ask.ticks()) / 2)
        } else {
            Price::ZERO
        }
    }

    /// Spread in ticks; `0` unless both sides are populated.
    pub fn spread(&self) -> Price {
        let top = self.top_of_book();
        if top.bid.ticks() > 0 && top.ask.ticks() > 0 {
            top.ask - top.bid
        } else {
            Price::ZERO
        }
    }

    pub fn best_bid_quantity(&self) -> Quantity {
        self.bids
            .best_price()
            .and_then(|price| self.bids.level(price))
            .map(|level| level.total_quantity())
            .unwrap_or(Quantity::ZERO)
    }

    pub fn best_ask_quantity(&self) -> Quantity {
        self.asks
            .best_price()
            .and_then(|price| self.asks.level(price))
            .map(|level| level.total_quantity())
            .unwrap_or(Quantity::ZERO)
    }

    /// Up to `depth` aggregated bid levels from the best outward.
    pub fn bid_levels(&self, depth: usize) -> Vec<LevelView> {
        self.bids.levels(depth)
    }

    /// Up to `depth` aggregated ask levels from the best outward.
    pub fn ask_levels(&self, depth: usize) -> Vec<LevelView> {
        self.asks.levels(depth)
    }

    /// Orders resting at a price, oldest first.
    pub fn orders_at(&self, price: Price, side: Side) -> Vec<&Order> {
        let level = match side {
            Side::Bid => self.bids.level(price),
            Side::Ask => self.asks.level(price),
        };
        level
            .map(|level| {
                level
                    .iter()
                    .filter_map(|id| self.orders.get(&id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resting quantity queued ahead of an order at its own level.
    pub fn queue_ahead(&self, id: OrderId) -> Quantity {
        let Some(order) = self.orders.get(&id) else {
            return Quantity::ZERO;
        };
        let level = match order.side {
            Side::Bid => self.bids.level(order.price),
            Side::Ask => self.asks.level(order.price),
        };
        let Some(level) = level else {
            return Quantity::ZERO;
        };
        let mut ahead = Quantity::ZERO;
        for queued in level.iter() {
            if queued == id {
                break;
            }
            if let Some(other) = self.orders.get(&queued) {
                ahead += other.remaining;
            }
        }
        ahead
    }

    /// Aggregated volume imbalance over the top `depth` levels:
    /// `(Σbid − Σask) / (Σbid + Σask)`, `0` for an empty book.
    pub fn order_imbalance(&self, depth: usize) -> f64 {
        let bid: u64 = self.bids.levels(depth).iter().map(|l| l.quantity.raw()).sum();
        let ask: u64 = self.asks.levels(depth).iter().map(|l| l.quantity.raw()).sum();
        let total = bid + ask;
        if total == 0 {
            return 0.0;
        }
        (bid as f64 - ask as f64) / total as f64
    }

    /// Volume-weighted microprice over the top `depth` levels, in ticks.
    ///
    /// Each side's VWAP is weighted by the *opposite* side's queue size, so
    /// the estimate leans toward the thin side. Falls back to the midpoint
    /// when either side is empty of quantity.
    pub fn microprice(&self, depth: usize) -> f64 {
        if self.bids.is_empty() || self.asks.is_empty() {
            return 0.0;
        }

        let mut bid_qty = 0u64;
        let mut ask_qty = 0u64;
        let mut weighted_bid = 0.0;
        let mut weighted_ask = 0.0;

        for view in self.bids.levels(depth) {
            bid_qty += view.quantity.raw();
            weighted_bid += view.price.ticks() as f64 * view.quantity.raw() as f64;
        }
        for view in self.asks.levels(depth) {
            ask_qty += view.quantity.raw();
            weighted_ask += view.price.ticks() as f64 * view.quantity.raw() as f64;
        }

        let total = bid_qty + ask_qty;
        if total == 0 {
            return self.mid_price().ticks() as f64;
        }

        let bid_weight = ask_qty as f64 / total as f64;
        let ask_weight = bid_qty as f64 / total as f64;
        bid_weight * (weighted_bid / bid_qty as f64) + ask_weight * (weighted_ask / ask_qty as f64)
    }

    /// The book is crossed iff both sides are populated and bid ≥ ask.
    /// Never true after a public operation returns.
    pub fn is_crossed(&self) -> bool {
        let top = self.top_of_book();
        top.bid.ticks() > 0 && top.ask.ticks() > 0 && top.bid >= top.ask
    }

    pub fn get_order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Number of live resting orders (parked stops excluded).
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn tick_size(&self) -> Price {
        self.tick_size
    }

    /// All executions since creation (or the last `clear_trades`), in
    /// emission order.
    pub fn trades(&self) -> &[Execution] {
        &self.trades
    }

    pub fn clear_trades(&mut self) {
        self.trades.clear();
    }

    pub fn metrics(&self) -> &BookMetrics {
        &self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = BookMetrics::default();
    }

    pub fn stats(&self) -> BookStats {
        BookStats {
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            bid_volume: self.bids.total_quantity(),
            ask_volume: self.asks.total_quantity(),
            spread: self.spread(),
            mid_price: self.mid_price(),
            microprice: self.microprice(1),
            imbalance: self.order_imbalance(5),
            bid_levels: self.bids.level_count(),
            ask_levels: self.asks.level_count(),
            total_orders: self.orders.len(),
            total_trades: self.trades.len(),
        }
    }

    /// Wipe all book state: resting orders, parked stops, both sides.
    /// The trade log and metrics survive for post-run analysis.
    pub fn clear(&mut self) {
        self.orders.clear();
        self.stops.clear();
        self.bids.clear();
        self.asks.clear();
        self.invalidate_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook::new("ACME")
    }

    fn limit(book: &mut OrderBook, side: Side, ticks: i64, qty: u64, ts: Timestamp) -> OrderId {
        book.add_order(
            side,
            Price::from_ticks(ticks),
            Quantity::new(qty),
            OrderType::Limit,
            ts,
            "",
        )
    }

    #[test]
    fn test_simple_cross() {
        let mut book = book();
        let bid = limit(&mut book, Side::Bid, 10000, 100, 1);
        let ask = limit(&mut book, Side::Ask, 9990, 100, 2);

        let trades = book.trades();
        assert_eq!(trades.len(), 1);
        // Execution at the resting bid's price; the later ask is the aggressor.
        assert_eq!(trades[0].price, Price::from_ticks(10000));
        assert_eq!(trades[0].quantity, Quantity::new(100));
        assert_eq!(trades[0].aggressor_id, ask);
        assert_eq!(trades[0].passive_id, bid);
        assert_eq!(trades[0].aggressor_side, Side::Ask);
        assert_eq!(trades[0].timestamp, 2);

        assert_eq!(book.order_count(), 0);
        assert_eq!(book.spread(), Price::ZERO);
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_price_time_priority_market_sweep() {
        let mut book = book();
        let id1 = limit(&mut book, Side::Bid, 100, 30, 1);
        let id2 = limit(&mut book, Side::Bid, 100, 20, 2);
        let id3 = limit(&mut book, Side::Bid, 100, 25, 3);
        assert_eq!(book.best_bid_quantity(), Quantity::new(75));

        let executions = book.process_market_order(Side::Ask, Quantity::new(40), 4);
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].passive_id, id1);
        assert_eq!(executions[0].quantity, Quantity::new(30));
        assert_eq!(executions[1].passive_id, id2);
        assert_eq!(executions[1].quantity, Quantity::new(10));

        // id=2 leads the level with 10 remaining, id=3 untouched behind it.
        assert_eq!(book.best_bid_quantity(), Quantity::new(35));
        let resting = book.orders_at(Price::from_ticks(100), Side::Bid);
        assert_eq!(resting[0].id, id2);
        assert_eq!(resting[0].remaining, Quantity::new(10));
        assert_eq!(resting[1].id, id3);
        assert_eq!(resting[1].remaining, Quantity::new(25));
    }

    #[test]
    fn test_modify_shrink_preserves_queue_position() {
        let mut book = book();
        let id1 = limit(&mut book, Side::Bid, 100, 30, 1);
        let id2 = limit(&mut book, Side::Bid, 100, 20, 2);

        assert!(book.modify_order(id1, None, Quantity::new(20)));

        let resting = book.orders_at(Price::from_ticks(100), Side::Bid);
        assert_eq!(resting[0].id, id1);
        assert_eq!(resting[0].remaining, Quantity::new(20));
        assert_eq!(resting[1].id, id2);
        assert_eq!(book.best_bid_quantity(), Quantity::new(40));
    }

    #[test]
    fn test_modify_grow_loses_queue_position() {
        let mut book = book();
        let id1 = limit(&mut book, Side::Bid, 100, 30, 1);
        let id2 = limit(&mut book, Side::Bid, 100, 20, 2);

        assert!(book.modify_order(id1, None, Quantity::new(50)));

        let resting = book.orders_at(Price::from_ticks(100), Side::Bid);
        assert_eq!(resting[0].id, id2);
        assert_eq!(resting[1].id, id1);
        assert_eq!(resting[1].remaining, Quantity::new(50));
        assert_eq!(book.best_bid_quantity(), Quantity::new(70));
    }

    #[test]
    fn test_modify_price_change_requeues() {
        let mut book = book();
        let id1 = limit(&mut book, Side::Bid, 100, 30, 1);
        let id2 = limit(&mut book, Side::Bid, 99, 20, 2);

        assert!(book.modify_order(id1, Some(Price::from_ticks(99)), Quantity::new(30)));

        let resting = book.orders_at(Price::from_ticks(99), Side::Bid);
        assert_eq!(resting.len(), 2);
        assert_eq!(resting[0].id, id2);
        assert_eq!(resting[1].id, id1);
        assert_eq!(book.best_bid(), Price::from_ticks(99));
    }

    #[test]
    fn test_modify_to_zero_cancels() {
        let mut book = book();
        let id = limit(&mut book, Side::Bid, 100, 30, 1);
        assert!(book.modify_order(id, None, Quantity::ZERO));
        assert_eq!(book.order_count(), 0);
        assert!(book.get_order(id).is_none());
        assert_eq!(book.metrics().orders_cancelled, 1);
    }

    #[test]
    fn test_market_sweep_across_levels() {
        let mut book = book();
        limit(&mut book, Side::Ask, 105, 30, 1);
        limit(&mut book, Side::Ask, 106, 40, 2);

        let executions = book.process_market_order(Side::Bid, Quantity::new(50), 3);
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].price, Price::from_ticks(105));
        assert_eq!(executions[0].quantity, Quantity::new(30));
        assert_eq!(executions[1].price, Price::from_ticks(106));
        assert_eq!(executions[1].quantity, Quantity::new(20));

        assert_eq!(book.best_ask(), Price::from_ticks(106));
        assert_eq!(book.best_ask_quantity(), Quantity::new(20));
    }

    #[test]
    fn test_market_order_remainder_discarded() {
        let mut book = book();
        limit(&mut book, Side::Ask, 105, 30, 1);

        let executions = book.process_market_order(Side::Bid, Quantity::new(100), 2);
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].quantity, Quantity::new(30));
        // Nothing rests from the market order.
        assert_eq!(book.order_count(), 0);
        assert!(book.asks.is_empty());
        assert!(book.bids.is_empty());
    }

    #[test]
    fn test_partial_limit_cross_rests_residual() {
        let mut book = book();
        limit(&mut book, Side::Ask, 100, 30, 1);
        let bid = limit(&mut book, Side::Bid, 100, 50, 2);

        assert_eq!(book.trades().len(), 1);
        assert_eq!(book.trades()[0].quantity, Quantity::new(30));
        assert_eq!(book.best_bid(), Price::from_ticks(100));
        assert_eq!(book.best_bid_quantity(), Quantity::new(20));
        assert_eq!(book.get_order(bid).unwrap().remaining, Quantity::new(20));
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut book = book();
        let id = book.add_order(
            Side::Bid,
            Price::from_ticks(100),
            Quantity::ZERO,
            OrderType::Limit,
            1,
            "",
        );
        assert!(id.is_null());
        assert_eq!(book.order_count(), 0);
    }

    #[test]
    fn test_duplicate_replay_id_rejected() {
        let mut book = book();
        let order = Order::new(
            OrderId::new(77),
            Side::Bid,
            OrderType::Limit,
            Price::from_ticks(100),
            Quantity::new(10),
            1,
        );
        assert!(book.insert_order(order.clone()));
        assert!(!book.insert_order(order));
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn test_replay_id_bumps_allocator() {
        let mut book = book();
        let order = Order::new(
            OrderId::new(500),
            Side::Bid,
            OrderType::Limit,
            Price::from_ticks(100),
            Quantity::new(10),
            1,
        );
        assert!(book.insert_order(order));
        let minted = limit(&mut book, Side::Bid, 99, 5, 2);
        assert!(minted.raw() > 500);
    }

    #[test]
    fn test_cancel_unknown_returns_false() {
        let mut book = book();
        assert!(!book.cancel_order(OrderId::new(404)));
        assert!(!book.modify_order(OrderId::new(404), None, Quantity::new(5)));
    }

    #[test]
    fn test_cancel_erases_level() {
        let mut book = book();
        let id = limit(&mut book, Side::Ask, 105, 30, 1);
        assert!(book.cancel_order(id));
        assert_eq!(book.best_ask(), Price::ZERO);
        assert_eq!(book.ask_levels(5).len(), 0);
    }

    #[test]
    fn test_cache_coherence_through_mutations() {
        let mut book = book();
        limit(&mut book, Side::Bid, 100, 10, 1);
        assert_eq!(book.best_bid(), Price::from_ticks(100));

        let better = limit(&mut book, Side::Bid, 101, 10, 2);
        assert_eq!(book.best_bid(), Price::from_ticks(101));

        book.cancel_order(better);
        assert_eq!(book.best_bid(), Price::from_ticks(100));
    }

    #[test]
    fn test_mid_and_spread() {
        let mut book = book();
        limit(&mut book, Side::Bid, 9990, 10, 1);
        limit(&mut book, Side::Ask, 10010, 10, 2);

        assert_eq!(book.mid_price(), Price::from_ticks(10000));
        assert_eq!(book.spread(), Price::from_ticks(20));
    }

    #[test]
    fn test_one_sided_book_sentinels() {
        let mut book = book();
        limit(&mut book, Side::Bid, 9990, 10, 1);

        assert_eq!(book.best_ask(), Price::ZERO);
        assert_eq!(book.mid_price(), Price::ZERO);
        assert_eq!(book.spread(), Price::ZERO);
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_queue_ahead() {
        let mut book = book();
        limit(&mut book, Side::Bid, 100, 30, 1);
        let id2 = limit(&mut book, Side::Bid, 100, 20, 2);
        let id3 = limit(&mut book, Side::Bid, 100, 25, 3);

        assert_eq!(book.queue_ahead(id2), Quantity::new(30));
        assert_eq!(book.queue_ahead(id3), Quantity::new(50));
        assert_eq!(book.queue_ahead(OrderId::new(404)), Quantity::ZERO);
    }

    #[test]
    fn test_order_imbalance_and_microprice() {
        let mut book = book();
        limit(&mut book, Side::Bid, 100, 80, 1);
        limit(&mut book, Side::Ask, 102, 20, 2);

        // (80 - 20) / 100
        assert!((book.order_imbalance(1) - 0.6).abs() < 1e-12);
        // Microprice leans toward the thin ask side.
        let micro = book.microprice(1);
        assert!(micro > book.mid_price().ticks() as f64);
        assert!(micro < 102.0);
    }

    #[test]
    fn test_imbalance_empty_book() {
        let book = book();
        assert_eq!(book.order_imbalance(5), 0.0);
        assert_eq!(book.microprice(1), 0.0);
    }

    #[test]
    fn test_stop_orders_park_and_trigger() {
        let mut book = book();
        let stop = book.add_order(
            Side::Bid,
            Price::from_ticks(105),
            Quantity::new(10),
            OrderType::Stop,
            1,
            "",
        );
        assert!(!stop.is_null());
        // Parked orders are not resting.
        assert_eq!(book.order_count(), 0);
        assert!(book.take_triggered_stops().is_empty());

        limit(&mut book, Side::Ask, 105, 5, 2);
        let triggered = book.take_triggered_stops();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].id, stop);
        assert!(book.take_triggered_stops().is_empty());
    }

    #[test]
    fn test_cancel_parked_stop() {
        let mut book = book();
        let stop = book.add_order(
            Side::Ask,
            Price::from_ticks(95),
            Quantity::new(10),
            OrderType::StopLimit,
            1,
            "",
        );
        assert!(book.cancel_order(stop));
        assert!(book.take_triggered_stops().is_empty());
    }

    #[test]
    fn test_metrics_and_stats() {
        let mut book = book();
        limit(&mut book, Side::Bid, 100, 30, 1);
        limit(&mut book, Side::Ask, 101, 20, 2);
        limit(&mut book, Side::Ask, 100, 10, 3);

        let metrics = book.metrics();
        assert_eq!(metrics.orders_added, 3);
        assert_eq!(metrics.orders_matched, 1);
        assert_eq!(metrics.total_volume, 10);

        let stats = book.stats();
        assert_eq!(stats.total_orders, 2);
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.best_bid, Price::from_ticks(100));
        assert_eq!(stats.best_ask, Price::from_ticks(101));
        assert_eq!(stats.bid_volume, Quantity::new(20));
        assert_eq!(stats.ask_volume, Quantity::new(20));
    }

    #[test]
    fn test_stats_serialization() {
        let mut book = book();
        limit(&mut book, Side::Bid, 100, 30, 1);
        limit(&mut book, Side::Ask, 101, 20, 2);

        let json = serde_json::to_string(&book.stats()).unwrap();
        let back: BookStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back.best_bid, Price::from_ticks(100));
        assert_eq!(back.total_orders, 2);

        let json = serde_json::to_string(book.metrics()).unwrap();
        let back: BookMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.orders_added, 2);
    }

    #[test]
    fn test_clear_wipes_state_keeps_trades() {
        let mut book = book();
        limit(&mut book, Side::Bid, 100, 30, 1);
        limit(&mut book, Side::Ask, 100, 10, 2);
        assert_eq!(book.trades().len(), 1);

        book.clear();
        assert_eq!(book.order_count(), 0);
        assert_eq!(book.best_bid(), Price::ZERO);
        assert_eq!(book.best_ask(), Price::ZERO);
        assert_eq!(book.trades().len(), 1);
    }

    #[test]
    fn test_level_consistency_after_mixed_operations() {
        let mut book = book();
        let a = limit(&mut book, Side::Bid, 100, 30, 1);
        let b = limit(&mut book, Side::Bid, 100, 20, 2);
        limit(&mut book, Side::Bid, 100, 25, 3);

        book.modify_order(a, None, Quantity::new(15));
        book.cancel_order(b);
        book.process_market_order(Side::Ask, Quantity::new(10), 4);

        let resting = book.orders_at(Price::from_ticks(100), Side::Bid);
        let sum: u64 = resting.iter().map(|o| o.remaining.raw()).sum();
        assert_eq!(book.best_bid_quantity().raw(), sum);
        let views = book.bid_levels(1);
        assert_eq!(views[0].orders as usize, resting.len());
    }

    #[test]
    fn test_never_crossed_after_any_operation() {
        let mut book = book();
        limit(&mut book, Side::Bid, 100, 10, 1);
        limit(&mut book, Side::Ask, 105, 10, 2);
        assert!(!book.is_crossed());

        // Aggressive modify drives the bid through the ask.
        let id = limit(&mut book, Side::Bid, 99, 20, 3);
        book.modify_order(id, Some(Price::from_ticks(106)), Quantity::new(20));
        assert!(!book.is_crossed());
        // 10 match at the resting ask's price, 10 rest as the new best bid.
        assert_eq!(book.best_bid(), Price::from_ticks(106));
        assert_eq!(book.best_ask(), Price::ZERO);
    }
}
