//! Event-driven simulation loop
//!
//! The engine owns a min-heap of events keyed by `(timestamp, insertion
//! sequence)`, per-symbol books, the portfolio, and the strategies. Every
//! handler runs to completion before the next event is popped; fills
//! produced while applying an event dispatch inline, and orders a strategy
//! emits during a callback are queued at the engine's current time.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use matching_engine::OrderBook;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use signals::SignalGenerator;
use thiserror::Error;
use tracing::{debug, info};
use types::event::{Event, EventPayload};
use types::market_data::MarketDataUpdate;
use types::numeric::{Price, Timestamp};
use types::order::{Order, OrderType, Side};
use types::signal::Signal;
use types::trade::Execution;

use crate::data::DataSource;
use crate::metrics::{
    compute_metrics, BacktestResult, TradeRecord, DEFAULT_TRADING_DAY_SECONDS,
};
use crate::portfolio::{Portfolio, Snapshot};
use crate::strategy::Strategy;

/// Engine-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no data source configured")]
    NoDataSource,
}

/// Processing counters for one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub events_processed: u64,
    pub orders_sent: u64,
    pub orders_filled: u64,
}

/// Heap entry: min by `(timestamp, insertion sequence)`.
struct QueuedEvent {
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event.timestamp == other.event.timestamp && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed comparison turns the max-heap into a min-heap.
        (other.event.timestamp, other.seq).cmp(&(self.event.timestamp, self.seq))
    }
}

/// Timestamp-ordered backtest engine.
pub struct SimulationEngine {
    queue: BinaryHeap<QueuedEvent>,
    seq: u64,
    books: HashMap<String, OrderBook>,
    portfolio: Portfolio,
    strategies: Vec<Box<dyn Strategy>>,
    signal_generator: SignalGenerator,
    data_source: Option<Box<dyn DataSource>>,
    /// Mark-to-mid per symbol, in ticks.
    current_prices: BTreeMap<String, Price>,
    current_time: Timestamp,
    running: bool,
    /// When set, calculator signals are queued after every market update.
    emit_signals: bool,
    history: Vec<Snapshot>,
    trade_records: Vec<TradeRecord>,
    stats: EngineStats,
}

impl SimulationEngine {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            queue: BinaryHeap::new(),
            seq: 0,
            books: HashMap::new(),
            portfolio: Portfolio::new(initial_capital),
            strategies: Vec::new(),
            signal_generator: SignalGenerator::standard(),
            data_source: None,
            current_prices: BTreeMap::new(),
            current_time: 0,
            running: false,
            emit_signals: false,
            history: Vec::new(),
            trade_records: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    // -- configuration ------------------------------------------------------

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    pub fn set_data_source(&mut self, source: Box<dyn DataSource>) {
        self.data_source = Some(source);
    }

    pub fn set_signal_generator(&mut self, generator: SignalGenerator) {
        self.signal_generator = generator;
    }

    /// Queue calculator signals after every market update.
    pub fn enable_signal_events(&mut self, enabled: bool) {
        self.emit_signals = enabled;
    }

    pub fn set_commission_rate(&mut self, rate: Decimal) {
        self.portfolio.set_commission_rate(rate);
    }

    pub fn set_slippage_model(&mut self, model: crate::portfolio::SlippageModel) {
        self.portfolio.set_slippage_model(model);
    }

    // -- accessors ----------------------------------------------------------

    pub fn book(&self, symbol: &str) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    pub fn trade_records(&self) -> &[TradeRecord] {
        &self.trade_records
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn current_price(&self, symbol: &str) -> Option<Price> {
        self.current_prices.get(symbol).copied()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Request a cooperative stop: the run loop drains to a clean state
    /// after the event in flight.
    pub fn stop(&mut self) {
        self.running = false;
    }

    // -- event loop ---------------------------------------------------------

    /// Replay the configured data source to exhaustion and compute results.
    pub fn run(&mut self) -> Result<BacktestResult, EngineError> {
        let mut source = self.data_source.take().ok_or(EngineError::NoDataSource)?;

        for strategy in &mut self.strategies {
            strategy.initialize();
            strategy.on_start();
        }
        self.running = true;
        info!(strategies = self.strategies.len(), "backtest starting");

        while self.running {
            if let Some(queued) = self.queue.pop() {
                self.dispatch(queued.event);
            } else if let Some(event) = source.next_event() {
                self.enqueue(event);
            } else {
                break;
            }
        }
        self.running = false;

        for strategy in &mut self.strategies {
            strategy.on_end(&self.portfolio);
        }
        self.data_source = Some(source);

        let equity: Vec<(Timestamp, f64)> = self
            .history
            .iter()
            .map(|snapshot| {
                (
                    snapshot.timestamp,
                    snapshot.equity.to_f64().unwrap_or(0.0),
                )
            })
            .collect();
        let result = compute_metrics(
            &equity,
            &self.trade_records,
            0.0,
            DEFAULT_TRADING_DAY_SECONDS,
        );
        info!(
            events = self.stats.events_processed,
            orders = self.stats.orders_sent,
            fills = self.stats.orders_filled,
            "backtest complete"
        );
        Ok(result)
    }

    /// Drive the engine externally: process one event and everything it
    /// queues.
    pub fn step(&mut self, event: Event) {
        self.dispatch(event);
        while let Some(queued) = self.queue.pop() {
            self.dispatch(queued.event);
        }
    }

    fn enqueue(&mut self, event: Event) {
        self.seq += 1;
        self.queue.push(QueuedEvent {
            seq: self.seq,
            event,
        });
    }

    fn dispatch(&mut self, event: Event) {
        self.stats.events_processed += 1;
        self.current_time = self.current_time.max(event.timestamp);
        let timestamp = event.timestamp;
        let Event {
            symbol, payload, ..
        } = event;

        match payload {
            EventPayload::MarketData(update) => self.handle_market_data(&symbol, &update),
            EventPayload::Signal(signal) => self.handle_signal(&symbol, &signal),
            EventPayload::Order(order) => self.handle_order(&symbol, &order),
            EventPayload::Fill(execution) => self.handle_fill(&symbol, &execution, None),
            EventPayload::EndOfDay => self.handle_end_of_day(timestamp),
        }
    }

    // -- handlers -----------------------------------------------------------

    fn handle_market_data(&mut self, symbol: &str, update: &MarketDataUpdate) {
        let timestamp = self.current_time;
        let book = self
            .books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBook::new(symbol));
        let mark = book.trades().len();

        match update {
            MarketDataUpdate::AddOrder {
                order_id,
                side,
                price,
                quantity,
            } => {
                let order = Order::new(*order_id, *side, OrderType::Limit, *price, *quantity, timestamp);
                if !book.insert_order(order) {
                    debug!(%order_id, symbol, "feed add rejected");
                }
            }
            MarketDataUpdate::ModifyOrder {
                order_id,
                new_quantity,
                new_price,
            } => {
                if !book.modify_order(*order_id, *new_price, *new_quantity) {
                    debug!(%order_id, symbol, "feed modify for unknown order");
                }
            }
            MarketDataUpdate::CancelOrder { order_id } => {
                if !book.cancel_order(*order_id) {
                    debug!(%order_id, symbol, "feed cancel for unknown order");
                }
            }
            MarketDataUpdate::Clear => book.clear(),
            // The add/cancel stream is authoritative; prints and snapshots
            // do not mutate the reconstructed book.
            MarketDataUpdate::Trade { .. }
            | MarketDataUpdate::Snapshot
            | MarketDataUpdate::Unknown => {}
        }

        let fills: Vec<Execution> = book.trades()[mark..].to_vec();
        let mid = book.mid_price();
        self.current_prices.insert(symbol.to_string(), mid);

        for execution in &fills {
            self.signal_generator.on_trade(execution);
        }
        if let Some(book) = self.books.get(symbol) {
            self.signal_generator.update(book);
        }

        for execution in &fills {
            self.handle_fill(symbol, execution, None);
        }

        if let Some(book) = self.books.get(symbol) {
            for strategy in &mut self.strategies {
                strategy.on_market_data(update, book, &self.portfolio);
            }
        }
        self.collect_strategy_orders(symbol);
        self.activate_stops(symbol);

        if self.emit_signals {
            if let Some(book) = self.books.get(symbol) {
                let signals = self.signal_generator.generate(book, self.current_time);
                for signal in signals {
                    let event = Event::signal(self.current_time, symbol, signal);
                    self.enqueue(event);
                }
            }
        }
    }

    fn handle_signal(&mut self, symbol: &str, signal: &Signal) {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBook::new(symbol));
        if let Some(book) = self.books.get(symbol) {
            for strategy in &mut self.strategies {
                strategy.on_signal(signal, book, &self.portfolio);
            }
        }
        self.collect_strategy_orders(symbol);
    }

    fn handle_order(&mut self, symbol: &str, order: &Order) {
        let timestamp = self.current_time;
        let book = self
            .books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBook::new(symbol));
        let mark = book.trades().len();

        if order.id.is_null() {
            match order.order_type {
                OrderType::Market => {
                    book.process_market_order(order.side, order.remaining, timestamp);
                }
                _ => {
                    book.add_order(
                        order.side,
                        order.price,
                        order.remaining,
                        order.order_type,
                        timestamp,
                        &order.client_id,
                    );
                }
            }
        } else {
            let mut stamped = order.clone();
            stamped.timestamp = timestamp;
            book.insert_order(stamped);
        }
        self.stats.orders_sent += 1;

        let fills: Vec<Execution> = book.trades()[mark..].to_vec();
        let mid = book.mid_price();
        self.current_prices.insert(symbol.to_string(), mid);

        for execution in &fills {
            self.signal_generator.on_trade(execution);
        }
        for execution in &fills {
            self.handle_fill(symbol, execution, Some(order));
        }
        self.activate_stops(symbol);
    }

    fn handle_fill(&mut self, symbol: &str, execution: &Execution, source: Option<&Order>) {
        let delta = match execution.aggressor_side {
            Side::Bid => execution.quantity.raw() as i64,
            Side::Ask => -(execution.quantity.raw() as i64),
        };
        let costs =
            self.portfolio
                .apply_fill(symbol, delta, execution.price.to_decimal(), source);

        self.trade_records.push(TradeRecord {
            timestamp: execution.timestamp,
            symbol: symbol.to_string(),
            quantity: delta,
            price: execution.price.to_f64(),
            commission: costs.commission.to_f64().unwrap_or(0.0),
            slippage: costs.slippage.to_f64().unwrap_or(0.0),
        });
        self.stats.orders_filled += 1;

        for strategy in &mut self.strategies {
            strategy.on_fill(execution, &self.portfolio);
        }
    }

    fn handle_end_of_day(&mut self, timestamp: Timestamp) {
        let marks: BTreeMap<String, Decimal> = self
            .current_prices
            .iter()
            .map(|(symbol, price)| (symbol.clone(), price.to_decimal()))
            .collect();
        let snapshot = self.portfolio.take_snapshot(timestamp, &marks);
        self.history.push(snapshot);
    }

    /// Poll strategies for orders and queue them at the current time.
    fn collect_strategy_orders(&mut self, symbol: &str) {
        let Some(book) = self.books.get(symbol) else {
            return;
        };
        let mut generated = Vec::new();
        for strategy in &mut self.strategies {
            generated.extend(strategy.generate_orders(book, &self.portfolio));
        }
        for order in generated {
            let event = Event::order(self.current_time, symbol, order);
            self.enqueue(event);
        }
    }

    /// Re-submit parked stop orders whose trigger price was touched.
    fn activate_stops(&mut self, symbol: &str) {
        let triggered = self
            .books
            .get_mut(symbol)
            .map(|book| book.take_triggered_stops())
            .unwrap_or_default();

        for mut stop in triggered {
            stop.order_type = match stop.order_type {
                OrderType::Stop => OrderType::Market,
                _ => OrderType::Limit,
            };
            debug!(order_id = %stop.id, symbol, "stop order activated");
            let event = Event::order(self.current_time, symbol, stop);
            self.enqueue(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::OrderId;
    use types::numeric::Quantity;

    fn add_event(ts: Timestamp, id: u64, side: Side, ticks: i64, qty: u64) -> Event {
        Event::market_data(
            ts,
            "ACME",
            MarketDataUpdate::AddOrder {
                order_id: OrderId::new(id),
                side,
                price: Price::from_ticks(ticks),
                quantity: Quantity::new(qty),
            },
        )
    }

    #[test]
    fn test_run_without_source_fails() {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        assert!(matches!(engine.run(), Err(EngineError::NoDataSource)));
    }

    #[test]
    fn test_step_builds_book() {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        engine.step(add_event(1_000, 1, Side::Bid, 10000, 50));
        engine.step(add_event(2_000, 2, Side::Ask, 10010, 40));

        let book = engine.book("ACME").unwrap();
        assert_eq!(book.best_bid(), Price::from_ticks(10000));
        assert_eq!(book.best_ask(), Price::from_ticks(10010));
        assert_eq!(engine.current_price("ACME"), Some(Price::from_ticks(10005)));
        assert_eq!(engine.current_time(), 2_000);
    }

    #[test]
    fn test_crossing_feed_fill_updates_portfolio() {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        engine.set_commission_rate(Decimal::ZERO);
        engine.step(add_event(1_000, 1, Side::Bid, 100, 50));
        engine.step(add_event(2_000, 2, Side::Ask, 99, 40));

        // The later ask is the aggressor: the portfolio goes short 40 at the
        // resting bid's price.
        assert_eq!(engine.portfolio().net_position("ACME"), -40);
        let position = engine.portfolio().position("ACME").unwrap();
        assert_eq!(position.average_price, Decimal::new(100, 2));
        assert_eq!(engine.stats().orders_filled, 1);
        assert_eq!(engine.trade_records().len(), 1);
        assert_eq!(engine.trade_records()[0].quantity, -40);
    }

    #[test]
    fn test_clear_wipes_symbol_book() {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        engine.step(add_event(1_000, 1, Side::Bid, 10000, 50));
        engine.step(Event::market_data(2_000, "ACME", MarketDataUpdate::Clear));

        let book = engine.book("ACME").unwrap();
        assert_eq!(book.order_count(), 0);
        assert_eq!(book.best_bid(), Price::ZERO);
    }

    #[test]
    fn test_trade_and_snapshot_updates_do_not_mutate_book() {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        engine.step(add_event(1_000, 1, Side::Bid, 10000, 50));
        engine.step(Event::market_data(
            2_000,
            "ACME",
            MarketDataUpdate::Trade {
                side: Side::Bid,
                price: Price::from_ticks(10000),
                quantity: Quantity::new(10),
            },
        ));
        engine.step(Event::market_data(3_000, "ACME", MarketDataUpdate::Snapshot));

        let book = engine.book("ACME").unwrap();
        assert_eq!(book.order_count(), 1);
        assert_eq!(book.best_bid_quantity(), Quantity::new(50));
    }

    #[test]
    fn test_fill_event_updates_portfolio() {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        engine.set_commission_rate(Decimal::ZERO);
        let execution = Execution::new(
            OrderId::NULL,
            OrderId::NULL,
            "ACME",
            Side::Bid,
            Price::from_ticks(10000),
            Quantity::new(10),
            1_000,
        );
        engine.step(Event::fill(1_000, "ACME", execution));

        assert_eq!(engine.portfolio().net_position("ACME"), 10);
        assert_eq!(engine.portfolio().cash(), Decimal::from(999_000));
    }

    #[test]
    fn test_end_of_day_snapshots() {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        engine.step(add_event(1_000, 1, Side::Bid, 10000, 50));
        engine.step(Event::end_of_day(5_000, "ACME"));

        assert_eq!(engine.history().len(), 1);
        let snapshot = &engine.history()[0];
        assert_eq!(snapshot.timestamp, 5_000);
        assert_eq!(snapshot.equity, Decimal::from(1_000_000));
    }

    #[test]
    fn test_signal_events_dispatch_when_enabled() {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        engine.enable_signal_events(true);
        engine.step(add_event(1_000, 1, Side::Bid, 10000, 50));

        // One market event plus one queued signal per standard calculator.
        assert_eq!(engine.stats().events_processed, 5);

        engine.enable_signal_events(false);
        engine.step(add_event(2_000, 2, Side::Ask, 10010, 40));
        assert_eq!(engine.stats().events_processed, 6);
    }

    #[test]
    fn test_stop_order_activates_on_touch() {
        let mut engine = SimulationEngine::new(Decimal::from(1_000_000));
        engine.set_commission_rate(Decimal::ZERO);

        // Resting ask liquidity below the stop trigger.
        engine.step(add_event(1_000, 1, Side::Ask, 10400, 30));
        // Stop buy triggered at 10500: parked while the ask sits lower.
        let stop = Order::new(
            OrderId::NULL,
            Side::Bid,
            OrderType::Stop,
            Price::from_ticks(10500),
            Quantity::new(10),
            0,
        );
        engine.step(Event::order(2_000, "ACME", stop));
        assert_eq!(engine.portfolio().net_position("ACME"), 0);

        // Ask side repriced up through the trigger: the stop converts to a
        // market buy and sweeps the new best ask.
        engine.step(Event::market_data(
            3_000,
            "ACME",
            MarketDataUpdate::CancelOrder {
                order_id: OrderId::new(1),
            },
        ));
        assert_eq!(engine.portfolio().net_position("ACME"), 0);
        engine.step(add_event(4_000, 2, Side::Ask, 10500, 20));

        assert_eq!(engine.portfolio().net_position("ACME"), 10);
        let position = engine.portfolio().position("ACME").unwrap();
        assert_eq!(position.average_price, Decimal::new(10500, 2));
    }
}
