//! Stateful signal calculators
//!
//! Calculators expose a uniform interface: `calculate` derives a signal
//! from current book state, while `update`/`on_trade` feed the internal
//! state the simulation loop advances on every market event. Stateless
//! calculators simply ignore the feeding hooks.

use crate::analytics::BookAnalytics;
use crate::stats;
use matching_engine::OrderBook;
use types::numeric::Timestamp;
use types::signal::{Signal, SignalKind};
use types::trade::Execution;

/// Common interface for signal calculators.
pub trait SignalCalculator {
    fn name(&self) -> &str;

    /// Derive a signal from the book's current state.
    fn calculate(&self, book: &OrderBook, now: Timestamp) -> Signal;

    /// Advance internal state after a market event.
    fn update(&mut self, _book: &OrderBook) {}

    /// Advance internal state after an execution.
    fn on_trade(&mut self, _execution: &Execution) {}

    /// Discard accumulated state.
    fn reset(&mut self) {}
}

/// Multi-level volume imbalance, confidence scaled by a threshold.
pub struct ImbalanceCalculator {
    levels: usize,
    threshold: f64,
}

impl ImbalanceCalculator {
    pub fn new(levels: usize, threshold: f64) -> Self {
        Self { levels, threshold }
    }
}

impl Default for ImbalanceCalculator {
    fn default() -> Self {
        Self::new(5, 0.3)
    }
}

impl SignalCalculator for ImbalanceCalculator {
    fn name(&self) -> &str {
        "order_imbalance"
    }

    fn calculate(&self, book: &OrderBook, now: Timestamp) -> Signal {
        let analytics = BookAnalytics::new(book);
        let value = book.order_imbalance(self.levels);
        let confidence = (value.abs() / self.threshold.max(1e-6)).min(1.0);
        Signal::new(SignalKind::OrderImbalance, book.symbol(), value, now)
            .with_confidence(confidence)
            .with_metadata("top_imbalance", analytics.order_imbalance())
            .with_metadata("pressure", analytics.book_pressure(self.levels, 0.5))
    }
}

/// Stoikov microprice with mid/spread context.
pub struct MicropriceCalculator;

impl SignalCalculator for MicropriceCalculator {
    fn name(&self) -> &str {
        "microprice"
    }

    fn calculate(&self, book: &OrderBook, now: Timestamp) -> Signal {
        let analytics = BookAnalytics::new(book);
        Signal::new(
            SignalKind::Microprice,
            book.symbol(),
            analytics.microprice(),
            now,
        )
        .with_metadata("mid", book.mid_price().ticks() as f64)
        .with_metadata("spread", book.spread().ticks() as f64)
        .with_metadata("weighted_mid", analytics.weighted_mid_price())
    }
}

/// Z-score of the current spread against its rolling window.
pub struct SpreadCalculator {
    window: usize,
    history: Vec<f64>,
}

impl SpreadCalculator {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            history: Vec::new(),
        }
    }

    pub fn average_spread(&self) -> f64 {
        stats::mean(&self.history)
    }

    pub fn spread_z_score(&self) -> f64 {
        match self.history.last() {
            Some(&current) => stats::z_score(
                current,
                stats::mean(&self.history),
                stats::stddev(&self.history),
            ),
            None => 0.0,
        }
    }

    pub fn is_spread_wide(&self) -> bool {
        self.spread_z_score() > 1.0
    }
}

impl SignalCalculator for SpreadCalculator {
    fn name(&self) -> &str {
        "spread"
    }

    fn calculate(&self, book: &OrderBook, now: Timestamp) -> Signal {
        let z = self.spread_z_score();
        Signal::new(SignalKind::Spread, book.symbol(), z, now)
            .with_confidence((z.abs() / 3.0).min(1.0))
            .with_metadata("spread", book.spread().ticks() as f64)
            .with_metadata("avg_spread", self.average_spread())
    }

    fn update(&mut self, book: &OrderBook) {
        self.history.push(book.spread().ticks() as f64);
        if self.history.len() > self.window {
            self.history.remove(0);
        }
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

/// Decayed aggressive buy/sell volume with a rolling VWAP.
pub struct TradeFlowCalculator {
    lookback: usize,
    decay: f64,
    buy_volume: f64,
    sell_volume: f64,
    recent: Vec<(f64, f64)>,
}

impl TradeFlowCalculator {
    pub fn new(lookback: usize, decay: f64) -> Self {
        Self {
            lookback: lookback.max(1),
            decay,
            buy_volume: 0.0,
            sell_volume: 0.0,
            recent: Vec::new(),
        }
    }

    pub fn buy_volume(&self) -> f64 {
        self.buy_volume
    }

    pub fn sell_volume(&self) -> f64 {
        self.sell_volume
    }

    pub fn vwap(&self) -> f64 {
        let volume: f64 = self.recent.iter().map(|(_, qty)| qty).sum();
        if volume <= 0.0 {
            return 0.0;
        }
        let notional: f64 = self.recent.iter().map(|(px, qty)| px * qty).sum();
        notional / volume
    }
}

impl Default for TradeFlowCalculator {
    fn default() -> Self {
        Self::new(50, 0.95)
    }
}

impl SignalCalculator for TradeFlowCalculator {
    fn name(&self) -> &str {
        "trade_flow"
    }

    fn calculate(&self, book: &OrderBook, now: Timestamp) -> Signal {
        let total = (self.buy_volume + self.sell_volume).max(1.0);
        let value = (self.buy_volume - self.sell_volume) / total;
        Signal::new(SignalKind::TradeFlow, book.symbol(), value, now)
            .with_metadata("vwap", self.vwap())
            .with_metadata("buy_vol", self.buy_volume)
            .with_metadata("sell_vol", self.sell_volume)
    }

    fn on_trade(&mut self, execution: &Execution) {
        self.buy_volume *= self.decay;
        self.sell_volume *= self.decay;
        let quantity = execution.quantity.as_f64();
        match execution.aggressor_side {
            types::order::Side::Bid => self.buy_volume += quantity,
            types::order::Side::Ask => self.sell_volume += quantity,
        }

        self.recent
            .push((execution.price.ticks() as f64, quantity));
        if self.recent.len() > self.lookback {
            self.recent.remove(0);
        }
    }

    fn reset(&mut self) {
        self.buy_volume = 0.0;
        self.sell_volume = 0.0;
        self.recent.clear();
    }
}

/// Smoothed depth-weighted pressure accumulator.
pub struct BookPressureCalculator {
    levels: usize,
    decay: f64,
    alpha: f64,
    smoothed: Option<f64>,
}

impl BookPressureCalculator {
    pub fn new(levels: usize, decay: f64, alpha: f64) -> Self {
        Self {
            levels,
            decay,
            alpha,
            smoothed: None,
        }
    }
}

impl Default for BookPressureCalculator {
    fn default() -> Self {
        Self::new(5, 0.5, 0.2)
    }
}

impl SignalCalculator for BookPressureCalculator {
    fn name(&self) -> &str {
        "book_pressure"
    }

    fn calculate(&self, book: &OrderBook, now: Timestamp) -> Signal {
        let instant = BookAnalytics::new(book).book_pressure(self.levels, self.decay);
        let value = self.smoothed.unwrap_or(instant);
        Signal::new(SignalKind::BookPressure, book.symbol(), value, now)
            .with_metadata("instant", instant)
    }

    fn update(&mut self, book: &OrderBook) {
        let instant = BookAnalytics::new(book).book_pressure(self.levels, self.decay);
        self.smoothed = Some(match self.smoothed {
            Some(prev) => stats::ema(instant, prev, self.alpha),
            None => instant,
        });
    }

    fn reset(&mut self) {
        self.smoothed = None;
    }
}

/// Heterogeneous calculator set polled by the simulation loop.
#[derive(Default)]
pub struct SignalGenerator {
    calculators: Vec<Box<dyn SignalCalculator>>,
}

impl SignalGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default set the backtester registers.
    pub fn standard() -> Self {
        let mut generator = Self::new();
        generator.add_calculator(Box::new(ImbalanceCalculator::default()));
        generator.add_calculator(Box::new(MicropriceCalculator));
        generator.add_calculator(Box::new(SpreadCalculator::new(50)));
        generator.add_calculator(Box::new(TradeFlowCalculator::default()));
        generator
    }

    pub fn add_calculator(&mut self, calculator: Box<dyn SignalCalculator>) {
        self.calculators.push(calculator);
    }

    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }

    /// Feed book state into every stateful calculator.
    pub fn update(&mut self, book: &OrderBook) {
        for calculator in &mut self.calculators {
            calculator.update(book);
        }
    }

    /// Feed an execution into every stateful calculator.
    pub fn on_trade(&mut self, execution: &Execution) {
        for calculator in &mut self.calculators {
            calculator.on_trade(execution);
        }
    }

    /// Evaluate every calculator against the book.
    pub fn generate(&self, book: &OrderBook, now: Timestamp) -> Vec<Signal> {
        self.calculators
            .iter()
            .map(|calculator| calculator.calculate(book, now))
            .collect()
    }

    /// Evaluate a single calculator by name.
    pub fn by_name(&self, name: &str, book: &OrderBook, now: Timestamp) -> Option<Signal> {
        self.calculators
            .iter()
            .find(|calculator| calculator.name() == name)
            .map(|calculator| calculator.calculate(book, now))
    }

    /// Weighted combination of signals into one custom signal.
    pub fn combine(signals: &[Signal], weights: &[f64], now: Timestamp) -> Signal {
        let mut value = 0.0;
        let mut confidence = 0.0;
        let mut weight_sum = 0.0;
        for (signal, weight) in signals.iter().zip(weights) {
            value += weight * signal.value;
            confidence += weight * signal.confidence;
            weight_sum += weight;
        }

        let symbol = signals
            .first()
            .map(|signal| signal.symbol.clone())
            .unwrap_or_default();
        if weight_sum > 0.0 {
            Signal::new(SignalKind::Custom, symbol, value / weight_sum, now)
                .with_confidence(confidence / weight_sum)
        } else {
            Signal::new(SignalKind::Custom, symbol, 0.0, now).with_confidence(0.0)
        }
    }

    pub fn reset(&mut self) {
        for calculator in &mut self.calculators {
            calculator.reset();
        }
    }
}
