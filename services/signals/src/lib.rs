//! Microstructure signals
//!
//! Read-only analytics over an order book, split into two capability sets:
//! stateless reads (`analytics`) and stateful calculators driven by the
//! simulation loop (`calculators`). All values are finite `f64`; degenerate
//! inputs yield `0.0` (or the documented neutral value), never NaN.

pub mod analytics;
pub mod calculators;
pub mod stats;

pub use analytics::{BookAnalytics, MarketQuality};
pub use calculators::{
    BookPressureCalculator, ImbalanceCalculator, MicropriceCalculator, SignalCalculator,
    SignalGenerator, SpreadCalculator, TradeFlowCalculator,
};
