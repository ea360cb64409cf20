//! Event-driven backtester
//!
//! Replays time-sorted market events through per-symbol order books, drives
//! strategy callbacks, and tracks portfolio performance.
//!
//! # Modules
//! - `portfolio` — Positions, cash, PnL, commission and drawdown tracking
//! - `data` — `DataSource` trait, CSV feed, synthetic generator
//! - `strategy` — Strategy trait, parameters, reference strategies
//! - `engine` — The timestamp-ordered simulation loop
//! - `metrics` — Result statistics over the equity series

pub mod portfolio;
pub mod data;
pub mod strategy;
pub mod engine;
pub mod metrics;

pub use data::{CsvDataSource, DataError, DataSource, SyntheticConfig, SyntheticDataSource};
pub use engine::{EngineError, EngineStats, SimulationEngine};
pub use metrics::{BacktestResult, DrawdownPoint, TradeRecord};
pub use portfolio::{Portfolio, Position, Snapshot};
pub use strategy::{MarketMakerStrategy, MomentumStrategy, Params, Strategy};
