//! Market data sources
//!
//! A `DataSource` yields events in non-decreasing timestamp order. The CSV
//! source parses the reference feed format; the synthetic source generates
//! a deterministic random-walk stream for tests and demos.

use csv::StringRecord;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use types::ids::OrderId;
use types::market_data::MarketDataUpdate;
use types::numeric::{Price, Quantity, Timestamp};
use types::order::Side;
use types::trade::Execution;
use types::event::Event;

/// Errors opening or decoding a feed.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A time-sorted event feed.
pub trait DataSource {
    fn has_next(&self) -> bool;
    fn next_event(&mut self) -> Option<Event>;
    /// Rewind to the start of the stream.
    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// CSV source
// ---------------------------------------------------------------------------

/// CSV feed with columns `timestamp_ns, symbol, type, side, price, quantity,
/// order_id`.
///
/// Row mapping: `ADD`/`MODIFY`/`CANCEL` become book updates, `TRADE` becomes
/// a fill (its `side` column is the aggressor side), `EOD` closes the day,
/// and anything unrecognized — including unparsable rows — becomes a
/// market-data no-op.
pub struct CsvDataSource {
    events: Vec<Event>,
    cursor: usize,
}

impl CsvDataSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut events = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            // Skip a header row if present.
            if index == 0 && record.get(0).is_some_and(|c| c.contains("timestamp")) {
                continue;
            }
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            events.push(parse_record(&record));
        }

        Ok(Self { events, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl DataSource for CsvDataSource {
    fn has_next(&self) -> bool {
        self.cursor < self.events.len()
    }

    fn next_event(&mut self) -> Option<Event> {
        let event = self.events.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(event)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

fn parse_record(record: &StringRecord) -> Event {
    let symbol = field(record, 1).unwrap_or_default().to_string();
    let Some(timestamp) = field(record, 0).and_then(|c| c.parse::<Timestamp>().ok()) else {
        return Event::market_data(0, symbol, MarketDataUpdate::Unknown);
    };
    let row_type = field(record, 2).unwrap_or_default();

    let parsed = match row_type {
        "ADD" => parse_add(record),
        "MODIFY" => parse_modify(record),
        "CANCEL" => parse_cancel(record),
        "TRADE" => {
            return match parse_trade(record, timestamp, &symbol) {
                Some(execution) => Event::fill(timestamp, symbol, execution),
                None => Event::market_data(timestamp, symbol, MarketDataUpdate::Unknown),
            };
        }
        "EOD" => return Event::end_of_day(timestamp, symbol),
        _ => None,
    };

    Event::market_data(timestamp, symbol, parsed.unwrap_or(MarketDataUpdate::Unknown))
}

fn field<'a>(record: &'a StringRecord, index: usize) -> Option<&'a str> {
    record.get(index).map(str::trim).filter(|f| !f.is_empty())
}

fn parse_side(record: &StringRecord) -> Option<Side> {
    match field(record, 3)? {
        "BID" => Some(Side::Bid),
        "ASK" => Some(Side::Ask),
        _ => None,
    }
}

fn parse_price(record: &StringRecord) -> Option<Price> {
    field(record, 4)?.parse::<i64>().ok().map(Price::from_ticks)
}

fn parse_quantity(record: &StringRecord) -> Option<Quantity> {
    field(record, 5)?.parse::<u64>().ok().map(Quantity::new)
}

fn parse_order_id(record: &StringRecord) -> Option<OrderId> {
    field(record, 6)?.parse::<u64>().ok().map(OrderId::new)
}

fn parse_add(record: &StringRecord) -> Option<MarketDataUpdate> {
    Some(MarketDataUpdate::AddOrder {
        order_id: parse_order_id(record)?,
        side: parse_side(record)?,
        price: parse_price(record)?,
        quantity: parse_quantity(record)?,
    })
}

fn parse_modify(record: &StringRecord) -> Option<MarketDataUpdate> {
    Some(MarketDataUpdate::ModifyOrder {
        order_id: parse_order_id(record)?,
        new_quantity: parse_quantity(record)?,
        new_price: parse_price(record).filter(|price| !price.is_zero()),
    })
}

fn parse_cancel(record: &StringRecord) -> Option<MarketDataUpdate> {
    Some(MarketDataUpdate::CancelOrder {
        order_id: parse_order_id(record)?,
    })
}

fn parse_trade(record: &StringRecord, timestamp: Timestamp, symbol: &str) -> Option<Execution> {
    Some(Execution::new(
        OrderId::NULL,
        OrderId::NULL,
        symbol,
        parse_side(record)?,
        parse_price(record)?,
        parse_quantity(record)?,
        timestamp,
    ))
}

// ---------------------------------------------------------------------------
// Event-log export
// ---------------------------------------------------------------------------

/// Serialize an event log to JSON for offline inspection or re-replay.
pub fn export_event_log(events: &[Event]) -> String {
    serde_json::to_string_pretty(events).unwrap_or_default()
}

/// Load an event log previously written by [`export_event_log`].
pub fn import_event_log(json: &str) -> Result<Vec<Event>, serde_json::Error> {
    serde_json::from_str(json)
}

// ---------------------------------------------------------------------------
// Synthetic source
// ---------------------------------------------------------------------------

/// Configuration for the synthetic random-walk feed.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub symbol: String,
    pub seed: u64,
    /// Number of market-data events to generate (an EOD row is appended).
    pub events: usize,
    /// Starting midpoint in ticks.
    pub start_price: i64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            symbol: "SYN".to_string(),
            seed: 42,
            events: 1_000,
            start_price: 10_000,
        }
    }
}

/// Deterministic add/cancel/trade stream around a drifting midpoint.
///
/// Same seed, same stream: the generator is the replay fixture used by the
/// engine tests.
pub struct SyntheticDataSource {
    config: SyntheticConfig,
    buffer: VecDeque<Event>,
}

impl SyntheticDataSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let buffer = Self::generate(&config);
        Self { config, buffer }
    }

    fn generate(config: &SyntheticConfig) -> VecDeque<Event> {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut events = VecDeque::with_capacity(config.events + 1);
        let mut timestamp: Timestamp = 1_000_000;
        let mut mid = config.start_price;
        let mut next_id: u64 = 1;
        let mut live: Vec<u64> = Vec::new();

        for _ in 0..config.events {
            timestamp += rng.gen_range(100..1_000);
            mid += rng.gen_range(-1..=1);

            let roll: f64 = rng.gen();
            let update = if roll < 0.7 || live.is_empty() {
                let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
                let offset = rng.gen_range(1..=5);
                let price = match side {
                    Side::Bid => mid - offset,
                    Side::Ask => mid + offset,
                };
                let id = next_id;
                next_id += 1;
                live.push(id);
                MarketDataUpdate::AddOrder {
                    order_id: OrderId::new(id),
                    side,
                    price: Price::from_ticks(price),
                    quantity: Quantity::new(rng.gen_range(1..=100)),
                }
            } else if roll < 0.9 {
                let index = rng.gen_range(0..live.len());
                let id = live.swap_remove(index);
                MarketDataUpdate::CancelOrder {
                    order_id: OrderId::new(id),
                }
            } else {
                let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
                MarketDataUpdate::Trade {
                    side,
                    price: Price::from_ticks(mid),
                    quantity: Quantity::new(rng.gen_range(1..=50)),
                }
            };

            events.push_back(Event::market_data(timestamp, config.symbol.clone(), update));
        }

        events.push_back(Event::end_of_day(timestamp + 1, config.symbol.clone()));
        events
    }
}

impl DataSource for SyntheticDataSource {
    fn has_next(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn next_event(&mut self) -> Option<Event> {
        self.buffer.pop_front()
    }

    fn reset(&mut self) {
        self.buffer = Self::generate(&self.config);
    }
}
