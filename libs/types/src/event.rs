//! Simulation event union
//!
//! Every record flowing through the simulation loop is an `Event`: a
//! timestamp, a symbol, and one tagged payload. Events compare by timestamp
//! only; the engine layers an insertion sequence on top for a stable total
//! order.

use crate::market_data::MarketDataUpdate;
use crate::numeric::Timestamp;
use crate::order::Order;
use crate::signal::Signal;
use crate::trade::Execution;
use serde::{Deserialize, Serialize};

/// Payload of a simulation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    MarketData(MarketDataUpdate),
    Signal(Signal),
    Order(Order),
    Fill(Execution),
    EndOfDay,
}

/// A timestamped simulation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    pub symbol: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn market_data(timestamp: Timestamp, symbol: impl Into<String>, update: MarketDataUpdate) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            payload: EventPayload::MarketData(update),
        }
    }

    pub fn signal(timestamp: Timestamp, symbol: impl Into<String>, signal: Signal) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            payload: EventPayload::Signal(signal),
        }
    }

    pub fn order(timestamp: Timestamp, symbol: impl Into<String>, order: Order) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            payload: EventPayload::Order(order),
        }
    }

    pub fn fill(timestamp: Timestamp, symbol: impl Into<String>, execution: Execution) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            payload: EventPayload::Fill(execution),
        }
    }

    pub fn end_of_day(timestamp: Timestamp, symbol: impl Into<String>) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            payload: EventPayload::EndOfDay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_tag_payloads() {
        let e = Event::end_of_day(99, "ACME");
        assert_eq!(e.timestamp, 99);
        assert!(matches!(e.payload, EventPayload::EndOfDay));

        let e = Event::market_data(5, "ACME", MarketDataUpdate::Clear);
        assert!(matches!(
            e.payload,
            EventPayload::MarketData(MarketDataUpdate::Clear)
        ));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let e = Event::market_data(5, "ACME", MarketDataUpdate::Snapshot);
        let json = serde_json::to_string(&e).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);
    }
}
