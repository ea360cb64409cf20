//! Microstructure signal records
//!
//! A signal is a metric derived from book or trade state: a kind, a value,
//! a confidence score, and free-form numeric metadata.

use crate::numeric::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signal category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    OrderImbalance,
    Microprice,
    Spread,
    TradeFlow,
    BookPressure,
    QueuePosition,
    Custom,
}

/// A computed signal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub symbol: String,
    pub value: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub timestamp: Timestamp,
    /// Auxiliary values keyed by name. Sorted map for stable output.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, f64>,
}

impl Signal {
    pub fn new(kind: SignalKind, symbol: impl Into<String>, value: f64, timestamp: Timestamp) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            value,
            confidence: 1.0,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn metadata(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        let s = Signal::new(SignalKind::Spread, "ACME", 1.5, 0).with_confidence(3.0);
        assert_eq!(s.confidence, 1.0);
        let s = s.with_confidence(-0.5);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn test_metadata_access() {
        let s = Signal::new(SignalKind::TradeFlow, "ACME", 0.2, 0)
            .with_metadata("vwap", 100.5)
            .with_metadata("buy_vol", 40.0);
        assert_eq!(s.metadata("vwap"), Some(100.5));
        assert_eq!(s.metadata("missing"), None);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let s = Signal::new(SignalKind::OrderImbalance, "ACME", 0.8, 17)
            .with_metadata("weighted", 0.75);
        let json = serde_json::to_string(&s).unwrap();
        let back: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
