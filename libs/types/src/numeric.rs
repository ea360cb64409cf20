//! Fixed-point price and quantity types
//!
//! The engine is unit-agnostic: prices are integer ticks and quantities are
//! unsigned integers everywhere inside the matching path. Floating point
//! enters exactly at two documented boundary helpers, and `Decimal` enters
//! at the portfolio boundary for money arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Nanoseconds since epoch, injected by the event stream.
pub type Timestamp = u64;

/// Price in ticks.
///
/// `0` doubles as the "no price" sentinel for empty book sides and market
/// orders, mirroring the feed encoding.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(i64);

/// Tick scale of the f64 boundary: one currency unit is 100 ticks.
const PRICE_SCALE: f64 = 100.0;

impl Price {
    pub const ZERO: Price = Price(0);

    pub fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    pub fn ticks(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Boundary conversion: currency units to ticks, half-up.
    pub fn from_f64(price: f64) -> Self {
        Self((price * PRICE_SCALE + 0.5).floor() as i64)
    }

    /// Boundary conversion: ticks to currency units.
    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / PRICE_SCALE
    }

    /// Exact tick-to-currency conversion for the money path.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quantity in integral units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl From<u64> for Quantity {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_price_boundary_roundtrip() {
        let p = Price::from_f64(100.25);
        assert_eq!(p.ticks(), 10025);
        assert_eq!(p.to_f64(), 100.25);
    }

    #[test]
    fn test_price_from_f64_rounds_to_nearest_tick() {
        assert_eq!(Price::from_f64(1.006).ticks(), 101);
        assert_eq!(Price::from_f64(1.004).ticks(), 100);
    }

    #[test]
    fn test_price_to_decimal_exact() {
        let p = Price::from_ticks(10025);
        assert_eq!(p.to_decimal(), Decimal::from_str("100.25").unwrap());
    }

    #[test]
    fn test_price_arithmetic() {
        let spread = Price::from_ticks(10010) - Price::from_ticks(10000);
        assert_eq!(spread.ticks(), 10);
    }

    #[test]
    fn test_quantity_saturating_sub() {
        let q = Quantity::new(5);
        assert_eq!(q.saturating_sub(Quantity::new(10)), Quantity::ZERO);
        assert_eq!(q.saturating_sub(Quantity::new(2)), Quantity::new(3));
    }

    #[test]
    fn test_quantity_min() {
        assert_eq!(Quantity::new(3).min(Quantity::new(7)), Quantity::new(3));
    }

    #[test]
    fn test_serialization_transparent() {
        let json = serde_json::to_string(&Price::from_ticks(-50)).unwrap();
        assert_eq!(json, "-50");
        let json = serde_json::to_string(&Quantity::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
