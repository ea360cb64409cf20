//! Portfolio and position bookkeeping
//!
//! All money arithmetic uses `Decimal`; prices enter as exact tick
//! conversions. Cash changes only through fills and fees, and
//! `equity = cash + Σ realized + Σ unrealized(mark)`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::numeric::Timestamp;
use types::order::Order;

/// Per-fill transaction costs charged by the portfolio.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FillCosts {
    pub commission: Decimal,
    pub slippage: Decimal,
}

/// Signed position in one symbol. Positive quantity is long, negative short.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub average_price: Decimal,
    pub realized_pnl: Decimal,
    pub total_traded: u64,
}

impl Position {
    /// Apply a signed fill.
    ///
    /// Additions in the position's direction re-average the entry price;
    /// reductions realize PnL on the closed portion.
    pub fn apply(&mut self, delta: i64, price: Decimal) {
        if delta == 0 {
            return;
        }
        if (self.quantity >= 0 && delta > 0) || (self.quantity <= 0 && delta < 0) {
            let notional_old = Decimal::from(self.quantity.abs()) * self.average_price;
            let notional_new = Decimal::from(delta.abs()) * price;
            let size_new = Decimal::from((self.quantity + delta).abs());
            self.average_price = if size_new > Decimal::ZERO {
                (notional_old + notional_new) / size_new
            } else {
                Decimal::ZERO
            };
        } else {
            let closed = self.quantity.abs().min(delta.abs());
            let signed_closed = if self.quantity > 0 { closed } else { -closed };
            self.realized_pnl += (price - self.average_price) * Decimal::from(signed_closed);
        }
        self.quantity += delta;
        self.total_traded += delta.unsigned_abs();
        if self.quantity == 0 {
            self.average_price = Decimal::ZERO;
        }
    }

    /// Mark-to-market PnL at the given price.
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.average_price) * Decimal::from(self.quantity)
    }

    pub fn total_pnl(&self, mark: Decimal) -> Decimal {
        self.realized_pnl + self.unrealized_pnl(mark)
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }
}

/// Point-in-time portfolio state recorded at end-of-day events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: Timestamp,
    pub equity: Decimal,
    pub cash: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub positions: BTreeMap<String, Position>,
}

/// Slippage model invoked with the fill-generating order.
pub type SlippageModel = Box<dyn Fn(&Order) -> Decimal>;

/// Cash, positions, and running risk tracking for one backtest.
pub struct Portfolio {
    initial_capital: Decimal,
    cash: Decimal,
    commission_rate: Decimal,
    slippage_model: Option<SlippageModel>,
    /// Sorted for deterministic iteration across runs.
    positions: BTreeMap<String, Position>,
    total_commission: Decimal,
    total_slippage: Decimal,
    max_equity: Decimal,
    max_drawdown: Decimal,
}

impl Portfolio {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            // 1 bps default
            commission_rate: Decimal::new(1, 4),
            slippage_model: None,
            positions: BTreeMap::new(),
            total_commission: Decimal::ZERO,
            total_slippage: Decimal::ZERO,
            max_equity: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
        }
    }

    pub fn set_commission_rate(&mut self, rate: Decimal) {
        self.commission_rate = rate;
    }

    pub fn set_slippage_model(&mut self, model: SlippageModel) {
        self.slippage_model = Some(model);
    }

    /// Apply a signed fill to cash and the symbol's position.
    ///
    /// `source` is the order that generated the fill, when known; the
    /// slippage model is only consulted for such fills.
    pub fn apply_fill(
        &mut self,
        symbol: &str,
        delta: i64,
        price: Decimal,
        source: Option<&Order>,
    ) -> FillCosts {
        let traded_notional = Decimal::from(delta.abs()) * price;
        let commission = self.commission_rate * traded_notional;
        let slippage = match (&self.slippage_model, source) {
            (Some(model), Some(order)) => model(order),
            _ => Decimal::ZERO,
        };

        self.cash -= Decimal::from(delta) * price + commission + slippage;
        self.total_commission += commission;
        self.total_slippage += slippage;

        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position {
                symbol: symbol.to_string(),
                ..Position::default()
            });
        position.apply(delta, price);

        FillCosts {
            commission,
            slippage,
        }
    }

    // -- queries ------------------------------------------------------------

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn net_position(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map(|p| p.quantity).unwrap_or(0)
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.realized_pnl).sum()
    }

    /// Unrealized PnL against the given marks; symbols without a mark are
    /// skipped.
    pub fn unrealized_pnl(&self, marks: &BTreeMap<String, Decimal>) -> Decimal {
        self.positions
            .iter()
            .filter_map(|(symbol, position)| {
                marks.get(symbol).map(|mark| position.unrealized_pnl(*mark))
            })
            .sum()
    }

    pub fn total_pnl(&self, marks: &BTreeMap<String, Decimal>) -> Decimal {
        self.realized_pnl() + self.unrealized_pnl(marks)
    }

    pub fn equity(&self, marks: &BTreeMap<String, Decimal>) -> Decimal {
        self.cash + self.total_pnl(marks)
    }

    /// Gross exposure divided by equity; `0` when equity is non-positive.
    pub fn leverage(&self, marks: &BTreeMap<String, Decimal>) -> Decimal {
        let gross: Decimal = self
            .positions
            .iter()
            .filter_map(|(symbol, position)| {
                marks
                    .get(symbol)
                    .map(|mark| (Decimal::from(position.quantity) * *mark).abs())
            })
            .sum();
        let equity = self.equity(marks);
        if equity > Decimal::ZERO {
            gross / equity
        } else {
            Decimal::ZERO
        }
    }

    pub fn total_commission(&self) -> Decimal {
        self.total_commission
    }

    pub fn total_slippage(&self) -> Decimal {
        self.total_slippage
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.max_drawdown
    }

    /// Record a snapshot and advance the peak-equity/drawdown tracker.
    pub fn take_snapshot(
        &mut self,
        timestamp: Timestamp,
        marks: &BTreeMap<String, Decimal>,
    ) -> Snapshot {
        let equity = self.equity(marks);
        self.update_drawdown(equity);
        Snapshot {
            timestamp,
            equity,
            cash: self.cash,
            realized_pnl: self.realized_pnl(),
            unrealized_pnl: self.unrealized_pnl(marks),
            positions: self.positions.clone(),
        }
    }

    fn update_drawdown(&mut self, equity: Decimal) {
        if equity > self.max_equity {
            self.max_equity = equity;
        }
        if self.max_equity > Decimal::ZERO {
            let drawdown = (self.max_equity - equity) / self.max_equity;
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
    }
}
