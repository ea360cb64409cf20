//! Backtest result statistics
//!
//! Pure functions over the end-of-day equity series and the trade record.
//! Degenerate inputs (short series, zero denominators) yield zeros.

use serde::{Deserialize, Serialize};
use types::numeric::Timestamp;

/// Snapshots per year assumed when annualizing (daily equity marks).
const PERIODS_PER_YEAR: f64 = 252.0;

/// Default session length used to infer elapsed trading days.
pub const DEFAULT_TRADING_DAY_SECONDS: f64 = 6.5 * 3600.0;

/// One point of the equity curve with its running peak and drawdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownPoint {
    pub timestamp: Timestamp,
    pub equity: f64,
    pub peak: f64,
    pub drawdown: f64,
}

/// One fill from the portfolio's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: Timestamp,
    pub symbol: String,
    /// Signed quantity: positive bought, negative sold.
    pub quantity: i64,
    pub price: f64,
    pub commission: f64,
    pub slippage: f64,
}

/// Aggregate performance of one backtest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub calmar: f64,
    pub turnover: f64,
    pub capacity_estimate: f64,
    pub num_trades: usize,
    pub equity_curve: Vec<DrawdownPoint>,
}

/// Period-over-period simple returns of the equity series.
fn returns(equity: &[(Timestamp, f64)]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|pair| (pair[1].1 - pair[0].1) / pair[0].1.max(1e-12))
        .collect()
}

/// Per-period Sharpe ratio (not annualized); `0` below two observations.
pub fn sharpe(returns: &[f64], risk_free_per_period: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let excess_mean =
        returns.iter().map(|r| r - risk_free_per_period).sum::<f64>() / returns.len() as f64;
    let variance = returns
        .iter()
        .map(|r| {
            let deviation = (r - risk_free_per_period) - excess_mean;
            deviation * deviation
        })
        .sum::<f64>()
        / (returns.len() - 1).max(1) as f64;
    let stddev = variance.sqrt();
    if stddev > 0.0 {
        excess_mean / stddev
    } else {
        0.0
    }
}

/// Per-period Sortino ratio, penalizing downside deviation only.
pub fn sortino(returns: &[f64], risk_free_per_period: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let excess_mean =
        returns.iter().map(|r| r - risk_free_per_period).sum::<f64>() / returns.len() as f64;
    let mut downside = 0.0;
    let mut count = 0usize;
    for r in returns {
        let excess = r - risk_free_per_period;
        if excess < 0.0 {
            downside += excess * excess;
            count += 1;
        }
    }
    let downside_dev = if count > 0 {
        (downside / count as f64).sqrt()
    } else {
        0.0
    };
    if downside_dev > 0.0 {
        excess_mean / downside_dev
    } else {
        0.0
    }
}

/// Maximum peak-to-trough decline, optionally emitting the full curve.
pub fn max_drawdown(
    equity: &[(Timestamp, f64)],
    curve_out: Option<&mut Vec<DrawdownPoint>>,
) -> f64 {
    if equity.is_empty() {
        return 0.0;
    }
    let mut peak = equity[0].1;
    let mut worst: f64 = 0.0;
    let mut curve = curve_out;
    if let Some(curve) = curve.as_deref_mut() {
        curve.clear();
    }
    for &(timestamp, value) in equity {
        peak = peak.max(value);
        let drawdown = (peak - value) / peak.max(1e-12);
        worst = worst.max(drawdown);
        if let Some(curve) = curve.as_deref_mut() {
            curve.push(DrawdownPoint {
                timestamp,
                equity: value,
                peak,
                drawdown,
            });
        }
    }
    worst
}

/// Gross traded notional.
pub fn turnover(trades: &[TradeRecord]) -> f64 {
    trades
        .iter()
        .map(|trade| trade.quantity.unsigned_abs() as f64 * trade.price)
        .sum()
}

/// Linear-impact capacity proxy in `[0, 1]`: `1` for an untraded book,
/// shrinking with turnover.
pub fn capacity_estimate(trades: &[TradeRecord], impact_coef_bps: f64) -> f64 {
    let gross = turnover(trades);
    if gross > 0.0 {
        (1.0 - impact_coef_bps * 1e-4 * gross).max(0.0)
    } else {
        1.0
    }
}

/// Compute the full result bundle from an equity series and trade log.
pub fn compute_metrics(
    equity: &[(Timestamp, f64)],
    trades: &[TradeRecord],
    risk_free_rate_annual: f64,
    trading_day_seconds: f64,
) -> BacktestResult {
    let mut result = BacktestResult {
        capacity_estimate: capacity_estimate(trades, 0.1),
        turnover: turnover(trades),
        num_trades: trades.len(),
        ..BacktestResult::default()
    };
    if equity.len() < 2 {
        return result;
    }

    let start = equity[0].1;
    let end = equity[equity.len() - 1].1;
    result.total_return = (end - start) / start.max(1e-12);

    let elapsed_seconds = (equity[equity.len() - 1].0 - equity[0].0) as f64 / 1e9;
    let days = (elapsed_seconds / trading_day_seconds).max(1.0);
    let rets = returns(equity);

    let mean_square = rets.iter().map(|r| r * r).sum::<f64>() / (rets.len() - 1).max(1) as f64;
    result.volatility = mean_square.max(0.0).sqrt() * PERIODS_PER_YEAR.sqrt();

    let risk_free_per_period = risk_free_rate_annual / PERIODS_PER_YEAR;
    result.sharpe = sharpe(&rets, risk_free_per_period) * PERIODS_PER_YEAR.sqrt();
    result.sortino = sortino(&rets, risk_free_per_period) * PERIODS_PER_YEAR.sqrt();
    result.max_drawdown = max_drawdown(equity, Some(&mut result.equity_curve));
    result.calmar = if result.max_drawdown > 0.0 {
        result.total_return / result.max_drawdown
    } else {
        0.0
    };
    result.annualized_return = (1.0 + result.total_return).powf(PERIODS_PER_YEAR / days) - 1.0;
    result
}
