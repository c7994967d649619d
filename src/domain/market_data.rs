use crate::domain::types::Ticker;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single daily OHLCV bar, keyed by `(ticker, date)`. A bar series is
/// always ordered ascending by date; callers that assemble one from an
/// upstream provider are responsible for sorting before handing it to C8/C9/C10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    pub adj_close: Option<Decimal>,
    pub dividend: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    Stock,
    Etf,
    Crypto,
    Bond,
}

/// A transient price tick. Any newer quote for the same ticker supersedes it;
/// no history is retained by the type itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: Ticker,
    pub price: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub change: Option<Decimal>,
    pub change_percent: Option<Decimal>,
    pub volume: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMetadata {
    pub ticker: Ticker,
    pub name: String,
    pub currency: String,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub asset_type: AssetType,
    pub market_cap: Option<Decimal>,
    pub dividend_yield: Option<Decimal>,
}

/// Daily log-returns of closes, the shared input to volatility, Monte Carlo
/// parameter estimation, and covariance construction.
pub fn daily_log_returns(bars: &[HistoricalBar]) -> Vec<f64> {
    use rust_decimal::prelude::ToPrimitive;
    bars.windows(2)
        .filter_map(|pair| {
            let prev = pair[0].close.to_f64()?;
            let curr = pair[1].close.to_f64()?;
            if prev <= 0.0 {
                None
            } else {
                Some((curr / prev).ln())
            }
        })
        .collect()
}

/// Annualised standard deviation of daily log-returns, or `None` if fewer
/// than 20 data points are available.
pub fn annualized_volatility(bars: &[HistoricalBar]) -> Option<f64> {
    let returns = daily_log_returns(bars);
    if returns.len() < 20 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(variance.sqrt() * 252f64.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> HistoricalBar {
        HistoricalBar {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: Decimal::try_from(close).unwrap(),
            high: Decimal::try_from(close).unwrap(),
            low: Decimal::try_from(close).unwrap(),
            close: Decimal::try_from(close).unwrap(),
            volume: 1000,
            adj_close: None,
            dividend: Decimal::ZERO,
        }
    }

    #[test]
    fn volatility_is_none_below_20_points() {
        let bars: Vec<_> = (1..=10).map(|d| bar(&format!("2024-01-{d:02}"), 100.0 + d as f64)).collect();
        assert!(annualized_volatility(&bars).is_none());
    }

    #[test]
    fn volatility_is_some_at_or_above_20_points() {
        let bars: Vec<_> = (1..=25)
            .map(|d| bar(&format!("2024-01-{d:02}"), 100.0 + (d as f64 * 0.3).sin()))
            .collect();
        assert!(annualized_volatility(&bars).is_some());
    }
}
