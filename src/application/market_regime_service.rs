//! C13 Market Regime Provider: pulls HYG/LQD/VIX/SPY and yield-proxy bars
//! through C4, derives `domain::regime::StressIndicators`/`MarketRegime`,
//! and debounces the label through an `AntiWhipsawState` so a single noisy
//! day does not flip the reported regime. Exposes `current()` for C7/C10
//! and a fixed allocation mapping per regime.

use crate::application::quote_provider::QuoteProvider;
use crate::domain::errors::AppError;
use crate::domain::market_data::HistoricalBar;
use crate::domain::regime::{AntiWhipsawState, MarketRegime, SignalData};
use crate::domain::types::Ticker;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

const TICKER_HYG: &str = "HYG";
const TICKER_LQD: &str = "LQD";
const TICKER_VIX: &str = "VIX";
const TICKER_SPY: &str = "SPY";
/// 10-year Treasury yield proxy.
const TICKER_YIELD_10Y: &str = "TNX";
/// 3-month Treasury yield proxy, standing in for the 2-year tenor (see
/// module docs: a true 2Y series is treated as unavailable upstream).
const TICKER_YIELD_SHORT: &str = "IRX";

const LOOKBACK_DAYS: u32 = 252;
/// Ticks an observed regime must sustain before being adopted when it is
/// *more* severe than the currently reported one (spec §4.12).
const ENTRY_CONFIRMATION_TICKS: u32 = 7;
/// Ticks required when the observed regime is *less* severe (exiting a
/// stressed regime back toward calm).
const EXIT_CONFIRMATION_TICKS: u32 = 14;

fn severity(regime: MarketRegime) -> u8 {
    match regime {
        MarketRegime::RiskOn => 0,
        MarketRegime::Neutral => 1,
        MarketRegime::RiskOff => 2,
        MarketRegime::HighUncertainty => 3,
    }
}

pub struct MarketRegimeService {
    quote_provider: Arc<dyn QuoteProvider>,
    state: RwLock<AntiWhipsawState>,
}

impl MarketRegimeService {
    pub fn new(quote_provider: Arc<dyn QuoteProvider>) -> Self {
        Self {
            quote_provider,
            state: RwLock::new(AntiWhipsawState::new(MarketRegime::RiskOn, ENTRY_CONFIRMATION_TICKS)),
        }
    }

    /// Fetches fresh data, derives the day's candidate regime, and feeds it
    /// through the anti-whipsaw debounce. Returns the (possibly unchanged)
    /// reported regime. Intended to be called once per trading day.
    pub async fn refresh(&self) -> Result<MarketRegime, AppError> {
        let signals = self.fetch_signals().await?;
        let candidate = MarketRegime::from_signals(&signals);

        let mut state = self.state.write().await;
        let ticks = if severity(candidate) > severity(state.current) {
            ENTRY_CONFIRMATION_TICKS
        } else {
            EXIT_CONFIRMATION_TICKS
        };
        state.confirmation_ticks = ticks;
        let changed = state.observe(candidate);
        if changed {
            debug!(regime = ?state.current, "market regime changed");
        }
        Ok(state.current)
    }

    pub async fn current(&self) -> MarketRegime {
        self.state.read().await.current
    }

    pub async fn interpretation(&self) -> &'static str {
        self.current().await.interpretation()
    }

    async fn fetch_signals(&self) -> Result<SignalData, AppError> {
        let hyg = self.bars(TICKER_HYG, LOOKBACK_DAYS).await?;
        let lqd = self.bars(TICKER_LQD, LOOKBACK_DAYS).await?;
        let vix = self.bars(TICKER_VIX, LOOKBACK_DAYS).await?;
        let spy = self.bars(TICKER_SPY, LOOKBACK_DAYS).await?;
        let yield_10y = self.bars(TICKER_YIELD_10Y, LOOKBACK_DAYS).await?;
        let yield_short = self.bars(TICKER_YIELD_SHORT, LOOKBACK_DAYS).await?;

        let ratio: Vec<f64> = hyg
            .iter()
            .zip(lqd.iter())
            .map(|(h, l)| close_f64(h) / close_f64(l).max(f64::EPSILON))
            .collect();
        let vix_closes: Vec<f64> = vix.iter().map(close_f64).collect();
        let spy_closes: Vec<f64> = spy.iter().map(close_f64).collect();

        let spy_close = *spy_closes.last().unwrap_or(&0.0);
        let spy_high = rolling_max(&spy_closes);

        Ok(SignalData {
            hyg_lqd_ratio: *ratio.last().unwrap_or(&0.0),
            hyg_lqd_sma50: sma(&ratio, 50),
            vix: *vix_closes.last().unwrap_or(&0.0),
            vix_sma20: sma(&vix_closes, 20),
            spy_close,
            spy_sma200: sma(&spy_closes, 200),
            spy_drawdown_from_high_percent: if spy_high > 0.0 {
                (spy_close - spy_high) / spy_high * 100.0
            } else {
                0.0
            },
            yield_10y: yield_10y.last().map(close_f64).unwrap_or(0.0),
            yield_2y: yield_short.last().map(close_f64).unwrap_or(0.0),
        })
    }

    async fn bars(&self, ticker: &str, days: u32) -> Result<Vec<HistoricalBar>, AppError> {
        let ticker = Ticker::new(ticker)?;
        Ok(self.quote_provider.historical(&ticker, days).await?)
    }
}

fn close_f64(bar: &HistoricalBar) -> f64 {
    bar.close.to_f64().unwrap_or(0.0)
}

fn sma(values: &[f64], period: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let window = &values[values.len().saturating_sub(period)..];
    window.iter().sum::<f64>() / window.len() as f64
}

fn rolling_max(values: &[f64]) -> f64 {
    values.iter().cloned().fold(0.0, f64::max)
}

/// Fixed recommended allocation across `{growth, income, defensive, cash}`
/// for a given regime (spec §4.12).
pub fn recommended_allocation(regime: MarketRegime) -> HashMap<String, f64> {
    let weights: [(&str, f64); 4] = match regime {
        MarketRegime::RiskOn => [("growth", 70.0), ("income", 20.0), ("defensive", 5.0), ("cash", 5.0)],
        MarketRegime::Neutral => [("growth", 55.0), ("income", 25.0), ("defensive", 10.0), ("cash", 10.0)],
        MarketRegime::RiskOff => [("growth", 35.0), ("income", 25.0), ("defensive", 20.0), ("cash", 20.0)],
        MarketRegime::HighUncertainty => [("growth", 15.0), ("income", 15.0), ("defensive", 30.0), ("cash", 40.0)],
    };
    weights.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
