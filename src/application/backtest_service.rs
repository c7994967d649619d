//! C10 Backtest service: assembles the per-ticker bar history and the
//! HYG/LQD/VIX/SPY macro signal series through C4, then runs the engine on
//! the blocking-task pool (spec §5: CPU-bound routines must not hold the
//! async scheduler).

use crate::application::quote_provider::QuoteProvider;
use crate::domain::errors::AppError;
use crate::domain::performance::backtest::{BacktestBar, BacktestConfig, BacktestEngine, BacktestResult, SignalSnapshot};
use crate::domain::types::Ticker;
use crate::infrastructure::observability::metrics;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag checked at the coarse grain this wrapper
/// exposes (before the blocking replay starts). The domain engine itself
/// loops day-by-day with no cancellation hook, so a flag set mid-run cannot
/// interrupt an in-flight `BacktestEngine::run` call; it only prevents a
/// new run from starting.
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct BacktestService {
    quote_provider: Arc<dyn QuoteProvider>,
}

const SMA20_WINDOW: usize = 20;
const SMA50_WINDOW: usize = 50;
const SMA200_WINDOW: usize = 200;

impl BacktestService {
    pub fn new(quote_provider: Arc<dyn QuoteProvider>) -> Self {
        Self { quote_provider }
    }

    pub async fn run(
        &self,
        config: BacktestConfig,
        cancellation: Option<CancellationFlag>,
    ) -> Result<BacktestResult, AppError> {
        if cancellation.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(AppError::Cancelled);
        }

        let days = (config.end_date - config.start_date).num_days().max(252) as u32 + 30;

        let mut historical_data = HashMap::new();
        for symbol in config.allocation.keys() {
            let ticker = Ticker::new(symbol)?;
            let bars = self.quote_provider.historical(&ticker, days).await?;
            historical_data.insert(symbol.clone(), to_backtest_bars(&bars));
        }

        let signal_data = self.build_signal_series(days).await?;

        if cancellation.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(AppError::Cancelled);
        }

        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let mut engine = BacktestEngine::new();
            engine.run(&config, &historical_data, &signal_data)
        })
        .await
        .map_err(|e| AppError::DataFetch(format!("backtest task panicked: {e}")));
        metrics::record_backtest_run(start.elapsed().as_secs_f64());
        result
    }

    /// Builds the HYG/LQD/VIX/SPY-derived daily signal snapshot series the
    /// risk-off triggers read, keyed by date.
    async fn build_signal_series(&self, days: u32) -> Result<HashMap<NaiveDate, SignalSnapshot>, AppError> {
        let hyg = self.quote_provider.historical(&Ticker::new("HYG")?, days).await?;
        let lqd = self.quote_provider.historical(&Ticker::new("LQD")?, days).await?;
        let vix = self.quote_provider.historical(&Ticker::new("VIX")?, days).await?;
        let spy = self.quote_provider.historical(&Ticker::new("SPY")?, days).await?;

        let hyg_close: HashMap<NaiveDate, f64> = hyg.iter().filter_map(|b| Some((b.date, b.close.to_f64()?))).collect();
        let lqd_close: HashMap<NaiveDate, f64> = lqd.iter().filter_map(|b| Some((b.date, b.close.to_f64()?))).collect();
        let vix_close: HashMap<NaiveDate, f64> = vix.iter().filter_map(|b| Some((b.date, b.close.to_f64()?))).collect();
        let spy_closes: Vec<f64> = spy.iter().filter_map(|b| b.close.to_f64()).collect();
        let spy_sma200 = rolling_sma(&spy_closes, SMA200_WINDOW);
        let vix_closes: Vec<f64> = vix.iter().filter_map(|b| b.close.to_f64()).collect();
        let vix_sma20 = rolling_sma(&vix_closes, SMA20_WINDOW);

        let hyg_lqd_ratio: HashMap<NaiveDate, f64> = hyg
            .iter()
            .filter_map(|b| {
                let hyg_close = hyg_close.get(&b.date)?;
                let lqd_close = lqd_close.get(&b.date)?;
                if *lqd_close == 0.0 {
                    None
                } else {
                    Some((b.date, hyg_close / lqd_close))
                }
            })
            .collect();
        let ratio_series: Vec<f64> = {
            let mut dates: Vec<_> = hyg_lqd_ratio.keys().copied().collect();
            dates.sort();
            dates.iter().filter_map(|d| hyg_lqd_ratio.get(d).copied()).collect()
        };
        let ratio_sma50 = rolling_sma(&ratio_series, SMA50_WINDOW);
        let mut ratio_dates: Vec<_> = hyg_lqd_ratio.keys().copied().collect();
        ratio_dates.sort();

        let mut peak = f64::MIN;
        let mut snapshots = HashMap::new();
        for (i, date) in spy.iter().map(|b| b.date).enumerate() {
            let spy_close = spy_closes.get(i).copied();
            if let Some(close) = spy_close {
                peak = peak.max(close);
            }
            let spy_drawdown = spy_close.map(|c| if peak > 0.0 { (c - peak) / peak } else { 0.0 });

            let ratio_idx = ratio_dates.iter().position(|d| *d == date);
            let hyg_lqd_ratio_value = ratio_idx.and_then(|idx| ratio_series.get(idx).copied());
            let hyg_lqd_sma50 = ratio_idx.and_then(|idx| ratio_sma50.get(idx).copied().flatten());

            snapshots.insert(
                date,
                SignalSnapshot {
                    hyg_lqd_ratio: hyg_lqd_ratio_value,
                    hyg_lqd_sma50,
                    vix_close: vix_close.get(&date).copied(),
                    vix_sma20: vix_sma20.get(i).copied().flatten(),
                    spy_close,
                    spy_sma200: spy_sma200.get(i).copied().flatten(),
                    spy_drawdown,
                },
            );
        }

        Ok(snapshots)
    }
}

fn to_backtest_bars(bars: &[crate::domain::market_data::HistoricalBar]) -> Vec<BacktestBar> {
    bars.iter()
        .map(|b| BacktestBar {
            date: b.date,
            close: b.close.to_f64().unwrap_or(0.0),
            dividend: b.dividend.to_f64().unwrap_or(0.0),
        })
        .collect()
}

/// Simple rolling average; `None` until the window has filled.
fn rolling_sma(series: &[f64], window: usize) -> Vec<Option<f64>> {
    series
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < window {
                None
            } else {
                Some(series[i + 1 - window..=i].iter().sum::<f64>() / window as f64)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_sma_is_none_until_window_fills() {
        let series = vec![1.0, 2.0, 3.0];
        let sma = rolling_sma(&series, 5);
        assert!(sma.iter().all(|v| v.is_none()));
    }

    #[test]
    fn rolling_sma_computes_average_once_filled() {
        let series = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let sma = rolling_sma(&series, 5);
        assert_eq!(sma[4], Some(3.0));
    }

    #[test]
    fn cancellation_flag_short_circuits_run() {
        let flag = CancellationFlag::new();
        flag.cancel();
        assert!(flag.is_cancelled());
    }
}
