//! C12 Alert Watcher: periodic per-ticker technical-signal scan over C4's
//! quote provider, deduplicated against the last recorded signal for the
//! ticker and gated by a cooldown, pushed through the notification trait
//! and persisted via the signal-history repository. Mirrors C6's
//! `tokio::select!` + watch-channel shutdown idiom.

use crate::application::indicator_engine;
use crate::application::notifications::NotificationSink;
use crate::application::quote_provider::QuoteProvider;
use crate::config::AlertWatcherConfig;
use crate::domain::errors::AppError;
use crate::domain::repositories::{PortfolioRepository, SignalHistoryRepository, SignalRecord};
use crate::domain::technical::{BollingerPosition, MacdTrend, RsiSignal, TechnicalIndicators};
use crate::domain::types::Ticker;
use crate::infrastructure::observability::metrics;
use chrono::{Duration as ChronoDuration, Timelike, Utc, Weekday};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bars requested per scan (spec §4.11: "latest ≤30 daily bars").
const HISTORY_DAYS: u32 = 30;
/// Signal history is capped to the 500 most recent records (spec §4.11).
const MAX_SIGNAL_HISTORY: usize = 500;

/// Counts of emitted signals over a trailing window, broken down by signal
/// type and by ticker, for the 24h/7d stats spec §4.11 calls for.
#[derive(Debug, Clone, Default)]
pub struct AlertStats {
    pub total: usize,
    pub by_type: HashMap<String, usize>,
    pub by_ticker: HashMap<String, usize>,
}

pub struct AlertWatcher {
    quote_provider: Arc<dyn QuoteProvider>,
    portfolio: Arc<dyn PortfolioRepository>,
    signal_history: Arc<dyn SignalHistoryRepository>,
    notifier: Arc<dyn NotificationSink>,
    config: AlertWatcherConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl AlertWatcher {
    pub fn new(
        quote_provider: Arc<dyn QuoteProvider>,
        portfolio: Arc<dyn PortfolioRepository>,
        signal_history: Arc<dyn SignalHistoryRepository>,
        notifier: Arc<dyn NotificationSink>,
        config: AlertWatcherConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            quote_provider,
            portfolio,
            signal_history,
            notifier,
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Spawns the long-lived scan loop. Idempotent only if paired with
    /// `stop()`; a disabled watcher returns immediately without looping.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let watcher = self.clone();
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            if !watcher.config.enabled {
                info!("alert watcher disabled, not starting scan loop");
                return;
            }
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(watcher.config.scan_interval) => {
                        if watcher.in_scan_window() {
                            if let Err(e) = watcher.scan_once().await {
                                warn!(error = %e, "alert scan failed");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// When `trading_hours_only` is set, restricts scans to weekdays,
    /// 13:00-21:00 UTC (a US-market-hours approximation; spec leaves the
    /// exact window unspecified).
    fn in_scan_window(&self) -> bool {
        if !self.config.trading_hours_only {
            return true;
        }
        let now = Utc::now();
        !matches!(now.weekday(), Weekday::Sat | Weekday::Sun) && (13..21).contains(&now.hour())
    }

    /// Scans every ticker currently held in the portfolio, emitting at most
    /// one alert per ticker per scan, then prunes the signal history.
    pub async fn scan_once(&self) -> Result<(), AppError> {
        let positions = self
            .portfolio
            .get_positions()
            .await
            .map_err(|e| AppError::DataFetch(e.to_string()))?;
        for position in positions {
            if let Err(e) = self.scan_ticker(&position.ticker).await {
                warn!(ticker = position.ticker.as_str(), error = %e, "ticker scan failed");
            }
        }
        self.signal_history
            .prune(MAX_SIGNAL_HISTORY)
            .await
            .map_err(|e| AppError::DataFetch(e.to_string()))?;
        Ok(())
    }

    pub async fn scan_ticker(&self, ticker: &Ticker) -> Result<(), AppError> {
        let bars = self.quote_provider.historical(ticker, HISTORY_DAYS).await?;
        if bars.len() < 2 {
            return Ok(());
        }
        let indicators = indicator_engine::compute(&bars)?;
        let Some((signal_type, message)) = classify(&indicators) else {
            return Ok(());
        };

        let last_any = self
            .signal_history
            .last_for_ticker(ticker)
            .await
            .map_err(|e| AppError::DataFetch(e.to_string()))?;
        if let Some(last) = &last_any {
            if last.signal_type == signal_type {
                return Ok(());
            }
        }

        let last_same_type = self
            .signal_history
            .last_for_ticker_and_type(ticker, &signal_type)
            .await
            .map_err(|e| AppError::DataFetch(e.to_string()))?;
        if let Some(last) = &last_same_type {
            let cooldown = ChronoDuration::minutes(self.config.cooldown_minutes);
            if Utc::now() - last.emitted_at < cooldown {
                return Ok(());
            }
        }

        let record = SignalRecord {
            id: Uuid::new_v4(),
            ticker: ticker.clone(),
            signal_type: signal_type.clone(),
            message: message.clone(),
            emitted_at: Utc::now(),
        };
        self.signal_history
            .record(&record)
            .await
            .map_err(|e| AppError::DataFetch(e.to_string()))?;
        metrics::record_alert_emitted(&signal_type);
        self.notifier
            .send_message(&format!("<b>{}</b>: {}", ticker.as_str(), message))
            .await;
        debug!(ticker = ticker.as_str(), signal_type = signal_type.as_str(), "alert emitted");
        Ok(())
    }

    async fn stats_since(&self, since: chrono::DateTime<Utc>) -> Result<AlertStats, AppError> {
        let recent = self
            .signal_history
            .recent(MAX_SIGNAL_HISTORY)
            .await
            .map_err(|e| AppError::DataFetch(e.to_string()))?;
        let mut stats = AlertStats::default();
        for record in recent.into_iter().filter(|r| r.emitted_at >= since) {
            stats.total += 1;
            *stats.by_type.entry(record.signal_type).or_insert(0) += 1;
            *stats.by_ticker.entry(record.ticker.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    pub async fn stats_24h(&self) -> Result<AlertStats, AppError> {
        self.stats_since(Utc::now() - ChronoDuration::hours(24)).await
    }

    pub async fn stats_7d(&self) -> Result<AlertStats, AppError> {
        self.stats_since(Utc::now() - ChronoDuration::days(7)).await
    }
}

/// Picks the single strongest deviation among RSI/MACD/Bollinger as this
/// scan's signal type, checked in that priority order; `None` when every
/// sub-signal is neutral.
fn classify(indicators: &TechnicalIndicators) -> Option<(String, String)> {
    match indicators.rsi_signal {
        RsiSignal::StrongOverbought => {
            return Some(("rsi_strong_overbought".to_string(), format!("RSI {:.1} is strongly overbought", indicators.rsi)))
        }
        RsiSignal::StrongOversold => {
            return Some(("rsi_strong_oversold".to_string(), format!("RSI {:.1} is strongly oversold", indicators.rsi)))
        }
        RsiSignal::Overbought => {
            return Some(("rsi_overbought".to_string(), format!("RSI {:.1} is overbought", indicators.rsi)))
        }
        RsiSignal::Oversold => {
            return Some(("rsi_oversold".to_string(), format!("RSI {:.1} is oversold", indicators.rsi)))
        }
        RsiSignal::Neutral => {}
    }

    match indicators.macd.trend {
        MacdTrend::Bullish if indicators.macd.histogram > 0.0 => {
            return Some((
                "macd_bullish_cross".to_string(),
                format!("MACD turned bullish (histogram {:.3})", indicators.macd.histogram),
            ))
        }
        MacdTrend::Bearish if indicators.macd.histogram < 0.0 => {
            return Some((
                "macd_bearish_cross".to_string(),
                format!("MACD turned bearish (histogram {:.3})", indicators.macd.histogram),
            ))
        }
        _ => {}
    }

    match indicators.bollinger.position {
        BollingerPosition::AboveUpper => Some((
            "bollinger_breach_upper".to_string(),
            format!("price broke above the upper Bollinger band (%B {:.2})", indicators.bollinger.percent_b),
        )),
        BollingerPosition::BelowLower => Some((
            "bollinger_breach_lower".to_string(),
            format!("price broke below the lower Bollinger band (%B {:.2})", indicators.bollinger.percent_b),
        )),
        BollingerPosition::Inside => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::QuoteProviderError;
    use crate::domain::market_data::{HistoricalBar, Quote, StockMetadata};
    use crate::domain::trading::types::PortfolioPosition;
    use crate::infrastructure::persistence::{Database, SqliteSignalHistoryRepository};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Deterministic monotonically-rising bar series: RSI(14) and Bollinger
    /// both saturate into their strong-overbought/above-upper states, and
    /// MACD turns bullish, so `classify` reliably returns `rsi_strong_overbought`.
    struct RisingQuoteProvider;

    #[async_trait]
    impl QuoteProvider for RisingQuoteProvider {
        async fn historical(&self, _ticker: &Ticker, _days: u32) -> Result<Vec<HistoricalBar>, QuoteProviderError> {
            let base = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
            Ok((0..30)
                .map(|i| {
                    let close = Decimal::from(100 + i * 2);
                    HistoricalBar {
                        date: base + chrono::Duration::days(i as i64),
                        open: close,
                        high: close + Decimal::ONE,
                        low: close - Decimal::ONE,
                        close,
                        volume: 1_000_000,
                        adj_close: None,
                        dividend: Decimal::ZERO,
                    }
                })
                .collect())
        }

        async fn current_quote(&self, ticker: &Ticker) -> Result<Quote, QuoteProviderError> {
            Ok(Quote {
                ticker: ticker.clone(),
                price: dec!(150),
                bid: None,
                ask: None,
                change: None,
                change_percent: None,
                volume: None,
                timestamp: Utc::now(),
                source: "test".to_string(),
            })
        }

        async fn metadata(&self, _ticker: &Ticker) -> Result<StockMetadata, QuoteProviderError> {
            Err(QuoteProviderError::TickerNotFound("unused in tests".to_string()))
        }

        async fn is_valid(&self, _ticker: &Ticker) -> bool {
            true
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<StockMetadata>, QuoteProviderError> {
            Ok(Vec::new())
        }
    }

    struct OnePositionPortfolio(Ticker);

    #[async_trait]
    impl PortfolioRepository for OnePositionPortfolio {
        async fn upsert_position(&self, _position: &PortfolioPosition) -> anyhow::Result<()> {
            Ok(())
        }

        async fn remove_position(&self, _ticker: &Ticker) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get_positions(&self) -> anyhow::Result<Vec<PortfolioPosition>> {
            Ok(vec![PortfolioPosition {
                ticker: self.0.clone(),
                shares: dec!(10),
                avg_cost: dec!(100),
                current_price: dec!(150),
            }])
        }

        async fn get_position(&self, _ticker: &Ticker) -> anyhow::Result<Option<PortfolioPosition>> {
            Ok(None)
        }
    }

    async fn watcher(cooldown_minutes: i64) -> (AlertWatcher, Ticker) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let signal_history = Arc::new(SqliteSignalHistoryRepository::new(db.pool.clone()));
        let ticker = Ticker::new("AAPL").unwrap();
        let config = AlertWatcherConfig {
            enabled: true,
            scan_interval: std::time::Duration::from_secs(1),
            cooldown_minutes,
            trading_hours_only: false,
        };
        let watcher = AlertWatcher::new(
            Arc::new(RisingQuoteProvider),
            Arc::new(OnePositionPortfolio(ticker.clone())),
            signal_history,
            Arc::new(crate::application::notifications::NullNotifier),
            config,
        );
        (watcher, ticker)
    }

    #[tokio::test]
    async fn scan_ticker_emits_and_records_a_strong_overbought_signal() {
        let (watcher, ticker) = watcher(60).await;
        watcher.scan_ticker(&ticker).await.unwrap();
        let recent = watcher.signal_history.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].signal_type, "rsi_strong_overbought");
    }

    #[tokio::test]
    async fn repeated_scan_within_cooldown_does_not_duplicate() {
        let (watcher, ticker) = watcher(60).await;
        watcher.scan_ticker(&ticker).await.unwrap();
        watcher.scan_ticker(&ticker).await.unwrap();
        let recent = watcher.signal_history.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn stats_24h_counts_the_just_emitted_signal() {
        let (watcher, ticker) = watcher(60).await;
        watcher.scan_ticker(&ticker).await.unwrap();
        let stats = watcher.stats_24h().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_ticker.get("AAPL"), Some(&1));
    }
}
