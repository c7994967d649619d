//! C4 Quote Provider Abstraction: historical bars, current quotes, metadata,
//! volatility, ticker validation and symbol search behind one trait, so C5's
//! polling source and C7/C9/C10/C13 never talk to a specific vendor API.

use crate::domain::errors::QuoteProviderError;
use crate::domain::market_data::{annualized_volatility, AssetType, HistoricalBar, Quote, StockMetadata};
use crate::domain::types::Ticker;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Default per-call deadline (spec §4.4/§5: every call is cancellable with a
/// bounded deadline, 30s default).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn historical(&self, ticker: &Ticker, days: u32) -> Result<Vec<HistoricalBar>, QuoteProviderError>;
    async fn current_quote(&self, ticker: &Ticker) -> Result<Quote, QuoteProviderError>;
    async fn metadata(&self, ticker: &Ticker) -> Result<StockMetadata, QuoteProviderError>;
    async fn is_valid(&self, ticker: &Ticker) -> bool;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<StockMetadata>, QuoteProviderError>;

    /// Annualised volatility over `days` (default 252) of history. `None` if
    /// under 20 data points. The default impl derives this from `historical`
    /// so implementors only need to provide bars.
    async fn volatility(&self, ticker: &Ticker, days: u32) -> Result<Option<f64>, QuoteProviderError> {
        let bars = self.historical(ticker, days).await?;
        Ok(annualized_volatility(&bars))
    }
}

/// Wraps any `QuoteProvider` with the spec's mandatory per-call deadline,
/// converting a timeout into `QuoteProviderError::DataFetch`.
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T, QuoteProviderError>>,
) -> Result<T, QuoteProviderError> {
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(QuoteProviderError::DataFetch(format!("timed out after {deadline:?}"))),
    }
}

/// Finnhub-backed provider: real HTTP calls through the shared retrying
/// client. Ships alongside the deterministic offline provider below; which
/// one is wired at bootstrap depends on `Config::force_env_config` and
/// whether an API key is configured.
pub struct FinnhubQuoteProvider {
    http: ClientWithMiddleware,
    api_key: String,
    base_url: String,
}

impl FinnhubQuoteProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            http: crate::infrastructure::http_client_factory::HttpClientFactory::create_client(),
            api_key,
            base_url: "https://finnhub.io/api/v1".to_string(),
        }
    }
}

#[async_trait]
impl QuoteProvider for FinnhubQuoteProvider {
    async fn historical(&self, ticker: &Ticker, days: u32) -> Result<Vec<HistoricalBar>, QuoteProviderError> {
        #[derive(serde::Deserialize)]
        struct CandleResponse {
            #[serde(rename = "t")]
            timestamps: Vec<i64>,
            #[serde(rename = "o")]
            open: Vec<f64>,
            #[serde(rename = "h")]
            high: Vec<f64>,
            #[serde(rename = "l")]
            low: Vec<f64>,
            #[serde(rename = "c")]
            close: Vec<f64>,
            #[serde(rename = "v")]
            volume: Vec<f64>,
            #[serde(rename = "s")]
            status: String,
        }

        let to = Utc::now().timestamp();
        let from = to - (days as i64) * 86_400;
        let url = format!(
            "{}/stock/candle?symbol={}&resolution=D&from={from}&to={to}&token={}",
            self.base_url,
            ticker.as_str(),
            self.api_key
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| QuoteProviderError::DataFetch(format!("network: {e}")))?;
        if !response.status().is_success() {
            return Err(QuoteProviderError::DataFetch(format!("status {}", response.status())));
        }
        let body: CandleResponse = response
            .json()
            .await
            .map_err(|e| QuoteProviderError::DataFetch(format!("decode: {e}")))?;
        if body.status != "ok" {
            return Err(QuoteProviderError::TickerNotFound(ticker.as_str().to_string()));
        }

        let mut bars = Vec::with_capacity(body.timestamps.len());
        for i in 0..body.timestamps.len() {
            let date = chrono::DateTime::from_timestamp(body.timestamps[i], 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| QuoteProviderError::DataFetch("bad timestamp".into()))?;
            bars.push(HistoricalBar {
                date,
                open: Decimal::from_f64(body.open[i]).unwrap_or_default(),
                high: Decimal::from_f64(body.high[i]).unwrap_or_default(),
                low: Decimal::from_f64(body.low[i]).unwrap_or_default(),
                close: Decimal::from_f64(body.close[i]).unwrap_or_default(),
                volume: body.volume[i].max(0.0) as u64,
                adj_close: None,
                dividend: Decimal::ZERO,
            });
        }
        Ok(bars)
    }

    async fn current_quote(&self, ticker: &Ticker) -> Result<Quote, QuoteProviderError> {
        #[derive(serde::Deserialize)]
        struct QuoteResponse {
            c: f64,
            d: Option<f64>,
            dp: Option<f64>,
        }
        let url = format!("{}/quote?symbol={}&token={}", self.base_url, ticker.as_str(), self.api_key);
        let start = std::time::Instant::now();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| QuoteProviderError::DataFetch(format!("network: {e}")))?;
        let status = response.status();
        let body: QuoteResponse = response
            .json()
            .await
            .map_err(|e| QuoteProviderError::DataFetch(format!("decode: {e}")))?;
        debug!(method = "GET", path = "/quote", status = status.as_u16(), latency_ms = start.elapsed().as_millis() as u64, "quote provider call");
        if body.c == 0.0 {
            return Err(QuoteProviderError::TickerNotFound(ticker.as_str().to_string()));
        }
        Ok(Quote {
            ticker: ticker.clone(),
            price: Decimal::from_f64(body.c).unwrap_or_default(),
            bid: None,
            ask: None,
            change: body.d.and_then(Decimal::from_f64),
            change_percent: body.dp.and_then(Decimal::from_f64),
            volume: None,
            timestamp: Utc::now(),
            source: "finnhub".to_string(),
        })
    }

    async fn metadata(&self, ticker: &Ticker) -> Result<StockMetadata, QuoteProviderError> {
        #[derive(serde::Deserialize, Default)]
        struct ProfileResponse {
            name: Option<String>,
            currency: Option<String>,
            exchange: Option<String>,
            #[serde(rename = "finnhubIndustry")]
            industry: Option<String>,
            #[serde(rename = "marketCapitalization")]
            market_cap: Option<f64>,
        }
        let url = format!("{}/stock/profile2?symbol={}&token={}", self.base_url, ticker.as_str(), self.api_key);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| QuoteProviderError::DataFetch(format!("network: {e}")))?;
        let body: ProfileResponse = response
            .json()
            .await
            .map_err(|e| QuoteProviderError::DataFetch(format!("decode: {e}")))?;
        let name = body.name.ok_or_else(|| QuoteProviderError::TickerNotFound(ticker.as_str().to_string()))?;
        Ok(StockMetadata {
            ticker: ticker.clone(),
            name,
            currency: body.currency.unwrap_or_else(|| "USD".to_string()),
            exchange: body.exchange,
            sector: None,
            industry: body.industry,
            asset_type: AssetType::Stock,
            market_cap: body.market_cap.and_then(Decimal::from_f64),
            dividend_yield: None,
        })
    }

    async fn is_valid(&self, ticker: &Ticker) -> bool {
        self.metadata(ticker).await.is_ok()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<StockMetadata>, QuoteProviderError> {
        #[derive(serde::Deserialize, Default)]
        struct SearchResponse {
            #[serde(default)]
            result: Vec<SearchItem>,
        }
        #[derive(serde::Deserialize)]
        struct SearchItem {
            symbol: String,
            description: String,
        }
        let url = format!("{}/search?q={query}&token={}", self.base_url, self.api_key);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| QuoteProviderError::DataFetch(format!("network: {e}")))?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| QuoteProviderError::DataFetch(format!("decode: {e}")))?;
        Ok(body
            .result
            .into_iter()
            .take(limit)
            .filter_map(|item| {
                Ticker::new(&item.symbol).ok().map(|ticker| StockMetadata {
                    ticker,
                    name: item.description,
                    currency: "USD".to_string(),
                    exchange: None,
                    sector: None,
                    industry: None,
                    asset_type: AssetType::Stock,
                    market_cap: None,
                    dividend_yield: None,
                })
            })
            .collect())
    }
}

/// Deterministic offline provider: seeded GBM price paths plus a fixed
/// metadata fixture table. Wired at bootstrap whenever no live provider key
/// is configured, so the rest of the system (C5-C13) always has something
/// to run against in local development and CI.
pub struct OfflineQuoteProvider {
    seed: u64,
    fixtures: HashMap<String, StockMetadata>,
}

impl Default for OfflineQuoteProvider {
    fn default() -> Self {
        Self::new(42)
    }
}

impl OfflineQuoteProvider {
    pub fn new(seed: u64) -> Self {
        let mut fixtures = HashMap::new();
        for (symbol, name, sector) in [
            ("AAPL", "Apple Inc.", "Technology"),
            ("MSFT", "Microsoft Corp.", "Technology"),
            ("SPY", "SPDR S&P 500 ETF Trust", "Broad Market"),
            ("HYG", "iShares iBoxx High Yield Corporate Bond ETF", "Fixed Income"),
            ("LQD", "iShares iBoxx Investment Grade Corporate Bond ETF", "Fixed Income"),
            ("VIX", "CBOE Volatility Index", "Volatility"),
        ] {
            let ticker = Ticker::new(symbol).expect("fixture symbol is valid");
            fixtures.insert(
                symbol.to_string(),
                StockMetadata {
                    ticker,
                    name: name.to_string(),
                    currency: "USD".to_string(),
                    exchange: Some("NASDAQ".to_string()),
                    sector: Some(sector.to_string()),
                    industry: None,
                    asset_type: AssetType::Stock,
                    market_cap: None,
                    dividend_yield: None,
                },
            );
        }
        Self { seed, fixtures }
    }

    fn rng_for(&self, ticker: &Ticker) -> ChaCha8Rng {
        let mut hasher_seed = self.seed;
        for byte in ticker.as_str().bytes() {
            hasher_seed = hasher_seed.wrapping_mul(31).wrapping_add(byte as u64);
        }
        ChaCha8Rng::seed_from_u64(hasher_seed)
    }

    fn synthesize(&self, ticker: &Ticker, days: u32) -> Vec<HistoricalBar> {
        let mut rng = self.rng_for(ticker);
        let mut price = 100.0_f64;
        let dt = 1.0 / 252.0;
        let mu = 0.06_f64;
        let sigma = 0.2_f64;
        let today = Utc::now().date_naive();
        let start = today - ChronoDuration::days(days as i64);
        let normal = Uniform::new(-1.0, 1.0);
        (0..days)
            .map(|i| {
                let z: f64 = (0..12).map(|_| normal.sample(&mut rng)).sum::<f64>() / 2.0;
                price *= ((mu - 0.5 * sigma * sigma) * dt + sigma * dt.sqrt() * z).exp();
                let close = Decimal::from_f64(price).unwrap_or_default();
                let wobble = Decimal::from_f64(price * 0.003).unwrap_or_default();
                HistoricalBar {
                    date: start + ChronoDuration::days(i as i64),
                    open: close - wobble,
                    high: close + wobble,
                    low: close - wobble,
                    close,
                    volume: 1_000_000 + rng.gen_range(0..500_000),
                    adj_close: Some(close),
                    dividend: Decimal::ZERO,
                }
            })
            .collect()
    }
}

#[async_trait]
impl QuoteProvider for OfflineQuoteProvider {
    async fn historical(&self, ticker: &Ticker, days: u32) -> Result<Vec<HistoricalBar>, QuoteProviderError> {
        Ok(self.synthesize(ticker, days.max(20)))
    }

    async fn current_quote(&self, ticker: &Ticker) -> Result<Quote, QuoteProviderError> {
        let bars = self.synthesize(ticker, 5);
        let last = bars.last().ok_or_else(|| QuoteProviderError::TickerNotFound(ticker.as_str().to_string()))?;
        Ok(Quote {
            ticker: ticker.clone(),
            price: last.close,
            bid: Some(last.close),
            ask: Some(last.close),
            change: None,
            change_percent: None,
            volume: Some(last.volume),
            timestamp: Utc::now(),
            source: "offline".to_string(),
        })
    }

    async fn metadata(&self, ticker: &Ticker) -> Result<StockMetadata, QuoteProviderError> {
        self.fixtures
            .get(ticker.as_str())
            .cloned()
            .or_else(|| {
                Some(StockMetadata {
                    ticker: ticker.clone(),
                    name: format!("{} (synthetic)", ticker.as_str()),
                    currency: "USD".to_string(),
                    exchange: None,
                    sector: None,
                    industry: None,
                    asset_type: AssetType::Stock,
                    market_cap: None,
                    dividend_yield: None,
                })
            })
            .ok_or_else(|| QuoteProviderError::TickerNotFound(ticker.as_str().to_string()))
    }

    async fn is_valid(&self, _ticker: &Ticker) -> bool {
        true
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<StockMetadata>, QuoteProviderError> {
        let query = query.to_uppercase();
        Ok(self
            .fixtures
            .values()
            .filter(|m| m.ticker.as_str().contains(&query) || m.name.to_uppercase().contains(&query))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str) -> Ticker {
        Ticker::new(symbol).unwrap()
    }

    #[tokio::test]
    async fn offline_provider_is_deterministic_for_same_seed() {
        let a = OfflineQuoteProvider::new(7);
        let b = OfflineQuoteProvider::new(7);
        let bars_a = a.historical(&ticker("AAPL"), 60).await.unwrap();
        let bars_b = b.historical(&ticker("AAPL"), 60).await.unwrap();
        assert_eq!(bars_a, bars_b);
    }

    #[tokio::test]
    async fn offline_provider_differs_across_tickers() {
        let provider = OfflineQuoteProvider::default();
        let aapl = provider.historical(&ticker("AAPL"), 60).await.unwrap();
        let msft = provider.historical(&ticker("MSFT"), 60).await.unwrap();
        assert_ne!(aapl, msft);
    }

    #[tokio::test]
    async fn offline_volatility_needs_twenty_points() {
        let provider = OfflineQuoteProvider::default();
        let vol = provider.volatility(&ticker("AAPL"), 5).await.unwrap();
        assert!(vol.is_none());
        let vol = provider.volatility(&ticker("AAPL"), 252).await.unwrap();
        assert!(vol.is_some());
    }

    #[tokio::test]
    async fn offline_metadata_known_fixture() {
        let provider = OfflineQuoteProvider::default();
        let meta = provider.metadata(&ticker("SPY")).await.unwrap();
        assert_eq!(meta.name, "SPDR S&P 500 ETF Trust");
    }

    #[tokio::test]
    async fn deadline_wraps_slow_future_as_data_fetch_error() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, QuoteProviderError>(())
        })
        .await;
        assert!(matches!(result, Err(QuoteProviderError::DataFetch(_))));
    }
}
