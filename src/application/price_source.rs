//! C5 Price Source Registry: a common `PriceSource` trait over a polling
//! source (backed by C4) and an illustrative real-time stub, so C6's
//! streamer can activate/deactivate sources without knowing which kind it
//! holds.

use crate::application::quote_provider::QuoteProvider;
use crate::domain::errors::AppError;
use crate::domain::market_data::Quote;
use crate::domain::types::Ticker;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[async_trait]
pub trait PriceSource: Send + Sync {
    fn source_name(&self) -> &str;
    fn is_realtime(&self) -> bool;
    fn is_available(&self) -> bool;
    fn is_connected(&self) -> bool;
    async fn connect(&self) -> Result<(), AppError>;
    async fn disconnect(&self) -> Result<(), AppError>;
    async fn subscribe(&self, ticker: &Ticker) -> Result<(), AppError>;
    async fn unsubscribe(&self, ticker: &Ticker) -> Result<(), AppError>;
    async fn get_current_price(&self, ticker: &Ticker) -> Result<Quote, AppError>;
}

/// Default source, backed by C4. Always available; "connected" once
/// `connect()` is called, purely as bookkeeping since polling has no
/// persistent session to hold open.
pub struct PollingPriceSource {
    provider: Arc<dyn QuoteProvider>,
    connected: AtomicBool,
}

impl PollingPriceSource {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self {
            provider,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PriceSource for PollingPriceSource {
    fn source_name(&self) -> &str {
        "polling"
    }

    fn is_realtime(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> Result<(), AppError> {
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AppError> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn subscribe(&self, _ticker: &Ticker) -> Result<(), AppError> {
        Ok(())
    }

    async fn unsubscribe(&self, _ticker: &Ticker) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_current_price(&self, ticker: &Ticker) -> Result<Quote, AppError> {
        Ok(self.provider.current_quote(ticker).await?)
    }
}

/// Illustrative real-time source: activated only in scalping mode. A real
/// deployment would hold a websocket connection here; this one derives a
/// tick from the last polled quote so the streamer's scalping path has
/// something concrete to exercise end to end.
pub struct StubRealtimePriceSource {
    provider: Arc<dyn QuoteProvider>,
    connected: AtomicBool,
}

impl StubRealtimePriceSource {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self {
            provider,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PriceSource for StubRealtimePriceSource {
    fn source_name(&self) -> &str {
        "realtime-stub"
    }

    fn is_realtime(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> Result<(), AppError> {
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AppError> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn subscribe(&self, _ticker: &Ticker) -> Result<(), AppError> {
        Ok(())
    }

    async fn unsubscribe(&self, _ticker: &Ticker) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_current_price(&self, ticker: &Ticker) -> Result<Quote, AppError> {
        let mut quote = self.provider.current_quote(ticker).await?;
        quote.source = "realtime-stub".to_string();
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::quote_provider::OfflineQuoteProvider;

    fn ticker() -> Ticker {
        Ticker::new("AAPL").unwrap()
    }

    #[tokio::test]
    async fn polling_source_reports_connected_after_connect() {
        let source = PollingPriceSource::new(Arc::new(OfflineQuoteProvider::default()));
        assert!(!source.is_connected());
        source.connect().await.unwrap();
        assert!(source.is_connected());
    }

    #[tokio::test]
    async fn stub_realtime_source_tags_quote_source() {
        let source = StubRealtimePriceSource::new(Arc::new(OfflineQuoteProvider::default()));
        let quote = source.get_current_price(&ticker()).await.unwrap();
        assert_eq!(quote.source, "realtime-stub");
    }
}
