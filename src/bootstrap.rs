//! Constructs and starts C1-C13 as one `Application` handle, so `main`
//! stays a thin process harness. Mirrors the teacher's
//! `Application::build(config)` static-constructor idiom
//! (`application::system::Application`), adapted to a headless worker with
//! no UI layer.

use crate::application::alert_watcher::AlertWatcher;
use crate::application::backtest_service::BacktestService;
use crate::application::broker_session::BrokerSession;
use crate::application::enrichment_pipeline::{EnrichmentPipeline, NeutralSentimentProvider};
use crate::application::journal_service::JournalService;
use crate::application::market_regime_service::MarketRegimeService;
use crate::application::monte_carlo_service::MonteCarloService;
use crate::application::notifications::{NotificationSink, TelegramNotifier};
use crate::application::price_source::{PollingPriceSource, PriceSource, StubRealtimePriceSource};
use crate::application::quote_provider::{FinnhubQuoteProvider, OfflineQuoteProvider, QuoteProvider};
use crate::application::streamer::HybridStreamer;
use crate::application::token_manager::{RefreshFailureNotifier, TokenManager};
use crate::config::Config;
use crate::domain::errors::AppError;
use crate::domain::repositories::{JournalRepository, PortfolioRepository, TradeRepository};
use crate::domain::token::TokenRecord;
use crate::infrastructure::persistence::{
    Database, SqliteJournalRepository, SqlitePortfolioRepository, SqliteSignalHistoryRepository, SqliteTradeRepository,
};
use crate::infrastructure::secret_store::{EncryptedFileStore, EncryptionKey, TokenScope};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shutdown budget for the alert watcher's scan-loop task, mirroring C6's
/// per-source budget (`streamer::SOURCE_SHUTDOWN_BUDGET`).
const ALERT_WATCHER_SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

/// Adapts the outbound notification trait to C2's terminal-refresh-failure
/// callback, so a failed credential refresh reaches the same channel C12's
/// alerts do.
struct NotifyOnRefreshFailure {
    notifier: Arc<dyn NotificationSink>,
}

#[async_trait]
impl RefreshFailureNotifier for NotifyOnRefreshFailure {
    async fn notify_refresh_failed(&self, user_id: &str, broker: &str, error: &str) {
        self.notifier
            .send_message(&format!("<b>token refresh failed</b> for {user_id}@{broker}: {error}"))
            .await;
    }
}

/// One running process's collaborators, held for the lifetime of `main`.
pub struct Application {
    pub database: Database,
    pub notifier: Arc<dyn NotificationSink>,
    pub token_manager: Arc<TokenManager>,
    pub broker_session: Arc<BrokerSession>,
    pub quote_provider: Arc<dyn QuoteProvider>,
    pub streamer: Arc<HybridStreamer>,
    pub enrichment_pipeline: Arc<EnrichmentPipeline>,
    pub monte_carlo: Arc<MonteCarloService>,
    pub backtest: Arc<BacktestService>,
    pub journal: Arc<JournalService>,
    pub alert_watcher: Arc<AlertWatcher>,
    pub market_regime: Arc<MarketRegimeService>,
    alert_watcher_task: Mutex<Option<JoinHandle<()>>>,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let encryption_key = EncryptionKey::from_base64(&config.encryption_key)?;

        let notifier: Arc<dyn NotificationSink> = Arc::new(TelegramNotifier::new(
            config.notifications.telegram_bot_token.clone(),
            config.notifications.telegram_chat_id.clone(),
        ));

        let database = Database::new(&config.database_url)
            .await
            .map_err(|e| AppError::DataFetch(e.to_string()))?;

        let trades: Arc<dyn TradeRepository> = Arc::new(SqliteTradeRepository::new(database.pool.clone()));
        let journal_repo: Arc<dyn JournalRepository> = Arc::new(SqliteJournalRepository::new(database.pool.clone()));
        let portfolio: Arc<dyn PortfolioRepository> = Arc::new(SqlitePortfolioRepository::new(database.pool.clone()));
        let signal_history = Arc::new(SqliteSignalHistoryRepository::new(database.pool.clone()));

        let broker_session = Arc::new(BrokerSession::new(
            config.broker.client_id.clone(),
            config.broker.client_secret.clone(),
            config.broker.redirect_uri.clone(),
            config.broker.auth_base_url.clone(),
            config.broker.api_base_url.clone(),
        )?);

        let token_store_path = format!("{}/tokens.enc", config.data_dir);
        let token_store = Arc::new(EncryptedFileStore::<TokenScope, TokenRecord>::new(
            token_store_path,
            encryption_key,
        ));
        let token_manager = Arc::new(TokenManager::new(
            token_store,
            broker_session.clone(),
            Arc::new(NotifyOnRefreshFailure {
                notifier: notifier.clone(),
            }),
        ));

        let quote_provider: Arc<dyn QuoteProvider> = match &config.quote_provider_api_key {
            Some(api_key) => Arc::new(FinnhubQuoteProvider::new(api_key.clone())),
            None => {
                warn!("FINNHUB_API_KEY not set, wiring the offline synthetic quote provider");
                Arc::new(OfflineQuoteProvider::default())
            }
        };

        let polling_source = Arc::new(PollingPriceSource::new(quote_provider.clone()));
        let realtime_source: Arc<dyn PriceSource> = Arc::new(StubRealtimePriceSource::new(quote_provider.clone()));
        let streamer = Arc::new(HybridStreamer::new(
            polling_source,
            vec![realtime_source],
            config.streamer.default_mode,
        ));

        let enrichment_pipeline = Arc::new(EnrichmentPipeline::new(
            quote_provider.clone(),
            Arc::new(NeutralSentimentProvider),
        ));
        let monte_carlo = Arc::new(MonteCarloService::new(quote_provider.clone()));
        let backtest = Arc::new(BacktestService::new(quote_provider.clone()));
        let journal = Arc::new(JournalService::new(trades, journal_repo));
        let alert_watcher = Arc::new(AlertWatcher::new(
            quote_provider.clone(),
            portfolio,
            signal_history,
            notifier.clone(),
            config.alert_watcher.clone(),
        ));
        let market_regime = Arc::new(MarketRegimeService::new(quote_provider.clone()));

        Ok(Self {
            database,
            notifier,
            token_manager,
            broker_session,
            quote_provider,
            streamer,
            enrichment_pipeline,
            monte_carlo,
            backtest,
            journal,
            alert_watcher,
            market_regime,
            alert_watcher_task: Mutex::new(None),
        })
    }

    /// Starts the long-lived background tasks (streamer poll loops, alert
    /// scan loop). Request-driven components (C7/C9/C10/C11/C13) need no
    /// explicit start.
    pub async fn start(&self) -> Result<(), AppError> {
        self.streamer.start().await?;
        let task = self.alert_watcher.start();
        *self.alert_watcher_task.lock().await = Some(task);
        info!("application started");
        Ok(())
    }

    /// Stops background tasks within their bounded shutdown budgets.
    pub async fn stop(&self) {
        self.alert_watcher.stop().await;
        if let Some(task) = self.alert_watcher_task.lock().await.take() {
            let _ = tokio::time::timeout(ALERT_WATCHER_SHUTDOWN_BUDGET, task).await;
        }
        self.streamer.stop().await;
        info!("application stopped");
    }
}
