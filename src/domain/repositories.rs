//! Repository trait abstractions for the trading journal store, separating
//! the domain's trade/journal/position entities from the SQLite-backed
//! implementations in `infrastructure::persistence`.

use crate::domain::trading::types::{JournalEntry, PortfolioPosition, Trade, TradeStatus};
use crate::domain::types::Ticker;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persists and retrieves `Trade` records through their full lifecycle.
#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn save(&self, trade: &Trade) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Trade>>;

    async fn find_by_ticker(&self, ticker: &Ticker) -> Result<Vec<Trade>>;

    async fn find_by_status(&self, status: TradeStatus) -> Result<Vec<Trade>>;

    async fn find_recent(&self, limit: usize) -> Result<Vec<Trade>>;

    async fn get_all(&self) -> Result<Vec<Trade>>;

    async fn count(&self) -> Result<usize>;
}

/// Persists the pre-trade thesis and post-trade review attached to a trade.
/// One `JournalEntry` per `Trade`, keyed by `trade_id`.
#[async_trait]
pub trait JournalRepository: Send + Sync {
    async fn save(&self, entry: &JournalEntry) -> Result<()>;

    async fn find_by_trade_id(&self, trade_id: Uuid) -> Result<Option<JournalEntry>>;

    async fn delete(&self, trade_id: Uuid) -> Result<()>;
}

/// Tracks the broker-reported (or backtest-simulated) open position set.
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    async fn upsert_position(&self, position: &PortfolioPosition) -> Result<()>;

    async fn remove_position(&self, ticker: &Ticker) -> Result<()>;

    async fn get_positions(&self) -> Result<Vec<PortfolioPosition>>;

    async fn get_position(&self, ticker: &Ticker) -> Result<Option<PortfolioPosition>>;
}

/// One emitted alert, as recorded by the alert watcher (C12).
#[derive(Debug, Clone)]
pub struct SignalRecord {
    pub id: Uuid,
    pub ticker: Ticker,
    pub signal_type: String,
    pub message: String,
    pub emitted_at: DateTime<Utc>,
}

/// Persists the alert watcher's emitted-signal log, capped to the 500 most
/// recent records, and serves the cooldown/dedup and stats queries it needs.
#[async_trait]
pub trait SignalHistoryRepository: Send + Sync {
    async fn record(&self, signal: &SignalRecord) -> Result<()>;

    /// Most recent signal for `ticker`, of any type, if one exists.
    async fn last_for_ticker(&self, ticker: &Ticker) -> Result<Option<SignalRecord>>;

    /// Most recent signal for `(ticker, signal_type)`, used for cooldown checks.
    async fn last_for_ticker_and_type(&self, ticker: &Ticker, signal_type: &str) -> Result<Option<SignalRecord>>;

    async fn recent(&self, limit: usize) -> Result<Vec<SignalRecord>>;

    async fn count_since(&self, since: DateTime<Utc>) -> Result<usize>;

    /// Deletes all but the `keep` most recently emitted records.
    async fn prune(&self, keep: usize) -> Result<()>;
}
