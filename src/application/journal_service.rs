//! C11 Trading Journal Store: orchestrates the `Trade`/`JournalEntry`
//! lifecycle transitions over the sqlx-backed repositories, and derives
//! on-demand statistics (overall, and broken down per-setup/per-emotion).

use crate::domain::errors::{AppError, JournalError};
use crate::domain::repositories::{JournalRepository, TradeRepository};
use crate::domain::trading::types::{Direction, JournalEntry, Trade, TradeStatistics, TradeStatus};
use crate::domain::types::Ticker;
use crate::infrastructure::observability::metrics;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct JournalService {
    trades: Arc<dyn TradeRepository>,
    journal: Arc<dyn JournalRepository>,
}

impl JournalService {
    pub fn new(trades: Arc<dyn TradeRepository>, journal: Arc<dyn JournalRepository>) -> Self {
        Self { trades, journal }
    }

    /// Plans a trade, optionally pairing it with a journal entry holding the
    /// pre-trade thesis.
    pub async fn create_trade(
        &self,
        ticker: Ticker,
        direction: Direction,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        position_size: Option<Decimal>,
        entry: Option<JournalEntry>,
    ) -> Result<Trade, AppError> {
        let trade = Trade::plan(ticker, direction, stop_loss, take_profit, position_size);
        self.trades.save(&trade).await.map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?;
        if let Some(mut entry) = entry {
            entry.trade_id = trade.id;
            self.journal
                .save(&entry)
                .await
                .map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?;
        }
        self.refresh_trade_count_gauge(TradeStatus::Planned).await;
        Ok(trade)
    }

    pub async fn activate(&self, trade_id: Uuid, entry_price: Decimal) -> Result<Trade, AppError> {
        let mut trade = self.get(trade_id).await?;
        trade.activate(entry_price)?;
        self.trades.save(&trade).await.map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?;
        self.refresh_trade_count_gauge(TradeStatus::Active).await;
        Ok(trade)
    }

    pub async fn close(&self, trade_id: Uuid, exit_price: Decimal, fees: Decimal) -> Result<Trade, AppError> {
        let mut trade = self.get(trade_id).await?;
        trade.close(exit_price, fees)?;
        self.trades.save(&trade).await.map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?;
        self.refresh_trade_count_gauge(TradeStatus::Closed).await;
        Ok(trade)
    }

    pub async fn cancel(&self, trade_id: Uuid) -> Result<Trade, AppError> {
        let mut trade = self.get(trade_id).await?;
        trade.cancel();
        self.trades.save(&trade).await.map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?;
        self.refresh_trade_count_gauge(TradeStatus::Cancelled).await;
        Ok(trade)
    }

    async fn refresh_trade_count_gauge(&self, status: TradeStatus) {
        if let Ok(trades) = self.trades.find_by_status(status).await {
            metrics::set_journal_trade_count(status_label(status), trades.len() as f64);
        }
    }

    pub async fn delete(&self, trade_id: Uuid) -> Result<(), AppError> {
        self.journal
            .delete(trade_id)
            .await
            .map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?;
        Ok(())
    }

    async fn get(&self, trade_id: Uuid) -> Result<Trade, AppError> {
        self.trades
            .find_by_id(trade_id)
            .await
            .map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?
            .ok_or(JournalError::NotFound(trade_id))
            .map_err(AppError::from)
    }

    /// Win rate, average win/loss, profit factor, expectancy, and average
    /// R-multiple over every closed trade.
    pub async fn statistics(&self) -> Result<TradeStatistics, AppError> {
        let closed = self
            .trades
            .find_by_status(TradeStatus::Closed)
            .await
            .map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?;
        Ok(TradeStatistics::compute(&closed))
    }

    /// Breaks down closed-trade statistics by the journal entry's `setup`
    /// field, joining each closed trade to its paired entry.
    pub async fn statistics_by_setup(&self) -> Result<HashMap<String, TradeStatistics>, AppError> {
        self.statistics_by_journal_field(|entry| entry.setup.clone()).await
    }

    /// Breaks down closed-trade statistics by the journal entry's
    /// `emotional_state` field.
    pub async fn statistics_by_emotion(&self) -> Result<HashMap<String, TradeStatistics>, AppError> {
        self.statistics_by_journal_field(|entry| entry.emotional_state.clone()).await
    }

    async fn statistics_by_journal_field(
        &self,
        field: impl Fn(&JournalEntry) -> Option<String>,
    ) -> Result<HashMap<String, TradeStatistics>, AppError> {
        let closed = self
            .trades
            .find_by_status(TradeStatus::Closed)
            .await
            .map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?;

        let mut grouped: HashMap<String, Vec<Trade>> = HashMap::new();
        for trade in closed {
            let entry = self
                .journal
                .find_by_trade_id(trade.id)
                .await
                .map_err(|e| AppError::from(JournalError::Database(sqlx_err(e))))?;
            let Some(key) = entry.and_then(|e| field(&e)) else {
                continue;
            };
            grouped.entry(key).or_default().push(trade);
        }

        Ok(grouped
            .into_iter()
            .map(|(key, trades)| (key, TradeStatistics::compute(&trades)))
            .collect())
    }
}

/// The repository traits return `anyhow::Error` (they sit behind `anyhow`
/// at the persistence boundary per `domain::repositories`); this adapts one
/// into the `sqlx::Error` variant `JournalError::Database` expects by
/// downcasting where possible and falling back to a generic database error.
fn sqlx_err(e: anyhow::Error) -> sqlx::Error {
    e.downcast::<sqlx::Error>()
        .unwrap_or_else(|e| sqlx::Error::Protocol(e.to_string()))
}

fn status_label(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Planned => "planned",
        TradeStatus::Active => "active",
        TradeStatus::Closed => "closed",
        TradeStatus::Cancelled => "cancelled",
    }
}
