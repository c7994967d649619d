//! sqlx-backed implementations of the journal (C11) and signal-history (C12)
//! repository traits, following the teacher's `TEXT`-encoded-decimal schema
//! convention (see `database.rs`) so exact decimal values round-trip through
//! SQLite without floating-point drift.

use crate::domain::repositories::{
    JournalRepository, PortfolioRepository, SignalHistoryRepository, SignalRecord, TradeRepository,
};
use crate::domain::trading::types::{Direction, JournalEntry, PortfolioPosition, Trade, TradeStatus};
use crate::domain::types::Ticker;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

fn parse_decimal_opt(raw: Option<String>) -> Result<Option<Decimal>> {
    raw.map(|s| Decimal::from_str(&s).context("stored decimal is malformed"))
        .transpose()
}

fn trade_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Trade> {
    let direction: String = row.try_get("direction")?;
    let status: String = row.try_get("status")?;
    Ok(Trade {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        ticker: Ticker::new(row.try_get::<String, _>("ticker")?)?,
        direction: match direction.as_str() {
            "long" => Direction::Long,
            "short" => Direction::Short,
            other => anyhow::bail!("unknown trade direction in store: {other}"),
        },
        status: match status.as_str() {
            "planned" => TradeStatus::Planned,
            "active" => TradeStatus::Active,
            "closed" => TradeStatus::Closed,
            "cancelled" => TradeStatus::Cancelled,
            other => anyhow::bail!("unknown trade status in store: {other}"),
        },
        entry_price: parse_decimal_opt(row.try_get("entry_price")?)?,
        exit_price: parse_decimal_opt(row.try_get("exit_price")?)?,
        stop_loss: parse_decimal_opt(row.try_get("stop_loss")?)?,
        take_profit: parse_decimal_opt(row.try_get("take_profit")?)?,
        position_size: parse_decimal_opt(row.try_get("position_size")?)?,
        entry_time: row.try_get("entry_time")?,
        exit_time: row.try_get("exit_time")?,
        gross_pnl: parse_decimal_opt(row.try_get("gross_pnl")?)?,
        net_pnl: parse_decimal_opt(row.try_get("net_pnl")?)?,
        fees: Decimal::from_str(&row.try_get::<String, _>("fees")?)?,
        r_multiple: parse_decimal_opt(row.try_get("r_multiple")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct SqliteTradeRepository {
    pool: SqlitePool,
}

impl SqliteTradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeRepository for SqliteTradeRepository {
    async fn save(&self, trade: &Trade) -> Result<()> {
        let direction = match trade.direction {
            Direction::Long => "long",
            Direction::Short => "short",
        };
        let status = match trade.status {
            TradeStatus::Planned => "planned",
            TradeStatus::Active => "active",
            TradeStatus::Closed => "closed",
            TradeStatus::Cancelled => "cancelled",
        };

        sqlx::query(
            r#"
            INSERT INTO trades (
                id, ticker, direction, status, entry_price, exit_price, stop_loss, take_profit,
                position_size, entry_time, exit_time, gross_pnl, net_pnl, fees, r_multiple,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                entry_price = excluded.entry_price,
                exit_price = excluded.exit_price,
                stop_loss = excluded.stop_loss,
                take_profit = excluded.take_profit,
                position_size = excluded.position_size,
                entry_time = excluded.entry_time,
                exit_time = excluded.exit_time,
                gross_pnl = excluded.gross_pnl,
                net_pnl = excluded.net_pnl,
                fees = excluded.fees,
                r_multiple = excluded.r_multiple,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(trade.id.to_string())
        .bind(trade.ticker.as_str())
        .bind(direction)
        .bind(status)
        .bind(trade.entry_price.map(|d| d.to_string()))
        .bind(trade.exit_price.map(|d| d.to_string()))
        .bind(trade.stop_loss.map(|d| d.to_string()))
        .bind(trade.take_profit.map(|d| d.to_string()))
        .bind(trade.position_size.map(|d| d.to_string()))
        .bind(trade.entry_time)
        .bind(trade.exit_time)
        .bind(trade.gross_pnl.map(|d| d.to_string()))
        .bind(trade.net_pnl.map(|d| d.to_string()))
        .bind(trade.fees.to_string())
        .bind(trade.r_multiple.map(|d| d.to_string()))
        .bind(trade.created_at)
        .bind(trade.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to upsert trade")?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Trade>> {
        let row = sqlx::query("SELECT * FROM trades WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(trade_from_row).transpose()
    }

    async fn find_by_ticker(&self, ticker: &Ticker) -> Result<Vec<Trade>> {
        let rows = sqlx::query("SELECT * FROM trades WHERE ticker = ? ORDER BY created_at DESC")
            .bind(ticker.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn find_by_status(&self, status: TradeStatus) -> Result<Vec<Trade>> {
        let status_str = match status {
            TradeStatus::Planned => "planned",
            TradeStatus::Active => "active",
            TradeStatus::Closed => "closed",
            TradeStatus::Cancelled => "cancelled",
        };
        let rows = sqlx::query("SELECT * FROM trades WHERE status = ? ORDER BY created_at DESC")
            .bind(status_str)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Trade>> {
        let rows = sqlx::query("SELECT * FROM trades ORDER BY created_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn get_all(&self) -> Result<Vec<Trade>> {
        let rows = sqlx::query("SELECT * FROM trades ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM trades").fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>("n")? as usize)
    }
}

pub struct SqliteJournalRepository {
    pool: SqlitePool,
}

impl SqliteJournalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn journal_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<JournalEntry> {
    Ok(JournalEntry {
        trade_id: Uuid::parse_str(&row.try_get::<String, _>("trade_id")?)?,
        setup: row.try_get("setup")?,
        thesis: row.try_get("thesis")?,
        emotional_state: row.try_get("emotional_state")?,
        execution_quality: row.try_get("execution_quality")?,
        process_compliance: row.try_get("process_compliance")?,
        quality_score: row.try_get::<Option<i64>, _>("quality_score")?.map(|v| v as u8),
        mistakes: row.try_get("mistakes")?,
        lessons: row.try_get("lessons")?,
    })
}

#[async_trait]
impl JournalRepository for SqliteJournalRepository {
    async fn save(&self, entry: &JournalEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO journal_entries (
                trade_id, setup, thesis, emotional_state, execution_quality,
                process_compliance, quality_score, mistakes, lessons
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (trade_id) DO UPDATE SET
                setup = excluded.setup,
                thesis = excluded.thesis,
                emotional_state = excluded.emotional_state,
                execution_quality = excluded.execution_quality,
                process_compliance = excluded.process_compliance,
                quality_score = excluded.quality_score,
                mistakes = excluded.mistakes,
                lessons = excluded.lessons
            "#,
        )
        .bind(entry.trade_id.to_string())
        .bind(&entry.setup)
        .bind(&entry.thesis)
        .bind(&entry.emotional_state)
        .bind(&entry.execution_quality)
        .bind(entry.process_compliance)
        .bind(entry.quality_score.map(|v| v as i64))
        .bind(&entry.mistakes)
        .bind(&entry.lessons)
        .execute(&self.pool)
        .await
        .context("failed to upsert journal entry")?;
        Ok(())
    }

    async fn find_by_trade_id(&self, trade_id: Uuid) -> Result<Option<JournalEntry>> {
        let row = sqlx::query("SELECT * FROM journal_entries WHERE trade_id = ?")
            .bind(trade_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(journal_from_row).transpose()
    }

    async fn delete(&self, trade_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM journal_entries WHERE trade_id = ?")
            .bind(trade_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct SqlitePortfolioRepository {
    pool: SqlitePool,
}

impl SqlitePortfolioRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn position_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PortfolioPosition> {
    Ok(PortfolioPosition {
        ticker: Ticker::new(row.try_get::<String, _>("ticker")?)?,
        shares: Decimal::from_str(&row.try_get::<String, _>("shares")?)?,
        avg_cost: Decimal::from_str(&row.try_get::<String, _>("avg_cost")?)?,
        current_price: Decimal::from_str(&row.try_get::<String, _>("current_price")?)?,
    })
}

#[async_trait]
impl PortfolioRepository for SqlitePortfolioRepository {
    async fn upsert_position(&self, position: &PortfolioPosition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO portfolio_positions (ticker, shares, avg_cost, current_price, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (ticker) DO UPDATE SET
                shares = excluded.shares,
                avg_cost = excluded.avg_cost,
                current_price = excluded.current_price,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(position.ticker.as_str())
        .bind(position.shares.to_string())
        .bind(position.avg_cost.to_string())
        .bind(position.current_price.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to upsert portfolio position")?;
        Ok(())
    }

    async fn remove_position(&self, ticker: &Ticker) -> Result<()> {
        sqlx::query("DELETE FROM portfolio_positions WHERE ticker = ?")
            .bind(ticker.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_positions(&self) -> Result<Vec<PortfolioPosition>> {
        let rows = sqlx::query("SELECT * FROM portfolio_positions").fetch_all(&self.pool).await?;
        rows.iter().map(position_from_row).collect()
    }

    async fn get_position(&self, ticker: &Ticker) -> Result<Option<PortfolioPosition>> {
        let row = sqlx::query("SELECT * FROM portfolio_positions WHERE ticker = ?")
            .bind(ticker.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(position_from_row).transpose()
    }
}

pub struct SqliteSignalHistoryRepository {
    pool: SqlitePool,
}

impl SqliteSignalHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn signal_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SignalRecord> {
    Ok(SignalRecord {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        ticker: Ticker::new(row.try_get::<String, _>("ticker")?)?,
        signal_type: row.try_get("signal_type")?,
        message: row.try_get("message")?,
        emitted_at: row.try_get("emitted_at")?,
    })
}

#[async_trait]
impl SignalHistoryRepository for SqliteSignalHistoryRepository {
    async fn record(&self, signal: &SignalRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_history (id, ticker, signal_type, message, emitted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(signal.id.to_string())
        .bind(signal.ticker.as_str())
        .bind(&signal.signal_type)
        .bind(&signal.message)
        .bind(signal.emitted_at)
        .execute(&self.pool)
        .await
        .context("failed to record signal")?;
        Ok(())
    }

    async fn last_for_ticker(&self, ticker: &Ticker) -> Result<Option<SignalRecord>> {
        let row = sqlx::query("SELECT * FROM signal_history WHERE ticker = ? ORDER BY emitted_at DESC LIMIT 1")
            .bind(ticker.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(signal_from_row).transpose()
    }

    async fn last_for_ticker_and_type(&self, ticker: &Ticker, signal_type: &str) -> Result<Option<SignalRecord>> {
        let row = sqlx::query(
            "SELECT * FROM signal_history WHERE ticker = ? AND signal_type = ? ORDER BY emitted_at DESC LIMIT 1",
        )
        .bind(ticker.as_str())
        .bind(signal_type)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(signal_from_row).transpose()
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SignalRecord>> {
        let rows = sqlx::query("SELECT * FROM signal_history ORDER BY emitted_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(signal_from_row).collect()
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM signal_history WHERE emitted_at >= ?")
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as usize)
    }

    async fn prune(&self, keep: usize) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM signal_history WHERE id NOT IN (
                SELECT id FROM signal_history ORDER BY emitted_at DESC LIMIT ?
            )
            "#,
        )
        .bind(keep as i64)
        .execute(&self.pool)
        .await
        .context("failed to prune signal history")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::Trade;
    use rust_decimal_macros::dec;

    async fn pool() -> SqlitePool {
        let db = crate::infrastructure::persistence::Database::new("sqlite::memory:").await.unwrap();
        db.pool
    }

    #[tokio::test]
    async fn trade_round_trips_through_save_and_find() {
        let repo = SqliteTradeRepository::new(pool().await);
        let trade = Trade::plan(
            Ticker::new("AAPL").unwrap(),
            Direction::Long,
            Some(dec!(95)),
            None,
            Some(dec!(10)),
        );
        repo.save(&trade).await.unwrap();
        let found = repo.find_by_id(trade.id).await.unwrap().unwrap();
        assert_eq!(found.ticker.as_str(), "AAPL");
        assert_eq!(found.status, TradeStatus::Planned);
        assert_eq!(found.stop_loss, Some(dec!(95)));
    }

    #[tokio::test]
    async fn trade_update_overwrites_prior_row() {
        let repo = SqliteTradeRepository::new(pool().await);
        let mut trade = Trade::plan(Ticker::new("MSFT").unwrap(), Direction::Long, Some(dec!(90)), None, Some(dec!(5)));
        repo.save(&trade).await.unwrap();
        trade.activate(dec!(100)).unwrap();
        repo.save(&trade).await.unwrap();

        let found = repo.find_by_id(trade.id).await.unwrap().unwrap();
        assert_eq!(found.status, TradeStatus::Active);
        assert_eq!(found.entry_price, Some(dec!(100)));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn signal_history_prunes_to_requested_count() {
        let repo = SqliteSignalHistoryRepository::new(pool().await);
        for i in 0..5 {
            repo.record(&SignalRecord {
                id: Uuid::new_v4(),
                ticker: Ticker::new("AAPL").unwrap(),
                signal_type: "rsi_oversold".to_string(),
                message: format!("signal {i}"),
                emitted_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        repo.prune(2).await.unwrap();
        let remaining = repo.recent(10).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
