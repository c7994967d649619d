//! SQLite-backed persistence for the trading journal (C11), backtest run
//! history (C10), and the alert signal log (C12).

use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Singleton database wrapper shared by every sqlx-backed repository.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initializes the schema. All statements are `CREATE TABLE IF NOT
    /// EXISTS`, so this is safe to call on every startup.
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Trades: the round-trip (or in-flight) position lifecycle (C11).
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                ticker TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_price TEXT,
                exit_price TEXT,
                stop_loss TEXT,
                take_profit TEXT,
                position_size TEXT,
                entry_time DATETIME,
                exit_time DATETIME,
                gross_pnl TEXT,
                net_pnl TEXT,
                fees TEXT NOT NULL,
                r_multiple TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trades table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_trades_ticker ON trades (ticker);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trades ticker index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_trades_status ON trades (status);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trades status index")?;

        // 2. Journal entries: one-to-one with a trade (C11).
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal_entries (
                trade_id TEXT PRIMARY KEY,
                setup TEXT,
                thesis TEXT,
                emotional_state TEXT,
                execution_quality TEXT,
                process_compliance BOOLEAN,
                quality_score INTEGER,
                mistakes TEXT,
                lessons TEXT,
                FOREIGN KEY (trade_id) REFERENCES trades (id)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create journal_entries table")?;

        // 3. Portfolio positions: the broker-reported (or simulated) open
        // position set, upserted by ticker.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_positions (
                ticker TEXT PRIMARY KEY,
                shares TEXT NOT NULL,
                avg_cost TEXT NOT NULL,
                current_price TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create portfolio_positions table")?;

        // 4. Backtest runs: durable results for C10, one row per completed run.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_runs (
                id TEXT PRIMARY KEY,
                config_json TEXT NOT NULL,
                result_json TEXT NOT NULL,
                started_at DATETIME NOT NULL,
                completed_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create backtest_runs table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_backtest_runs_completed
            ON backtest_runs (completed_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create backtest_runs index")?;

        // 5. Signal history: C12's emitted alerts, capped to the 500 most
        // recent by the repository layer rather than by schema constraint.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_history (
                id TEXT PRIMARY KEY,
                ticker TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                message TEXT NOT NULL,
                emitted_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signal_history table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_signal_history_ticker_type
            ON signal_history (ticker, signal_type, emitted_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signal_history index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
