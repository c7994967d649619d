//! S6 — trade close integrity (spec §8 scenario 6).
//!
//! Plans a long trade (entry 100, stop 95, size 10), activates it, closes it
//! at 110 with 1 in fees, and checks the lifecycle numbers and that a
//! second close is rejected without mutating the already-closed trade.

use marketloom::application::journal_service::JournalService;
use marketloom::domain::errors::AppError;
use marketloom::domain::repositories::{JournalRepository, TradeRepository};
use marketloom::domain::trading::types::{Direction, TradeStatus};
use marketloom::domain::types::Ticker;
use marketloom::infrastructure::persistence::{Database, SqliteJournalRepository, SqliteTradeRepository};
use rust_decimal_macros::dec;
use std::sync::Arc;

async fn service() -> JournalService {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let trades: Arc<dyn TradeRepository> = Arc::new(SqliteTradeRepository::new(db.pool.clone()));
    let journal: Arc<dyn JournalRepository> = Arc::new(SqliteJournalRepository::new(db.pool.clone()));
    JournalService::new(trades, journal)
}

#[tokio::test]
async fn close_computes_expected_pnl_and_rejects_a_second_close() {
    let service = service().await;

    let trade = service
        .create_trade(Ticker::new("AAPL").unwrap(), Direction::Long, Some(dec!(95)), None, Some(dec!(10)), None)
        .await
        .unwrap();
    let trade = service.activate(trade.id, dec!(100)).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Active);

    let closed = service.close(trade.id, dec!(110), dec!(1)).await.unwrap();
    assert_eq!(closed.status, TradeStatus::Closed);
    assert_eq!(closed.gross_pnl, Some(dec!(100)));
    assert_eq!(closed.net_pnl, Some(dec!(99)));
    assert_eq!(closed.r_multiple, Some(dec!(1.98)));

    let second_close = service.close(trade.id, dec!(120), dec!(1)).await;
    assert!(second_close.is_err());
    assert!(matches!(second_close.unwrap_err(), AppError::Validation(_)));

    // The trade itself was not mutated by the rejected second close.
    let persisted = service.activate(trade.id, dec!(999)).await;
    assert!(persisted.is_err(), "an already-closed trade cannot be re-activated either");
}
