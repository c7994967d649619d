use crate::domain::errors::JournalError;
use crate::domain::types::Ticker;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TradeStatus {
    Planned,
    Active,
    Closed,
    Cancelled,
}

/// A single round-trip (or in-flight) position. Lifecycle: `planned -> active
/// -> closed`, or any state `-> cancelled`. `closed` is terminal and freezes
/// the realised P&L fields; any further `close()` call is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub ticker: Ticker,
    pub direction: Direction,
    pub status: TradeStatus,
    pub entry_price: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub position_size: Option<Decimal>,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub gross_pnl: Option<Decimal>,
    pub net_pnl: Option<Decimal>,
    pub fees: Decimal,
    pub r_multiple: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    pub fn plan(
        ticker: Ticker,
        direction: Direction,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        position_size: Option<Decimal>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ticker,
            direction,
            status: TradeStatus::Planned,
            entry_price: None,
            exit_price: None,
            stop_loss,
            take_profit,
            position_size,
            entry_time: None,
            exit_time: None,
            gross_pnl: None,
            net_pnl: None,
            fees: Decimal::ZERO,
            r_multiple: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Only valid from `planned`. Moves to `active` and records entry.
    pub fn activate(&mut self, entry_price: Decimal) -> Result<(), JournalError> {
        if self.status != TradeStatus::Planned {
            return Err(JournalError::InvalidTransition(format!(
                "cannot activate trade in status {:?}",
                self.status
            )));
        }
        self.entry_price = Some(entry_price);
        self.entry_time = Some(Utc::now());
        self.status = TradeStatus::Active;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Only valid from `active`. Computes and freezes P&L and R-multiple.
    /// A second call on an already-closed trade returns an error without
    /// mutating state, matching the journal's "closed is terminal" invariant.
    pub fn close(&mut self, exit_price: Decimal, fees: Decimal) -> Result<(), JournalError> {
        if self.status != TradeStatus::Active {
            return Err(JournalError::InvalidTransition(format!(
                "cannot close trade in status {:?}",
                self.status
            )));
        }
        let entry = self
            .entry_price
            .expect("active trade always has an entry_price");
        let size = self.position_size.unwrap_or(Decimal::ONE);

        let signed_move = match self.direction {
            Direction::Long => exit_price - entry,
            Direction::Short => entry - exit_price,
        };
        let gross = signed_move * size;
        let net = gross - fees;

        self.r_multiple = self.stop_loss.and_then(|stop| {
            let risk_denom = (entry - stop).abs() * size;
            if risk_denom.is_zero() {
                None
            } else {
                Some(net / risk_denom)
            }
        });

        self.exit_price = Some(exit_price);
        self.exit_time = Some(Utc::now());
        self.fees = fees;
        self.gross_pnl = Some(gross);
        self.net_pnl = Some(net);
        self.status = TradeStatus::Closed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Any state moves to `cancelled`.
    pub fn cancel(&mut self) {
        self.status = TradeStatus::Cancelled;
        self.updated_at = Utc::now();
    }
}

/// Pre-trade thesis and post-trade review, one-to-one with a `Trade`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub trade_id: Uuid,
    pub setup: Option<String>,
    pub thesis: Option<String>,
    pub emotional_state: Option<String>,
    pub execution_quality: Option<String>,
    pub process_compliance: Option<bool>,
    pub quality_score: Option<u8>,
    pub mistakes: Option<String>,
    pub lessons: Option<String>,
}

impl JournalEntry {
    pub fn new(trade_id: Uuid) -> Self {
        Self {
            trade_id,
            setup: None,
            thesis: None,
            emotional_state: None,
            execution_quality: None,
            process_compliance: None,
            quality_score: None,
            mistakes: None,
            lessons: None,
        }
    }
}

/// A held position, as reported by the broker or the backtest ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub ticker: Ticker,
    pub shares: Decimal,
    pub avg_cost: Decimal,
    pub current_price: Decimal,
}

impl PortfolioPosition {
    pub fn value(&self) -> Decimal {
        self.shares * self.current_price
    }

    pub fn pnl(&self) -> Decimal {
        (self.current_price - self.avg_cost) * self.shares
    }

    pub fn pnl_percent(&self) -> Decimal {
        if self.avg_cost.is_zero() {
            Decimal::ZERO
        } else {
            (self.current_price - self.avg_cost) / self.avg_cost
        }
    }
}

/// Derived, on-demand statistics over a set of closed trades.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TradeStatistics {
    pub total_trades: usize,
    pub win_rate: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub profit_factor: Decimal,
    pub expectancy: Decimal,
    pub avg_r_multiple: Decimal,
}

impl TradeStatistics {
    pub fn compute(closed_trades: &[Trade]) -> Self {
        let pnls: Vec<Decimal> = closed_trades.iter().filter_map(|t| t.net_pnl).collect();
        if pnls.is_empty() {
            return Self::default();
        }

        let wins: Vec<Decimal> = pnls.iter().copied().filter(|p| *p > Decimal::ZERO).collect();
        let losses: Vec<Decimal> = pnls.iter().copied().filter(|p| *p < Decimal::ZERO).collect();

        let total = pnls.len();
        let win_rate = Decimal::from(wins.len()) / Decimal::from(total);
        let loss_rate = Decimal::ONE - win_rate;

        let avg_win = if wins.is_empty() {
            Decimal::ZERO
        } else {
            wins.iter().sum::<Decimal>() / Decimal::from(wins.len())
        };
        let avg_loss = if losses.is_empty() {
            Decimal::ZERO
        } else {
            losses.iter().sum::<Decimal>().abs() / Decimal::from(losses.len())
        };

        let gross_win: Decimal = wins.iter().sum();
        let gross_loss: Decimal = losses.iter().sum::<Decimal>().abs();
        let profit_factor = if gross_loss.is_zero() {
            Decimal::ZERO
        } else {
            gross_win / gross_loss
        };

        let expectancy = win_rate * avg_win - loss_rate * avg_loss;

        let r_multiples: Vec<Decimal> = closed_trades.iter().filter_map(|t| t.r_multiple).collect();
        let avg_r_multiple = if r_multiples.is_empty() {
            Decimal::ZERO
        } else {
            r_multiples.iter().sum::<Decimal>() / Decimal::from(r_multiples.len())
        };

        Self {
            total_trades: total,
            win_rate,
            avg_win,
            avg_loss,
            profit_factor,
            expectancy,
            avg_r_multiple,
        }
    }
}
