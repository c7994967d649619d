use crate::domain::types::Ticker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubscriptionPriority {
    Normal = 1,
    High = 2,
    Critical = 3,
}

/// One record per subscribed ticker across all clients. `subscribe` is
/// idempotent per ticker: a repeat call only raises the priority if the
/// new request asks for more than the existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub ticker: Ticker,
    pub priority: SubscriptionPriority,
    pub source_hint: Option<String>,
    pub subscribed_at: DateTime<Utc>,
}

/// `TradingMode` governs the streamer's scheduling policy: which poll tasks
/// run at what cadence, and whether real-time sources are active at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    LongTerm,
    Swing,
    Scalping,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModeSchedule {
    pub poll_interval: Duration,
    pub priority_interval: Duration,
    pub use_websocket: bool,
}

impl TradingMode {
    pub fn schedule(&self) -> ModeSchedule {
        match self {
            TradingMode::LongTerm => ModeSchedule {
                poll_interval: Duration::from_secs(300),
                priority_interval: Duration::from_secs(60),
                use_websocket: false,
            },
            TradingMode::Swing => ModeSchedule {
                poll_interval: Duration::from_secs(60),
                priority_interval: Duration::from_secs(15),
                use_websocket: false,
            },
            TradingMode::Scalping => ModeSchedule {
                poll_interval: Duration::from_secs(2),
                priority_interval: Duration::from_secs(1),
                use_websocket: true,
            },
        }
    }
}

/// Minimum polling cadence retained as a safety net even when a real-time
/// feed is active in scalping mode.
pub const SCALPING_POLL_FLOOR: Duration = Duration::from_secs(2);

/// The complete set of desired subscriptions known to the streamer, keyed
/// by ticker. Not a handle to the running tasks — a plain state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionRegistry {
    subscriptions: HashMap<Ticker, SubscriptionState>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent per ticker: a repeat call raises priority but never lowers
    /// it, and keeps the original `subscribed_at`.
    pub fn subscribe(&mut self, ticker: Ticker, priority: SubscriptionPriority, source_hint: Option<String>) {
        self.subscriptions
            .entry(ticker.clone())
            .and_modify(|existing| {
                if priority > existing.priority {
                    existing.priority = priority;
                }
            })
            .or_insert_with(|| SubscriptionState {
                ticker,
                priority,
                source_hint,
                subscribed_at: Utc::now(),
            });
    }

    pub fn unsubscribe(&mut self, ticker: &Ticker) {
        self.subscriptions.remove(ticker);
    }

    pub fn tickers_at_or_above(&self, priority: SubscriptionPriority) -> Vec<Ticker> {
        self.subscriptions
            .values()
            .filter(|s| s.priority >= priority)
            .map(|s| s.ticker.clone())
            .collect()
    }

    pub fn all_tickers(&self) -> Vec<Ticker> {
        self.subscriptions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl() -> Ticker {
        Ticker::new("AAPL").unwrap()
    }

    #[test]
    fn subscribe_is_idempotent_and_raises_priority() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(aapl(), SubscriptionPriority::Normal, None);
        registry.subscribe(aapl(), SubscriptionPriority::Critical, None);
        assert_eq!(registry.len(), 1);
        let tickers = registry.tickers_at_or_above(SubscriptionPriority::High);
        assert_eq!(tickers.len(), 1);
    }

    #[test]
    fn repeat_subscribe_never_lowers_priority() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(aapl(), SubscriptionPriority::Critical, None);
        registry.subscribe(aapl(), SubscriptionPriority::Normal, None);
        assert_eq!(
            registry.tickers_at_or_above(SubscriptionPriority::Critical).len(),
            1
        );
    }

    #[test]
    fn scalping_mode_enables_websocket_with_poll_floor() {
        let schedule = TradingMode::Scalping.schedule();
        assert!(schedule.use_websocket);
        assert!(schedule.poll_interval >= SCALPING_POLL_FLOOR);
    }

    #[test]
    fn unsubscribe_removes_ticker() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(aapl(), SubscriptionPriority::Normal, None);
        registry.unsubscribe(&aapl());
        assert!(registry.is_empty());
    }
}
