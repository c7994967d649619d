//! Outbound notification transport (ambient, §6). A single
//! `send_message(text, parse_mode="HTML")` primitive; richer helpers compose
//! formatted HTML over it. Delivery is best-effort and never blocks callers.

use async_trait::async_trait;
use tracing::warn;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_message(&self, text: &str);
}

/// Telegram Bot API sender. The actual HTTP call is the out-of-scope
/// collaborator (§1); this wraps the single primitive plus HTML formatting
/// helpers that stay in scope.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send_message(&self, text: &str) {
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            warn!("telegram not configured, dropping notification: {text}");
            return;
        };
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let result = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to deliver telegram notification");
        }
    }
}

/// A sink that records messages instead of delivering them, for tests and
/// for any offline/local-development wiring.
#[derive(Default)]
pub struct NullNotifier;

#[async_trait]
impl NotificationSink for NullNotifier {
    async fn send_message(&self, text: &str) {
        tracing::debug!(%text, "notification suppressed (null sink)");
    }
}

pub fn format_alert(ticker: &str, signal: &str, detail: &str) -> String {
    format!("<b>Alert: {ticker}</b>\n{signal}\n{detail}")
}

pub fn format_trade_opened(ticker: &str, direction: &str, entry: &str) -> String {
    format!("<b>Trade opened: {ticker}</b>\n{direction} @ {entry}")
}

pub fn format_trade_closed(ticker: &str, net_pnl: &str, r_multiple: &str) -> String {
    format!("<b>Trade closed: {ticker}</b>\nP&amp;L: {net_pnl} ({r_multiple}R)")
}

pub fn format_daily_summary(total_pnl: &str, trades_today: usize, win_rate: &str) -> String {
    format!("<b>Daily summary</b>\nP&amp;L: {total_pnl}\nTrades: {trades_today}\nWin rate: {win_rate}")
}
