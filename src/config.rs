//! Environment/file-based configuration, loaded once at startup.
//!
//! Mirrors the teacher's `Config::from_env()` idiom (explicit `env::var`
//! reads with documented defaults, fail-fast on a missing required var) but
//! the field set reflects this crate's own components instead of the
//! teacher's strategy-bot surface.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEnv {
    Sim,
    Live,
}

impl BrokerEnv {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_uppercase().as_str() {
            "SIM" => Ok(BrokerEnv::Sim),
            "LIVE" => Ok(BrokerEnv::Live),
            other => anyhow::bail!("BROKER_ENV must be SIM or LIVE, got '{other}'"),
        }
    }
}

/// Broker OAuth2 client registration, used by C3 to build the authorization
/// URL and exchange/refresh tokens.
#[derive(Debug, Clone)]
pub struct BrokerOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_base_url: String,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AlertWatcherConfig {
    pub enabled: bool,
    pub scan_interval: Duration,
    pub cooldown_minutes: i64,
    pub trading_hours_only: bool,
}

#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub default_mode: crate::domain::streaming::TradingMode,
}

/// Flat struct loaded by `Config::from_env()`. Unset required vars fail
/// fast at startup; optional vars fall back to the defaults documented
/// alongside each field below.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base64-encoded 32-byte AEAD key backing C1's encrypted file store.
    pub encryption_key: String,
    pub broker_env: BrokerEnv,
    pub broker: BrokerOAuthConfig,
    pub notifications: NotificationConfig,
    /// Bypasses the encrypted config store in favour of pure env vars, for
    /// local development and CI.
    pub force_env_config: bool,
    pub database_url: String,
    pub data_dir: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub alert_watcher: AlertWatcherConfig,
    pub streamer: StreamerConfig,
    pub quote_provider_deadline: Duration,
    pub observability_port: u16,
    /// Finnhub API key; when unset, bootstrap wires the deterministic
    /// offline quote provider instead of the Finnhub-backed one.
    pub quote_provider_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let encryption_key =
            env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY must be set (base64, 32 bytes)")?;

        let broker_env = match env::var("BROKER_ENV") {
            Ok(raw) => BrokerEnv::parse(&raw)?,
            Err(_) => BrokerEnv::Sim,
        };

        let broker = BrokerOAuthConfig {
            client_id: env::var("BROKER_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("BROKER_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: env::var("BROKER_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:8787/callback".to_string()),
            auth_base_url: env::var("BROKER_AUTH_BASE_URL")
                .unwrap_or_else(|_| "https://sim.logonvalidation.net".to_string()),
            api_base_url: env::var("BROKER_API_BASE_URL")
                .unwrap_or_else(|_| "https://gateway.saxobank.com/sim/openapi".to_string()),
        };

        let notifications = NotificationConfig {
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
        };

        let force_env_config = env_bool("FORCE_ENV_CONFIG", false);

        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{data_dir}/marketloom.db"));

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let alert_watcher = AlertWatcherConfig {
            enabled: env_bool("ALERT_WATCHER_ENABLED", true),
            scan_interval: Duration::from_secs(env_u64("ALERT_SCAN_INTERVAL_SECS", 300)),
            cooldown_minutes: env_i64("ALERT_COOLDOWN_MINUTES", 60),
            trading_hours_only: env_bool("ALERT_TRADING_HOURS_ONLY", false),
        };

        let streamer = StreamerConfig {
            default_mode: match env::var("STREAMER_DEFAULT_MODE").as_deref() {
                Ok("scalping") => crate::domain::streaming::TradingMode::Scalping,
                Ok("swing") => crate::domain::streaming::TradingMode::Swing,
                _ => crate::domain::streaming::TradingMode::LongTerm,
            },
        };

        Ok(Self {
            encryption_key,
            broker_env,
            broker,
            notifications,
            force_env_config,
            database_url,
            data_dir,
            log_level,
            log_format,
            alert_watcher,
            streamer,
            quote_provider_deadline: Duration::from_secs(env_u64("QUOTE_PROVIDER_DEADLINE_SECS", 30)),
            observability_port: env_u64("OBSERVABILITY_PORT", 9464) as u16,
            quote_provider_api_key: env::var("FINNHUB_API_KEY").ok(),
        })
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse::<u64>().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse::<i64>().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_encryption_key_fails_fast() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("ENCRYPTION_KEY");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn defaults_apply_when_optional_vars_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("ENCRYPTION_KEY", "dGVzdC1rZXktMzItYnl0ZXMtbG9uZy1wYWRkZWQhIQ==");
        env::remove_var("BROKER_ENV");
        let config = Config::from_env().unwrap();
        assert_eq!(config.broker_env, BrokerEnv::Sim);
        assert!(config.database_url.starts_with("sqlite://"));
        env::remove_var("ENCRYPTION_KEY");
    }

    #[test]
    fn broker_env_parses_live() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("ENCRYPTION_KEY", "dGVzdC1rZXktMzItYnl0ZXMtbG9uZy1wYWRkZWQhIQ==");
        env::set_var("BROKER_ENV", "live");
        let config = Config::from_env().unwrap();
        assert_eq!(config.broker_env, BrokerEnv::Live);
        env::remove_var("BROKER_ENV");
        env::remove_var("ENCRYPTION_KEY");
    }
}
