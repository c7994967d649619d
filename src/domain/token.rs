use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const ACCESS_REFRESH_THRESHOLD_SECS: i64 = 600;
const REFRESH_TOKEN_REFRESH_THRESHOLD_SECS: i64 = 1200;
const MIN_CHECK_INTERVAL_SECS: i64 = 60;

/// Persisted OAuth token material for a broker connection. `access_token`
/// and `refresh_token` are stored encrypted at rest by C1; this type carries
/// them in plaintext only while resident in memory. Invariant: `expires_at >
/// created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub broker: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl TokenRecord {
    pub fn new(
        broker: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Duration,
        refresh_expires_in: Option<Duration>,
    ) -> Self {
        let now = Utc::now();
        Self {
            broker: broker.into(),
            access_token: access_token.into(),
            refresh_token,
            expires_at: now + expires_in,
            refresh_expires_at: refresh_expires_in.map(|d| now + d),
            created_at: now,
            last_refresh: None,
        }
    }

    pub fn access_ttl_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }

    pub fn refresh_ttl_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.refresh_expires_at.map(|exp| (exp - now).num_seconds())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_ttl_seconds(now) <= 0
    }

    /// Refresh iff the access token has under 600s left, or the refresh
    /// token itself has under 1200s left (the more critical threshold).
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.access_ttl_seconds(now) < ACCESS_REFRESH_THRESHOLD_SECS
            || self
                .refresh_ttl_seconds(now)
                .is_some_and(|ttl| ttl < REFRESH_TOKEN_REFRESH_THRESHOLD_SECS)
    }

    /// `max(60, min(access_ttl, refresh_ttl) / 2)`, the interval until C2
    /// should re-examine this token.
    pub fn next_check_interval(&self, now: DateTime<Utc>) -> Duration {
        let access_ttl = self.access_ttl_seconds(now);
        let bound = match self.refresh_ttl_seconds(now) {
            Some(refresh_ttl) => access_ttl.min(refresh_ttl),
            None => access_ttl,
        };
        Duration::seconds((bound / 2).max(MIN_CHECK_INTERVAL_SECS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
    Valid,
    ExpiringSoon,
    Expired,
    Missing,
    RefreshFailed,
}

/// Derived, never stored: always recomputed from the live `TokenRecord`
/// plus C2's own failure counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHealth {
    pub status: TokenStatus,
    pub access_ttl_seconds: Option<i64>,
    pub refresh_ttl_seconds: Option<i64>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub next_refresh_delay: Duration,
}

impl TokenHealth {
    pub fn derive(record: Option<&TokenRecord>, now: DateTime<Utc>, consecutive_failures: u32) -> Self {
        match record {
            None => Self {
                status: TokenStatus::Missing,
                access_ttl_seconds: None,
                refresh_ttl_seconds: None,
                last_refresh: None,
                consecutive_failures,
                next_refresh_delay: Duration::seconds(MIN_CHECK_INTERVAL_SECS),
            },
            Some(record) => {
                let status = if record.is_expired(now) {
                    TokenStatus::Expired
                } else if record.needs_refresh(now) {
                    TokenStatus::ExpiringSoon
                } else {
                    TokenStatus::Valid
                };
                Self {
                    status,
                    access_ttl_seconds: Some(record.access_ttl_seconds(now)),
                    refresh_ttl_seconds: record.refresh_ttl_seconds(now),
                    last_refresh: record.last_refresh,
                    consecutive_failures,
                    next_refresh_delay: record.next_check_interval(now),
                }
            }
        }
    }
}

/// Outcome of a single `check_and_refresh()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResult {
    pub success: bool,
    pub status: TokenStatus,
    pub access_ttl: Option<i64>,
    pub refresh_ttl: Option<i64>,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Exponential backoff, capped, with a non-retryable error-string denylist
/// matching the broker's OAuth error vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

const NON_RETRYABLE_ERRORS: &[&str] = &["invalid_grant", "unauthorized", "invalid_client"];

impl RetryPolicy {
    pub fn is_retryable(&self, error: &str) -> bool {
        !NON_RETRYABLE_ERRORS.iter().any(|needle| error.contains(needle))
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2i64.saturating_pow(attempt.min(20));
        let millis = (self.base_delay.num_milliseconds().saturating_mul(factor))
            .min(self.max_delay.num_milliseconds());
        Duration::milliseconds(millis)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::seconds(1),
            max_delay: Duration::seconds(30),
            max_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_token(access_secs: i64, refresh_secs: Option<i64>) -> TokenRecord {
        TokenRecord::new(
            "alpaca",
            "tok",
            Some("refresh".into()),
            Duration::seconds(access_secs),
            refresh_secs.map(Duration::seconds),
        )
    }

    #[test]
    fn needs_refresh_on_access_threshold() {
        let record = fresh_token(500, Some(10_000));
        assert!(record.needs_refresh(record.created_at));
    }

    #[test]
    fn needs_refresh_on_refresh_token_threshold() {
        let record = fresh_token(10_000, Some(1000));
        assert!(record.needs_refresh(record.created_at));
    }

    #[test]
    fn healthy_when_both_far_from_expiry() {
        let record = fresh_token(10_000, Some(10_000));
        assert!(!record.needs_refresh(record.created_at));
    }

    #[test]
    fn next_check_interval_floors_at_60_seconds() {
        let record = fresh_token(30, Some(40));
        assert_eq!(record.next_check_interval(record.created_at), Duration::seconds(60));
    }

    #[test]
    fn health_missing_when_no_record() {
        let health = TokenHealth::derive(None, Utc::now(), 0);
        assert_eq!(health.status, TokenStatus::Missing);
    }

    #[test]
    fn retry_policy_rejects_denylisted_errors() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_retryable("invalid_grant: token revoked"));
        assert!(policy.is_retryable("timeout"));
    }

    #[test]
    fn retry_policy_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::seconds(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::seconds(2));
        assert_eq!(policy.delay_for_attempt(10), Duration::seconds(30));
        assert!(policy.exhausted(3));
        assert!(!policy.exhausted(2));
    }
}
