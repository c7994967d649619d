//! C2 Token Lifecycle Manager: keeps OAuth credentials valid and observable,
//! persisting through C1's encrypted token store and refreshing through
//! whatever broker session implements `TokenRefresher`.

use crate::domain::errors::AppError;
use crate::domain::token::{RefreshResult, RetryPolicy, TokenHealth, TokenRecord, TokenStatus};
use crate::infrastructure::observability::metrics;
use crate::infrastructure::secret_store::{EncryptedFileStore, TokenScope};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Port C2 calls to actually exchange a refresh token for a new access
/// token. Implemented by C3's broker session; kept as a trait so C2 never
/// depends on a concrete broker client.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord, AppError>;
}

/// Invoked on terminal refresh failure (retries exhausted or non-retryable
/// error). The notification collaborator forwards this onward (e.g. to C12).
#[async_trait]
pub trait RefreshFailureNotifier: Send + Sync {
    async fn notify_refresh_failed(&self, user_id: &str, broker: &str, error: &str);
}

struct FailureCounters {
    counts: RwLock<HashMap<String, u32>>,
}

impl FailureCounters {
    fn new() -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, scope: &str) -> u32 {
        *self.counts.read().await.get(scope).unwrap_or(&0)
    }

    async fn increment(&self, scope: &str) -> u32 {
        let mut guard = self.counts.write().await;
        let entry = guard.entry(scope.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    async fn reset(&self, scope: &str) {
        self.counts.write().await.remove(scope);
    }
}

pub struct TokenManager {
    store: Arc<EncryptedFileStore<TokenScope, TokenRecord>>,
    refresher: Arc<dyn TokenRefresher>,
    notifier: Arc<dyn RefreshFailureNotifier>,
    retry_policy: RetryPolicy,
    failures: FailureCounters,
}

impl TokenManager {
    pub fn new(
        store: Arc<EncryptedFileStore<TokenScope, TokenRecord>>,
        refresher: Arc<dyn TokenRefresher>,
        notifier: Arc<dyn RefreshFailureNotifier>,
    ) -> Self {
        Self {
            store,
            refresher,
            notifier,
            retry_policy: RetryPolicy::default(),
            failures: FailureCounters::new(),
        }
    }

    pub async fn health(&self, scope: &TokenScope) -> TokenHealth {
        let record = self.store.get(scope).await.ok();
        let consecutive_failures = self.failures.get(&scope.to_string()).await;
        TokenHealth::derive(record.as_ref(), Utc::now(), consecutive_failures)
    }

    /// Checks the persisted token and refreshes it if the strategy contract
    /// says it needs refreshing. Retries up to `retry_policy.max_attempts`
    /// with exponential backoff, stopping early on a non-retryable error.
    pub async fn check_and_refresh(&self, scope: &TokenScope) -> RefreshResult {
        let scope_key = scope.to_string();
        let now = Utc::now();

        let record = match self.store.get(scope).await {
            Ok(record) => record,
            Err(_) => {
                return RefreshResult {
                    success: false,
                    status: TokenStatus::Missing,
                    access_ttl: None,
                    refresh_ttl: None,
                    attempts: 0,
                    error: Some("no token on file".into()),
                }
            }
        };

        if !record.needs_refresh(now) {
            return RefreshResult {
                success: true,
                status: TokenStatus::Valid,
                access_ttl: Some(record.access_ttl_seconds(now)),
                refresh_ttl: record.refresh_ttl_seconds(now),
                attempts: 0,
                error: None,
            };
        }

        let Some(refresh_token) = record.refresh_token.clone() else {
            return RefreshResult {
                success: false,
                status: TokenStatus::Expired,
                access_ttl: Some(record.access_ttl_seconds(now)),
                refresh_ttl: record.refresh_ttl_seconds(now),
                attempts: 0,
                error: Some("no refresh token on file".into()),
            };
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            metrics::record_token_refresh_attempt(&scope.broker);
            match self.refresher.refresh(&refresh_token).await {
                Ok(mut new_record) => {
                    new_record.last_refresh = Some(Utc::now());
                    let access_ttl = new_record.access_ttl_seconds(Utc::now());
                    let refresh_ttl = new_record.refresh_ttl_seconds(Utc::now());
                    if let Err(e) = self.store.save(scope, new_record).await {
                        error!(scope = %scope_key, error = %e, "failed to persist refreshed token");
                    }
                    self.failures.reset(&scope_key).await;
                    return RefreshResult {
                        success: true,
                        status: TokenStatus::Valid,
                        access_ttl: Some(access_ttl),
                        refresh_ttl,
                        attempts,
                        error: None,
                    };
                }
                Err(e) => {
                    let message = e.to_string();
                    let retryable = self.retry_policy.is_retryable(&message);
                    if !retryable || self.retry_policy.exhausted(attempts) {
                        let failures = self.failures.increment(&scope_key).await;
                        metrics::record_token_refresh_failure(&scope.broker);
                        warn!(scope = %scope_key, attempts, failures, error = %message, "token refresh failed terminally");
                        self.notifier
                            .notify_refresh_failed(&scope.user_id, &scope.broker, &message)
                            .await;
                        return RefreshResult {
                            success: false,
                            status: TokenStatus::RefreshFailed,
                            access_ttl: Some(record.access_ttl_seconds(Utc::now())),
                            refresh_ttl: record.refresh_ttl_seconds(Utc::now()),
                            attempts,
                            error: Some(message),
                        };
                    }
                    let delay = self.retry_policy.delay_for_attempt(attempts);
                    info!(scope = %scope_key, attempts, delay_ms = delay.num_milliseconds(), "retrying token refresh");
                    sleep(delay.to_std().unwrap_or(std::time::Duration::from_secs(1))).await;
                }
            }
        }
    }

    /// Self-pacing background loop: sleeps for the strategy's current
    /// next-check interval, re-reading it after every call so a shortened
    /// TTL tightens the loop automatically. Cancelled by `shutdown_rx`.
    pub async fn run_forever(self: Arc<Self>, scope: TokenScope, mut shutdown_rx: watch::Receiver<bool>) {
        info!(scope = %scope.to_string(), "token manager loop started");
        loop {
            let result = self.check_and_refresh(&scope).await;
            let next_interval = match self.store.get(&scope).await {
                Ok(record) => record.next_check_interval(Utc::now()),
                Err(_) => chrono::Duration::seconds(60),
            };

            if !result.success {
                warn!(scope = %scope.to_string(), status = ?result.status, "token health degraded");
            }

            tokio::select! {
                _ = sleep(next_interval.to_std().unwrap_or(std::time::Duration::from_secs(60))) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(scope = %scope.to_string(), "token manager loop shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::secret_store::EncryptionKey;
    use base64::Engine;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    struct AlwaysFailsRefresher {
        error: String,
    }

    #[async_trait]
    impl TokenRefresher for AlwaysFailsRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenRecord, AppError> {
            Err(AppError::BrokerAuth(self.error.clone()))
        }
    }

    struct CountingNotifier {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RefreshFailureNotifier for CountingNotifier {
        async fn notify_refresh_failed(&self, _user_id: &str, _broker: &str, _error: &str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_key() -> EncryptionKey {
        let raw = [3u8; 32];
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        EncryptionKey::from_base64(&encoded).unwrap()
    }

    #[tokio::test]
    async fn non_retryable_error_fails_on_first_attempt() {
        let dir = tempdir().unwrap();
        let store = Arc::new(EncryptedFileStore::new(dir.path().join("tokens.json"), test_key()));
        let scope = TokenScope {
            user_id: "u1".into(),
            broker: "alpaca".into(),
        };
        let record = TokenRecord::new(
            "alpaca",
            "stale",
            Some("refresh".into()),
            chrono::Duration::seconds(10),
            Some(chrono::Duration::seconds(20)),
        );
        store.save(&scope, record).await.unwrap();

        let refresher = Arc::new(AlwaysFailsRefresher {
            error: "invalid_grant: revoked".into(),
        });
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicU32::new(0),
        });
        let manager = TokenManager::new(store, refresher, notifier.clone());

        let result = manager.check_and_refresh(&scope).await;
        assert_eq!(result.attempts, 1);
        assert!(!result.success);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn healthy_token_skips_refresh() {
        let dir = tempdir().unwrap();
        let store = Arc::new(EncryptedFileStore::new(dir.path().join("tokens.json"), test_key()));
        let scope = TokenScope {
            user_id: "u1".into(),
            broker: "alpaca".into(),
        };
        let record = TokenRecord::new(
            "alpaca",
            "fresh",
            Some("refresh".into()),
            chrono::Duration::seconds(10_000),
            Some(chrono::Duration::seconds(10_000)),
        );
        store.save(&scope, record).await.unwrap();

        let refresher = Arc::new(AlwaysFailsRefresher {
            error: "should not be called".into(),
        });
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicU32::new(0),
        });
        let manager = TokenManager::new(store, refresher, notifier);

        let result = manager.check_and_refresh(&scope).await;
        assert!(result.success);
        assert_eq!(result.status, TokenStatus::Valid);
    }
}
