//! S1 — token proactive refresh (spec §8 scenario 1).
//!
//! Seeds a token at `access_ttl = 400s`, `refresh_ttl = 2400s` (under the
//! 600s access threshold, so the strategy must decide to refresh) and drives
//! `TokenManager::check_and_refresh` with a fake `TokenRefresher` standing in
//! for C3, so the scenario runs fully offline.

use async_trait::async_trait;
use base64::Engine;
use chrono::Duration;
use marketloom::application::token_manager::{RefreshFailureNotifier, TokenManager, TokenRefresher};
use marketloom::domain::errors::AppError;
use marketloom::domain::token::{TokenRecord, TokenStatus};
use marketloom::infrastructure::secret_store::{EncryptedFileStore, EncryptionKey, TokenScope};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

struct OneShotRefresher {
    calls: AtomicU32,
}

#[async_trait]
impl TokenRefresher for OneShotRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TokenRecord::new(
            "alpaca",
            format!("fresh-{refresh_token}"),
            Some(refresh_token.to_string()),
            Duration::seconds(1200),
            Some(Duration::seconds(2400)),
        ))
    }
}

struct SilentNotifier;

#[async_trait]
impl RefreshFailureNotifier for SilentNotifier {
    async fn notify_refresh_failed(&self, _user_id: &str, _broker: &str, _error: &str) {}
}

fn test_key() -> EncryptionKey {
    let raw = [7u8; 32];
    let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
    EncryptionKey::from_base64(&encoded).unwrap()
}

#[tokio::test]
async fn proactive_refresh_renews_a_token_nearing_access_expiry() {
    let dir = tempdir().unwrap();
    let store = Arc::new(EncryptedFileStore::new(dir.path().join("tokens.json"), test_key()));
    let scope = TokenScope {
        user_id: "u1".into(),
        broker: "alpaca".into(),
    };
    let seed = TokenRecord::new(
        "alpaca",
        "stale-access",
        Some("refresh-token".into()),
        Duration::seconds(400),
        Some(Duration::seconds(2400)),
    );
    store.save(&scope, seed).await.unwrap();

    let refresher = Arc::new(OneShotRefresher { calls: AtomicU32::new(0) });
    let manager = TokenManager::new(store.clone(), refresher.clone(), Arc::new(SilentNotifier));

    let result = manager.check_and_refresh(&scope).await;

    assert!(result.success);
    assert_eq!(result.status, TokenStatus::Valid);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

    let persisted = store.get(&scope).await.unwrap();
    let ttl = persisted.access_ttl_seconds(chrono::Utc::now());
    assert!((1150..=1200).contains(&ttl), "expected access_ttl near 1200s, got {ttl}");
}
