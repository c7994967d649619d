use thiserror::Error;

/// Crate-wide error taxonomy. Every component-level error converts into this
/// at its public boundary so background loops and bootstrap can log and
/// classify uniformly without matching on a dozen distinct types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("data fetch failed: {0}")]
    DataFetch(String),

    #[error("broker authentication failed: {0}")]
    BrokerAuth(String),

    #[error("rate limited, retry after {retry_after_secs:?}s: {message}")]
    RateLimit {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("broker api error: {0}")]
    BrokerApi(String),

    #[error("secret store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Status-hint for an outer HTTP layer to map onto a response code.
    /// The HTTP layer itself is out of scope here; this is just the seam.
    pub fn status_hint(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::BrokerAuth(_) => 401,
            AppError::RateLimit { .. } => 429,
            AppError::Timeout(_) => 504,
            AppError::DataFetch(_)
            | AppError::BrokerApi(_)
            | AppError::StoreCorrupt(_)
            | AppError::Cancelled => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::DataFetch(_) | AppError::RateLimit { .. } | AppError::Timeout(_)
        )
    }
}

/// Secret store (C1) leaf errors.
#[derive(Error, Debug)]
pub enum SecretStoreError {
    #[error("not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("store corrupt: {0}")]
    Corrupt(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<SecretStoreError> for AppError {
    fn from(e: SecretStoreError) -> Self {
        match e {
            SecretStoreError::NotFound => AppError::NotFound("secret not found".into()),
            SecretStoreError::Corrupt(msg) => AppError::StoreCorrupt(msg),
            SecretStoreError::Encryption(msg) => AppError::StoreCorrupt(msg),
            SecretStoreError::Io(e) => AppError::StoreCorrupt(format!("io: {e}")),
            SecretStoreError::Serde(e) => AppError::StoreCorrupt(format!("serde: {e}")),
        }
    }
}

/// Broker session (C3) leaf errors.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("authentication error: {0}")]
    Authentication(String),
    #[error("rate limited: {message}, retry after {retry_after_secs:?}")]
    RateLimit {
        message: String,
        retry_after_secs: Option<u64>,
    },
    #[error("api error: {0}")]
    Api(String),
    #[error("network: {0}")]
    Network(String),
}

impl From<BrokerError> for AppError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::Authentication(msg) => AppError::BrokerAuth(msg),
            BrokerError::RateLimit {
                message,
                retry_after_secs,
            } => AppError::RateLimit {
                message,
                retry_after_secs,
            },
            BrokerError::Api(msg) => AppError::BrokerApi(msg),
            BrokerError::Network(msg) => AppError::BrokerApi(format!("network: {msg}")),
        }
    }
}

/// Quote provider (C4) leaf errors.
#[derive(Error, Debug)]
pub enum QuoteProviderError {
    #[error("ticker not found: {0}")]
    TickerNotFound(String),
    #[error("data fetch error: {0}")]
    DataFetch(String),
}

impl From<QuoteProviderError> for AppError {
    fn from(e: QuoteProviderError) -> Self {
        match e {
            QuoteProviderError::TickerNotFound(t) => AppError::NotFound(t),
            QuoteProviderError::DataFetch(msg) => AppError::DataFetch(msg),
        }
    }
}

/// Trading journal (C11) leaf errors.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("trade not found: {0}")]
    NotFound(uuid::Uuid),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<JournalError> for AppError {
    fn from(e: JournalError) -> Self {
        match e {
            JournalError::NotFound(id) => AppError::NotFound(format!("trade {id}")),
            JournalError::InvalidTransition(msg) => AppError::Validation(msg),
            JournalError::Database(e) => AppError::BrokerApi(format!("database: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_hints_match_taxonomy() {
        assert_eq!(AppError::Validation("x".into()).status_hint(), 400);
        assert_eq!(AppError::NotFound("x".into()).status_hint(), 404);
        assert_eq!(AppError::BrokerAuth("x".into()).status_hint(), 401);
        assert_eq!(
            AppError::RateLimit {
                message: "x".into(),
                retry_after_secs: Some(5)
            }
            .status_hint(),
            429
        );
        assert_eq!(
            AppError::Timeout(std::time::Duration::from_secs(30)).status_hint(),
            504
        );
    }

    #[test]
    fn retryable_kinds() {
        assert!(AppError::DataFetch("x".into()).is_retryable());
        assert!(
            AppError::RateLimit {
                message: "x".into(),
                retry_after_secs: None
            }
            .is_retryable()
        );
        assert!(!AppError::Validation("x".into()).is_retryable());
        assert!(!AppError::StoreCorrupt("x".into()).is_retryable());
    }

    #[test]
    fn broker_auth_maps_from_broker_error() {
        let err: AppError = BrokerError::Authentication("expired".into()).into();
        assert!(matches!(err, AppError::BrokerAuth(_)));
    }
}
