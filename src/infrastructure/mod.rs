// Shared retrying HTTP client builder (used by C3/C4)
pub mod http_client_factory;

// Push-based metrics/logging init (ambient)
pub mod observability;

// SQLite-backed journal/backtest/signal-history persistence (C10/C11/C12)
pub mod persistence;

// Encrypted file-backed key/value store (C1)
pub mod secret_store;
