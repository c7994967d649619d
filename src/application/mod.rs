// Outbound notification transport (ambient, §6)
pub mod notifications;

// OAuth token lifecycle management (C2)
pub mod token_manager;

// Brokerage REST session: OAuth2 code flow + typed account/position/order access (C3)
pub mod broker_session;

// Quote provider abstraction: historical/current/metadata/volatility/search (C4)
pub mod quote_provider;

// Price source registry: polling + illustrative real-time sources (C5)
pub mod price_source;

// Hybrid streamer: polling/real-time scheduling and per-ticker fan-out (C6)
pub mod streamer;

// Technical indicator engine: stateful bar replay over the `ta` crate (C8)
pub mod indicator_engine;

// Portfolio enrichment pipeline: concurrent per-position fan-out (C7)
pub mod enrichment_pipeline;

// Monte Carlo projection service, runs on the blocking pool (C9)
pub mod monte_carlo_service;

// Multi-asset backtest service, runs on the blocking pool (C10)
pub mod backtest_service;

// Trading journal store: trade lifecycle + statistics (C11)
pub mod journal_service;

// Periodic technical-signal scan with cooldown/dedup and history (C12)
pub mod alert_watcher;

// Macro stress indicators into a debounced regime label + allocation (C13)
pub mod market_regime_service;
