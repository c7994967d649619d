// Performance tracking domain (Monte Carlo, backtest, stats)
pub mod performance;

// Repository traits
pub mod repositories;

// Core trading domain (Trade, JournalEntry, PortfolioPosition)
pub mod trading;

// Domain-specific error types
pub mod errors;

// Primitive value objects: Ticker, Money, Percentage
pub mod types;

// Market data contracts: HistoricalBar, Quote, StockMetadata
pub mod market_data;

// Technical indicator aggregates and signal labels
pub mod technical;

// OAuth token record and health derivation
pub mod token;

// Streaming subscription state and trading mode
pub mod streaming;

// Portfolio enrichment output types
pub mod enrichment;

// Market regime signals and anti-whipsaw state
pub mod regime;
