//! C7 Portfolio Enrichment Pipeline: fans four analyses out per position
//! (technical, sentiment, risk, recommendation) concurrently, degrading
//! individual sub-analyses to `None` on failure rather than dropping the
//! position.

use crate::application::indicator_engine;
use crate::application::quote_provider::QuoteProvider;
use crate::domain::enrichment::{EnrichedPosition, Recommendation, RiskMetrics};
use crate::domain::technical::TechnicalIndicators;
use crate::domain::trading::types::PortfolioPosition;
use crate::infrastructure::observability::metrics;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Per-position analysis timeout (spec §5 recommends ~10s).
const PER_POSITION_TIMEOUT: Duration = Duration::from_secs(10);

/// Sentiment is an out-of-scope collaborator behind a trait; the core ships
/// a deterministic neutral stub so the pipeline always has something to
/// fan out to.
#[async_trait]
pub trait SentimentProvider: Send + Sync {
    async fn sentiment_for(&self, ticker: &str) -> Option<String>;
}

#[derive(Default)]
pub struct NeutralSentimentProvider;

#[async_trait]
impl SentimentProvider for NeutralSentimentProvider {
    async fn sentiment_for(&self, _ticker: &str) -> Option<String> {
        Some("neutral".to_string())
    }
}

pub struct EnrichmentPipeline {
    quote_provider: Arc<dyn QuoteProvider>,
    sentiment: Arc<dyn SentimentProvider>,
}

impl EnrichmentPipeline {
    pub fn new(quote_provider: Arc<dyn QuoteProvider>, sentiment: Arc<dyn SentimentProvider>) -> Self {
        Self {
            quote_provider,
            sentiment,
        }
    }

    /// Enriches every position concurrently, one task per position; within
    /// each position, the four sub-analyses also run concurrently.
    pub async fn enrich(&self, positions: Vec<PortfolioPosition>, total_value: Decimal) -> Vec<EnrichedPosition> {
        let tasks = positions
            .into_iter()
            .map(|position| self.enrich_one(position, total_value));
        futures::future::join_all(tasks).await
    }

    async fn enrich_one(&self, position: PortfolioPosition, total_value: Decimal) -> EnrichedPosition {
        let start = Instant::now();
        let indicators_fut = timeout_to_none(self.technical_analysis(&position));
        let sentiment_fut = timeout_to_none(async {
            Some(self.sentiment.sentiment_for(position.ticker.as_str()).await).flatten()
        });
        let risk_fut = async { Some(self.risk_analysis(&position, total_value)) };

        let (indicators, sentiment, risk) = tokio::join!(indicators_fut, sentiment_fut, risk_fut);

        if sentiment.is_none() {
            metrics::record_enrichment_subanalysis_failure("sentiment");
        }

        let recommendation = indicators.as_ref().map(|tech: &TechnicalIndicators| {
            let pnl_percent = position.pnl_percent().to_f64().unwrap_or(0.0) * 100.0;
            Recommendation::derive(tech, pnl_percent)
        });

        metrics::record_enrichment_position_duration(start.elapsed().as_secs_f64());

        EnrichedPosition {
            position,
            indicators,
            sentiment,
            risk,
            recommendation,
        }
    }

    async fn technical_analysis(&self, position: &PortfolioPosition) -> Option<TechnicalIndicators> {
        let bars = self.quote_provider.historical(&position.ticker, 252).await.ok()?;
        match indicator_engine::compute(&bars) {
            Ok(indicators) => Some(indicators),
            Err(e) => {
                warn!(ticker = position.ticker.as_str(), error = %e, "technical analysis failed, degrading to null");
                metrics::record_enrichment_subanalysis_failure("technical");
                None
            }
        }
    }

    fn risk_analysis(&self, position: &PortfolioPosition, total_value: Decimal) -> RiskMetrics {
        RiskMetrics::compute(position.avg_cost, position.shares, position.value(), total_value)
    }
}

async fn timeout_to_none<T>(fut: impl std::future::Future<Output = Option<T>>) -> Option<T> {
    match tokio::time::timeout(PER_POSITION_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => None,
    }
}
