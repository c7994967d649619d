//! S3 — enrichment with partial failure (spec §8 scenario 3).
//!
//! Three positions are enriched together; one ticker's sentiment analysis
//! degrades to `None` while the other two succeed. The pipeline must still
//! return three `EnrichedPosition`s with no panic/error surfacing.

use async_trait::async_trait;
use marketloom::application::enrichment_pipeline::{EnrichmentPipeline, SentimentProvider};
use marketloom::application::quote_provider::OfflineQuoteProvider;
use marketloom::domain::trading::types::PortfolioPosition;
use marketloom::domain::types::Ticker;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct SentimentFailsForOneTicker {
    failing_ticker: &'static str,
}

#[async_trait]
impl SentimentProvider for SentimentFailsForOneTicker {
    async fn sentiment_for(&self, ticker: &str) -> Option<String> {
        if ticker == self.failing_ticker {
            None
        } else {
            Some("neutral".to_string())
        }
    }
}

fn position(ticker: &str) -> PortfolioPosition {
    PortfolioPosition {
        ticker: Ticker::new(ticker).unwrap(),
        shares: dec!(10),
        avg_cost: dec!(100),
        current_price: dec!(110),
    }
}

#[tokio::test]
async fn one_failing_sentiment_does_not_drop_the_other_positions() {
    let pipeline = EnrichmentPipeline::new(
        Arc::new(OfflineQuoteProvider::default()),
        Arc::new(SentimentFailsForOneTicker { failing_ticker: "FAIL" }),
    );

    let positions = vec![position("AAPL"), position("MSFT"), position("FAIL")];
    let enriched = pipeline.enrich(positions, dec!(30000)).await;

    assert_eq!(enriched.len(), 3);

    let aapl = enriched.iter().find(|p| p.position.ticker.as_str() == "AAPL").unwrap();
    let msft = enriched.iter().find(|p| p.position.ticker.as_str() == "MSFT").unwrap();
    let fail = enriched.iter().find(|p| p.position.ticker.as_str() == "FAIL").unwrap();

    assert!(aapl.sentiment.is_some());
    assert!(msft.sentiment.is_some());
    assert!(fail.sentiment.is_none());

    // Unrelated sub-analyses still populate for the degraded position.
    assert!(fail.risk.is_some());
    assert!(fail.indicators.is_some());
}
