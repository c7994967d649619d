//! C9 Monte Carlo service: fetches history through C4, estimates GBM
//! parameters, and runs the simulation on the blocking-task pool so the
//! async scheduler is never held by CPU-bound path generation (spec §5).

use crate::application::quote_provider::QuoteProvider;
use crate::domain::errors::{AppError, QuoteProviderError};
use crate::domain::market_data::daily_log_returns;
use crate::domain::performance::monte_carlo::{
    portfolio_var_cvar, GbmParameters, MonteCarloEngine, PortfolioHolding, PortfolioRiskResult, Scenario,
    SingleAssetResult,
};
use crate::domain::types::Ticker;
use crate::infrastructure::observability::metrics;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Instant;

pub struct MonteCarloService {
    quote_provider: Arc<dyn QuoteProvider>,
}

impl MonteCarloService {
    pub fn new(quote_provider: Arc<dyn QuoteProvider>) -> Self {
        Self { quote_provider }
    }

    /// Single-asset projection over `horizon_days`, estimating GBM
    /// parameters from 252 trading days of history.
    pub async fn simulate(
        &self,
        ticker: &Ticker,
        horizon_days: usize,
        num_simulations: usize,
        seed: Option<u64>,
    ) -> Result<SingleAssetResult, AppError> {
        let bars = self.quote_provider.historical(ticker, 252).await?;
        let returns = daily_log_returns(&bars);
        let params = GbmParameters::estimate(&returns)
            .ok_or_else(|| AppError::from(QuoteProviderError::DataFetch("fewer than 20 historical points".into())))?;
        let initial_price = bars
            .last()
            .and_then(|b| b.close.to_f64())
            .ok_or_else(|| AppError::from(QuoteProviderError::TickerNotFound(ticker.as_str().to_string())))?;

        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let mut engine = MonteCarloEngine::new(seed);
            engine.simulate_single_asset(initial_price, params, horizon_days, num_simulations)
        })
        .await
        .map_err(|e| AppError::DataFetch(format!("simulation task panicked: {e}")));
        metrics::record_monte_carlo_run(start.elapsed().as_secs_f64());
        result
    }

    /// Runs named what-if scenarios (vol/drift multipliers or overrides) on
    /// top of the same estimated base parameters.
    pub async fn simulate_scenarios(
        &self,
        ticker: &Ticker,
        horizon_days: usize,
        num_simulations: usize,
        seed: Option<u64>,
        scenarios: Vec<Scenario>,
    ) -> Result<Vec<(String, SingleAssetResult)>, AppError> {
        let bars = self.quote_provider.historical(ticker, 252).await?;
        let returns = daily_log_returns(&bars);
        let params = GbmParameters::estimate(&returns)
            .ok_or_else(|| AppError::from(QuoteProviderError::DataFetch("fewer than 20 historical points".into())))?;
        let initial_price = bars
            .last()
            .and_then(|b| b.close.to_f64())
            .ok_or_else(|| AppError::from(QuoteProviderError::TickerNotFound(ticker.as_str().to_string())))?;

        tokio::task::spawn_blocking(move || {
            let mut engine = MonteCarloEngine::new(seed);
            engine.run_scenarios(initial_price, params, horizon_days, num_simulations, &scenarios)
        })
        .await
        .map_err(|e| AppError::DataFetch(format!("simulation task panicked: {e}")))
    }

    /// Portfolio VaR/CVaR over a set of tickers weighted by current market
    /// value. Fetches each ticker's history through C4 before handing the
    /// covariance construction to the blocking pool.
    pub async fn portfolio_risk(
        &self,
        positions: &[(Ticker, f64)],
        horizon_days: usize,
        num_simulations: usize,
        seed: Option<u64>,
    ) -> Result<Option<PortfolioRiskResult>, AppError> {
        let mut holdings = Vec::with_capacity(positions.len());
        for (ticker, market_value) in positions {
            let bars = self.quote_provider.historical(ticker, 252).await?;
            holdings.push(PortfolioHolding {
                ticker: ticker.as_str().to_string(),
                market_value: *market_value,
                daily_returns: daily_log_returns(&bars),
            });
        }

        tokio::task::spawn_blocking(move || {
            let mut rng = seed.map(ChaCha8Rng::seed_from_u64).unwrap_or_else(ChaCha8Rng::from_entropy);
            portfolio_var_cvar(&holdings, horizon_days, num_simulations, &mut rng)
        })
        .await
        .map_err(|e| AppError::DataFetch(format!("risk task panicked: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::quote_provider::OfflineQuoteProvider;

    fn ticker() -> Ticker {
        Ticker::new("AAPL").unwrap()
    }

    #[tokio::test]
    async fn simulate_is_deterministic_for_same_seed() {
        let service = MonteCarloService::new(Arc::new(OfflineQuoteProvider::new(5)));
        let a = service.simulate(&ticker(), 30, 200, Some(1)).await.unwrap();
        let b = service.simulate(&ticker(), 30, 200, Some(1)).await.unwrap();
        assert_eq!(a.mean, b.mean);
        assert_eq!(a.percentiles.p50, b.percentiles.p50);
    }

    #[tokio::test]
    async fn simulate_scenarios_returns_one_result_per_scenario() {
        let service = MonteCarloService::new(Arc::new(OfflineQuoteProvider::default()));
        let scenarios = vec![
            Scenario {
                name: "crash".to_string(),
                vol_mult: Some(2.0),
                drift_mult: None,
                drift_override: Some(-0.3),
            },
            Scenario {
                name: "rally".to_string(),
                vol_mult: None,
                drift_mult: Some(1.5),
                drift_override: None,
            },
        ];
        let results = service.simulate_scenarios(&ticker(), 30, 200, Some(1), scenarios).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn portfolio_risk_over_two_positions() {
        let service = MonteCarloService::new(Arc::new(OfflineQuoteProvider::default()));
        let positions = vec![(ticker(), 5000.0), (Ticker::new("MSFT").unwrap(), 5000.0)];
        let result = service.portfolio_risk(&positions, 30, 200, Some(1)).await.unwrap();
        assert!(result.is_some());
    }
}
