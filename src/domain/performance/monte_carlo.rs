use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const MIN_HISTORICAL_POINTS: usize = 20;
const MAX_DRAWDOWN_SAMPLE: usize = 500;
const PATH_SAMPLE_SIZE: usize = 5;
const DISTRIBUTION_SNAPSHOT_SIZE: usize = 1000;
const MIN_ALIGNED_RETURN_LENGTH: usize = 50;

/// Annualised drift/volatility estimated from historical daily returns, the
/// shared parameter source for single-asset and portfolio simulation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GbmParameters {
    pub mu: f64,
    pub sigma: f64,
}

impl GbmParameters {
    /// Returns `None` if fewer than 20 historical points are supplied.
    pub fn estimate(daily_returns: &[f64]) -> Option<Self> {
        if daily_returns.len() < MIN_HISTORICAL_POINTS {
            return None;
        }
        let n = daily_returns.len() as f64;
        let mean = daily_returns.iter().sum::<f64>() / n;
        let variance = daily_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = variance.sqrt();
        Some(Self {
            mu: mean * TRADING_DAYS_PER_YEAR,
            sigma: std * TRADING_DAYS_PER_YEAR.sqrt(),
        })
    }

    pub fn scaled(&self, vol_mult: Option<f64>, drift_mult: Option<f64>, drift_override: Option<f64>) -> Self {
        let sigma = self.sigma * vol_mult.unwrap_or(1.0);
        let mu = drift_override.unwrap_or(self.mu * drift_mult.unwrap_or(1.0));
        Self { mu, sigma }
    }
}

/// One named what-if on top of the base estimated parameters.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub vol_mult: Option<f64>,
    pub drift_mult: Option<f64>,
    pub drift_override: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleAssetResult {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub percentiles: PercentileSet,
    pub prob_below_start: f64,
    pub prob_gain_above_10pct: f64,
    pub prob_loss_above_10pct: f64,
    pub expected_max_drawdown: f64,
    pub sample_paths: Vec<Vec<f64>>,
    pub distribution_snapshot: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PercentileSet {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * pct).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Discrete-time GBM single-asset Monte Carlo, seedable for reproducibility.
pub struct MonteCarloEngine {
    rng: ChaCha8Rng,
}

impl MonteCarloEngine {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { rng }
    }

    /// Simulates `num_simulations` independent price paths over `horizon_days`
    /// trading days, starting at `initial_price`.
    pub fn simulate_single_asset(
        &mut self,
        initial_price: f64,
        params: GbmParameters,
        horizon_days: usize,
        num_simulations: usize,
    ) -> SingleAssetResult {
        let dt = 1.0 / TRADING_DAYS_PER_YEAR;
        let drift = (params.mu - 0.5 * params.sigma.powi(2)) * dt;
        let vol_term = params.sigma * dt.sqrt();
        let normal = Normal::new(0.0, 1.0).expect("unit normal is always valid");

        let mut finals = Vec::with_capacity(num_simulations);
        let mut drawdowns = Vec::with_capacity(MAX_DRAWDOWN_SAMPLE.min(num_simulations));
        let mut sample_paths = Vec::with_capacity(PATH_SAMPLE_SIZE);

        for i in 0..num_simulations {
            let mut price = initial_price;
            let mut peak = price;
            let mut max_dd = 0.0_f64;
            let mut path = if i < PATH_SAMPLE_SIZE {
                Vec::with_capacity(horizon_days + 1)
            } else {
                Vec::new()
            };
            if i < PATH_SAMPLE_SIZE {
                path.push(price);
            }

            for _ in 0..horizon_days {
                let z: f64 = normal.sample(&mut self.rng);
                price *= (drift + vol_term * z).exp();
                if price > peak {
                    peak = price;
                } else if peak > 0.0 {
                    max_dd = max_dd.max((peak - price) / peak);
                }
                if i < PATH_SAMPLE_SIZE {
                    path.push(price);
                }
            }

            finals.push(price);
            if i < MAX_DRAWDOWN_SAMPLE {
                drawdowns.push(max_dd);
            }
            if i < PATH_SAMPLE_SIZE {
                sample_paths.push(path);
            }
        }

        let mut sorted = finals.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let prob_below_start = finals.iter().filter(|&&v| v < initial_price).count() as f64 / n;
        let prob_gain_above_10pct =
            finals.iter().filter(|&&v| v > initial_price * 1.10).count() as f64 / n;
        let prob_loss_above_10pct =
            finals.iter().filter(|&&v| v < initial_price * 0.90).count() as f64 / n;
        let expected_max_drawdown = if drawdowns.is_empty() {
            0.0
        } else {
            drawdowns.iter().sum::<f64>() / drawdowns.len() as f64
        };

        let distribution_snapshot = finals
            .iter()
            .take(DISTRIBUTION_SNAPSHOT_SIZE)
            .copied()
            .collect();

        SingleAssetResult {
            mean,
            median: percentile(&sorted, 0.5),
            std_dev: variance.sqrt(),
            percentiles: PercentileSet {
                p5: percentile(&sorted, 0.05),
                p25: percentile(&sorted, 0.25),
                p50: percentile(&sorted, 0.5),
                p75: percentile(&sorted, 0.75),
                p95: percentile(&sorted, 0.95),
            },
            prob_below_start,
            prob_gain_above_10pct,
            prob_loss_above_10pct,
            expected_max_drawdown,
            sample_paths,
            distribution_snapshot,
        }
    }

    pub fn run_scenarios(
        &mut self,
        initial_price: f64,
        base_params: GbmParameters,
        horizon_days: usize,
        num_simulations: usize,
        scenarios: &[Scenario],
    ) -> Vec<(String, SingleAssetResult)> {
        scenarios
            .iter()
            .map(|scenario| {
                let params = base_params.scaled(scenario.vol_mult, scenario.drift_mult, scenario.drift_override);
                let result = self.simulate_single_asset(initial_price, params, horizon_days, num_simulations);
                (scenario.name.clone(), result)
            })
            .collect()
    }
}

/// A position's weight in a portfolio VaR/CVaR computation.
#[derive(Debug, Clone)]
pub struct PortfolioHolding {
    pub ticker: String,
    pub market_value: f64,
    pub daily_returns: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRiskResult {
    pub portfolio_volatility_annualized: f64,
    pub diversification_ratio: f64,
    pub var_99: f64,
    pub var_95: f64,
    pub var_90: f64,
    pub cvar_99: f64,
    pub cvar_95: f64,
    pub cvar_90: f64,
    pub marginal_risk_contribution: Vec<(String, f64)>,
}

/// Portfolio VaR/CVaR over a return matrix aligned to the shared minimum
/// history length (padded up to at least 50 points with zeros if shorter).
pub fn portfolio_var_cvar(
    holdings: &[PortfolioHolding],
    horizon_days: usize,
    num_simulations: usize,
    rng: &mut ChaCha8Rng,
) -> Option<PortfolioRiskResult> {
    if holdings.is_empty() {
        return None;
    }
    let total_value: f64 = holdings.iter().map(|h| h.market_value).sum();
    if total_value <= 0.0 {
        return None;
    }

    let shared_len = holdings
        .iter()
        .map(|h| h.daily_returns.len())
        .min()
        .unwrap_or(0)
        .max(MIN_ALIGNED_RETURN_LENGTH);

    let aligned: Vec<Vec<f64>> = holdings
        .iter()
        .map(|h| {
            let mut padded = vec![0.0; shared_len.saturating_sub(h.daily_returns.len())];
            padded.extend(h.daily_returns.iter().rev().take(shared_len).rev());
            padded
        })
        .collect();

    let weights: Vec<f64> = holdings.iter().map(|h| h.market_value / total_value).collect();

    let n = aligned.len();
    let means: Vec<f64> = aligned
        .iter()
        .map(|r| r.iter().sum::<f64>() / r.len().max(1) as f64)
        .collect();
    let vols: Vec<f64> = aligned
        .iter()
        .zip(&means)
        .map(|(r, mean)| {
            let len = r.len().max(2) as f64;
            let var = r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (len - 1.0);
            (var * TRADING_DAYS_PER_YEAR).sqrt()
        })
        .collect();

    let mut covariance = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let len = aligned[i].len().min(aligned[j].len()).max(2) as f64;
            let cov = (0..aligned[i].len().min(aligned[j].len()))
                .map(|k| (aligned[i][k] - means[i]) * (aligned[j][k] - means[j]))
                .sum::<f64>()
                / (len - 1.0)
                * TRADING_DAYS_PER_YEAR;
            covariance[i][j] = cov;
        }
    }

    let mut portfolio_variance = 0.0;
    for i in 0..n {
        for j in 0..n {
            portfolio_variance += weights[i] * weights[j] * covariance[i][j];
        }
    }
    let portfolio_volatility_annualized = portfolio_variance.max(0.0).sqrt();

    let weighted_avg_vol: f64 = weights.iter().zip(&vols).map(|(w, v)| w * v).sum();
    let diversification_ratio = if portfolio_volatility_annualized > 0.0 {
        weighted_avg_vol / portfolio_volatility_annualized
    } else {
        1.0
    };

    let horizon_scale = (horizon_days as f64 / TRADING_DAYS_PER_YEAR).sqrt();
    let portfolio_mu_h: f64 = weights
        .iter()
        .zip(&means)
        .map(|(w, m)| w * m * horizon_days as f64)
        .sum();
    let portfolio_sigma_h = portfolio_volatility_annualized * horizon_scale;

    let normal = Normal::new(portfolio_mu_h, portfolio_sigma_h.max(1e-12)).expect("valid normal params");
    let mut simulated_returns: Vec<f64> = (0..num_simulations).map(|_| normal.sample(rng)).collect();
    simulated_returns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let var_at = |confidence: f64| -> f64 {
        let idx = ((1.0 - confidence) * simulated_returns.len() as f64).floor() as usize;
        -simulated_returns[idx.min(simulated_returns.len() - 1)] * total_value
    };
    let cvar_at = |confidence: f64| -> f64 {
        let idx = ((1.0 - confidence) * simulated_returns.len() as f64).floor() as usize;
        let tail = &simulated_returns[..=idx.min(simulated_returns.len() - 1)];
        -(tail.iter().sum::<f64>() / tail.len() as f64) * total_value
    };

    let marginal_risk_contribution = holdings
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let corr_with_portfolio = if portfolio_volatility_annualized > 0.0 {
                (0..n)
                    .map(|j| weights[j] * covariance[i][j])
                    .sum::<f64>()
                    / (vols[i] * portfolio_volatility_annualized).max(1e-12)
            } else {
                0.0
            };
            let contribution = weights[i] * vols[i] * corr_with_portfolio;
            (h.ticker.clone(), contribution)
        })
        .collect();

    Some(PortfolioRiskResult {
        portfolio_volatility_annualized,
        diversification_ratio,
        var_99: var_at(0.99),
        var_95: var_at(0.95),
        var_90: var_at(0.90),
        cvar_99: cvar_at(0.99),
        cvar_95: cvar_at(0.95),
        cvar_90: cvar_at(0.90),
        marginal_risk_contribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_returns(n: usize) -> Vec<f64> {
        (0..n).map(|i| 0.0005 * ((i as f64) * 0.3).sin()).collect()
    }

    #[test]
    fn parameter_estimation_requires_20_points() {
        assert!(GbmParameters::estimate(&synthetic_returns(10)).is_none());
        assert!(GbmParameters::estimate(&synthetic_returns(20)).is_some());
    }

    #[test]
    fn seeded_runs_are_deterministic() {
        let params = GbmParameters::estimate(&synthetic_returns(60)).unwrap();
        let mut a = MonteCarloEngine::new(Some(42));
        let mut b = MonteCarloEngine::new(Some(42));
        let result_a = a.simulate_single_asset(100.0, params, 30, 200);
        let result_b = b.simulate_single_asset(100.0, params, 30, 200);
        assert_eq!(result_a.mean, result_b.mean);
        assert_eq!(result_a.percentiles.p50, result_b.percentiles.p50);
    }

    #[test]
    fn sample_paths_and_snapshot_are_bounded() {
        let params = GbmParameters::estimate(&synthetic_returns(60)).unwrap();
        let mut engine = MonteCarloEngine::new(Some(7));
        let result = engine.simulate_single_asset(100.0, params, 30, 2000);
        assert_eq!(result.sample_paths.len(), PATH_SAMPLE_SIZE);
        assert_eq!(result.distribution_snapshot.len(), DISTRIBUTION_SNAPSHOT_SIZE);
    }

    #[test]
    fn portfolio_var_orders_by_confidence() {
        let holdings = vec![
            PortfolioHolding {
                ticker: "AAPL".into(),
                market_value: 10_000.0,
                daily_returns: synthetic_returns(60),
            },
            PortfolioHolding {
                ticker: "MSFT".into(),
                market_value: 5_000.0,
                daily_returns: synthetic_returns(60),
            },
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = portfolio_var_cvar(&holdings, 10, 5000, &mut rng).unwrap();
        assert!(result.var_99 >= result.var_95);
        assert!(result.var_95 >= result.var_90);
        assert!(result.cvar_99 >= result.var_99);
    }
}
