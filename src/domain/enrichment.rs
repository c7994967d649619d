use crate::domain::technical::{BollingerPosition, MacdTrend, MaTrend, RsiSignal, TechnicalIndicators};
use crate::domain::trading::types::PortfolioPosition;
use crate::domain::types::Ticker;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcentrationRisk {
    Low,
    Medium,
    High,
}

impl ConcentrationRisk {
    pub fn from_weight_percent(weight_percent: f64) -> Self {
        if weight_percent > 25.0 {
            ConcentrationRisk::High
        } else if weight_percent > 15.0 {
            ConcentrationRisk::Medium
        } else {
            ConcentrationRisk::Low
        }
    }
}

/// Per-position risk metrics produced by one of C7's four parallel analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub weight_percent: f64,
    pub concentration: ConcentrationRisk,
    pub suggested_stop: Decimal,
    pub suggested_target: Decimal,
    pub max_loss: Decimal,
}

impl RiskMetrics {
    /// Default suggested stop/target: 8% below entry, 24% above (3:1 R/R),
    /// per the enrichment pipeline's risk-metric defaults.
    pub fn compute(entry_price: Decimal, size: Decimal, market_value: Decimal, total_value: Decimal) -> Self {
        let weight_percent = if total_value.is_zero() {
            0.0
        } else {
            (market_value / total_value * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        };
        let suggested_stop = entry_price * Decimal::new(92, 2);
        let suggested_target = entry_price * Decimal::new(124, 2);
        let max_loss = (size * (entry_price - suggested_stop)).abs();
        Self {
            weight_percent,
            concentration: ConcentrationRisk::from_weight_percent(weight_percent),
            suggested_stop,
            suggested_target,
            max_loss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationAction {
    Buy,
    Add,
    Hold,
    Reduce,
    Sell,
}

impl RecommendationAction {
    pub fn from_score(score: f64) -> Self {
        if score > 40.0 {
            RecommendationAction::Buy
        } else if score > 20.0 {
            RecommendationAction::Add
        } else if score < -40.0 {
            RecommendationAction::Sell
        } else if score < -20.0 {
            RecommendationAction::Reduce
        } else {
            RecommendationAction::Hold
        }
    }
}

/// Additive, point-based recommendation score in [-100, 100], combining
/// technicals with the position's own unrealised P&L.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub score: f64,
    pub confidence: f64,
    pub action: RecommendationAction,
}

impl Recommendation {
    pub fn derive(indicators: &TechnicalIndicators, pnl_percent: f64) -> Self {
        let mut score = 0.0;

        score += match indicators.rsi_signal {
            RsiSignal::StrongOverbought => -30.0,
            RsiSignal::Overbought => -15.0,
            RsiSignal::StrongOversold => 30.0,
            RsiSignal::Oversold => 15.0,
            RsiSignal::Neutral => 0.0,
        };
        score += match indicators.macd.trend {
            MacdTrend::Bullish => 20.0,
            MacdTrend::Bearish => -20.0,
            MacdTrend::Neutral => 0.0,
        };
        score += match indicators.ma_stack.trend {
            MaTrend::StrongUptrend | MaTrend::Uptrend => 25.0,
            MaTrend::StrongDowntrend | MaTrend::Downtrend => -25.0,
            MaTrend::Sideways => 0.0,
        };
        score += match indicators.bollinger.position {
            BollingerPosition::BelowLower => 15.0,
            BollingerPosition::AboveUpper => -15.0,
            BollingerPosition::Inside => 0.0,
        };
        if pnl_percent > 30.0 {
            score -= 10.0;
        }
        if pnl_percent < -15.0 {
            score -= 5.0;
        }

        let score = score.clamp(-100.0, 100.0);
        Self {
            score,
            confidence: score.abs().min(100.0),
            action: RecommendationAction::from_score(score),
        }
    }
}

/// One position's full enrichment: the raw position, its technicals, risk
/// metrics, and the derived recommendation. This is the unit C7 fans out
/// four analyses to build, then reassembles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedPosition {
    pub position: PortfolioPosition,
    pub indicators: Option<TechnicalIndicators>,
    pub sentiment: Option<String>,
    pub risk: Option<RiskMetrics>,
    pub recommendation: Option<Recommendation>,
}

/// Portfolio-wide summary built from the enriched positions, surfaced
/// alongside the per-position detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_value: Decimal,
    pub total_pnl: Decimal,
    pub largest_position: Option<Ticker>,
    pub largest_position_percent: Decimal,
    pub positions_needing_attention: Vec<Ticker>,
}

impl PortfolioSummary {
    pub fn from_enriched(positions: &[EnrichedPosition]) -> Self {
        let total_value: Decimal = positions.iter().map(|p| p.position.value()).sum();
        let total_pnl: Decimal = positions.iter().map(|p| p.position.pnl()).sum();

        let largest = positions
            .iter()
            .max_by_key(|p| p.position.value());

        let largest_position = largest.map(|p| p.position.ticker.clone());
        let largest_position_percent = match largest {
            Some(p) if !total_value.is_zero() => p.position.value() / total_value * Decimal::ONE_HUNDRED,
            _ => Decimal::ZERO,
        };

        let positions_needing_attention = positions
            .iter()
            .filter(|p| {
                matches!(
                    p.recommendation.as_ref().map(|r| r.action),
                    Some(RecommendationAction::Reduce) | Some(RecommendationAction::Sell)
                )
            })
            .map(|p| p.position.ticker.clone())
            .collect();

        Self {
            total_value,
            total_pnl,
            largest_position,
            largest_position_percent,
            positions_needing_attention,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::domain::technical::{
        BollingerBands, MacdOutput, MovingAverageStack, OverallSignal, VolumeAnalysis,
    };

    fn pos(ticker: &str, shares: Decimal, cost: Decimal, price: Decimal) -> PortfolioPosition {
        PortfolioPosition {
            ticker: Ticker::new(ticker).unwrap(),
            shares,
            avg_cost: cost,
            current_price: price,
        }
    }

    fn indicators(
        rsi_signal: RsiSignal,
        macd_trend: MacdTrend,
        ma_trend: MaTrend,
        bollinger: BollingerPosition,
    ) -> TechnicalIndicators {
        TechnicalIndicators {
            rsi: 50.0,
            rsi_signal,
            macd: MacdOutput {
                macd: 0.0,
                signal: 0.0,
                histogram: 0.0,
                trend: macd_trend,
            },
            bollinger: BollingerBands {
                upper: 110.0,
                middle: 100.0,
                lower: 90.0,
                bandwidth: 0.2,
                percent_b: 0.5,
                position: bollinger,
            },
            ma_stack: MovingAverageStack {
                sma20: 100.0,
                sma50: 95.0,
                sma200: 90.0,
                ema12: 101.0,
                ema26: 99.0,
                trend: ma_trend,
            },
            atr: 2.0,
            atr_percent: 2.0,
            volume: VolumeAnalysis {
                current: 1_000_000.0,
                sma20: 900_000.0,
                sma50: 850_000.0,
                percent_change: 10.0,
                obv_rising: true,
                confirms_price: true,
            },
            overall_signal: OverallSignal::Buy,
            overall_score: 0.6,
        }
    }

    #[test]
    fn concentration_tier_thresholds() {
        assert_eq!(ConcentrationRisk::from_weight_percent(30.0), ConcentrationRisk::High);
        assert_eq!(ConcentrationRisk::from_weight_percent(20.0), ConcentrationRisk::Medium);
        assert_eq!(ConcentrationRisk::from_weight_percent(5.0), ConcentrationRisk::Low);
    }

    #[test]
    fn risk_metrics_default_stop_and_target() {
        let risk = RiskMetrics::compute(dec!(100), dec!(10), dec!(1000), dec!(4000));
        assert_eq!(risk.suggested_stop, dec!(92.00));
        assert_eq!(risk.suggested_target, dec!(124.00));
        assert_eq!(risk.max_loss, dec!(80.00));
        assert_eq!(risk.weight_percent, 25.0);
    }

    #[test]
    fn bullish_alignment_scores_buy() {
        let tech = indicators(
            RsiSignal::StrongOversold,
            MacdTrend::Bullish,
            MaTrend::Uptrend,
            BollingerPosition::BelowLower,
        );
        let rec = Recommendation::derive(&tech, 0.0);
        assert!(rec.score > 40.0);
        assert_eq!(rec.action, RecommendationAction::Buy);
    }

    #[test]
    fn bearish_alignment_with_large_gain_scores_sell() {
        let tech = indicators(
            RsiSignal::StrongOverbought,
            MacdTrend::Bearish,
            MaTrend::Downtrend,
            BollingerPosition::AboveUpper,
        );
        let rec = Recommendation::derive(&tech, 35.0);
        assert!(rec.score < -40.0);
        assert_eq!(rec.action, RecommendationAction::Sell);
    }

    #[test]
    fn summary_identifies_largest_and_flags_attention() {
        let sell_rec = Recommendation {
            score: -50.0,
            confidence: 50.0,
            action: RecommendationAction::Sell,
        };
        let hold_rec = Recommendation {
            score: 0.0,
            confidence: 0.0,
            action: RecommendationAction::Hold,
        };
        let enriched = vec![
            EnrichedPosition {
                position: pos("AAPL", dec!(10), dec!(100), dec!(150)),
                indicators: None,
                sentiment: None,
                risk: None,
                recommendation: Some(sell_rec),
            },
            EnrichedPosition {
                position: pos("MSFT", dec!(5), dec!(200), dec!(210)),
                indicators: None,
                sentiment: None,
                risk: None,
                recommendation: Some(hold_rec),
            },
        ];
        let summary = PortfolioSummary::from_enriched(&enriched);
        assert_eq!(summary.largest_position.unwrap().as_str(), "AAPL");
        assert_eq!(summary.positions_needing_attention.len(), 1);
    }
}
