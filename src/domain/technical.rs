use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiSignal {
    StrongOverbought,
    Overbought,
    Neutral,
    Oversold,
    StrongOversold,
}

impl RsiSignal {
    pub fn from_value(rsi: f64) -> Self {
        if rsi >= 80.0 {
            RsiSignal::StrongOverbought
        } else if rsi >= 70.0 {
            RsiSignal::Overbought
        } else if rsi <= 20.0 {
            RsiSignal::StrongOversold
        } else if rsi <= 30.0 {
            RsiSignal::Oversold
        } else {
            RsiSignal::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacdTrend {
    Bullish,
    Bearish,
    Neutral,
}

impl MacdTrend {
    pub fn from_values(macd: f64, signal: f64, histogram: f64) -> Self {
        if histogram > 0.0 && macd > signal {
            MacdTrend::Bullish
        } else if histogram < 0.0 && macd < signal {
            MacdTrend::Bearish
        } else {
            MacdTrend::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaTrend {
    StrongUptrend,
    Uptrend,
    Sideways,
    Downtrend,
    StrongDowntrend,
}

impl MaTrend {
    pub fn from_stack(price: f64, sma20: f64, sma50: f64, sma200: f64, golden_cross: bool) -> Self {
        if price > sma20 && sma20 > sma50 {
            if price > sma200 && golden_cross {
                MaTrend::StrongUptrend
            } else {
                MaTrend::Uptrend
            }
        } else if price < sma20 && sma20 < sma50 {
            if price < sma200 && !golden_cross {
                MaTrend::StrongDowntrend
            } else {
                MaTrend::Downtrend
            }
        } else {
            MaTrend::Sideways
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BollingerPosition {
    AboveUpper,
    Inside,
    BelowLower,
}

impl BollingerPosition {
    pub fn from_percent_b(percent_b: f64) -> Self {
        if percent_b >= 1.0 {
            BollingerPosition::AboveUpper
        } else if percent_b <= 0.0 {
            BollingerPosition::BelowLower
        } else {
            BollingerPosition::Inside
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallSignal {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl OverallSignal {
    pub fn from_score(score: f64) -> Self {
        if score >= 1.2 {
            OverallSignal::StrongBuy
        } else if score >= 0.5 {
            OverallSignal::Buy
        } else if score <= -1.2 {
            OverallSignal::StrongSell
        } else if score <= -0.5 {
            OverallSignal::Sell
        } else {
            OverallSignal::Neutral
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub bandwidth: f64,
    pub percent_b: f64,
    pub position: BollingerPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    pub trend: MacdTrend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovingAverageStack {
    pub sma20: f64,
    pub sma50: f64,
    pub sma200: f64,
    pub ema12: f64,
    pub ema26: f64,
    pub trend: MaTrend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeAnalysis {
    pub current: f64,
    pub sma20: f64,
    pub sma50: f64,
    pub percent_change: f64,
    pub obv_rising: bool,
    pub confirms_price: bool,
}

/// Pure, deterministic aggregate of the indicators produced by C8 for one
/// bar series. Stateless: the same input bars always produce byte-identical
/// output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub rsi: f64,
    pub rsi_signal: RsiSignal,
    pub macd: MacdOutput,
    pub bollinger: BollingerBands,
    pub ma_stack: MovingAverageStack,
    pub atr: f64,
    pub atr_percent: f64,
    pub volume: VolumeAnalysis,
    pub overall_signal: OverallSignal,
    pub overall_score: f64,
}

/// Weighted-vote contribution of each sub-signal, per the aggregation policy
/// shared by C7's recommendation scoring and C8's overall signal.
pub const WEIGHT_RSI: f64 = 0.20;
pub const WEIGHT_MACD: f64 = 0.25;
pub const WEIGHT_BOLLINGER: f64 = 0.15;
pub const WEIGHT_MA: f64 = 0.30;
pub const WEIGHT_VOLUME: f64 = 0.10;

pub fn weighted_overall_score(
    rsi_signal: RsiSignal,
    macd_trend: MacdTrend,
    bollinger: BollingerPosition,
    ma_trend: MaTrend,
    volume_confirms: bool,
) -> f64 {
    let rsi_component = match rsi_signal {
        RsiSignal::StrongOversold => 2.0,
        RsiSignal::Oversold => 1.0,
        RsiSignal::Neutral => 0.0,
        RsiSignal::Overbought => -1.0,
        RsiSignal::StrongOverbought => -2.0,
    };
    let macd_component = match macd_trend {
        MacdTrend::Bullish => 1.0,
        MacdTrend::Bearish => -1.0,
        MacdTrend::Neutral => 0.0,
    };
    let bollinger_component = match bollinger {
        BollingerPosition::BelowLower => 1.0,
        BollingerPosition::AboveUpper => -1.0,
        BollingerPosition::Inside => 0.0,
    };
    let ma_component = match ma_trend {
        MaTrend::StrongUptrend => 2.0,
        MaTrend::Uptrend => 1.0,
        MaTrend::Sideways => 0.0,
        MaTrend::Downtrend => -1.0,
        MaTrend::StrongDowntrend => -2.0,
    };
    let volume_component = if volume_confirms { 1.0 } else { 0.0 };

    rsi_component * WEIGHT_RSI
        + macd_component * WEIGHT_MACD
        + bollinger_component * WEIGHT_BOLLINGER
        + ma_component * WEIGHT_MA
        + volume_component * WEIGHT_VOLUME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_signal_thresholds() {
        assert_eq!(RsiSignal::from_value(85.0), RsiSignal::StrongOverbought);
        assert_eq!(RsiSignal::from_value(72.0), RsiSignal::Overbought);
        assert_eq!(RsiSignal::from_value(50.0), RsiSignal::Neutral);
        assert_eq!(RsiSignal::from_value(25.0), RsiSignal::Oversold);
        assert_eq!(RsiSignal::from_value(10.0), RsiSignal::StrongOversold);
    }

    #[test]
    fn bollinger_identity_at_bounds() {
        assert_eq!(
            BollingerPosition::from_percent_b(0.0),
            BollingerPosition::BelowLower
        );
        assert_eq!(
            BollingerPosition::from_percent_b(1.0),
            BollingerPosition::AboveUpper
        );
        assert_eq!(
            BollingerPosition::from_percent_b(0.5),
            BollingerPosition::Inside
        );
    }

    #[test]
    fn overall_signal_thresholds() {
        assert_eq!(OverallSignal::from_score(1.5), OverallSignal::StrongBuy);
        assert_eq!(OverallSignal::from_score(0.7), OverallSignal::Buy);
        assert_eq!(OverallSignal::from_score(0.0), OverallSignal::Neutral);
        assert_eq!(OverallSignal::from_score(-0.7), OverallSignal::Sell);
        assert_eq!(OverallSignal::from_score(-1.5), OverallSignal::StrongSell);
    }

    #[test]
    fn weights_sum_to_one() {
        let total = WEIGHT_RSI + WEIGHT_MACD + WEIGHT_BOLLINGER + WEIGHT_MA + WEIGHT_VOLUME;
        assert!((total - 1.0).abs() < 1e-9);
    }
}
