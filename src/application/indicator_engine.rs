//! C8 Technical Indicator Engine: replays a bar series once through
//! stateful `ta`-crate primitives (`.next(value)` idiom) to produce the
//! pure `TechnicalIndicators` aggregate C7 and C13 both consume.

use crate::domain::errors::AppError;
use crate::domain::market_data::HistoricalBar;
use crate::domain::technical::{
    BollingerBands, BollingerPosition, MacdOutput, MacdTrend, MaTrend, MovingAverageStack, OverallSignal,
    RsiSignal, TechnicalIndicators, VolumeAnalysis,
};
use rust_decimal::prelude::ToPrimitive;
use ta::indicators::{
    AverageTrueRange, BollingerBands as TaBollingerBands, ExponentialMovingAverage,
    MovingAverageConvergenceDivergence, OnBalanceVolume, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};

/// Computes the full indicator set from an ascending-by-date bar series.
/// Requires at least 200 bars to populate SMA200; shorter series still
/// produce a result, with the longer moving averages converging toward the
/// available history per `ta`'s own warm-up behaviour.
pub fn compute(bars: &[HistoricalBar]) -> Result<TechnicalIndicators, AppError> {
    if bars.len() < 2 {
        return Err(AppError::Validation("need at least 2 bars to compute indicators".into()));
    }

    let mut rsi = RelativeStrengthIndex::new(14).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut bollinger = TaBollingerBands::new(20, 2.0).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut sma20 = SimpleMovingAverage::new(20).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut sma50 = SimpleMovingAverage::new(50).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut sma200 = SimpleMovingAverage::new(200).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut ema12 = ExponentialMovingAverage::new(12).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut ema26 = ExponentialMovingAverage::new(26).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut atr = AverageTrueRange::new(14).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut volume_sma20 = SimpleMovingAverage::new(20).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut volume_sma50 = SimpleMovingAverage::new(50).map_err(|e| AppError::Validation(e.to_string()))?;
    let mut obv = OnBalanceVolume::new();

    let (mut rsi_value, mut macd_out, mut bb_out) = (50.0, (0.0, 0.0, 0.0), (0.0, 0.0, 0.0));
    let (mut sma20_v, mut sma50_v, mut sma200_v, mut ema12_v, mut ema26_v) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let (mut atr_v, mut vol_sma20_v, mut vol_sma50_v) = (0.0, 0.0, 0.0);
    let mut obv_prev = 0.0;
    let mut obv_rising = false;
    let mut last_close = 0.0;
    let mut prev_close = 0.0;

    for bar in bars {
        let close = bar.close.to_f64().unwrap_or(0.0);
        let high = bar.high.to_f64().unwrap_or(close);
        let low = bar.low.to_f64().unwrap_or(close);
        let open = bar.open.to_f64().unwrap_or(close);
        let volume = bar.volume as f64;

        rsi_value = rsi.next(close);
        let macd_result = macd.next(close);
        macd_out = (macd_result.macd, macd_result.signal, macd_result.histogram);
        let bb_result = bollinger.next(close);
        bb_out = (bb_result.upper, bb_result.average, bb_result.lower);
        sma20_v = sma20.next(close);
        sma50_v = sma50.next(close);
        sma200_v = sma200.next(close);
        ema12_v = ema12.next(close);
        ema26_v = ema26.next(close);
        vol_sma20_v = volume_sma20.next(volume);
        vol_sma50_v = volume_sma50.next(volume);

        if let Ok(item) = DataItem::builder()
            .open(open)
            .high(high)
            .low(low)
            .close(close)
            .volume(volume)
            .build()
        {
            atr_v = atr.next(&item);
            let obv_value = obv.next(&item);
            obv_rising = obv_value > obv_prev;
            obv_prev = obv_value;
        }

        prev_close = last_close;
        last_close = close;
    }

    let (upper, middle, lower) = bb_out;
    let bandwidth = if middle != 0.0 { (upper - lower) / middle } else { 0.0 };
    let percent_b = if (upper - lower).abs() > f64::EPSILON {
        (last_close - lower) / (upper - lower)
    } else {
        0.5
    };
    let bollinger_position = BollingerPosition::from_percent_b(percent_b);

    let (macd_line, signal_line, histogram) = macd_out;
    let macd_trend = MacdTrend::from_values(macd_line, signal_line, histogram);

    // Proxy for a golden cross: the medium-term average already above the
    // long-term one, since a full crossover-event history isn't retained.
    let golden_cross = sma50_v > sma200_v;
    let ma_trend = MaTrend::from_stack(last_close, sma20_v, sma50_v, sma200_v, golden_cross);

    let rsi_signal = RsiSignal::from_value(rsi_value);

    let percent_change = if vol_sma20_v != 0.0 {
        (bars.last().map(|b| b.volume as f64).unwrap_or(0.0) - vol_sma20_v) / vol_sma20_v * 100.0
    } else {
        0.0
    };
    let price_rising = last_close >= prev_close;
    let confirms_price = price_rising == obv_rising;

    let volume = VolumeAnalysis {
        current: bars.last().map(|b| b.volume as f64).unwrap_or(0.0),
        sma20: vol_sma20_v,
        sma50: vol_sma50_v,
        percent_change,
        obv_rising,
        confirms_price,
    };

    let overall_score = crate::domain::technical::weighted_overall_score(
        rsi_signal,
        macd_trend,
        bollinger_position,
        ma_trend,
        confirms_price,
    );

    Ok(TechnicalIndicators {
        rsi: rsi_value,
        rsi_signal,
        macd: MacdOutput {
            macd: macd_line,
            signal: signal_line,
            histogram,
            trend: macd_trend,
        },
        bollinger: BollingerBands {
            upper,
            middle,
            lower,
            bandwidth,
            percent_b,
            position: bollinger_position,
        },
        ma_stack: MovingAverageStack {
            sma20: sma20_v,
            sma50: sma50_v,
            sma200: sma200_v,
            ema12: ema12_v,
            ema26: ema26_v,
            trend: ma_trend,
        },
        atr: atr_v,
        atr_percent: if last_close != 0.0 { atr_v / last_close * 100.0 } else { 0.0 },
        volume,
        overall_signal: OverallSignal::from_score(overall_score),
        overall_score,
    })
}
