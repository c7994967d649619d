use serde::{Deserialize, Serialize};

/// Raw indicators C13 derives from HYG, LQD, VIX, SPY and yield-curve
/// ticker data fetched via C4, before they are collapsed into a stress count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StressIndicators {
    pub credit_stress: bool,
    pub vix_elevated: bool,
    pub vix_spike: bool,
    pub spy_below_sma200: bool,
    pub spy_drawdown_alert: bool,
    pub yield_curve_inverted: bool,
}

impl StressIndicators {
    pub fn stress_count(&self) -> u8 {
        [
            self.credit_stress,
            self.vix_elevated,
            self.vix_spike,
            self.spy_below_sma200,
            self.spy_drawdown_alert,
            self.yield_curve_inverted,
        ]
        .into_iter()
        .filter(|fired| *fired)
        .count() as u8
    }
}

/// Observed market values C13 derives `StressIndicators` from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalData {
    pub hyg_lqd_ratio: f64,
    pub hyg_lqd_sma50: f64,
    pub vix: f64,
    pub vix_sma20: f64,
    pub spy_close: f64,
    pub spy_sma200: f64,
    pub spy_drawdown_from_high_percent: f64,
    pub yield_10y: f64,
    pub yield_2y: f64,
}

impl SignalData {
    pub fn derive_indicators(&self) -> StressIndicators {
        StressIndicators {
            credit_stress: self.hyg_lqd_ratio < self.hyg_lqd_sma50,
            vix_elevated: self.vix > 25.0,
            vix_spike: self.vix > 30.0,
            spy_below_sma200: self.spy_close < self.spy_sma200,
            spy_drawdown_alert: self.spy_drawdown_from_high_percent < -10.0,
            yield_curve_inverted: self.yield_10y < self.yield_2y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketRegime {
    RiskOn,
    Neutral,
    RiskOff,
    HighUncertainty,
}

impl MarketRegime {
    /// Stress-count mapping: 0 -> risk_on, 1-2 -> neutral, 3 -> risk_off,
    /// >=4 or an outright VIX spike -> high_uncertainty.
    pub fn from_indicators(indicators: &StressIndicators) -> Self {
        let count = indicators.stress_count();
        if count >= 4 || indicators.vix_spike {
            MarketRegime::HighUncertainty
        } else {
            match count {
                0 => MarketRegime::RiskOn,
                1 | 2 => MarketRegime::Neutral,
                _ => MarketRegime::RiskOff,
            }
        }
    }

    pub fn from_signals(signals: &SignalData) -> Self {
        Self::from_indicators(&signals.derive_indicators())
    }

    pub fn interpretation(&self) -> &'static str {
        match self {
            MarketRegime::RiskOn => "broad market conditions are calm; no defensive posture warranted",
            MarketRegime::Neutral => "one or two stress indicators have fired; monitor for confirmation",
            MarketRegime::RiskOff => {
                "three stress indicators have fired; consider reducing risk exposure"
            }
            MarketRegime::HighUncertainty => {
                "four or more stress indicators have fired, or VIX has spiked; a defensive posture is strongly warranted"
            }
        }
    }
}

/// Debounces regime flips so a single noisy tick doesn't flip the reported
/// regime back and forth. A candidate regime must persist for
/// `confirmation_ticks` consecutive observations before it is adopted.
#[derive(Debug, Clone)]
pub struct AntiWhipsawState {
    pub current: MarketRegime,
    pub candidate: Option<MarketRegime>,
    pub candidate_streak: u32,
    pub confirmation_ticks: u32,
}

impl AntiWhipsawState {
    pub fn new(initial: MarketRegime, confirmation_ticks: u32) -> Self {
        Self {
            current: initial,
            candidate: None,
            candidate_streak: 0,
            confirmation_ticks,
        }
    }

    /// Feed one new observation. Returns `true` if `current` changed.
    pub fn observe(&mut self, observed: MarketRegime) -> bool {
        if observed == self.current {
            self.candidate = None;
            self.candidate_streak = 0;
            return false;
        }

        match self.candidate {
            Some(candidate) if candidate == observed => {
                self.candidate_streak += 1;
            }
            _ => {
                self.candidate = Some(observed);
                self.candidate_streak = 1;
            }
        }

        if self.candidate_streak >= self.confirmation_ticks {
            self.current = observed;
            self.candidate = None;
            self.candidate_streak = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicators(
        credit_stress: bool,
        vix_elevated: bool,
        vix_spike: bool,
        spy_below_sma200: bool,
        spy_drawdown_alert: bool,
        yield_curve_inverted: bool,
    ) -> StressIndicators {
        StressIndicators {
            credit_stress,
            vix_elevated,
            vix_spike,
            spy_below_sma200,
            spy_drawdown_alert,
            yield_curve_inverted,
        }
    }

    #[test]
    fn risk_on_when_no_indicators_fire() {
        let regime = MarketRegime::from_indicators(&indicators(false, false, false, false, false, false));
        assert_eq!(regime, MarketRegime::RiskOn);
    }

    #[test]
    fn neutral_at_one_or_two_indicators() {
        let regime = MarketRegime::from_indicators(&indicators(true, false, false, false, false, false));
        assert_eq!(regime, MarketRegime::Neutral);
        let regime = MarketRegime::from_indicators(&indicators(true, true, false, false, false, false));
        assert_eq!(regime, MarketRegime::Neutral);
    }

    #[test]
    fn risk_off_at_exactly_three_indicators() {
        let regime = MarketRegime::from_indicators(&indicators(true, true, false, true, false, false));
        assert_eq!(regime, MarketRegime::RiskOff);
    }

    #[test]
    fn high_uncertainty_on_vix_spike_even_with_few_indicators() {
        let regime = MarketRegime::from_indicators(&indicators(false, false, true, false, false, false));
        assert_eq!(regime, MarketRegime::HighUncertainty);
    }

    #[test]
    fn high_uncertainty_at_four_or_more_indicators() {
        let regime = MarketRegime::from_indicators(&indicators(true, true, false, true, true, false));
        assert_eq!(regime, MarketRegime::HighUncertainty);
    }

    #[test]
    fn anti_whipsaw_requires_sustained_signal_before_flipping() {
        let mut state = AntiWhipsawState::new(MarketRegime::RiskOn, 3);
        assert!(!state.observe(MarketRegime::RiskOff));
        assert!(!state.observe(MarketRegime::RiskOff));
        assert_eq!(state.current, MarketRegime::RiskOn);
        assert!(state.observe(MarketRegime::RiskOff));
        assert_eq!(state.current, MarketRegime::RiskOff);
    }

    #[test]
    fn anti_whipsaw_resets_streak_on_reversion() {
        let mut state = AntiWhipsawState::new(MarketRegime::RiskOn, 3);
        state.observe(MarketRegime::RiskOff);
        assert!(!state.observe(MarketRegime::RiskOn));
        assert_eq!(state.candidate_streak, 0);
    }
}
