//! S4 — backtest with risk-off switch (spec §8 scenario 4).
//!
//! Drives `BacktestEngine` directly (not through C10's live-quote-fetching
//! wrapper) with a hand-built macro signal series: 200 calm days, 10
//! consecutive days below SMA200 (enough to trip the 7-day entry
//! confirmation), then a recovery stretch whose length varies per case. Only
//! a recovery of exactly the 14-day exit confirmation closes the period
//! before the dataset ends; shorter recoveries leave it open.

use chrono::NaiveDate;
use marketloom::domain::performance::backtest::{
    BacktestBar, BacktestConfig, BacktestEngine, RebalanceFrequency, RiskOffTrigger, SignalSnapshot,
};
use std::collections::HashMap;

const STRESS_DAYS: i64 = 10;
const ENTRY_DAYS: u32 = 7;
const EXIT_DAYS: u32 = 14;
const TRAILING_BUFFER_DAYS: i64 = 3;

fn run_with_recovery_length(recovery_days: i64) -> marketloom::domain::performance::backtest::BacktestResult {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let total_days = 200 + STRESS_DAYS + recovery_days + TRAILING_BUFFER_DAYS;

    let flat_bars = |ticker_price: f64| -> Vec<BacktestBar> {
        (0..total_days)
            .map(|i| BacktestBar {
                date: start + chrono::Duration::days(i),
                close: ticker_price,
                dividend: 0.0,
            })
            .collect()
    };

    let historical_data = HashMap::from([
        ("SPY".to_string(), flat_bars(100.0)),
        ("SGOV".to_string(), flat_bars(100.0)),
    ]);

    let mut signal_data = HashMap::new();
    for i in 0..total_days {
        let date = start + chrono::Duration::days(i);
        let in_stress_window = i >= 200 && i < 200 + STRESS_DAYS;
        signal_data.insert(
            date,
            SignalSnapshot {
                hyg_lqd_ratio: None,
                hyg_lqd_sma50: None,
                vix_close: None,
                vix_sma20: None,
                spy_close: Some(if in_stress_window { 90.0 } else { 110.0 }),
                spy_sma200: Some(100.0),
                spy_drawdown: None,
            },
        );
    }

    let config = BacktestConfig {
        start_date: start,
        end_date: start + chrono::Duration::days(total_days - 1),
        initial_capital: 10_000.0,
        allocation: HashMap::from([("SPY".to_string(), 100.0)]),
        risk_off_allocation: Some(HashMap::from([("SGOV".to_string(), 100.0)])),
        risk_off_enabled: true,
        risk_off_trigger: RiskOffTrigger::SpyBelowSma200,
        risk_off_entry_days: ENTRY_DAYS,
        risk_off_exit_days: EXIT_DAYS,
        rebalance_frequency: RebalanceFrequency::Monthly,
        include_dividends: false,
        monthly_contribution: 0.0,
        slippage: 0.0,
        fx_fee: 0.0,
        commission_per_trade: 0.0,
    };

    let mut engine = BacktestEngine::new();
    engine.run(&config, &historical_data, &signal_data)
}

#[test]
fn recovery_shorter_than_exit_confirmation_leaves_period_open() {
    for recovery_days in [5, 10] {
        let result = run_with_recovery_length(recovery_days);
        assert_eq!(result.risk_off_periods.len(), 1, "recovery_days={recovery_days}");
        let period = &result.risk_off_periods[0];
        let expected_forced_close = 200 + STRESS_DAYS + recovery_days + TRAILING_BUFFER_DAYS - 1;
        let actual_end_day_offset = (period.end_date.unwrap()
            - (NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()))
        .num_days();
        assert_eq!(
            actual_end_day_offset, expected_forced_close,
            "recovery_days={recovery_days} should still be open at the dataset's last day"
        );
    }
}

#[test]
fn recovery_of_exactly_the_exit_confirmation_closes_the_period_mid_replay() {
    let result = run_with_recovery_length(EXIT_DAYS as i64);
    assert_eq!(result.risk_off_periods.len(), 1);

    let period = &result.risk_off_periods[0];
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let start_offset = (period.start_date - base).num_days();
    let end_offset = (period.end_date.unwrap() - base).num_days();

    assert_eq!(start_offset, 200 + ENTRY_DAYS as i64);
    assert_eq!(end_offset, 200 + STRESS_DAYS + EXIT_DAYS as i64);
    // Closed before the dataset's final day (confirms a natural exit, not a forced close).
    assert!(end_offset < 200 + STRESS_DAYS + EXIT_DAYS as i64 + TRAILING_BUFFER_DAYS);
}
