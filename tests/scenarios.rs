//! Cross-component black-box scenarios (spec §8, S1-S6), each driving a
//! public application-layer handle with offline/fake collaborators instead
//! of a live broker or network. One integration-test binary, one module per
//! scenario, mirroring the `tests/scenarios/` layout.

#[path = "scenarios/token_refresh.rs"]
mod token_refresh;

#[path = "scenarios/mode_switch.rs"]
mod mode_switch;

#[path = "scenarios/enrichment_partial_failure.rs"]
mod enrichment_partial_failure;

#[path = "scenarios/backtest_risk_off.rs"]
mod backtest_risk_off;

#[path = "scenarios/monte_carlo_deterministic.rs"]
mod monte_carlo_deterministic;

#[path = "scenarios/trade_close_integrity.rs"]
mod trade_close_integrity;
