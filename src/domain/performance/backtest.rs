use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One bar in the backtest's own bar type. Distinct from `market_data::HistoricalBar`
/// so the engine can operate purely on `f64` without decimal conversion on
/// every tick of a multi-year, multi-asset replay.
#[derive(Debug, Clone, Copy)]
pub struct BacktestBar {
    pub date: NaiveDate,
    pub close: f64,
    pub dividend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskOffTrigger {
    HygLqdBelowSma50,
    VixAbove25,
    SpyBelowSma200,
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceFrequency {
    Monthly,
    Quarterly,
    Annual,
}

/// Daily macro snapshot consumed by the risk-off trigger set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalSnapshot {
    pub hyg_lqd_ratio: Option<f64>,
    pub hyg_lqd_sma50: Option<f64>,
    pub vix_close: Option<f64>,
    pub vix_sma20: Option<f64>,
    pub spy_close: Option<f64>,
    pub spy_sma200: Option<f64>,
    pub spy_drawdown: Option<f64>,
}

impl SignalSnapshot {
    pub fn credit_stress(&self) -> bool {
        matches!((self.hyg_lqd_ratio, self.hyg_lqd_sma50), (Some(r), Some(s)) if r < s)
    }

    pub fn vix_elevated(&self) -> bool {
        match self.vix_close {
            Some(vix) if vix > 25.0 => true,
            Some(vix) => self.vix_sma20.is_some_and(|sma| vix > sma),
            None => false,
        }
    }

    pub fn spy_weak(&self) -> bool {
        matches!((self.spy_close, self.spy_sma200), (Some(c), Some(s)) if c < s)
    }

    pub fn drawdown_alert(&self) -> bool {
        self.spy_drawdown.is_some_and(|dd| dd < -0.10)
    }

    pub fn fires(&self, trigger: RiskOffTrigger) -> bool {
        match trigger {
            RiskOffTrigger::HygLqdBelowSma50 => self.credit_stress(),
            RiskOffTrigger::VixAbove25 => self.vix_elevated(),
            RiskOffTrigger::SpyBelowSma200 => self.spy_weak(),
            RiskOffTrigger::Combined => {
                let count = [
                    self.credit_stress(),
                    self.vix_elevated(),
                    self.spy_weak(),
                    self.drawdown_alert(),
                ]
                .into_iter()
                .filter(|f| *f)
                .count();
                count >= 2
            }
        }
    }
}

/// Consecutive-day counters that debounce risk-off transitions. Currently
/// risk-on flips to risk-off only after `entry_days` consecutive risk-off
/// signal days; currently risk-off reverts only after `exit_days`
/// consecutive risk-on signal days.
#[derive(Debug, Clone, Copy, Default)]
pub struct AntiWhipsawCounters {
    pub days_risk_off_signal: u32,
    pub days_risk_on_signal: u32,
    pub is_risk_off: bool,
}

impl AntiWhipsawCounters {
    pub fn observe(&mut self, should_be_risk_off: bool, entry_days: u32, exit_days: u32) -> bool {
        if should_be_risk_off {
            self.days_risk_off_signal += 1;
            self.days_risk_on_signal = 0;
        } else {
            self.days_risk_on_signal += 1;
            self.days_risk_off_signal = 0;
        }

        let new_state = if self.is_risk_off {
            self.days_risk_on_signal < exit_days
        } else {
            self.days_risk_off_signal >= entry_days
        };
        self.is_risk_off = new_state;
        new_state
    }
}

#[derive(Debug, Clone)]
pub struct RiskOffPeriod {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub trigger: RiskOffTrigger,
    pub duration_days: i64,
}

#[derive(Debug, Clone, Copy)]
pub enum TradeAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: TradeAction,
    pub shares: f64,
    pub price: f64,
    pub amount: f64,
    pub fees: f64,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub drawdown: f64,
    pub is_risk_off: bool,
}

#[derive(Debug, Clone)]
struct Position {
    shares: f64,
    avg_cost: f64,
    current_price: f64,
}

impl Position {
    fn value(&self) -> f64 {
        self.shares * self.current_price
    }
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub allocation: HashMap<String, f64>,
    pub risk_off_allocation: Option<HashMap<String, f64>>,
    pub risk_off_enabled: bool,
    pub risk_off_trigger: RiskOffTrigger,
    pub risk_off_entry_days: u32,
    pub risk_off_exit_days: u32,
    pub rebalance_frequency: RebalanceFrequency,
    pub include_dividends: bool,
    pub monthly_contribution: f64,
    pub slippage: f64,
    pub fx_fee: f64,
    pub commission_per_trade: f64,
}

fn default_risk_off_allocation() -> HashMap<String, f64> {
    HashMap::from([
        ("SGOV".to_string(), 40.0),
        ("BIL".to_string(), 30.0),
        ("AGG".to_string(), 20.0),
        ("BND".to_string(), 10.0),
    ])
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub final_value: f64,
    pub cagr: f64,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: u32,
    pub volatility: f64,
    pub total_dividends: f64,
    pub total_fees: f64,
    pub time_in_risk_off_percent: f64,
    pub risk_off_periods: Vec<RiskOffPeriod>,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub monthly_returns: Vec<f64>,
    pub warnings: Vec<String>,
}

/// Day-by-day multi-asset replay with risk-off regime switching. Pure
/// computation: all history and signals are supplied by the caller.
pub struct BacktestEngine {
    positions: HashMap<String, Position>,
    cash: f64,
    trades: Vec<TradeRecord>,
    equity_curve: Vec<EquityPoint>,
    risk_off_periods: Vec<RiskOffPeriod>,
    anti_whipsaw: AntiWhipsawCounters,
    total_dividends: f64,
    total_fees: f64,
}

impl BacktestEngine {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            cash: 0.0,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            risk_off_periods: Vec::new(),
            anti_whipsaw: AntiWhipsawCounters::default(),
            total_dividends: 0.0,
            total_fees: 0.0,
        }
    }

    pub fn run(
        &mut self,
        config: &BacktestConfig,
        historical_data: &HashMap<String, Vec<BacktestBar>>,
        signal_data: &HashMap<NaiveDate, SignalSnapshot>,
    ) -> BacktestResult {
        let warnings = Self::validate_data(config, historical_data);

        let mut all_dates: Vec<NaiveDate> = historical_data
            .values()
            .flat_map(|bars| bars.iter())
            .filter(|bar| bar.date >= config.start_date && bar.date <= config.end_date)
            .map(|bar| bar.date)
            .collect();
        all_dates.sort();
        all_dates.dedup();

        if all_dates.is_empty() {
            return self.empty_result(config, warnings);
        }

        self.cash = config.initial_capital;

        let mut last_rebalance: Option<NaiveDate> = None;
        let mut current_risk_off_period: Option<RiskOffPeriod> = None;
        let mut rolling_max = config.initial_capital;
        let mut monthly_values: Vec<(NaiveDate, f64)> = Vec::new();

        for &current_date in &all_dates {
            self.mark_to_market(current_date, historical_data);

            if config.include_dividends {
                self.collect_dividends(current_date, historical_data);
            }

            if config.monthly_contribution > 0.0
                && current_date.day() <= 5
                && last_rebalance.is_none_or(|last| current_date.month() != last.month())
            {
                self.cash += config.monthly_contribution;
            }

            if config.risk_off_enabled {
                if let Some(signals) = signal_data.get(&current_date) {
                    let should_be_risk_off = signals.fires(config.risk_off_trigger);
                    let new_is_risk_off = self.anti_whipsaw.observe(
                        should_be_risk_off,
                        config.risk_off_entry_days,
                        config.risk_off_exit_days,
                    );
                    let was_risk_off = current_risk_off_period.is_some();
                    if new_is_risk_off != was_risk_off {
                        if new_is_risk_off {
                            current_risk_off_period = Some(RiskOffPeriod {
                                start_date: current_date,
                                end_date: None,
                                trigger: config.risk_off_trigger,
                                duration_days: 0,
                            });
                            let target = config
                                .risk_off_allocation
                                .clone()
                                .unwrap_or_else(default_risk_off_allocation);
                            self.rebalance(current_date, &target, config, historical_data, "risk_off_entry");
                        } else if let Some(mut period) = current_risk_off_period.take() {
                            period.end_date = Some(current_date);
                            period.duration_days = (current_date - period.start_date).num_days();
                            self.risk_off_periods.push(period);
                            self.rebalance(current_date, &config.allocation, config, historical_data, "risk_on_entry");
                        }
                    }
                }
            }

            let is_risk_off = current_risk_off_period.is_some();
            let active_allocation = if is_risk_off {
                config.risk_off_allocation.clone().unwrap_or_else(default_risk_off_allocation)
            } else {
                config.allocation.clone()
            };

            if Self::should_rebalance(current_date, last_rebalance, config.rebalance_frequency) {
                self.rebalance(current_date, &active_allocation, config, historical_data, "rebalance");
                last_rebalance = Some(current_date);
            }

            let portfolio_value = self.portfolio_value();
            rolling_max = rolling_max.max(portfolio_value);
            let drawdown = if rolling_max > 0.0 {
                portfolio_value / rolling_max - 1.0
            } else {
                0.0
            };

            self.equity_curve.push(EquityPoint {
                date: current_date,
                portfolio_value,
                drawdown,
                is_risk_off,
            });

            match monthly_values.last() {
                Some((last_date, _)) if last_date.month() == current_date.month() && last_date.year() == current_date.year() => {}
                _ => monthly_values.push((current_date, portfolio_value)),
            }
        }

        if let Some(mut period) = current_risk_off_period {
            let last_date = *all_dates.last().unwrap();
            period.end_date = Some(last_date);
            period.duration_days = (last_date - period.start_date).num_days();
            self.risk_off_periods.push(period);
        }

        self.calculate_metrics(config, &all_dates, &monthly_values, warnings)
    }

    fn validate_data(config: &BacktestConfig, historical_data: &HashMap<String, Vec<BacktestBar>>) -> Vec<String> {
        let mut warnings = Vec::new();
        for ticker in config.allocation.keys() {
            match historical_data.get(ticker) {
                None => warnings.push(format!("missing historical data for {ticker}")),
                Some(bars) if bars.len() < 50 => {
                    warnings.push(format!("short history for {ticker} ({} days)", bars.len()))
                }
                _ => {}
            }
        }
        warnings
    }

    fn bar_for_date<'a>(bars: &'a [BacktestBar], date: NaiveDate) -> Option<&'a BacktestBar> {
        bars.iter().find(|bar| bar.date == date)
    }

    fn mark_to_market(&mut self, date: NaiveDate, historical_data: &HashMap<String, Vec<BacktestBar>>) {
        for (ticker, position) in self.positions.iter_mut() {
            if let Some(bars) = historical_data.get(ticker) {
                if let Some(bar) = Self::bar_for_date(bars, date) {
                    position.current_price = bar.close;
                }
            }
        }
    }

    fn collect_dividends(&mut self, date: NaiveDate, historical_data: &HashMap<String, Vec<BacktestBar>>) {
        let mut credited = 0.0;
        for (ticker, position) in self.positions.iter() {
            if let Some(bars) = historical_data.get(ticker) {
                if let Some(bar) = Self::bar_for_date(bars, date) {
                    if bar.dividend > 0.0 {
                        credited += bar.dividend * position.shares;
                    }
                }
            }
        }
        self.cash += credited;
        self.total_dividends += credited;
    }

    fn portfolio_value(&self) -> f64 {
        self.cash + self.positions.values().map(|p| p.value()).sum::<f64>()
    }

    fn should_rebalance(current: NaiveDate, last: Option<NaiveDate>, frequency: RebalanceFrequency) -> bool {
        let Some(last) = last else { return true };
        match frequency {
            RebalanceFrequency::Monthly => current.month() != last.month() || current.year() != last.year(),
            RebalanceFrequency::Quarterly => {
                let current_quarter = (current.month() - 1) / 3;
                let last_quarter = (last.month() - 1) / 3;
                current_quarter != last_quarter || current.year() != last.year()
            }
            RebalanceFrequency::Annual => current.year() != last.year(),
        }
    }

    fn current_price(&self, ticker: &str, date: NaiveDate, historical_data: &HashMap<String, Vec<BacktestBar>>) -> Option<f64> {
        historical_data.get(ticker).and_then(|bars| Self::bar_for_date(bars, date)).map(|bar| bar.close)
    }

    fn rebalance(
        &mut self,
        date: NaiveDate,
        target_allocation: &HashMap<String, f64>,
        config: &BacktestConfig,
        historical_data: &HashMap<String, Vec<BacktestBar>>,
        reason: &'static str,
    ) {
        let portfolio_value = self.portfolio_value();

        let to_liquidate: Vec<String> = self
            .positions
            .keys()
            .filter(|ticker| !target_allocation.contains_key(*ticker))
            .cloned()
            .collect();
        for ticker in to_liquidate {
            let shares = self.positions.get(&ticker).map(|p| p.shares).unwrap_or(0.0);
            if shares > 0.0 {
                self.sell(date, &ticker, shares, config, reason);
            }
        }

        for (ticker, weight_percent) in target_allocation {
            let target_value = weight_percent / 100.0 * portfolio_value;
            let current_value = self.positions.get(ticker).map(|p| p.value()).unwrap_or(0.0);

            let Some(price) = self.current_price(ticker, date, historical_data) else {
                continue;
            };
            if price <= 0.0 {
                continue;
            }

            let diff_value = target_value - current_value;
            if diff_value > 0.0 {
                let shares = diff_value / price;
                self.buy(date, ticker, shares, price, config, reason);
            } else if diff_value < -50.0 {
                let mut shares = diff_value.abs() / price;
                if let Some(position) = self.positions.get(ticker) {
                    shares = shares.min(position.shares);
                }
                if shares > 0.0 {
                    self.sell(date, ticker, shares, config, reason);
                }
            }
        }
    }

    fn trade_fees(amount: f64, config: &BacktestConfig) -> f64 {
        amount * config.slippage + amount * config.fx_fee + config.commission_per_trade
    }

    fn buy(&mut self, date: NaiveDate, ticker: &str, mut shares: f64, price: f64, config: &BacktestConfig, reason: &'static str) {
        let mut amount = shares * price;
        let fees = Self::trade_fees(amount, config);
        let mut total_cost = amount + fees;

        if total_cost > self.cash {
            let available = self.cash - fees;
            if available <= 0.0 {
                return;
            }
            shares = available / price;
            amount = shares * price;
            total_cost = amount + fees;
        }

        self.cash -= total_cost;
        self.total_fees += fees;

        self.positions
            .entry(ticker.to_string())
            .and_modify(|pos| {
                let total_shares = pos.shares + shares;
                pos.avg_cost = (pos.shares * pos.avg_cost + shares * price) / total_shares;
                pos.shares = total_shares;
                pos.current_price = price;
            })
            .or_insert(Position {
                shares,
                avg_cost: price,
                current_price: price,
            });

        self.trades.push(TradeRecord {
            date,
            ticker: ticker.to_string(),
            action: TradeAction::Buy,
            shares,
            price,
            amount,
            fees,
            reason,
        });
    }

    fn sell(&mut self, date: NaiveDate, ticker: &str, shares_requested: f64, config: &BacktestConfig, reason: &'static str) {
        let Some(position) = self.positions.get_mut(ticker) else {
            return;
        };
        let shares = shares_requested.min(position.shares);
        if shares <= 0.0 {
            return;
        }

        let price = position.current_price;
        let amount = shares * price;
        let fees = Self::trade_fees(amount, config);

        self.cash += amount - fees;
        self.total_fees += fees;

        position.shares -= shares;
        let remaining = position.shares;
        if remaining < 1e-4 {
            self.positions.remove(ticker);
        }

        self.trades.push(TradeRecord {
            date,
            ticker: ticker.to_string(),
            action: TradeAction::Sell,
            shares,
            price,
            amount,
            fees,
            reason,
        });
    }

    fn calculate_metrics(
        &self,
        config: &BacktestConfig,
        all_dates: &[NaiveDate],
        monthly_values: &[(NaiveDate, f64)],
        warnings: Vec<String>,
    ) -> BacktestResult {
        if self.equity_curve.is_empty() {
            return self.empty_result(config, warnings);
        }

        let initial_value = config.initial_capital;
        let final_value = self.equity_curve.last().unwrap().portfolio_value;

        let total_days = (*all_dates.last().unwrap() - *all_dates.first().unwrap()).num_days();
        let years = total_days as f64 / 365.25;

        let total_return = if initial_value > 0.0 {
            (final_value / initial_value - 1.0) * 100.0
        } else {
            0.0
        };

        let cagr = if years > 0.0 && initial_value > 0.0 {
            ((final_value / initial_value).powf(1.0 / years) - 1.0) * 100.0
        } else {
            0.0
        };

        let monthly_returns: Vec<f64> = monthly_values
            .windows(2)
            .filter_map(|pair| {
                let (_, prev) = pair[0];
                let (_, curr) = pair[1];
                if prev > 0.0 {
                    Some((curr / prev - 1.0) * 100.0)
                } else {
                    None
                }
            })
            .collect();

        let volatility = std_dev(&monthly_returns) * 12f64.sqrt();
        let avg_monthly_return = mean(&monthly_returns);
        let sharpe = if volatility > 0.0 {
            avg_monthly_return * 12.0 / volatility
        } else {
            0.0
        };

        let negative_returns: Vec<f64> = monthly_returns.iter().copied().filter(|r| *r < 0.0).collect();
        let sortino = if !negative_returns.is_empty() {
            let downside_vol = std_dev(&negative_returns) * 12f64.sqrt();
            if downside_vol > 0.0 {
                avg_monthly_return * 12.0 / downside_vol
            } else {
                0.0
            }
        } else {
            sharpe
        };

        let max_drawdown = self
            .equity_curve
            .iter()
            .map(|p| p.drawdown)
            .fold(0.0_f64, f64::min)
            .abs()
            * 100.0;

        let max_drawdown_duration = self.max_drawdown_duration();

        let risk_off_days: i64 = self.risk_off_periods.iter().map(|p| p.duration_days).sum();
        let time_in_risk_off_percent = if total_days > 0 {
            risk_off_days as f64 / total_days as f64 * 100.0
        } else {
            0.0
        };

        BacktestResult {
            final_value,
            cagr,
            total_return,
            sharpe_ratio: sharpe,
            sortino_ratio: sortino,
            max_drawdown,
            max_drawdown_duration,
            volatility,
            total_dividends: self.total_dividends,
            total_fees: self.total_fees,
            time_in_risk_off_percent,
            risk_off_periods: self.risk_off_periods.clone(),
            trades: self.trades.clone(),
            equity_curve: self.equity_curve.clone(),
            monthly_returns,
            warnings,
        }
    }

    fn max_drawdown_duration(&self) -> u32 {
        let mut max_duration = 0u32;
        let mut current_duration = 0u32;
        let mut peak_value = 0.0_f64;

        for point in &self.equity_curve {
            if point.portfolio_value >= peak_value {
                peak_value = point.portfolio_value;
                max_duration = max_duration.max(current_duration);
                current_duration = 0;
            } else {
                current_duration += 1;
            }
        }
        max_duration.max(current_duration)
    }

    fn empty_result(&self, config: &BacktestConfig, warnings: Vec<String>) -> BacktestResult {
        BacktestResult {
            final_value: config.initial_capital,
            cagr: 0.0,
            total_return: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            max_drawdown: 0.0,
            max_drawdown_duration: 0,
            volatility: 0.0,
            total_dividends: 0.0,
            total_fees: 0.0,
            time_in_risk_off_percent: 0.0,
            risk_off_periods: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            monthly_returns: Vec::new(),
            warnings,
        }
    }
}

impl Default for BacktestEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(start: &str, closes: &[f64]) -> Vec<BacktestBar> {
        let start_date = NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| BacktestBar {
                date: start_date + chrono::Duration::days(i as i64),
                close,
                dividend: 0.0,
            })
            .collect()
    }

    fn base_config(end: &str) -> BacktestConfig {
        BacktestConfig {
            start_date: NaiveDate::parse_from_str("2024-01-01", "%Y-%m-%d").unwrap(),
            end_date: NaiveDate::parse_from_str(end, "%Y-%m-%d").unwrap(),
            initial_capital: 10_000.0,
            allocation: HashMap::from([("SPY".to_string(), 100.0)]),
            risk_off_allocation: None,
            risk_off_enabled: false,
            risk_off_trigger: RiskOffTrigger::Combined,
            risk_off_entry_days: 3,
            risk_off_exit_days: 5,
            rebalance_frequency: RebalanceFrequency::Monthly,
            include_dividends: false,
            monthly_contribution: 0.0,
            slippage: 0.0005,
            fx_fee: 0.0,
            commission_per_trade: 1.0,
        }
    }

    #[test]
    fn cash_never_goes_negative() {
        let data = HashMap::from([("SPY".to_string(), bars("2024-01-01", &[100.0; 60]))]);
        let config = base_config("2024-03-01");
        let mut engine = BacktestEngine::new();
        let result = engine.run(&config, &data, &HashMap::new());
        assert!(result.equity_curve.iter().all(|p| p.portfolio_value >= 0.0));
    }

    #[test]
    fn first_day_always_rebalances() {
        let data = HashMap::from([("SPY".to_string(), bars("2024-01-01", &[100.0; 10]))]);
        let config = base_config("2024-01-10");
        let mut engine = BacktestEngine::new();
        engine.run(&config, &data, &HashMap::new());
        assert!(!engine.trades.is_empty());
    }

    #[test]
    fn dust_position_is_removed_after_sell() {
        let data = HashMap::from([("SPY".to_string(), bars("2024-01-01", &[100.0; 5]))]);
        let mut config = base_config("2024-01-05");
        config.allocation = HashMap::new();
        let mut engine = BacktestEngine::new();
        engine.cash = 10_000.0;
        engine.positions.insert(
            "SPY".to_string(),
            Position {
                shares: 0.00005,
                avg_cost: 100.0,
                current_price: 100.0,
            },
        );
        engine.sell(
            NaiveDate::parse_from_str("2024-01-01", "%Y-%m-%d").unwrap(),
            "SPY",
            0.00005,
            &config,
            "test",
        );
        assert!(!engine.positions.contains_key("SPY"));
    }

    #[test]
    fn anti_whipsaw_requires_sustained_signal_to_enter_risk_off() {
        let mut counters = AntiWhipsawCounters::default();
        assert!(!counters.observe(true, 3, 5));
        assert!(!counters.observe(true, 3, 5));
        assert!(counters.observe(true, 3, 5));
    }

    #[test]
    fn combined_trigger_needs_two_of_four() {
        let signals = SignalSnapshot {
            hyg_lqd_ratio: Some(0.8),
            hyg_lqd_sma50: Some(0.9),
            vix_close: Some(15.0),
            vix_sma20: Some(20.0),
            spy_close: None,
            spy_sma200: None,
            spy_drawdown: None,
        };
        assert!(signals.fires(RiskOffTrigger::Combined));
    }
}
