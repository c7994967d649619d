use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Case-normalised instrument symbol. Always uppercase, non-empty, bounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Ticker(String);

const TICKER_MAX_LEN: usize = 10;

impl Ticker {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, crate::domain::errors::AppError> {
        let normalized = raw.as_ref().trim().to_uppercase();
        if normalized.is_empty() || normalized.len() > TICKER_MAX_LEN {
            return Err(crate::domain::errors::AppError::Validation(format!(
                "ticker '{normalized}' must be 1-{TICKER_MAX_LEN} chars"
            )));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(crate::domain::errors::AppError::Validation(format!(
                "ticker '{normalized}' contains invalid characters"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO-4217 currencies this system is prepared to hold Money in.
pub const SUPPORTED_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "CHF", "JPY", "HKD", "CNY", "CAD", "AUD", "SGD", "KRW", "SEK", "NOK",
    "DKK", "PLN", "CZK", "HUF",
];

const MONEY_DECIMAL_PLACES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Currency([u8; 3]);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, crate::domain::errors::AppError> {
        let upper = code.trim().to_uppercase();
        if !SUPPORTED_CURRENCIES.contains(&upper.as_str()) {
            return Err(crate::domain::errors::AppError::Validation(format!(
                "unsupported currency '{code}'"
            )));
        }
        let bytes = upper.as_bytes();
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable monetary value. Arithmetic between different currencies fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Result<Self, crate::domain::errors::AppError> {
        Ok(Self {
            amount,
            currency: Currency::parse(currency)?,
        })
    }

    pub fn zero(currency: &str) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency: Currency::parse(currency).expect("zero() requires a supported currency"),
        }
    }

    pub fn from_cents(cents: i64, currency: &str) -> Self {
        Self {
            amount: Decimal::from(cents) / Decimal::from(100),
            currency: Currency::parse(currency).expect("from_cents requires a supported currency"),
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    fn check_same_currency(&self, other: &Money) -> Result<(), crate::domain::errors::AppError> {
        if self.currency != other.currency {
            return Err(crate::domain::errors::AppError::Validation(format!(
                "incompatible currencies: {} vs {}",
                self.currency, other.currency
            )));
        }
        Ok(())
    }

    pub fn add(&self, other: &Money) -> Result<Money, crate::domain::errors::AppError> {
        self.check_same_currency(other)?;
        Ok(Money {
            amount: self.amount + other.amount,
            currency: self.currency,
        })
    }

    pub fn sub(&self, other: &Money) -> Result<Money, crate::domain::errors::AppError> {
        self.check_same_currency(other)?;
        Ok(Money {
            amount: self.amount - other.amount,
            currency: self.currency,
        })
    }

    pub fn mul(&self, factor: Decimal) -> Money {
        Money {
            amount: self.amount * factor,
            currency: self.currency,
        }
    }

    pub fn div(&self, divisor: Decimal) -> Result<Money, crate::domain::errors::AppError> {
        if divisor.is_zero() {
            return Err(crate::domain::errors::AppError::Validation(
                "division by zero".into(),
            ));
        }
        Ok(Money {
            amount: self.amount / divisor,
            currency: self.currency,
        })
    }

    pub fn neg(&self) -> Money {
        Money {
            amount: -self.amount,
            currency: self.currency,
        }
    }

    pub fn abs(&self) -> Money {
        Money {
            amount: self.amount.abs(),
            currency: self.currency,
        }
    }

    pub fn round(&self) -> Money {
        Money {
            amount: self.amount.round_dp_with_strategy(
                MONEY_DECIMAL_PLACES,
                RoundingStrategy::MidpointAwayFromZero,
            ),
            currency: self.currency,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn as_f64(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.amount.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.*} {}",
            MONEY_DECIMAL_PLACES as usize, self.amount, self.currency
        )
    }
}

/// Immutable fractional value with dual accessors.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percentage(f64);

impl Percentage {
    pub fn from_decimal(fraction: f64) -> Self {
        Self(fraction)
    }

    pub fn from_percent(percent: f64) -> Self {
        Self(percent / 100.0)
    }

    pub fn as_decimal(&self) -> f64 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        self.0 * 100.0
    }
}
