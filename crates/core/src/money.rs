//! Fixed-scale decimal amounts.
//!
//! Every monetary value in the system is a [`Money`]: a [`rust_decimal::Decimal`]
//! held at exactly [`MONEY_SCALE`] fractional digits. Quantities share that
//! scale; percentage rates are held at [`RATE_SCALE`]. Binary floating point is
//! never involved, so `0.1 * 3` is `0.300` and not `0.30000000000000004`.
//!
//! Products are rounded once, half away from zero, straight to the stored
//! scale. Rate fractions (`rate / 100`) are computed at
//! [`RATE_FRACTION_SCALE`] digits, which is exact for two-digit rates.

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Fractional digits of every stored amount and quantity.
pub const MONEY_SCALE: u32 = 3;

/// Fractional digits of a percentage rate (`19.00`).
pub const RATE_SCALE: u32 = 2;

/// Internal scale of `rate / 100` before it multiplies an amount.
pub const RATE_FRACTION_SCALE: u32 = 4;

fn round_to_scale(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded
}

fn check_scale(value: Decimal, scale: u32, what: &str) -> DomainResult<()> {
    if value.normalize().scale() > scale {
        return Err(DomainError::validation(format!(
            "{what} {value} has more than {scale} fractional digits"
        )));
    }
    Ok(())
}

/// A monetary amount at scale 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money::from_millimes(0);

    /// `millimes / 1000`, e.g. `from_millimes(1_500)` is `1.500`.
    pub const fn from_millimes(millimes: i64) -> Self {
        let magnitude = millimes.unsigned_abs();
        Self(Decimal::from_parts(
            magnitude as u32,
            (magnitude >> 32) as u32,
            0,
            millimes < 0,
            MONEY_SCALE,
        ))
    }

    /// Rounds `amount` half away from zero to scale 3.
    pub fn new(amount: Decimal) -> Self {
        Self(round_to_scale(amount, MONEY_SCALE))
    }

    /// Accepts `amount` only if it already fits scale 3.
    pub fn exact(amount: Decimal) -> DomainResult<Self> {
        check_scale(amount, MONEY_SCALE, "amount")?;
        Ok(Self::new(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money::new)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money::new)
    }

    /// `self * rate / 100`, rounded to scale 3.
    pub fn percent(self, rate: Rate) -> Option<Money> {
        self.0.checked_mul(rate.fraction()?).map(Money::new)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl ValueObject for Money {}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::exact(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("amount {s:?}: {e}")))?;
        Self::exact(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A non-negative quantity at scale 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        check_scale(value, MONEY_SCALE, "quantity")?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!(
                "quantity {value} must not be negative"
            )));
        }
        Ok(Self(round_to_scale(value, MONEY_SCALE)))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `self * unit_price`, rounded to scale 3.
    pub fn times(self, unit_price: Money) -> Option<Money> {
        self.0.checked_mul(unit_price.amount()).map(Money::new)
    }
}

impl ValueObject for Quantity {}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A percentage between 0 and 100 at scale 2 (`19.00` means 19%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::from_parts(0, 0, 0, false, RATE_SCALE));

    pub fn new(percent: Decimal) -> DomainResult<Self> {
        check_scale(percent, RATE_SCALE, "rate")?;
        if (percent.is_sign_negative() && !percent.is_zero()) || percent > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "rate {percent} must be between 0 and 100"
            )));
        }
        Ok(Self(round_to_scale(percent, RATE_SCALE)))
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `rate / 100` at scale 4.
    pub fn fraction(&self) -> Option<Decimal> {
        self.0
            .checked_div(Decimal::ONE_HUNDRED)
            .map(|f| round_to_scale(f, RATE_FRACTION_SCALE))
    }
}

impl ValueObject for Rate {}

impl TryFrom<Decimal> for Rate {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(value: Rate) -> Self {
        value.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
