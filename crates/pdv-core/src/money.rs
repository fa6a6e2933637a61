//! # Money
//!
//! All monetary values are integer centavos. Decimals only appear at the
//! edges: remote API payloads and per-kilogram pricing of weighed items.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Where conversions happen                           │
//! │                                                                         │
//! │  API "10.99" ──► Money::from_decimal ──► 1099 ──► products.price_cents │
//! │                                                                         │
//! │  unit price 1099/kg × ScaleReading 0.350 kg ──► multiply_weight ──► 385│
//! │                                                                         │
//! │  1099 ──► Money::to_decimal ──► "10.99" ──► push payload               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rounding to centavos always uses banker's rounding (half to even) so the
//! same weight and price give the same line total on every terminal.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::types::TaxRate;

/// A monetary amount in centavos.
///
/// Signed, so refunds and cash differences can go below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Money(i64);

impl Money {
    /// Creates an amount from centavos.
    ///
    /// ```rust
    /// use pdv_core::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts a decimal currency amount (e.g. `10.99`) into centavos.
    ///
    /// Returns `None` when the value does not fit in an `i64` of centavos.
    ///
    /// ```rust
    /// use pdv_core::Money;
    /// use rust_decimal::Decimal;
    /// use std::str::FromStr;
    ///
    /// let price = Money::from_decimal(Decimal::from_str("10.995").unwrap()).unwrap();
    /// assert_eq!(price.cents(), 1100);
    /// ```
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        amount
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i64()
            .map(Money)
    }

    /// Returns the amount as a decimal with two places.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whole reais part.
    #[inline]
    pub const fn reais(&self) -> i64 {
        self.0 / 100
    }

    /// Centavos part, always 0-99.
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the larger of `self` and zero.
    #[inline]
    pub fn clamp_non_negative(self) -> Self {
        Money(self.0.max(0))
    }

    /// Tax owed on this amount, rounded half up to the centavo.
    ///
    /// ```rust
    /// use pdv_core::{Money, TaxRate};
    ///
    /// let tax = Money::from_cents(1000).calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.percentage(rate.bps())
    }

    /// `bps` basis points of this amount (1000 bps = 10%).
    pub fn percentage(&self, bps: u32) -> Money {
        // i128 so large totals cannot overflow the intermediate product
        let cents = (self.0 as i128 * bps as i128 + 5000) / 10000;
        Money(cents as i64)
    }

    /// Unit price times a whole quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Per-kilogram price times a measured weight, rounded half to even.
    ///
    /// Returns `None` on overflow.
    ///
    /// ```rust
    /// use pdv_core::Money;
    /// use rust_decimal::Decimal;
    /// use std::str::FromStr;
    ///
    /// let per_kg = Money::from_cents(2490);
    /// let line = per_kg.multiply_weight(Decimal::from_str("0.350").unwrap()).unwrap();
    /// assert_eq!(line.cents(), 872); // 871.5 rounds to even
    /// ```
    pub fn multiply_weight(&self, weight: Decimal) -> Option<Money> {
        Decimal::from(self.0)
            .checked_mul(weight)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i64()
            .map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}R$ {}.{:02}", sign, self.reais().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
