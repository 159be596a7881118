//! Denomination amounts.

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of power-of-two denominations a keyset carries: `2^0` through
/// `2^(MAX_ORDER - 1)`.
pub const MAX_ORDER: u8 = 24;

/// Amount error
#[derive(Debug, Error)]
pub enum Error {
    /// Sum or difference left the `u64` range
    #[error("amount overflow")]
    AmountOverflow,
    /// Amount is not one of the keyset denominations
    #[error("amount {0} is not a power of two denomination")]
    InvalidDenomination(u64),
}

/// An amount in the smallest unit of the backing asset.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero
    pub const ZERO: Amount = Amount(0);

    /// The amount as a raw integer
    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// Whether this amount is a denomination the mint keys: a power of two
    /// in `[1, 2^(MAX_ORDER-1)]`.
    pub fn is_standard_denomination(self) -> bool {
        self.0.is_power_of_two() && self.0 <= 1 << (MAX_ORDER - 1)
    }

    /// Split into power-of-two parts, largest first.
    pub fn split(self) -> Vec<Self> {
        (0_u64..64)
            .rev()
            .filter_map(|bit| {
                let part = 1 << bit;
                ((self.0 & part) == part).then_some(Self(part))
            })
            .collect()
    }

    /// All standard denominations, ascending.
    pub fn standard_denominations() -> impl Iterator<Item = Amount> {
        (0..MAX_ORDER).map(|order| Amount(1 << order))
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Sum an iterator of amounts, failing on overflow.
    pub fn try_sum<I>(iter: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Self>,
    {
        iter.into_iter().try_fold(Amount::ZERO, |acc, x| {
            acc.checked_add(x).ok_or(Error::AmountOverflow)
        })
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl From<Amount> for u128 {
    fn from(value: Amount) -> Self {
        value.0 as u128
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_value() {
        let amount = Amount::from(13);
        let parts = amount.split();
        assert_eq!(
            parts,
            vec![Amount::from(8), Amount::from(4), Amount::from(1)]
        );
        assert_eq!(Amount::try_sum(parts).unwrap(), amount);
    }

    #[test]
    fn standard_denominations_are_bounded() {
        assert!(Amount::from(1).is_standard_denomination());
        assert!(Amount::from(1 << 23).is_standard_denomination());
        assert!(!Amount::from(1 << 24).is_standard_denomination());
        assert!(!Amount::from(3).is_standard_denomination());
        assert!(!Amount::from(0).is_standard_denomination());
        assert_eq!(Amount::standard_denominations().count(), 24);
    }

    #[test]
    fn try_sum_overflow() {
        let result = Amount::try_sum(vec![Amount::from(u64::MAX), Amount::from(1)]);
        assert!(result.is_err());
    }
}
