use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

/// Base units per whole coin.
pub const COIN: u64 = 100_000_000;
const DECIMALS: usize = 8;

/// Non-negative decimal value, stored in base units (1e-8 coin) so sums are
/// exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn from_coins(coins: u64) -> Self {
        Self(coins * COIN)
    }

    pub const fn base_units(&self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Sum that reports overflow instead of wrapping.
    pub fn checked_sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Option<Amount> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / COIN, self.0 % COIN)
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LedgerError::InvalidInput(format!("Invalid amount: {}", s));

        let (whole, frac) = match s.trim().split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (s.trim(), ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > DECIMALS || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let frac: u64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac, width = DECIMALS).parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(COIN)
            .and_then(|units| units.checked_add(frac))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

impl Sum for Amount {
    /// Saturates at `u64::MAX`; use [`Amount::checked_sum`] where overflow
    /// must be detected.
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Amount(iter.fold(0u64, |acc, amount| acc.saturating_add(amount.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() -> Result<()> {
        assert_eq!("50".parse::<Amount>()?, Amount::from_coins(50));
        assert_eq!("30.0".parse::<Amount>()?, Amount::from_coins(30));
        assert_eq!("0.00000001".parse::<Amount>()?, Amount::from_base_units(1));
        assert_eq!("1.5".parse::<Amount>()?, Amount::from_base_units(150_000_000));
        assert_eq!(Amount::from_coins(20).to_string(), "20.00000000");
        Ok(())
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", ".", "-1", "1.123456789", "abc", "1.2.3"] {
            assert!(bad.parse::<Amount>().is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn test_checked_sum_detects_overflow() {
        let big = Amount::from_base_units(u64::MAX);
        assert_eq!(Amount::checked_sum([big, Amount::from_base_units(1)]), None);
        assert_eq!(
            Amount::checked_sum([Amount::from_coins(30), Amount::from_coins(20)]),
            Some(Amount::from_coins(50))
        );
    }
}
