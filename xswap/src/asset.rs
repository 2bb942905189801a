//! Quantities of chain-native assets.
//!
//! An [`Amount`] is always held in the smallest unit of its asset (wei for
//! ether, satoshi-like units for BitShares assets). Amounts of different
//! assets are never combined.

use num::{BigUint, Integer, Num, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    /// Number of decimal places between the display unit and the base unit.
    pub precision: u8,
}

impl Asset {
    pub fn new(symbol: impl Into<String>, precision: u8) -> Self {
        Self {
            symbol: symbol.into(),
            precision,
        }
    }

    pub fn ether() -> Self {
        Self::new("ETH", 18)
    }

    pub fn bts() -> Self {
        Self::new("BTS", 5)
    }

    fn base_units_per_unit(&self) -> BigUint {
        num::pow(BigUint::from(10u8), usize::from(self.precision))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseAmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount {0:?} is not a decimal number")]
    NotDecimal(String),
    #[error("{asset} supports at most {precision} decimal places")]
    TooPrecise { asset: String, precision: u8 },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    asset: Asset,
    #[serde(with = "base_units")]
    quantity: BigUint,
}

impl Amount {
    pub fn from_base_units(asset: Asset, quantity: impl Into<BigUint>) -> Self {
        Self {
            asset,
            quantity: quantity.into(),
        }
    }

    /// Parses a human readable decimal such as `"1.5"` into base units of
    /// `asset` without any loss of precision.
    pub fn parse(asset: Asset, decimal: &str) -> Result<Self, ParseAmountError> {
        let decimal = decimal.trim();
        if decimal.is_empty() {
            return Err(ParseAmountError::Empty);
        }

        let (int, frac) = match decimal.split_once('.') {
            Some((int, frac)) => (int, frac),
            None => (decimal, ""),
        };

        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if (int.is_empty() && frac.is_empty()) || !all_digits(int) || !all_digits(frac) {
            return Err(ParseAmountError::NotDecimal(decimal.to_owned()));
        }

        let precision = usize::from(asset.precision);
        let frac = frac.trim_end_matches('0');
        if frac.len() > precision {
            return Err(ParseAmountError::TooPrecise {
                asset: asset.symbol,
                precision: asset.precision,
            });
        }

        let digits = format!("{}{:0<width$}", int, frac, width = precision);
        let quantity = BigUint::from_str_radix(&digits, 10)
            .map_err(|_| ParseAmountError::NotDecimal(decimal.to_owned()))?;

        Ok(Self { asset, quantity })
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn base_units(&self) -> &BigUint {
        &self.quantity
    }

    pub fn is_zero(&self) -> bool {
        self.quantity.is_zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (int, rem) = self.quantity.div_rem(&self.asset.base_units_per_unit());

        if rem.is_zero() {
            write!(f, "{} {}", int, self.asset.symbol)
        } else {
            let rem = format!(
                "{:0>width$}",
                rem.to_str_radix(10),
                width = usize::from(self.asset.precision)
            );
            let rem = rem.trim_end_matches('0');

            write!(f, "{}.{} {}", int, rem, self.asset.symbol)
        }
    }
}

/// Base units travel as decimal strings, they routinely exceed the range of
/// JSON numbers.
mod base_units {
    use num::{BigUint, Num};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BigUint::from_str_radix(&s, 10).map_err(de::Error::custom)
    }
}
