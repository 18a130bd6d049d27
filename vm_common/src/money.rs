use std::{
    fmt::{self, Display},
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

const MINOR_UNITS: i64 = 100;

//--------------------------------------       Money         ---------------------------------------------------------
/// A monetary amount, stored as an integer number of minor units (cents).
///
/// Prices, balances and order totals are all expressed in `Money`, so that sums of `price × quantity` are exact. On the
/// wire, amounts are written as decimal strings with two places (`"6.00"`), and read from either JSON numbers or
/// decimal strings, both interpreted in major units.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from_minor(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * MINOR_UNITS)
    }

    pub fn checked_mul(self, quantity: i64) -> Option<Self> {
        self.0.checked_mul(quantity).map(Self)
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

impl TryFrom<f64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(MoneyConversionError(format!("{value} is not a finite number")));
        }
        let cents = (value * MINOR_UNITS as f64).round();
        if cents > i64::MAX as f64 || cents < i64::MIN as f64 {
            return Err(MoneyConversionError(format!("{value} is out of range")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(cents as i64))
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        let valid_whole = !whole.is_empty() && whole.chars().all(|c| c.is_ascii_digit());
        let valid_frac = frac.len() <= 2 && frac.chars().all(|c| c.is_ascii_digit());
        if !valid_whole || !valid_frac {
            return Err(MoneyConversionError(format!("'{s}' is not a decimal amount with at most 2 places")));
        }
        let whole = whole.parse::<i64>().map_err(|e| MoneyConversionError(format!("'{s}': {e}")))?;
        let frac = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map(|v| v * 10).unwrap_or_default(),
            _ => frac.parse::<i64>().unwrap_or_default(),
        };
        let cents = whole
            .checked_mul(MINOR_UNITS)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(|| MoneyConversionError(format!("'{s}' is out of range")))?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / MINOR_UNITS as u64, abs % MINOR_UNITS as u64)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl<'de> de::Visitor<'de> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal amount as a number or string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
                v.checked_mul(MINOR_UNITS).map(Money).ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
                let v = i64::try_from(v).map_err(E::custom)?;
                self.visit_i64(v)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
                Money::try_from(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}
