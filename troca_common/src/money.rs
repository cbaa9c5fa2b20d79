use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const BRL_CURRENCY_CODE: &str = "BRL";

//--------------------------------------     FiatAmount       ---------------------------------------------------------
/// A fiat amount in centavos. All arithmetic is integer arithmetic; fractional reais only exist at display/gateway
/// boundaries.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct FiatAmount(i64);

op!(binary FiatAmount, Add, add);
op!(binary FiatAmount, Sub, sub);
op!(inplace FiatAmount, SubAssign, sub_assign);
op!(unary FiatAmount, Neg, neg);

impl Mul<i64> for FiatAmount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for FiatAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in centavos: {0}")]
pub struct FiatConversionError(String);

impl From<i64> for FiatAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for FiatAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for FiatAmount {}

impl TryFrom<u64> for FiatAmount {
    type Error = FiatConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(FiatConversionError(format!("Value {} is too large to convert to FiatAmount", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for FiatAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reais = self.0 as f64 / 100.0;
        write!(f, "R${reais:0.2}")
    }
}

impl FiatAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_reais(reais: i64) -> Self {
        Self(reais * 100)
    }

    /// The amount as fractional reais, for gateway request bodies. Never use this for internal arithmetic.
    pub fn to_reais_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

//--------------------------------------     CryptoAmount       -------------------------------------------------------
/// An asset amount in the asset's smallest unit (10^-8 of a whole coin).
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CryptoAmount(i64);

op!(binary CryptoAmount, Add, add);
op!(binary CryptoAmount, Sub, sub);
op!(inplace CryptoAmount, SubAssign, sub_assign);
op!(unary CryptoAmount, Neg, neg);

impl Sum for CryptoAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for CryptoAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for CryptoAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let coins = self.0 as f64 / 100_000_000.0;
        write!(f, "{coins:0.8}")
    }
}

impl CryptoAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_coins(coins: i64) -> Self {
        Self(coins * 100_000_000)
    }
}
