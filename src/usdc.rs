//! Token amounts: the `Usdc` newtype used for configuration and the deposit
//! floor, plus conversions between human decimal amounts and raw on-chain
//! base units.

use std::fmt::Display;

use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

pub const USDC_DECIMALS: u8 = 6;

/// A USDC dollar amount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Usdc(pub Decimal);

impl Display for Usdc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Usdc {
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    #[error("amount {amount} has more than {decimals} decimal places")]
    TooPrecise { amount: Decimal, decimals: u8 },
    #[error("amount {amount} overflows {decimals}-decimal base units")]
    Overflow { amount: String, decimals: u8 },
}

/// Scales `amount` into base units of a token with `decimals` places.
///
/// Fractions finer than one base unit are rejected rather than truncated.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256, AmountError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative(amount));
    }

    let overflow = || AmountError::Overflow {
        amount: amount.to_string(),
        decimals,
    };

    let multiplier = 10_i128
        .checked_pow(u32::from(decimals))
        .and_then(|factor| Decimal::try_from_i128_with_scale(factor, 0).ok())
        .ok_or_else(overflow)?;
    let scaled = amount.checked_mul(multiplier).ok_or_else(overflow)?;

    if scaled.fract() != Decimal::ZERO {
        return Err(AmountError::TooPrecise { amount, decimals });
    }

    let units = scaled.trunc().to_u128().ok_or_else(overflow)?;

    Ok(U256::from(units))
}

/// Inverse of [`to_base_units`].
pub fn from_base_units(value: U256, decimals: u8) -> Result<Decimal, AmountError> {
    let overflow = || AmountError::Overflow {
        amount: value.to_string(),
        decimals,
    };

    let units = i128::try_from(value).map_err(|_| overflow())?;

    Decimal::try_from_i128_with_scale(units, u32::from(decimals))
        .map(|amount| amount.normalize())
        .map_err(|_| overflow())
}

/// Human-readable rendering of a raw amount, falling back to the raw
/// integer when it does not fit a decimal.
pub fn format_units(value: U256, decimals: u8) -> String {
    from_base_units(value, decimals).map_or_else(|_| value.to_string(), |amount| amount.to_string())
}
