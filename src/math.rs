//! Fixed-point arithmetic.
//!
//! Every ratio in the engine (exchange rates, prices, collateral factors, borrow
//! indices) is a [`Wad`]: an unsigned integer scaled by 1e18. Products are taken in
//! 256 bits so `amount * price` never overflows before the final division, and every
//! division names its rounding direction. Callers round down when crediting an
//! account and up when debiting one.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const WAD_DECIMALS: u32 = 18;
pub const WAD: u128 = 1_000_000_000_000_000_000;

// 2^96 - 1, the largest mantissa a Decimal can hold
const MAX_DECIMAL_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("fixed point overflow")]
    Overflow,

    #[error("fixed point underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0} cannot be represented as an unsigned fixed point value")]
    Unrepresentable(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// `a * b / denominator` with a 256-bit intermediate product.
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let mut quotient = product / denominator;
    if rounding == Rounding::Up && !(product % denominator).is_zero() {
        quotient += U256::from(1u8);
    }
    u128::try_from(quotient).map_err(|_| MathError::Overflow)
}

/// Current amount owed on a borrow recorded as `principal` when the market's
/// borrow index was `index_at_snapshot`. Rounds up: the debt is what the pool is owed.
pub fn resolve_borrow(
    principal: u128,
    index_at_snapshot: Wad,
    current_index: Wad,
) -> Result<u128, MathError> {
    if principal == 0 {
        return Ok(0);
    }
    mul_div(principal, current_index.raw(), index_at_snapshot.raw(), Rounding::Up)
}

/// Converts a human amount (e.g. `dec!(1000)`) to raw units of a token with `decimals`.
/// Digits beyond `decimals` are truncated.
pub fn to_raw_units(value: Decimal, decimals: u32) -> Result<u128, MathError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(MathError::Unrepresentable(value));
    }
    let mantissa = u128::try_from(value.mantissa()).map_err(|_| MathError::Unrepresentable(value))?;
    let scale = value.scale();
    if scale <= decimals {
        let factor = pow10(decimals - scale)?;
        mantissa.checked_mul(factor).ok_or(MathError::Overflow)
    } else {
        Ok(mantissa / pow10(scale - decimals)?)
    }
}

/// Inverse of [`to_raw_units`]. Very large values lose trailing digits rather than fail.
pub fn from_raw_units(raw: u128, decimals: u32) -> Decimal {
    let mut raw = raw;
    let mut scale = decimals;
    while raw > MAX_DECIMAL_MANTISSA && scale > 0 {
        raw /= 10;
        scale -= 1;
    }
    if raw > MAX_DECIMAL_MANTISSA {
        return Decimal::MAX;
    }
    // Decimal caps its scale at 28
    while scale > 28 {
        raw /= 10;
        scale -= 1;
    }
    Decimal::from_i128_with_scale(raw as i128, scale).normalize()
}

fn pow10(exp: u32) -> Result<u128, MathError> {
    10u128.checked_pow(exp).ok_or(MathError::Overflow)
}

// 2.1: 1e18-scaled unsigned ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Wad(u128);

impl Wad {
    pub const ZERO: Wad = Wad(0);
    pub const ONE: Wad = Wad(WAD);

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn from_integer(value: u128) -> Result<Self, MathError> {
        value.checked_mul(WAD).map(Self).ok_or(MathError::Overflow)
    }

    /// `numerator / denominator`, rounded down.
    pub fn from_ratio(numerator: u128, denominator: u128) -> Result<Self, MathError> {
        mul_div(numerator, WAD, denominator, Rounding::Down).map(Self)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, MathError> {
        to_raw_units(value, WAD_DECIMALS).map(Self)
    }

    pub fn to_decimal(&self) -> Decimal {
        from_raw_units(self.0, WAD_DECIMALS)
    }

    pub fn checked_add(self, other: Wad) -> Result<Wad, MathError> {
        self.0.checked_add(other.0).map(Wad).ok_or(MathError::Overflow)
    }

    pub fn checked_sub(self, other: Wad) -> Result<Wad, MathError> {
        self.0.checked_sub(other.0).map(Wad).ok_or(MathError::Underflow)
    }

    /// Wad product, rounded down.
    pub fn mul(self, other: Wad) -> Result<Wad, MathError> {
        mul_div(self.0, other.0, WAD, Rounding::Down).map(Wad)
    }

    /// Wad quotient, rounded down.
    pub fn div(self, other: Wad) -> Result<Wad, MathError> {
        mul_div(self.0, WAD, other.0, Rounding::Down).map(Wad)
    }

    pub fn mul_scalar(self, factor: u128) -> Result<Wad, MathError> {
        self.0.checked_mul(factor).map(Wad).ok_or(MathError::Overflow)
    }

    /// `amount * self`, e.g. receipt units times an exchange rate.
    pub fn mul_amount(self, amount: u128, rounding: Rounding) -> Result<u128, MathError> {
        mul_div(amount, self.0, WAD, rounding)
    }

    /// `amount / self`, e.g. underlying units divided by an exchange rate.
    pub fn divide_amount(self, amount: u128, rounding: Rounding) -> Result<u128, MathError> {
        mul_div(amount, WAD, self.0, rounding)
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mul_div_rounding_directions() {
        assert_eq!(mul_div(10, 1, 3, Rounding::Down).unwrap(), 3);
        assert_eq!(mul_div(10, 1, 3, Rounding::Up).unwrap(), 4);
        // exact results are never bumped
        assert_eq!(mul_div(9, 1, 3, Rounding::Up).unwrap(), 3);
    }

    #[test]
    fn mul_div_survives_wide_intermediates() {
        // 1e21 * 1e30 overflows u128 but the quotient fits
        let amount = 1_000 * WAD;
        let price = 1_000_000_000_000 * WAD;
        assert_eq!(
            mul_div(amount, price, WAD, Rounding::Down).unwrap(),
            1_000_000_000_000_000 * WAD
        );
    }

    #[test]
    fn mul_div_rejects_zero_denominator_and_overflow() {
        assert_eq!(mul_div(1, 1, 0, Rounding::Down), Err(MathError::DivisionByZero));
        assert_eq!(mul_div(u128::MAX, u128::MAX, 1, Rounding::Down), Err(MathError::Overflow));
    }

    #[test]
    fn wad_from_decimal() {
        assert_eq!(Wad::from_decimal(dec!(0.5)).unwrap().raw(), WAD / 2);
        assert_eq!(Wad::from_decimal(dec!(1.1)).unwrap().raw(), 1_100_000_000_000_000_000);
        assert_eq!(Wad::from_decimal(dec!(6.2)).unwrap().raw(), 6_200_000_000_000_000_000);
        assert!(matches!(
            Wad::from_decimal(dec!(-1)),
            Err(MathError::Unrepresentable(_))
        ));
    }

    #[test]
    fn wad_round_trips_through_decimal() {
        let cf = Wad::from_decimal(dec!(0.75)).unwrap();
        assert_eq!(cf.to_decimal(), dec!(0.75));
        assert_eq!(Wad::ONE.to_string(), "1");
    }

    #[test]
    fn wad_mul_and_div() {
        let half = Wad::from_decimal(dec!(0.5)).unwrap();
        let ten = Wad::from_integer(10).unwrap();
        assert_eq!(half.mul(ten).unwrap(), Wad::from_integer(5).unwrap());

        let ratio = Wad::from_decimal(dec!(1.1)).unwrap()
            .div(Wad::from_decimal(dec!(6.2)).unwrap())
            .unwrap();
        // 1.1 / 6.2 = 0.177419354838709677419..., truncated to 18 places
        assert_eq!(ratio.raw(), 177_419_354_838_709_677);
    }

    #[test]
    fn wad_amount_conversions() {
        let rate = Wad::from_decimal(dec!(1.5)).unwrap();
        assert_eq!(rate.mul_amount(3, Rounding::Down).unwrap(), 4);
        assert_eq!(rate.mul_amount(3, Rounding::Up).unwrap(), 5);
        assert_eq!(rate.divide_amount(4, Rounding::Down).unwrap(), 2);
        assert_eq!(rate.divide_amount(4, Rounding::Up).unwrap(), 3);
    }

    #[test]
    fn sub_underflow_is_an_error() {
        assert_eq!(Wad::ZERO.checked_sub(Wad::ONE), Err(MathError::Underflow));
    }

    #[test]
    fn resolve_borrow_scales_with_index() {
        let start = Wad::ONE;
        let later = Wad::from_decimal(dec!(1.05)).unwrap();
        assert_eq!(resolve_borrow(1_000, start, later).unwrap(), 1_050);
        assert_eq!(resolve_borrow(1_000, later, later).unwrap(), 1_000);
        assert_eq!(resolve_borrow(0, Wad::ZERO, later).unwrap(), 0);
    }

    #[test]
    fn resolve_borrow_rounds_against_the_borrower() {
        let start = Wad::from_decimal(dec!(3)).unwrap();
        let later = Wad::from_decimal(dec!(4)).unwrap();
        // 10 * 4 / 3 = 13.33.. owed, charged as 14
        assert_eq!(resolve_borrow(10, start, later).unwrap(), 14);
    }

    #[test]
    fn raw_unit_conversions() {
        assert_eq!(to_raw_units(dec!(5000), 6).unwrap(), 5_000_000_000);
        assert_eq!(to_raw_units(dec!(0.0000001), 6).unwrap(), 0);
        assert_eq!(from_raw_units(2_500_000_000, 6), dec!(2500));
        assert_eq!(from_raw_units(443_548_387_096_774_192_500, 18), dec!(443.5483870967741925));
    }
}
