//! Liquidation arithmetic.
//!
//! An account is liquidatable when its risk-weighted collateral is worth less than
//! its debt. A liquidator repays part of one borrow and receives the borrower's
//! receipt units in a collateral market, valued at a premium (the liquidation
//! incentive). The functions here are pure; the controller supplies prices and the
//! collateral market's exchange rate.

use crate::math::{MathError, Rounding, Wad};
use serde::{Deserialize, Serialize};

/// Risk state of an account. Moves only with prices, borrows and collateral,
/// never with the clock alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskStatus {
    Healthy,
    Shortfall,
}

/// Largest single repayment allowed against `borrow_balance`.
pub fn max_repay(close_factor: Wad, borrow_balance: u128) -> Result<u128, MathError> {
    close_factor.mul_amount(borrow_balance, Rounding::Down)
}

/// Collateral receipt units a liquidator receives for repaying `repay_amount` of
/// the borrowed asset:
///
/// `repay * incentive * price_borrowed / (price_collateral * exchange_rate)`
///
/// The price ratio is formed first and floored, then applied to the repay amount
/// and floored again. Both truncations favour the borrower's remaining collateral.
pub fn seize_tokens(
    repay_amount: u128,
    price_borrowed: Wad,
    price_collateral: Wad,
    collateral_exchange_rate: Wad,
    liquidation_incentive: Wad,
) -> Result<u128, MathError> {
    let numerator = liquidation_incentive.mul(price_borrowed)?;
    let denominator = price_collateral.mul(collateral_exchange_rate)?;
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let ratio = numerator.div(denominator)?;
    ratio.mul_amount(repay_amount, Rounding::Down)
}
