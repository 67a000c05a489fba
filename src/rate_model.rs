//! Interest rate models.
//!
//! A rate model is a pure function from a market's cash, borrows and reserves to a
//! borrow rate per second. The ledger consults it on every accrual and never caches
//! the result.

use crate::math::{MathError, Wad};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SECONDS_PER_YEAR: u128 = 31_536_000;

pub trait InterestRateModel: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Borrow rate per second.
    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Result<Wad, MathError>;

    /// Supply rate per second: what suppliers earn after the reserve cut.
    fn supply_rate(
        &self,
        cash: u128,
        borrows: u128,
        reserves: u128,
        reserve_factor: Wad,
    ) -> Result<Wad, MathError> {
        let one_minus_factor = Wad::ONE.checked_sub(reserve_factor)?;
        let borrow_rate = self.borrow_rate(cash, borrows, reserves)?;
        let rate_to_pool = borrow_rate.mul(one_minus_factor)?;
        utilization_rate(cash, borrows, reserves)?.mul(rate_to_pool)
    }
}

/// `borrows / (cash + borrows - reserves)`, zero when nothing is borrowed.
pub fn utilization_rate(cash: u128, borrows: u128, reserves: u128) -> Result<Wad, MathError> {
    if borrows == 0 {
        return Ok(Wad::ZERO);
    }
    let gross = cash.checked_add(borrows).ok_or(MathError::Overflow)?;
    let net = gross.checked_sub(reserves).ok_or(MathError::Underflow)?;
    Wad::from_ratio(borrows, net)
}

fn per_second(per_year: Wad) -> Wad {
    Wad::from_raw(per_year.raw() / SECONDS_PER_YEAR)
}

// 3.1: linear model. rate = base + utilization * multiplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitePaperRateModel {
    pub base_rate_per_second: Wad,
    pub multiplier_per_second: Wad,
}

impl WhitePaperRateModel {
    pub fn new(base_rate_per_year: Wad, multiplier_per_year: Wad) -> Self {
        Self {
            base_rate_per_second: per_second(base_rate_per_year),
            multiplier_per_second: per_second(multiplier_per_year),
        }
    }

    /// A model that never charges interest. Handy for accounting-only setups.
    pub fn zero() -> Self {
        Self::new(Wad::ZERO, Wad::ZERO)
    }
}

impl InterestRateModel for WhitePaperRateModel {
    fn name(&self) -> &str {
        "white_paper"
    }

    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Result<Wad, MathError> {
        let util = utilization_rate(cash, borrows, reserves)?;
        util.mul(self.multiplier_per_second)?
            .checked_add(self.base_rate_per_second)
    }
}

// 3.2: kinked model. above the kink the jump multiplier applies to the excess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpRateModel {
    pub base_rate_per_second: Wad,
    pub multiplier_per_second: Wad,
    pub jump_multiplier_per_second: Wad,
    pub kink: Wad,
}

impl JumpRateModel {
    pub fn new(
        base_rate_per_year: Wad,
        multiplier_per_year: Wad,
        jump_multiplier_per_year: Wad,
        kink: Wad,
    ) -> Self {
        Self {
            base_rate_per_second: per_second(base_rate_per_year),
            multiplier_per_second: per_second(multiplier_per_year),
            jump_multiplier_per_second: per_second(jump_multiplier_per_year),
            kink,
        }
    }
}

impl InterestRateModel for JumpRateModel {
    fn name(&self) -> &str {
        "jump_rate"
    }

    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Result<Wad, MathError> {
        let util = utilization_rate(cash, borrows, reserves)?;
        if util <= self.kink {
            return util.mul(self.multiplier_per_second)?.checked_add(self.base_rate_per_second);
        }
        let normal_rate = self
            .kink
            .mul(self.multiplier_per_second)?
            .checked_add(self.base_rate_per_second)?;
        let excess = util.checked_sub(self.kink)?;
        excess.mul(self.jump_multiplier_per_second)?.checked_add(normal_rate)
    }
}

// 3.3: serializable description of a model, used by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateModelConfig {
    WhitePaper {
        base_rate_per_year: Decimal,
        multiplier_per_year: Decimal,
    },
    Jump {
        base_rate_per_year: Decimal,
        multiplier_per_year: Decimal,
        jump_multiplier_per_year: Decimal,
        kink: Decimal,
    },
}

impl Default for RateModelConfig {
    fn default() -> Self {
        RateModelConfig::WhitePaper {
            base_rate_per_year: Decimal::new(2, 2),  // 2%
            multiplier_per_year: Decimal::new(2, 1), // 20%
        }
    }
}

impl RateModelConfig {
    pub fn build(&self) -> Result<std::sync::Arc<dyn InterestRateModel>, MathError> {
        Ok(match self {
            RateModelConfig::WhitePaper {
                base_rate_per_year,
                multiplier_per_year,
            } => std::sync::Arc::new(WhitePaperRateModel::new(
                Wad::from_decimal(*base_rate_per_year)?,
                Wad::from_decimal(*multiplier_per_year)?,
            )),
            RateModelConfig::Jump {
                base_rate_per_year,
                multiplier_per_year,
                jump_multiplier_per_year,
                kink,
            } => std::sync::Arc::new(JumpRateModel::new(
                Wad::from_decimal(*base_rate_per_year)?,
                Wad::from_decimal(*multiplier_per_year)?,
                Wad::from_decimal(*jump_multiplier_per_year)?,
                Wad::from_decimal(*kink)?,
            )),
        })
    }
}
