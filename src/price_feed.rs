// Price Feed Integration
//
// The risk controller is agnostic to where prices come from. It only needs a
// read of "value of one raw unit of this market's underlying", scaled by 1e18.
// Following the usual money-market convention the mantissa is additionally scaled
// by 1e(18 - underlying decimals), so a $1 token with 6 decimals is quoted as 1e30.

use crate::math::{MathError, Wad};
use crate::types::MarketId;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

pub trait PriceOracle: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// `None` (or zero) means the price is unavailable and no risk decision may use it.
    fn underlying_price(&self, market: MarketId) -> Option<Wad>;
}

/// Mantissa for a human price of a token with `underlying_decimals`.
pub fn price_mantissa(price: Decimal, underlying_decimals: u32) -> Result<Wad, MathError> {
    let shift = 18u32
        .checked_sub(underlying_decimals)
        .ok_or(MathError::Underflow)?;
    let base = Wad::from_decimal(price)?;
    base.mul_scalar(10u128.checked_pow(shift).ok_or(MathError::Overflow)?)
}

/// What a `set_underlying_price` call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePosted {
    pub market: MarketId,
    pub previous: Wad,
    pub new: Wad,
}

/// Admin-posted prices. Cloning yields another handle on the same price table, so a
/// test or operator can keep a handle while the controller holds the oracle.
#[derive(Debug, Clone, Default)]
pub struct SimplePriceOracle {
    prices: Arc<RwLock<HashMap<MarketId, Wad>>>,
}

impl SimplePriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_underlying_price(&self, market: MarketId, price: Wad) -> PricePosted {
        let mut prices = self.prices.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = prices.insert(market, price).unwrap_or(Wad::ZERO);
        tracing::debug!(%market, %previous, new = %price, "price posted");
        PricePosted {
            market,
            previous,
            new: price,
        }
    }

    /// Posts a human price for a token with the given decimals.
    pub fn set_price(
        &self,
        market: MarketId,
        price: Decimal,
        underlying_decimals: u32,
    ) -> Result<PricePosted, MathError> {
        Ok(self.set_underlying_price(market, price_mantissa(price, underlying_decimals)?))
    }
}

impl PriceOracle for SimplePriceOracle {
    fn name(&self) -> &str {
        "simple"
    }

    fn underlying_price(&self, market: MarketId) -> Option<Wad> {
        let prices = self.prices.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        prices.get(&market).copied().filter(|price| !price.is_zero())
    }
}
