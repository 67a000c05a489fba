// 7.0 config.rs: bootstrap settings in one place. risk params, markets, rate models.
// 7.1 values are human readable decimals (cf 0.5, incentive 1.1). they become Wads
// only when the engine is built, so a config file never carries 1e18 mantissas.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::controller::RiskParams;
use crate::market::MarketConfig;
use crate::math::{to_raw_units, MathError, Wad};
use crate::rate_model::RateModelConfig;
use crate::types::{AccountId, MarketId};

// One market to list at bootstrap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSetup {
    pub id: MarketId,
    pub underlying_symbol: String,
    pub underlying_decimals: u32,
    // Fraction of collateral value usable as borrowing power, [0, 1)
    pub collateral_factor: Decimal,
    // Share of interest kept as reserves, [0, 1]
    pub reserve_factor: Decimal,
    // Whole underlying tokens per whole receipt token while supply is zero
    pub initial_exchange_rate: Decimal,
    // Whole tokens, 0 = uncapped
    pub borrow_cap: Decimal,
    // Opening price in USD per whole token, if the oracle should be seeded
    pub price: Option<Decimal>,
    pub rate_model: RateModelConfig,
}

impl MarketSetup {
    pub fn new(id: MarketId, underlying_symbol: &str, underlying_decimals: u32) -> Self {
        Self {
            id,
            underlying_symbol: underlying_symbol.to_string(),
            underlying_decimals,
            collateral_factor: Decimal::ZERO,
            reserve_factor: Decimal::ZERO,
            initial_exchange_rate: Decimal::ONE,
            borrow_cap: Decimal::ZERO,
            price: None,
            rate_model: RateModelConfig::default(),
        }
    }

    pub fn with_collateral_factor(mut self, collateral_factor: Decimal) -> Self {
        self.collateral_factor = collateral_factor;
        self
    }

    pub fn with_reserve_factor(mut self, reserve_factor: Decimal) -> Self {
        self.reserve_factor = reserve_factor;
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_borrow_cap(mut self, cap: Decimal) -> Self {
        self.borrow_cap = cap;
        self
    }

    pub fn with_rate_model(mut self, rate_model: RateModelConfig) -> Self {
        self.rate_model = rate_model;
        self
    }

    pub fn market_config(&self) -> Result<MarketConfig, ConfigError> {
        let initial = to_raw_units(self.initial_exchange_rate, self.underlying_decimals)?;
        Ok(MarketConfig::new(self.id, &self.underlying_symbol, self.underlying_decimals)
            .with_initial_exchange_rate(Wad::from_raw(initial))
            .with_reserve_factor(Wad::from_decimal(self.reserve_factor)?))
    }

    pub fn collateral_factor_wad(&self) -> Result<Wad, ConfigError> {
        Ok(Wad::from_decimal(self.collateral_factor)?)
    }

    pub fn borrow_cap_raw(&self) -> Result<u128, ConfigError> {
        Ok(to_raw_units(self.borrow_cap, self.underlying_decimals)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidMarket {
            market: self.id,
            reason: reason.to_string(),
        };

        if self.underlying_decimals > 18 {
            return Err(invalid("underlying decimals above 18 are not supported"));
        }
        if self.collateral_factor < Decimal::ZERO || self.collateral_factor >= Decimal::ONE {
            return Err(invalid("collateral factor must be in [0, 1)"));
        }
        if self.reserve_factor < Decimal::ZERO || self.reserve_factor > Decimal::ONE {
            return Err(invalid("reserve factor must be in [0, 1]"));
        }
        if self.initial_exchange_rate <= Decimal::ZERO {
            return Err(invalid("initial exchange rate must be positive"));
        }
        if self.borrow_cap < Decimal::ZERO {
            return Err(invalid("borrow cap cannot be negative"));
        }
        match self.price {
            Some(price) if price < Decimal::ZERO => return Err(invalid("price cannot be negative")),
            None if !self.collateral_factor.is_zero() => {
                return Err(invalid("collateral factor needs an opening price"))
            }
            _ => {}
        }
        // rounds to nothing at this precision
        if self.market_config()?.initial_exchange_rate.is_zero() {
            return Err(invalid("initial exchange rate is below one raw unit"));
        }
        self.rate_model.build()?;
        Ok(())
    }
}

// The complete bootstrap configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingConfig {
    pub admin: AccountId,
    pub close_factor: Decimal,
    pub liquidation_incentive: Decimal,
    pub max_assets: usize,
    // Audit log capacity
    pub max_events: usize,
    pub markets: Vec<MarketSetup>,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            admin: AccountId(0),
            close_factor: dec!(0.5),
            liquidation_incentive: dec!(1.1),
            max_assets: 20,
            max_events: 100_000,
            markets: vec![
                MarketSetup::new(MarketId(1), "UNI", 18)
                    .with_collateral_factor(dec!(0.5))
                    .with_price(dec!(10)),
                MarketSetup::new(MarketId(2), "USDC", 6)
                    .with_collateral_factor(dec!(0.8))
                    .with_price(dec!(1)),
            ],
        }
    }
}

impl LendingConfig {
    // Same markets with reserves switched on
    pub fn testnet() -> Self {
        let mut config = Self::default();
        for market in &mut config.markets {
            market.reserve_factor = dec!(0.1);
        }
        config
    }

    // Conservative factors, jump rate models and borrow caps
    pub fn mainnet_conservative() -> Self {
        let jump = RateModelConfig::Jump {
            base_rate_per_year: dec!(0),
            multiplier_per_year: dec!(0.05),
            jump_multiplier_per_year: dec!(1.09),
            kink: dec!(0.8),
        };
        Self {
            liquidation_incentive: dec!(1.08),
            max_assets: 10,
            markets: vec![
                MarketSetup::new(MarketId(1), "UNI", 18)
                    .with_collateral_factor(dec!(0.6))
                    .with_reserve_factor(dec!(0.25))
                    .with_borrow_cap(dec!(5_000_000))
                    .with_price(dec!(10))
                    .with_rate_model(jump.clone()),
                MarketSetup::new(MarketId(2), "USDC", 6)
                    .with_collateral_factor(dec!(0.75))
                    .with_reserve_factor(dec!(0.075))
                    .with_price(dec!(1))
                    .with_rate_model(jump),
            ],
            ..Self::default()
        }
    }

    pub fn risk_params(&self) -> Result<RiskParams, ConfigError> {
        Ok(RiskParams {
            close_factor: Wad::from_decimal(self.close_factor)?,
            liquidation_incentive: Wad::from_decimal(self.liquidation_incentive)?,
            max_assets: self.max_assets,
        })
    }

    pub fn market(&self, id: MarketId) -> Option<&MarketSetup> {
        self.markets.iter().find(|m| m.id == id)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.close_factor <= Decimal::ZERO || self.close_factor > Decimal::ONE {
            return Err(ConfigError::InvalidRisk {
                reason: "close factor must be in (0, 1]".to_string(),
            });
        }
        if self.liquidation_incentive < Decimal::ONE {
            return Err(ConfigError::InvalidRisk {
                reason: "liquidation incentive must be at least 1".to_string(),
            });
        }
        if self.max_assets == 0 {
            return Err(ConfigError::InvalidRisk {
                reason: "max assets must be positive".to_string(),
            });
        }
        if self.max_events == 0 {
            return Err(ConfigError::InvalidRisk {
                reason: "event log needs room for at least one event".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for market in &self.markets {
            if !seen.insert(market.id) {
                return Err(ConfigError::DuplicateMarket(market.id));
            }
            market.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid risk parameters: {reason}")]
    InvalidRisk { reason: String },

    #[error("invalid market {market}: {reason}")]
    InvalidMarket { market: MarketId, reason: String },

    #[error("{0} is configured twice")]
    DuplicateMarket(MarketId),

    #[error(transparent)]
    Math(#[from] MathError),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> LendingConfig {
        match self {
            Environment::Development => LendingConfig::default(),
            Environment::Testnet => LendingConfig::testnet(),
            Environment::Mainnet => LendingConfig::mainnet_conservative(),
        }
    }
}
