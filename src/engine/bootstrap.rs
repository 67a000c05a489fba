//! Building an engine from a [`LendingConfig`].

use super::config::EngineConfig;
use super::core::Engine;
use super::results::EngineError;
use crate::clock::Clock;
use crate::config::LendingConfig;
use crate::price_feed::{price_mantissa, SimplePriceOracle};
use crate::token::{Holder, InMemoryToken, UnderlyingToken};
use crate::types::{AccountId, MarketId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A bootstrapped engine together with the handles the operator keeps: the
/// price table behind the controller's oracle and every market's token.
#[derive(Debug)]
pub struct Bootstrap {
    pub engine: Engine,
    pub oracle: SimplePriceOracle,
    pub tokens: BTreeMap<MarketId, InMemoryToken>,
}

impl Bootstrap {
    pub fn admin(&self) -> AccountId {
        self.engine.controller().admin()
    }

    pub fn token(&self, market_id: MarketId) -> Result<&InMemoryToken, EngineError> {
        self.tokens.get(&market_id).ok_or(EngineError::MarketNotFound(market_id))
    }

    /// Mints underlying to `account` and approves the market's pool to pull it.
    pub fn fund(&self, market_id: MarketId, account: AccountId, amount: u128) -> Result<(), EngineError> {
        let token = self.token(market_id)?;
        token.mint(Holder::Account(account), amount);
        token
            .clone()
            .approve(Holder::Account(account), Holder::Pool(market_id), u128::MAX)
            .map_err(EngineError::TransferFailed)
    }

    pub fn balance(&self, market_id: MarketId, account: AccountId) -> Result<u128, EngineError> {
        Ok(self.token(market_id)?.balance_of(Holder::Account(account)))
    }
}

impl Engine {
    /// Validates the config, then lists every market with an in-memory token,
    /// seeds opening prices and applies collateral factors and borrow caps.
    pub fn from_config(config: &LendingConfig, clock: Arc<dyn Clock>) -> Result<Bootstrap, EngineError> {
        config.validate()?;
        let admin = config.admin;
        let oracle = SimplePriceOracle::new();
        let engine_config = EngineConfig {
            max_events: config.max_events,
            admin,
        };
        let mut engine = Engine::new(engine_config, config.risk_params()?, Arc::new(oracle.clone()), clock)?;
        let mut tokens = BTreeMap::new();

        for setup in &config.markets {
            let market_id = setup.id;
            let token = InMemoryToken::new(setup.underlying_symbol.clone(), setup.underlying_decimals);
            engine.list_market(admin, setup.market_config()?, Box::new(token.clone()), setup.rate_model.build()?)?;
            tokens.insert(market_id, token);

            if let Some(price) = setup.price {
                engine.post_price(admin, &oracle, market_id, price_mantissa(price, setup.underlying_decimals)?)?;
            }
            let collateral_factor = setup.collateral_factor_wad()?;
            if !collateral_factor.is_zero() {
                engine.set_collateral_factor(admin, market_id, collateral_factor)?;
            }
            let borrow_cap = setup.borrow_cap_raw()?;
            if borrow_cap != 0 {
                engine.set_borrow_cap(admin, market_id, borrow_cap)?;
            }
        }

        tracing::info!(markets = config.markets.len(), %admin, "engine bootstrapped");
        Ok(Bootstrap { engine, oracle, tokens })
    }
}
