// shared fixture for the engine's unit tests: two 18-decimal markets with flat
// rate models, UNI at $10 (cf 0.5) and USDC at $1 (cf 0.8), incentive 1.1.

use super::core::Engine;
use crate::clock::ManualClock;
use crate::config::{LendingConfig, MarketSetup};
use crate::price_feed::SimplePriceOracle;
use crate::rate_model::RateModelConfig;
use crate::token::{Holder, InMemoryToken, UnderlyingToken};
use crate::types::{AccountId, MarketId, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) const ALICE: AccountId = AccountId(1);
pub(crate) const BOB: AccountId = AccountId(2);
pub(crate) const CAROL: AccountId = AccountId(3);
pub(crate) const UNI: MarketId = MarketId(1);
pub(crate) const USDC: MarketId = MarketId(2);

pub(crate) fn at(secs: i64) -> Timestamp {
    Timestamp::from_secs(secs)
}

pub(crate) struct Harness {
    pub engine: Engine,
    pub oracle: SimplePriceOracle,
    pub clock: ManualClock,
    pub admin: AccountId,
    tokens: BTreeMap<MarketId, InMemoryToken>,
}

impl Harness {
    pub fn new() -> Self {
        let flat = RateModelConfig::WhitePaper {
            base_rate_per_year: Decimal::ZERO,
            multiplier_per_year: Decimal::ZERO,
        };
        let config = LendingConfig {
            markets: vec![
                MarketSetup::new(UNI, "UNI", 18)
                    .with_collateral_factor(dec!(0.5))
                    .with_price(dec!(10))
                    .with_rate_model(flat.clone()),
                MarketSetup::new(USDC, "USDC", 18)
                    .with_collateral_factor(dec!(0.8))
                    .with_price(dec!(1))
                    .with_rate_model(flat),
            ],
            ..LendingConfig::default()
        };
        let clock = ManualClock::new(at(0));
        let boot = Engine::from_config(&config, Arc::new(clock.clone())).unwrap();
        let admin = boot.admin();
        // approve every pool up front
        for market in [UNI, USDC] {
            for account in [ALICE, BOB, CAROL] {
                boot.fund(market, account, 0).unwrap();
            }
        }
        Self {
            engine: boot.engine,
            oracle: boot.oracle,
            clock,
            admin,
            tokens: boot.tokens,
        }
    }

    pub fn token(&self, market: MarketId) -> &InMemoryToken {
        &self.tokens[&market]
    }

    pub fn fund(&self, market: MarketId, account: AccountId, amount: u128) {
        self.token(market).mint(Holder::Account(account), amount);
    }

    pub fn balance(&self, market: MarketId, account: AccountId) -> u128 {
        self.token(market).balance_of(Holder::Account(account))
    }

    pub fn set_price(&mut self, market: MarketId, price: Decimal) {
        let mantissa = crate::price_feed::price_mantissa(price, 18).unwrap();
        self.engine.post_price(self.admin, &self.oracle, market, mantissa).unwrap();
    }

    /// Funds, deposits and enters the market.
    pub fn supply_collateral(&mut self, account: AccountId, market: MarketId, amount: u128) {
        self.seed_liquidity(account, market, amount);
        self.engine.enter_markets(account, &[market]).unwrap();
    }

    /// Funds and deposits without entering.
    pub fn seed_liquidity(&mut self, account: AccountId, market: MarketId, amount: u128) {
        self.fund(market, account, amount);
        self.engine.deposit(account, market, amount).unwrap();
    }
}
