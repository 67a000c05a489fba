//! Administrative entry points. Every call names its caller and only the
//! configured admin gets through. Each change is logged with its old and new value.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{
    EventPayload, MarketListedEvent, ParamChangedEvent, ParamValue, PricePostedEvent, ReservesEvent,
    RiskParameter,
};
use crate::market::{MarketConfig, MarketLedger, ReservesChanged};
use crate::math::Wad;
use crate::price_feed::{PriceOracle, PricePosted, SimplePriceOracle};
use crate::rate_model::InterestRateModel;
use crate::token::UnderlyingToken;
use crate::types::{AccountId, Action, MarketId};
use std::sync::Arc;

impl Engine {
    fn ensure_admin(&self, caller: AccountId) -> Result<(), EngineError> {
        if caller != self.controller.admin() {
            return Err(EngineError::Unauthorized(format!("{caller} is not the admin")));
        }
        Ok(())
    }

    fn param_changed(&mut self, parameter: RiskParameter, market_id: Option<MarketId>, old: ParamValue, new: ParamValue) {
        tracing::info!(?parameter, market = ?market_id, ?old, ?new, "parameter changed");
        self.emit_event(EventPayload::ParamChanged(ParamChangedEvent {
            parameter,
            market_id,
            old,
            new,
        }));
    }

    /// Lists a new market. The token's decimals must match the config.
    pub fn list_market(
        &mut self,
        caller: AccountId,
        config: MarketConfig,
        token: Box<dyn UnderlyingToken>,
        rate_model: Arc<dyn InterestRateModel>,
    ) -> Result<(), EngineError> {
        self.ensure_admin(caller)?;
        let market_id = config.id;
        if self.markets.contains_key(&market_id) {
            return Err(EngineError::MarketAlreadyListed(market_id));
        }
        if config.underlying_decimals > 18 {
            return Err(EngineError::InvalidParameter {
                name: "underlying_decimals",
                reason: "must not exceed 18",
            });
        }
        if token.decimals() != config.underlying_decimals {
            return Err(EngineError::InvalidParameter {
                name: "underlying_decimals",
                reason: "token decimals do not match the market config",
            });
        }
        if config.initial_exchange_rate.is_zero() {
            return Err(EngineError::InvalidParameter {
                name: "initial_exchange_rate",
                reason: "must be positive",
            });
        }
        if config.reserve_factor > Wad::ONE {
            return Err(EngineError::InvalidParameter {
                name: "reserve_factor",
                reason: "must not exceed 1",
            });
        }

        self.controller.support_market(caller, market_id)?;
        let now = self.now();
        let listed = MarketListedEvent {
            market_id,
            symbol: config.symbol.clone(),
            underlying_decimals: config.underlying_decimals,
        };
        self.markets
            .insert(market_id, MarketLedger::new(config, token, rate_model, now));

        tracing::info!(market = %market_id, symbol = %listed.symbol, "market listed");
        self.emit_event(EventPayload::MarketListed(listed));
        Ok(())
    }

    pub fn set_collateral_factor(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        collateral_factor: Wad,
    ) -> Result<(), EngineError> {
        let change = self.controller.set_collateral_factor(caller, market_id, collateral_factor)?;
        self.param_changed(
            RiskParameter::CollateralFactor,
            Some(market_id),
            ParamValue::Ratio(change.old),
            ParamValue::Ratio(change.new),
        );
        Ok(())
    }

    pub fn set_close_factor(&mut self, caller: AccountId, close_factor: Wad) -> Result<(), EngineError> {
        let change = self.controller.set_close_factor(caller, close_factor)?;
        self.param_changed(
            RiskParameter::CloseFactor,
            None,
            ParamValue::Ratio(change.old),
            ParamValue::Ratio(change.new),
        );
        Ok(())
    }

    pub fn set_liquidation_incentive(&mut self, caller: AccountId, incentive: Wad) -> Result<(), EngineError> {
        let change = self.controller.set_liquidation_incentive(caller, incentive)?;
        self.param_changed(
            RiskParameter::LiquidationIncentive,
            None,
            ParamValue::Ratio(change.old),
            ParamValue::Ratio(change.new),
        );
        Ok(())
    }

    pub fn set_max_assets(&mut self, caller: AccountId, max_assets: usize) -> Result<(), EngineError> {
        let change = self.controller.set_max_assets(caller, max_assets)?;
        self.param_changed(
            RiskParameter::MaxAssets,
            None,
            ParamValue::Count(change.old),
            ParamValue::Count(change.new),
        );
        Ok(())
    }

    pub fn set_price_oracle(&mut self, caller: AccountId, oracle: Arc<dyn PriceOracle>) -> Result<(), EngineError> {
        let change = self.controller.set_price_oracle(caller, oracle)?;
        self.param_changed(
            RiskParameter::PriceOracle,
            None,
            ParamValue::Name(change.old),
            ParamValue::Name(change.new),
        );
        Ok(())
    }

    /// Raw underlying units; 0 removes the cap.
    pub fn set_borrow_cap(&mut self, caller: AccountId, market_id: MarketId, cap: u128) -> Result<(), EngineError> {
        let change = self.controller.set_borrow_cap(caller, market_id, cap)?;
        self.param_changed(
            RiskParameter::BorrowCap,
            Some(market_id),
            ParamValue::Amount(change.old),
            ParamValue::Amount(change.new),
        );
        Ok(())
    }

    /// Mint and borrow pause per market.
    pub fn set_market_paused(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        action: Action,
        paused: bool,
    ) -> Result<(), EngineError> {
        let change = self.controller.set_market_paused(caller, market_id, action, paused)?;
        self.param_changed(
            RiskParameter::Paused(action),
            Some(market_id),
            ParamValue::Flag(change.old),
            ParamValue::Flag(change.new),
        );
        Ok(())
    }

    /// Seize and transfer pause globally.
    pub fn set_global_paused(&mut self, caller: AccountId, action: Action, paused: bool) -> Result<(), EngineError> {
        let change = self.controller.set_global_paused(caller, action, paused)?;
        self.param_changed(
            RiskParameter::Paused(action),
            None,
            ParamValue::Flag(change.old),
            ParamValue::Flag(change.new),
        );
        Ok(())
    }

    /// Accrues under the old factor, then switches.
    pub fn set_reserve_factor(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        reserve_factor: Wad,
    ) -> Result<(), EngineError> {
        self.ensure_admin(caller)?;
        let now = self.now();
        let (old, accrual) = self.ledger_mut(market_id)?.set_reserve_factor(reserve_factor, now)?;
        self.record_accrual(market_id, accrual);
        self.param_changed(
            RiskParameter::ReserveFactor,
            Some(market_id),
            ParamValue::Ratio(old),
            ParamValue::Ratio(reserve_factor),
        );
        Ok(())
    }

    /// Accrues under the old model, then switches.
    pub fn set_interest_rate_model(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        rate_model: Arc<dyn InterestRateModel>,
    ) -> Result<(), EngineError> {
        self.ensure_admin(caller)?;
        let now = self.now();
        let ledger = self.ledger_mut(market_id)?;
        let old = ledger.rate_model().name().to_string();
        let new = rate_model.name().to_string();
        let accrual = ledger.set_rate_model(rate_model, now)?;
        self.record_accrual(market_id, accrual);
        self.param_changed(
            RiskParameter::InterestRateModel,
            Some(market_id),
            ParamValue::Name(old),
            ParamValue::Name(new),
        );
        Ok(())
    }

    /// Pays reserves out of the pool to `to`.
    pub fn reduce_reserves(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        amount: u128,
        to: AccountId,
    ) -> Result<ReservesChanged, EngineError> {
        self.ensure_admin(caller)?;
        let now = self.now();
        let ledger = self.ledger_mut(market_id)?;
        let prepared = ledger.prepare_reduce_reserves(to, amount, now)?;
        let committed = ledger.commit(prepared)?;

        self.record_accrual(market_id, committed.accrual);
        let outcome = committed.outcome;
        tracing::info!(market = %market_id, %to, amount, total_reserves = outcome.total_reserves, "reserves reduced");
        self.emit_event(EventPayload::ReservesReduced(ReservesEvent {
            market_id,
            account_id: to,
            amount,
            total_reserves: outcome.total_reserves,
        }));
        Ok(outcome)
    }

    /// Posts a price through an admin-held handle on the simple oracle.
    pub fn post_price(
        &mut self,
        caller: AccountId,
        oracle: &SimplePriceOracle,
        market_id: MarketId,
        price: Wad,
    ) -> Result<PricePosted, EngineError> {
        self.ensure_admin(caller)?;
        self.ensure_market(market_id)?;
        let posted = oracle.set_underlying_price(market_id, price);
        tracing::info!(market = %market_id, previous = %posted.previous, new = %posted.new, "price posted");
        self.emit_event(EventPayload::PricePosted(PricePostedEvent {
            market_id,
            previous: posted.previous,
            new: posted.new,
        }));
        Ok(posted)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testkit::{Harness, ALICE, BOB, UNI, USDC};
    use crate::engine::EngineError;
    use crate::events::{EventPayload, ParamValue, RiskParameter};
    use crate::market::MarketConfig;
    use crate::math::{Wad, WAD};
    use crate::rate_model::WhitePaperRateModel;
    use crate::token::InMemoryToken;
    use crate::types::{Action, MarketId};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn wad(value: rust_decimal::Decimal) -> Wad {
        Wad::from_decimal(value).unwrap()
    }

    #[test]
    fn only_admin_may_change_parameters() {
        let mut h = Harness::new();
        let result = h.engine.set_close_factor(ALICE, wad(dec!(0.4)));
        assert!(matches!(result, Err(EngineError::Unauthorized(_))));
        let result = h.engine.reduce_reserves(ALICE, UNI, 1, ALICE);
        assert!(matches!(result, Err(EngineError::Unauthorized(_))));
    }

    #[test]
    fn parameter_changes_record_old_and_new() {
        let mut h = Harness::new();
        h.engine.set_close_factor(h.admin, wad(dec!(0.4))).unwrap();

        let last = &h.engine.recent_events(1)[0];
        match &last.payload {
            EventPayload::ParamChanged(e) => {
                assert_eq!(e.parameter, RiskParameter::CloseFactor);
                assert_eq!(e.old, ParamValue::Ratio(wad(dec!(0.5))));
                assert_eq!(e.new, ParamValue::Ratio(wad(dec!(0.4))));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn invalid_factors_are_rejected() {
        let mut h = Harness::new();
        assert!(matches!(
            h.engine.set_collateral_factor(h.admin, UNI, Wad::ONE),
            Err(EngineError::InvalidParameter { .. })
        ));
        assert!(matches!(
            h.engine.set_close_factor(h.admin, Wad::ZERO),
            Err(EngineError::InvalidParameter { .. })
        ));
        assert!(matches!(
            h.engine.set_liquidation_incentive(h.admin, wad(dec!(0.99))),
            Err(EngineError::InvalidParameter { .. })
        ));
        assert!(matches!(
            h.engine.set_global_paused(h.admin, Action::Mint, true),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn collateral_factor_needs_a_price() {
        let mut h = Harness::new();
        h.set_price(USDC, dec!(0));
        let result = h.engine.set_collateral_factor(h.admin, USDC, wad(dec!(0.5)));
        assert_eq!(result.unwrap_err(), EngineError::PriceUnavailable(USDC));
        h.engine.set_collateral_factor(h.admin, USDC, Wad::ZERO).unwrap();
    }

    #[test]
    fn listing_checks_duplicates_and_decimals() {
        let mut h = Harness::new();
        let duplicate = h.engine.list_market(
            h.admin,
            MarketConfig::uni(),
            Box::new(InMemoryToken::new("UNI", 18)),
            Arc::new(WhitePaperRateModel::zero()),
        );
        assert_eq!(duplicate.unwrap_err(), EngineError::MarketAlreadyListed(UNI));

        let mismatched = h.engine.list_market(
            h.admin,
            MarketConfig::new(MarketId(3), "DAI", 18),
            Box::new(InMemoryToken::new("DAI", 6)),
            Arc::new(WhitePaperRateModel::zero()),
        );
        assert!(matches!(mismatched, Err(EngineError::InvalidParameter { .. })));

        h.engine
            .list_market(
                h.admin,
                MarketConfig::new(MarketId(3), "DAI", 18),
                Box::new(InMemoryToken::new("DAI", 18)),
                Arc::new(WhitePaperRateModel::zero()),
            )
            .unwrap();
        assert!(h.engine.controller().is_listed(MarketId(3)));
        assert_eq!(h.engine.market(MarketId(3)).unwrap().config().symbol, "cDAI");
    }

    #[test]
    fn reserves_flow_in_and_out() {
        let mut h = Harness::new();
        h.fund(UNI, ALICE, 100 * WAD);
        h.engine.add_reserves(ALICE, UNI, 100 * WAD).unwrap();

        let too_much = h.engine.reduce_reserves(h.admin, UNI, 101 * WAD, BOB);
        assert!(matches!(too_much, Err(EngineError::InsufficientBalance { .. })));

        let outcome = h.engine.reduce_reserves(h.admin, UNI, 60 * WAD, BOB).unwrap();
        assert_eq!(outcome.total_reserves, 40 * WAD);
        assert_eq!(h.balance(UNI, BOB), 60 * WAD);
    }

    #[test]
    fn reserve_factor_change_is_logged() {
        let mut h = Harness::new();
        h.engine.set_reserve_factor(h.admin, UNI, wad(dec!(0.2))).unwrap();
        assert_eq!(h.engine.market_state(UNI).unwrap().reserve_factor, wad(dec!(0.2)));
        assert!(matches!(
            h.engine.set_reserve_factor(h.admin, UNI, wad(dec!(1.5))),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn oracle_swap_reports_names() {
        let mut h = Harness::new();
        let replacement = crate::price_feed::SimplePriceOracle::new();
        h.engine.set_price_oracle(h.admin, Arc::new(replacement)).unwrap();

        let last = &h.engine.recent_events(1)[0];
        assert!(matches!(
            &last.payload,
            EventPayload::ParamChanged(e) if e.new == ParamValue::Name("simple".to_string())
        ));
        // the new oracle has no prices yet
        assert_eq!(
            h.engine.set_collateral_factor(h.admin, UNI, wad(dec!(0.5))).unwrap_err(),
            EngineError::PriceUnavailable(UNI)
        );
    }
}
