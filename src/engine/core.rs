// 8.0 engine/core.rs: main engine. owns every market ledger, the risk controller,
// the clock and the audit log. every entry point takes &mut self, so one operation
// runs at a time and nothing can interleave between its accrual and its commit.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::clock::Clock;
use crate::controller::{PositionBook, RiskController, RiskParams};
use crate::events::{AccrueInterestEvent, Event, EventLog, EventPayload, OperationRejectedEvent};
use crate::hooks::MutationNotice;
use crate::market::{AccrualOutcome, MarketLedger, MarketState};
use crate::price_feed::PriceOracle;
use crate::types::{AccountId, MarketId, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) markets: BTreeMap<MarketId, MarketLedger>,
    pub(super) controller: RiskController,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) events: EventLog,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        params: RiskParams,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let controller = RiskController::new(config.admin, params, oracle)?;
        let events = EventLog::new(config.max_events);
        Ok(Self {
            config,
            markets: BTreeMap::new(),
            controller,
            clock,
            events,
        })
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn controller(&self) -> &RiskController {
        &self.controller
    }

    pub fn market(&self, market_id: MarketId) -> Result<&MarketLedger, EngineError> {
        self.markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))
    }

    /// Stored state, as of the market's last accrual.
    pub fn market_state(&self, market_id: MarketId) -> Result<&MarketState, EngineError> {
        Ok(self.market(market_id)?.state())
    }

    pub fn markets(&self) -> impl Iterator<Item = &MarketLedger> {
        self.markets.values()
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        self.events.recent(count)
    }

    pub(super) fn ledger_mut(&mut self, market_id: MarketId) -> Result<&mut MarketLedger, EngineError> {
        self.markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))
    }

    pub(super) fn ensure_market(&self, market_id: MarketId) -> Result<(), EngineError> {
        self.market(market_id).map(|_| ())
    }

    /// The account's position in every market the controller tracks for it.
    /// `at: Some(now)` previews accrual to `now`; `None` reads stored state.
    pub(super) fn position_book(
        &self,
        account: AccountId,
        at: Option<Timestamp>,
    ) -> Result<PositionBook, EngineError> {
        let mut book = PositionBook::new();
        for market_id in self.controller.markets_for(account) {
            let ledger = self.market(market_id)?;
            let snapshot = match at {
                Some(now) => ledger.preview(now)?.snapshot(account)?,
                None => ledger.snapshot(account)?,
            };
            book.insert(market_id, snapshot);
        }
        Ok(book)
    }

    pub(super) fn notify_controller(&mut self, notices: &[MutationNotice]) {
        for notice in notices {
            self.controller.mutation_completed(notice);
        }
    }

    pub(super) fn record_accrual(&mut self, market_id: MarketId, accrual: Option<AccrualOutcome>) {
        if let Some(accrual) = accrual {
            self.emit_event(EventPayload::AccrueInterest(AccrueInterestEvent {
                market_id,
                interest_accumulated: accrual.interest_accumulated,
                borrow_index: accrual.borrow_index,
                total_borrows: accrual.total_borrows,
            }));
        }
    }

    // rejected operations are logged for audit, then the error goes back to the caller
    pub(super) fn record_rejection(
        &mut self,
        operation: &str,
        account_id: AccountId,
        market_id: Option<MarketId>,
        amount: u128,
        err: &EngineError,
    ) {
        tracing::warn!(operation, account = %account_id, amount, error = %err, "operation rejected");
        self.emit_event(EventPayload::OperationRejected(OperationRejectedEvent {
            operation: operation.to_string(),
            account_id,
            market_id,
            amount,
            reason: err.to_string(),
        }));
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let now = self.now();
        self.events.emit(now, payload);
    }
}
