//! Liquidation of under-collateralized borrowers.
//!
//! A liquidation touches two ledgers. Both mutations are staged before anything
//! commits: the repay on the borrowed market, then the seize on the collateral
//! market. The repay carries the only external transfer, so it commits first;
//! if it fails neither market changes. The seize moves receipt units only and
//! cannot fail once staged.

use super::core::Engine;
use super::results::{EngineError, LiquidationResult};
use crate::controller::{ControllerGate, LiquidationRequest, PositionBook};
use crate::events::{EventPayload, LiquidateBorrowEvent, RepayBorrowEvent};
use crate::hooks::MutationNotice;
use crate::market::{AccrualOutcome, RepayOutcome};
use crate::types::{AccountId, MarketId, RepayAmount};

struct Settled {
    repay: RepayOutcome,
    seized_receipt: u128,
    accruals: Vec<(MarketId, Option<AccrualOutcome>)>,
    notices: Vec<MutationNotice>,
}

impl Engine {
    /// Repays `repay_amount` of `borrower`'s debt in `borrowed_market` from the
    /// liquidator's underlying and seizes discounted collateral receipt units
    /// from `collateral_market`. All or nothing.
    pub fn liquidate_borrow(
        &mut self,
        liquidator: AccountId,
        borrower: AccountId,
        borrowed_market: MarketId,
        repay_amount: u128,
        collateral_market: MarketId,
    ) -> Result<LiquidationResult, EngineError> {
        let request = LiquidationRequest {
            liquidator,
            borrower,
            borrowed_market,
            collateral_market,
            repay_amount,
        };
        match self.execute_liquidation(&request) {
            Ok(result) => Ok(result),
            Err(err) => {
                self.record_rejection("liquidate_borrow", liquidator, Some(borrowed_market), repay_amount, &err);
                Err(err)
            }
        }
    }

    fn execute_liquidation(&mut self, request: &LiquidationRequest) -> Result<LiquidationResult, EngineError> {
        self.ensure_market(request.borrowed_market)?;
        self.ensure_market(request.collateral_market)?;
        let now = self.now();

        let book = self.position_book(request.borrower, Some(now))?;
        let liquidity_before = self.controller.authorize_liquidation(request, &book)?;

        let settled = if request.borrowed_market == request.collateral_market {
            self.settle_in_one_market(request)?
        } else {
            self.settle_across_markets(request)?
        };

        for (market_id, accrual) in &settled.accruals {
            self.record_accrual(*market_id, *accrual);
        }
        self.notify_controller(&settled.notices);

        let result = LiquidationResult {
            liquidator: request.liquidator,
            borrower: request.borrower,
            borrowed_market: request.borrowed_market,
            collateral_market: request.collateral_market,
            repay_amount: settled.repay.amount,
            seized_receipt: settled.seized_receipt,
            liquidity_before,
            remaining_borrow: settled.repay.account_borrows,
        };

        tracing::info!(
            liquidator = %result.liquidator,
            borrower = %result.borrower,
            borrowed = %result.borrowed_market,
            collateral = %result.collateral_market,
            repaid = result.repay_amount,
            seized = result.seized_receipt,
            shortfall = liquidity_before.shortfall,
            "liquidation"
        );
        self.emit_event(EventPayload::RepayBorrow(RepayBorrowEvent {
            market_id: result.borrowed_market,
            payer: result.liquidator,
            borrower: result.borrower,
            amount: result.repay_amount,
            account_borrows: settled.repay.account_borrows,
            total_borrows: settled.repay.total_borrows,
        }));
        self.emit_event(EventPayload::LiquidateBorrow(LiquidateBorrowEvent {
            liquidator: result.liquidator,
            borrower: result.borrower,
            borrowed_market: result.borrowed_market,
            collateral_market: result.collateral_market,
            repay_amount: result.repay_amount,
            seized_receipt: result.seized_receipt,
        }));

        Ok(result)
    }

    fn settle_across_markets(&mut self, request: &LiquidationRequest) -> Result<Settled, EngineError> {
        let now = self.now();
        let borrowed = self
            .markets
            .get(&request.borrowed_market)
            .ok_or(EngineError::MarketNotFound(request.borrowed_market))?;
        let collateral = self
            .markets
            .get(&request.collateral_market)
            .ok_or(EngineError::MarketNotFound(request.collateral_market))?;

        let repay = {
            let gate = ControllerGate::new(&mut self.controller, PositionBook::new());
            borrowed.prepare_repay(
                &gate,
                request.liquidator,
                request.borrower,
                RepayAmount::Exact(request.repay_amount),
                now,
            )?
        };

        let collateral_rate = collateral.preview(now)?.exchange_rate()?;
        let seize_amount = self.controller.seize_tokens(
            request.borrowed_market,
            request.collateral_market,
            repay.outcome().amount,
            collateral_rate,
        )?;
        let ticket = self.controller.issue_seize_ticket(request, seize_amount);

        let seize = {
            let gate = ControllerGate::new(&mut self.controller, PositionBook::new());
            collateral.prepare_seize(&gate, &ticket, request.liquidator, request.borrower, seize_amount, now)?
        };

        let repaid = self
            .markets
            .get_mut(&request.borrowed_market)
            .ok_or(EngineError::MarketNotFound(request.borrowed_market))?
            .commit(repay)?;
        let seized = self
            .markets
            .get_mut(&request.collateral_market)
            .ok_or(EngineError::MarketNotFound(request.collateral_market))?
            .commit(seize)?;

        let mut notices = repaid.notices;
        notices.extend(seized.notices);
        Ok(Settled {
            repay: repaid.outcome,
            seized_receipt: seized.outcome.receipt,
            accruals: vec![
                (request.borrowed_market, repaid.accrual),
                (request.collateral_market, seized.accrual),
            ],
            notices,
        })
    }

    // the collateral rate is read after the repay is staged, since both land in
    // the same pool
    fn settle_in_one_market(&mut self, request: &LiquidationRequest) -> Result<Settled, EngineError> {
        let now = self.now();
        let market_id = request.borrowed_market;
        let ledger = self
            .markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;

        let repay = {
            let gate = ControllerGate::new(&mut self.controller, PositionBook::new());
            ledger.prepare_repay(
                &gate,
                request.liquidator,
                request.borrower,
                RepayAmount::Exact(request.repay_amount),
                now,
            )?
        };

        let collateral_rate = repay.staged_state().exchange_rate()?;
        let seize_amount =
            self.controller
                .seize_tokens(market_id, market_id, repay.outcome().amount, collateral_rate)?;
        let ticket = self.controller.issue_seize_ticket(request, seize_amount);

        let combined = {
            let gate = ControllerGate::new(&mut self.controller, PositionBook::new());
            ledger.prepare_seize_after(repay, &gate, &ticket, request.liquidator, request.borrower, seize_amount)?
        };

        let committed = self
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?
            .commit(combined)?;
        let (repay, seized) = committed.outcome;
        Ok(Settled {
            repay,
            seized_receipt: seized.receipt,
            accruals: vec![(market_id, committed.accrual)],
            notices: committed.notices,
        })
    }
}
