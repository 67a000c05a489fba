//! Borrow side: borrow, repay and repay on behalf.

use super::core::Engine;
use super::results::EngineError;
use crate::controller::{ControllerGate, PositionBook};
use crate::events::{BorrowEvent, EventPayload, RepayBorrowEvent};
use crate::market::{BorrowOutcome, RepayOutcome};
use crate::types::{AccountId, MarketId, RepayAmount};

impl Engine {
    /// Borrows `amount` underlying. The controller checks liquidity against every
    /// market the account uses, accrued to now. Borrowing does not enter the market.
    pub fn borrow(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<BorrowOutcome, EngineError> {
        let now = self.now();
        let book = self.position_book(account, Some(now))?;
        let ledger = self
            .markets
            .get_mut(&market_id)
            .ok_or_else(|| EngineError::not_listed(market_id))?;
        let mut gate = ControllerGate::new(&mut self.controller, book);
        let committed = ledger.borrow(&mut gate, account, amount, now)?;

        self.record_accrual(market_id, committed.accrual);
        let outcome = committed.outcome;
        tracing::info!(
            market = %market_id,
            %account,
            amount,
            account_borrows = outcome.account_borrows,
            "borrow"
        );
        self.emit_event(EventPayload::Borrow(BorrowEvent {
            market_id,
            account_id: account,
            amount,
            account_borrows: outcome.account_borrows,
            total_borrows: outcome.total_borrows,
        }));
        Ok(outcome)
    }

    pub fn repay(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        amount: RepayAmount,
    ) -> Result<RepayOutcome, EngineError> {
        self.repay_behalf(account, account, market_id, amount)
    }

    /// `payer` settles part or all of `borrower`'s debt.
    pub fn repay_behalf(
        &mut self,
        payer: AccountId,
        borrower: AccountId,
        market_id: MarketId,
        amount: RepayAmount,
    ) -> Result<RepayOutcome, EngineError> {
        let now = self.now();
        let ledger = self
            .markets
            .get_mut(&market_id)
            .ok_or_else(|| EngineError::not_listed(market_id))?;
        let mut gate = ControllerGate::new(&mut self.controller, PositionBook::new());
        let committed = ledger.repay(&mut gate, payer, borrower, amount, now)?;

        self.record_accrual(market_id, committed.accrual);
        let outcome = committed.outcome;
        tracing::info!(
            market = %market_id,
            %payer,
            %borrower,
            amount = outcome.amount,
            account_borrows = outcome.account_borrows,
            "repay"
        );
        self.emit_event(EventPayload::RepayBorrow(RepayBorrowEvent {
            market_id,
            payer,
            borrower,
            amount: outcome.amount,
            account_borrows: outcome.account_borrows,
            total_borrows: outcome.total_borrows,
        }));
        Ok(outcome)
    }

    /// Borrow balance at the market's last accrual.
    pub fn borrow_balance_stored(&self, account: AccountId, market_id: MarketId) -> Result<u128, EngineError> {
        Ok(self.market_state(market_id)?.borrow_balance(account)?)
    }

    /// Accrues the market first, then reads the balance.
    pub fn borrow_balance_current(&mut self, account: AccountId, market_id: MarketId) -> Result<u128, EngineError> {
        self.accrue_interest(market_id)?;
        self.borrow_balance_stored(account, market_id)
    }
}
