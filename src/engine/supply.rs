//! Supply side: deposits, withdrawals, receipt transfers and reserves.

use super::core::Engine;
use super::results::EngineError;
use crate::controller::{ControllerGate, PositionBook};
use crate::events::{EventPayload, MintEvent, ReceiptTransferEvent, RedeemEvent, ReservesEvent};
use crate::market::{AccrualOutcome, MintOutcome, RedeemOutcome, ReservesChanged, WithdrawAmount};
use crate::types::{AccountId, MarketId};

impl Engine {
    /// Supplies `amount` underlying and mints receipt units at the accrued rate.
    pub fn deposit(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<MintOutcome, EngineError> {
        let now = self.now();
        let ledger = self
            .markets
            .get_mut(&market_id)
            .ok_or_else(|| EngineError::not_listed(market_id))?;
        // minting never consults liquidity
        let mut gate = ControllerGate::new(&mut self.controller, PositionBook::new());
        let committed = ledger.deposit(&mut gate, account, amount, now)?;

        self.record_accrual(market_id, committed.accrual);
        let outcome = committed.outcome;
        tracing::info!(market = %market_id, %account, underlying = outcome.underlying, receipt = outcome.receipt, "deposit");
        self.emit_event(EventPayload::Mint(MintEvent {
            market_id,
            account_id: account,
            underlying: outcome.underlying,
            receipt: outcome.receipt,
        }));
        Ok(outcome)
    }

    /// Burns `receipt_amount` receipt units for underlying, rounded down.
    pub fn withdraw(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        receipt_amount: u128,
    ) -> Result<RedeemOutcome, EngineError> {
        self.redeem(account, market_id, WithdrawAmount::Receipt(receipt_amount))
    }

    /// Withdraws exactly `underlying_amount`, burning receipt units rounded up.
    pub fn withdraw_underlying(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        underlying_amount: u128,
    ) -> Result<RedeemOutcome, EngineError> {
        self.redeem(account, market_id, WithdrawAmount::Underlying(underlying_amount))
    }

    fn redeem(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        amount: WithdrawAmount,
    ) -> Result<RedeemOutcome, EngineError> {
        match self.try_redeem(account, market_id, amount) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let requested = match amount {
                    WithdrawAmount::Receipt(n) | WithdrawAmount::Underlying(n) => n,
                };
                self.record_rejection("withdraw", account, Some(market_id), requested, &err);
                Err(err)
            }
        }
    }

    fn try_redeem(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        amount: WithdrawAmount,
    ) -> Result<RedeemOutcome, EngineError> {
        let now = self.now();
        let book = self.position_book(account, Some(now))?;
        let ledger = self
            .markets
            .get_mut(&market_id)
            .ok_or_else(|| EngineError::not_listed(market_id))?;
        let mut gate = ControllerGate::new(&mut self.controller, book);
        let committed = ledger.withdraw(&mut gate, account, amount, now)?;

        self.record_accrual(market_id, committed.accrual);
        let outcome = committed.outcome;
        tracing::info!(market = %market_id, %account, underlying = outcome.underlying, receipt = outcome.receipt, "withdraw");
        self.emit_event(EventPayload::Redeem(RedeemEvent {
            market_id,
            account_id: account,
            underlying: outcome.underlying,
            receipt: outcome.receipt,
        }));
        Ok(outcome)
    }

    /// Moves receipt units between accounts. Gated like a withdrawal of the
    /// sender's units.
    pub fn transfer_receipt(
        &mut self,
        from: AccountId,
        to: AccountId,
        market_id: MarketId,
        receipt_amount: u128,
    ) -> Result<u128, EngineError> {
        let now = self.now();
        let book = self.position_book(from, Some(now))?;
        let ledger = self
            .markets
            .get_mut(&market_id)
            .ok_or_else(|| EngineError::not_listed(market_id))?;
        let mut gate = ControllerGate::new(&mut self.controller, book);
        let committed = ledger.transfer_receipt(&mut gate, from, to, receipt_amount, now)?;

        self.record_accrual(market_id, committed.accrual);
        tracing::info!(market = %market_id, %from, %to, receipt = receipt_amount, "receipt transfer");
        self.emit_event(EventPayload::ReceiptTransfer(ReceiptTransferEvent {
            market_id,
            from,
            to,
            receipt: receipt_amount,
        }));
        Ok(committed.outcome.receipt)
    }

    /// Anyone may add reserves. The underlying is pulled from `account`.
    pub fn add_reserves(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<ReservesChanged, EngineError> {
        let now = self.now();
        let ledger = self.ledger_mut(market_id)?;
        let prepared = ledger.prepare_add_reserves(account, amount, now)?;
        let committed = ledger.commit(prepared)?;

        self.record_accrual(market_id, committed.accrual);
        let outcome = committed.outcome;
        tracing::info!(market = %market_id, %account, amount, total_reserves = outcome.total_reserves, "reserves added");
        self.emit_event(EventPayload::ReservesAdded(ReservesEvent {
            market_id,
            account_id: account,
            amount,
            total_reserves: outcome.total_reserves,
        }));
        Ok(outcome)
    }

    /// Brings one market's borrows, reserves and index up to the clock.
    pub fn accrue_interest(&mut self, market_id: MarketId) -> Result<Option<AccrualOutcome>, EngineError> {
        let now = self.now();
        let accrual = self.ledger_mut(market_id)?.accrue_interest(now)?;
        self.record_accrual(market_id, accrual);
        Ok(accrual)
    }

    /// Underlying the account could redeem, at the stored exchange rate.
    pub fn underlying_balance(&self, account: AccountId, market_id: MarketId) -> Result<u128, EngineError> {
        Ok(self.market_state(market_id)?.underlying_balance(account)?)
    }

    pub fn receipt_balance(&self, account: AccountId, market_id: MarketId) -> Result<u128, EngineError> {
        Ok(self.market_state(market_id)?.receipt_balance(account))
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testkit::{at, Harness, ALICE, BOB, UNI, USDC};
    use crate::engine::EngineError;
    use crate::hooks::RejectReason;
    use crate::events::EventPayload;
    use crate::math::WAD;
    use crate::types::Action;

    #[test]
    fn deposit_then_withdraw_returns_underlying() {
        let mut h = Harness::new();
        h.fund(UNI, ALICE, 100 * WAD);

        let minted = h.engine.deposit(ALICE, UNI, 100 * WAD).unwrap();
        assert_eq!(minted.receipt, 100 * WAD);

        let redeemed = h.engine.withdraw(ALICE, UNI, minted.receipt).unwrap();
        assert_eq!(redeemed.underlying, 100 * WAD);
        assert_eq!(h.balance(UNI, ALICE), 100 * WAD);
        assert_eq!(h.engine.receipt_balance(ALICE, UNI).unwrap(), 0);
    }

    #[test]
    fn deposit_into_unknown_market_is_rejected() {
        let mut h = Harness::new();
        let result = h.engine.deposit(ALICE, crate::types::MarketId(9), 1);
        assert_eq!(
            result.unwrap_err(),
            EngineError::ControllerRejected(RejectReason::MarketNotListed(crate::types::MarketId(9)))
        );

        let result = h.engine.withdraw(ALICE, crate::types::MarketId(9), 1);
        assert_eq!(
            result.unwrap_err(),
            EngineError::ControllerRejected(RejectReason::MarketNotListed(crate::types::MarketId(9)))
        );
    }

    #[test]
    fn paused_mint_is_rejected() {
        let mut h = Harness::new();
        h.fund(UNI, ALICE, 10);
        h.engine.set_market_paused(h.admin, UNI, Action::Mint, true).unwrap();

        let result = h.engine.deposit(ALICE, UNI, 10);
        assert!(matches!(result, Err(EngineError::ControllerRejected(_))));
        assert_eq!(h.balance(UNI, ALICE), 10);
    }

    #[test]
    fn collateral_withdrawal_blocked_by_shortfall_is_logged() {
        let mut h = Harness::new();
        h.supply_collateral(ALICE, UNI, 1_000 * WAD);
        h.seed_liquidity(BOB, USDC, 10_000 * WAD);
        h.engine.borrow(ALICE, USDC, 5_000 * WAD).unwrap();

        let result = h.engine.withdraw(ALICE, UNI, 1);
        assert!(matches!(result, Err(EngineError::InsufficientLiquidity { .. })));

        let last = h.engine.recent_events(1);
        assert!(matches!(&last[0].payload, EventPayload::OperationRejected(e) if e.operation == "withdraw"));
    }

    #[test]
    fn withdraw_underlying_burns_rounded_up() {
        let mut h = Harness::new();
        h.fund(UNI, ALICE, 300);
        h.engine.deposit(ALICE, UNI, 300).unwrap();
        // a reserve donation does not move the exchange rate
        h.fund(UNI, BOB, 150);
        h.engine.add_reserves(BOB, UNI, 150).unwrap();

        let redeemed = h.engine.withdraw_underlying(ALICE, UNI, 7).unwrap();
        assert_eq!(redeemed.underlying, 7);
        assert_eq!(redeemed.receipt, 7);
    }

    #[test]
    fn receipt_transfer_moves_units() {
        let mut h = Harness::new();
        h.fund(UNI, ALICE, 50);
        h.engine.deposit(ALICE, UNI, 50).unwrap();

        h.engine.transfer_receipt(ALICE, BOB, UNI, 20).unwrap();
        assert_eq!(h.engine.receipt_balance(ALICE, UNI).unwrap(), 30);
        assert_eq!(h.engine.receipt_balance(BOB, UNI).unwrap(), 20);
    }

    #[test]
    fn accrual_without_elapsed_time_is_a_no_op() {
        let mut h = Harness::new();
        assert!(h.engine.accrue_interest(UNI).unwrap().is_none());
        h.clock.set(at(60));
        assert!(h.engine.accrue_interest(UNI).unwrap().is_some());
        assert!(h.engine.accrue_interest(UNI).unwrap().is_none());
    }
}
