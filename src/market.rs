//! Market configuration, state and the per-pool ledger.
//!
//! A market is one pool of an underlying asset. Suppliers receive receipt units
//! priced by an exchange rate that grows as borrowers pay interest. Borrows are
//! stored as `{principal, index}` snapshots and resolved against the current borrow
//! index on demand, so accrual never touches per-account storage.
//!
//! Every entry point is a small transaction: the ledger accrues interest on a
//! clone of its state, asks the risk controller for permission, applies the
//! mutation to the clone, performs the one external transfer, and only then swaps
//! the clone in. Any failure before the swap leaves the live state untouched.

use crate::controller::ControllerError;
use crate::hooks::{
    AccountSnapshot, Authorization, AuthorizeRequest, MutationNotice, RejectReason, RiskGate,
    SeizeTicket,
};
use crate::math::{mul_div, resolve_borrow, MathError, Rounding, Wad};
use crate::rate_model::InterestRateModel;
use crate::token::{Holder, TransferError, UnderlyingToken};
use crate::types::{AccountId, MarketId, RepayAmount, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Accrual refuses to run above this borrow rate (0.0005% per second).
pub const MAX_BORROW_RATE_PER_SECOND: Wad = Wad::from_raw(5_000_000_000_000);

/// Static market configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub id: MarketId,
    /// Receipt token symbol (e.g., "cUNI")
    pub symbol: String,
    pub underlying_symbol: String,
    pub underlying_decimals: u32,
    /// Underlying raw units per receipt unit while the market has no supply
    pub initial_exchange_rate: Wad,
    /// Share of accrued interest kept as reserves
    pub reserve_factor: Wad,
}

impl MarketConfig {
    /// Receipt units carry 18 decimals, so the default initial rate is one whole
    /// underlying token per whole receipt token.
    pub fn new(id: MarketId, underlying_symbol: &str, underlying_decimals: u32) -> Self {
        Self {
            id,
            symbol: format!("c{underlying_symbol}"),
            underlying_symbol: underlying_symbol.to_string(),
            underlying_decimals,
            initial_exchange_rate: Wad::from_raw(10u128.pow(underlying_decimals.min(18))),
            reserve_factor: Wad::ZERO,
        }
    }

    pub fn uni() -> Self {
        Self::new(MarketId(1), "UNI", 18)
    }

    pub fn usdc() -> Self {
        Self::new(MarketId(2), "USDC", 6)
    }

    pub fn with_reserve_factor(mut self, reserve_factor: Wad) -> Self {
        self.reserve_factor = reserve_factor;
        self
    }

    pub fn with_initial_exchange_rate(mut self, rate: Wad) -> Self {
        self.initial_exchange_rate = rate;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowSnapshot {
    pub principal: u128,
    pub interest_index: Wad,
}

/// What one accrual step changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualOutcome {
    pub elapsed_secs: u64,
    pub borrow_rate: Wad,
    pub interest_accumulated: u128,
    pub borrow_index: Wad,
    pub total_borrows: u128,
    pub total_reserves: u128,
}

/// Mutable pool state. Everything a rollback has to restore lives here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    pub total_cash: u128,
    pub total_borrows: u128,
    pub total_reserves: u128,
    /// Receipt units outstanding
    pub total_supply: u128,
    pub borrow_index: Wad,
    pub accrual_timestamp: Timestamp,
    pub reserve_factor: Wad,
    pub initial_exchange_rate: Wad,
    pub receipt_balances: HashMap<AccountId, u128>,
    pub borrow_snapshots: HashMap<AccountId, BorrowSnapshot>,
}

impl MarketState {
    pub fn new(config: &MarketConfig, now: Timestamp) -> Self {
        Self {
            total_cash: 0,
            total_borrows: 0,
            total_reserves: 0,
            total_supply: 0,
            borrow_index: Wad::ONE,
            accrual_timestamp: now,
            reserve_factor: config.reserve_factor,
            initial_exchange_rate: config.initial_exchange_rate,
            receipt_balances: HashMap::new(),
            borrow_snapshots: HashMap::new(),
        }
    }

    /// `cash + borrows - reserves`: the underlying that backs the receipt supply.
    pub fn underlying_value(&self) -> Result<u128, MathError> {
        self.total_cash
            .checked_add(self.total_borrows)
            .ok_or(MathError::Overflow)?
            .checked_sub(self.total_reserves)
            .ok_or(MathError::Underflow)
    }

    pub fn exchange_rate(&self) -> Result<Wad, MathError> {
        if self.total_supply == 0 {
            return Ok(self.initial_exchange_rate);
        }
        Wad::from_ratio(self.underlying_value()?, self.total_supply)
    }

    pub fn receipt_balance(&self, account: AccountId) -> u128 {
        self.receipt_balances.get(&account).copied().unwrap_or(0)
    }

    pub fn borrow_balance(&self, account: AccountId) -> Result<u128, MathError> {
        match self.borrow_snapshots.get(&account) {
            Some(snapshot) => resolve_borrow(snapshot.principal, snapshot.interest_index, self.borrow_index),
            None => Ok(0),
        }
    }

    /// Underlying the account could redeem at the current exchange rate.
    pub fn underlying_balance(&self, account: AccountId) -> Result<u128, MathError> {
        self.underlying_for_receipt(self.receipt_balance(account))
    }

    pub fn snapshot(&self, account: AccountId) -> Result<AccountSnapshot, MathError> {
        Ok(AccountSnapshot {
            receipt_balance: self.receipt_balance(account),
            borrow_balance: self.borrow_balance(account)?,
            exchange_rate: self.exchange_rate()?,
        })
    }

    // conversions divide by the pool totals directly rather than by the rounded
    // exchange rate, so each one is a single rounding in the pool's favour

    fn receipt_for_deposit(&self, underlying: u128) -> Result<u128, MathError> {
        if self.total_supply == 0 {
            return self.initial_exchange_rate.divide_amount(underlying, Rounding::Down);
        }
        mul_div(underlying, self.total_supply, self.underlying_value()?, Rounding::Down)
    }

    fn underlying_for_receipt(&self, receipt: u128) -> Result<u128, MathError> {
        if self.total_supply == 0 {
            return self.initial_exchange_rate.mul_amount(receipt, Rounding::Down);
        }
        mul_div(receipt, self.underlying_value()?, self.total_supply, Rounding::Down)
    }

    fn receipt_to_burn_for(&self, underlying: u128) -> Result<u128, MathError> {
        if self.total_supply == 0 {
            return self.initial_exchange_rate.divide_amount(underlying, Rounding::Up);
        }
        mul_div(underlying, self.total_supply, self.underlying_value()?, Rounding::Up)
    }

    /// Brings borrows, reserves and the borrow index up to `now`. A second call at
    /// the same timestamp is a no-op and returns `None`.
    pub fn accrue(
        &mut self,
        model: &dyn InterestRateModel,
        now: Timestamp,
    ) -> Result<Option<AccrualOutcome>, LedgerError> {
        let elapsed = self.accrual_timestamp.elapsed_secs(&now);
        if elapsed == 0 {
            return Ok(None);
        }

        let borrow_rate = model.borrow_rate(self.total_cash, self.total_borrows, self.total_reserves)?;
        if borrow_rate > MAX_BORROW_RATE_PER_SECOND {
            return Err(LedgerError::BorrowRateTooHigh { rate: borrow_rate });
        }

        let interest_factor = borrow_rate.mul_scalar(elapsed as u128)?;
        let interest = interest_factor.mul_amount(self.total_borrows, Rounding::Down)?;
        let reserve_cut = self.reserve_factor.mul_amount(interest, Rounding::Down)?;

        self.total_borrows = self.total_borrows.checked_add(interest).ok_or(MathError::Overflow)?;
        self.total_reserves = self.total_reserves.checked_add(reserve_cut).ok_or(MathError::Overflow)?;
        self.borrow_index = interest_factor.mul(self.borrow_index)?.checked_add(self.borrow_index)?;
        self.accrual_timestamp = now;

        Ok(Some(AccrualOutcome {
            elapsed_secs: elapsed,
            borrow_rate,
            interest_accumulated: interest,
            borrow_index: self.borrow_index,
            total_borrows: self.total_borrows,
            total_reserves: self.total_reserves,
        }))
    }

    fn credit_receipt(&mut self, account: AccountId, amount: u128) -> Result<(), MathError> {
        let balance = self.receipt_balances.entry(account).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(MathError::Overflow)?;
        Ok(())
    }

    fn debit_receipt(&mut self, account: AccountId, amount: u128) -> Result<(), LedgerError> {
        let available = self.receipt_balance(account);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        self.receipt_balances.insert(account, available - amount);
        Ok(())
    }

    fn apply_mint(&mut self, minter: AccountId, underlying: u128) -> Result<u128, LedgerError> {
        let minted = self.receipt_for_deposit(underlying)?;
        if minted == 0 {
            return Err(LedgerError::InvalidAmount("deposit too small to mint a receipt unit"));
        }
        self.total_cash = self.total_cash.checked_add(underlying).ok_or(MathError::Overflow)?;
        self.total_supply = self.total_supply.checked_add(minted).ok_or(MathError::Overflow)?;
        self.credit_receipt(minter, minted)?;
        Ok(minted)
    }

    fn apply_redeem(&mut self, redeemer: AccountId, receipt: u128, underlying: u128) -> Result<(), LedgerError> {
        self.debit_receipt(redeemer, receipt)?;
        if self.total_cash < underlying {
            return Err(LedgerError::InsufficientCash {
                requested: underlying,
                available: self.total_cash,
            });
        }
        self.total_cash -= underlying;
        self.total_supply = self.total_supply.checked_sub(receipt).ok_or(MathError::Underflow)?;
        Ok(())
    }

    fn apply_borrow(&mut self, borrower: AccountId, amount: u128) -> Result<u128, LedgerError> {
        if self.total_cash < amount {
            return Err(LedgerError::InsufficientCash {
                requested: amount,
                available: self.total_cash,
            });
        }
        let account_borrows = self
            .borrow_balance(borrower)?
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        self.borrow_snapshots.insert(
            borrower,
            BorrowSnapshot {
                principal: account_borrows,
                interest_index: self.borrow_index,
            },
        );
        self.total_borrows = self.total_borrows.checked_add(amount).ok_or(MathError::Overflow)?;
        self.total_cash -= amount;
        Ok(account_borrows)
    }

    /// Returns `(amount actually repaid, borrow left)`.
    fn apply_repay(&mut self, borrower: AccountId, amount: RepayAmount) -> Result<(u128, u128), LedgerError> {
        let owed = self.borrow_balance(borrower)?;
        let repaid = match amount {
            RepayAmount::Full => owed,
            RepayAmount::Exact(requested) => requested.min(owed),
        };
        if repaid == 0 {
            return Err(LedgerError::InvalidAmount("nothing to repay"));
        }

        let remaining = owed - repaid;
        if remaining == 0 {
            self.borrow_snapshots.remove(&borrower);
        } else {
            self.borrow_snapshots.insert(
                borrower,
                BorrowSnapshot {
                    principal: remaining,
                    interest_index: self.borrow_index,
                },
            );
        }
        // resolved debts round up, so the sum of accounts can exceed the total by dust
        self.total_borrows = self.total_borrows.saturating_sub(repaid);
        self.total_cash = self.total_cash.checked_add(repaid).ok_or(MathError::Overflow)?;
        Ok((repaid, remaining))
    }

    fn apply_receipt_transfer(&mut self, from: AccountId, to: AccountId, amount: u128) -> Result<(), LedgerError> {
        self.debit_receipt(from, amount)?;
        self.credit_receipt(to, amount)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(&'static str),

    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: &'static str },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    #[error("insufficient cash: requested {requested}, available {available}")]
    InsufficientCash { requested: u128, available: u128 },

    #[error("insufficient liquidity: would leave a shortfall of {shortfall}")]
    InsufficientLiquidity { shortfall: u128 },

    #[error("rejected by risk controller: {0}")]
    Rejected(RejectReason),

    #[error("risk controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("underlying transfer failed: {0}")]
    TransferFailed(TransferError),

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("borrow rate {rate} per second is above the cap")]
    BorrowRateTooHigh { rate: Wad },

    #[error(transparent)]
    Math(#[from] MathError),
}

/// How much to withdraw: by receipt units or by underlying units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawAmount {
    Receipt(u128),
    Underlying(u128),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintOutcome {
    pub underlying: u128,
    pub receipt: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemOutcome {
    pub underlying: u128,
    pub receipt: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowOutcome {
    pub amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepayOutcome {
    pub amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptMoved {
    pub receipt: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservesChanged {
    pub amount: u128,
    pub total_reserves: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingTransfer {
    In { from: AccountId, amount: u128 },
    Out { to: AccountId, amount: u128 },
}

/// A mutation that has been validated and applied to a staged copy of the state
/// but not yet committed. Dropping it discards the mutation.
#[derive(Debug)]
#[must_use = "a prepared mutation does nothing until committed"]
pub struct Prepared<T> {
    state: MarketState,
    transfer: Option<PendingTransfer>,
    notices: Vec<MutationNotice>,
    accrual: Option<AccrualOutcome>,
    outcome: T,
}

impl<T> Prepared<T> {
    pub fn outcome(&self) -> &T {
        &self.outcome
    }

    pub fn staged_state(&self) -> &MarketState {
        &self.state
    }
}

/// A committed mutation.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub outcome: T,
    pub accrual: Option<AccrualOutcome>,
    pub notices: Vec<MutationNotice>,
}

/// One pool: its state, its underlying token and its rate model.
#[derive(Debug)]
pub struct MarketLedger {
    config: MarketConfig,
    state: MarketState,
    token: Box<dyn UnderlyingToken>,
    rate_model: Arc<dyn InterestRateModel>,
}

impl MarketLedger {
    pub fn new(
        config: MarketConfig,
        token: Box<dyn UnderlyingToken>,
        rate_model: Arc<dyn InterestRateModel>,
        now: Timestamp,
    ) -> Self {
        let state = MarketState::new(&config, now);
        Self {
            config,
            state,
            token,
            rate_model,
        }
    }

    pub fn id(&self) -> MarketId {
        self.config.id
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn state(&self) -> &MarketState {
        &self.state
    }

    pub fn token(&self) -> &dyn UnderlyingToken {
        self.token.as_ref()
    }

    pub fn rate_model(&self) -> &Arc<dyn InterestRateModel> {
        &self.rate_model
    }

    fn pool(&self) -> Holder {
        Holder::Pool(self.config.id)
    }

    /// Exchange rate as of the last accrual.
    pub fn exchange_rate(&self) -> Result<Wad, LedgerError> {
        Ok(self.state.exchange_rate()?)
    }

    pub fn snapshot(&self, account: AccountId) -> Result<AccountSnapshot, LedgerError> {
        Ok(self.state.snapshot(account)?)
    }

    pub fn borrow_rate_per_second(&self) -> Result<Wad, LedgerError> {
        let s = &self.state;
        Ok(self.rate_model.borrow_rate(s.total_cash, s.total_borrows, s.total_reserves)?)
    }

    pub fn supply_rate_per_second(&self) -> Result<Wad, LedgerError> {
        let s = &self.state;
        Ok(self
            .rate_model
            .supply_rate(s.total_cash, s.total_borrows, s.total_reserves, s.reserve_factor)?)
    }

    /// State as it would be after accruing to `now`, without committing anything.
    pub fn preview(&self, now: Timestamp) -> Result<MarketState, LedgerError> {
        Ok(self.accrued(now)?.0)
    }

    fn accrued(&self, now: Timestamp) -> Result<(MarketState, Option<AccrualOutcome>), LedgerError> {
        let mut state = self.state.clone();
        let accrual = state.accrue(self.rate_model.as_ref(), now)?;
        if let Some(outcome) = &accrual {
            tracing::debug!(
                market = %self.config.id,
                elapsed = outcome.elapsed_secs,
                interest = outcome.interest_accumulated,
                index = %outcome.borrow_index,
                "interest accrued"
            );
        }
        Ok((state, accrual))
    }

    pub fn accrue_interest(&mut self, now: Timestamp) -> Result<Option<AccrualOutcome>, LedgerError> {
        let (state, accrual) = self.accrued(now)?;
        self.state = state;
        Ok(accrual)
    }

    fn require(gate: &dyn RiskGate, request: &AuthorizeRequest) -> Result<(), LedgerError> {
        match gate.authorize(request)? {
            Authorization::Allowed => Ok(()),
            Authorization::Denied(RejectReason::InsufficientLiquidity { shortfall }) => {
                Err(LedgerError::InsufficientLiquidity { shortfall })
            }
            Authorization::Denied(reason) => Err(LedgerError::Rejected(reason)),
        }
    }

    pub fn prepare_deposit(
        &self,
        gate: &dyn RiskGate,
        minter: AccountId,
        amount: u128,
        now: Timestamp,
    ) -> Result<Prepared<MintOutcome>, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("deposit amount must be positive"));
        }
        let (mut state, accrual) = self.accrued(now)?;
        Self::require(
            gate,
            &AuthorizeRequest::Mint {
                market: self.id(),
                minter,
                amount,
            },
        )?;

        let receipt = state.apply_mint(minter, amount)?;
        Ok(Prepared {
            state,
            transfer: Some(PendingTransfer::In { from: minter, amount }),
            notices: vec![MutationNotice::Minted {
                market: self.id(),
                minter,
                amount,
                receipt_minted: receipt,
            }],
            accrual,
            outcome: MintOutcome {
                underlying: amount,
                receipt,
            },
        })
    }

    pub fn prepare_withdraw(
        &self,
        gate: &dyn RiskGate,
        redeemer: AccountId,
        amount: WithdrawAmount,
        now: Timestamp,
    ) -> Result<Prepared<RedeemOutcome>, LedgerError> {
        let (mut state, accrual) = self.accrued(now)?;
        let (receipt, underlying) = match amount {
            WithdrawAmount::Receipt(receipt) => (receipt, state.underlying_for_receipt(receipt)?),
            WithdrawAmount::Underlying(underlying) => (state.receipt_to_burn_for(underlying)?, underlying),
        };
        if receipt == 0 || underlying == 0 {
            return Err(LedgerError::InvalidAmount("withdrawal must redeem a positive amount"));
        }

        let available = state.receipt_balance(redeemer);
        if available < receipt {
            return Err(LedgerError::InsufficientBalance {
                requested: receipt,
                available,
            });
        }
        if state.total_cash < underlying {
            return Err(LedgerError::InsufficientCash {
                requested: underlying,
                available: state.total_cash,
            });
        }

        Self::require(
            gate,
            &AuthorizeRequest::Redeem {
                market: self.id(),
                redeemer,
                receipt_amount: receipt,
                position: state.snapshot(redeemer)?,
            },
        )?;

        state.apply_redeem(redeemer, receipt, underlying)?;
        Ok(Prepared {
            state,
            transfer: Some(PendingTransfer::Out {
                to: redeemer,
                amount: underlying,
            }),
            notices: vec![MutationNotice::Redeemed {
                market: self.id(),
                redeemer,
                underlying,
                receipt_burned: receipt,
            }],
            accrual,
            outcome: RedeemOutcome { underlying, receipt },
        })
    }

    pub fn prepare_borrow(
        &self,
        gate: &dyn RiskGate,
        borrower: AccountId,
        amount: u128,
        now: Timestamp,
    ) -> Result<Prepared<BorrowOutcome>, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("borrow amount must be positive"));
        }
        let (mut state, accrual) = self.accrued(now)?;
        Self::require(
            gate,
            &AuthorizeRequest::Borrow {
                market: self.id(),
                borrower,
                amount,
                position: state.snapshot(borrower)?,
                total_borrows: state.total_borrows,
            },
        )?;

        let account_borrows = state.apply_borrow(borrower, amount)?;
        let total_borrows = state.total_borrows;
        Ok(Prepared {
            state,
            transfer: Some(PendingTransfer::Out { to: borrower, amount }),
            notices: vec![MutationNotice::Borrowed {
                market: self.id(),
                borrower,
                amount,
                account_borrows,
            }],
            accrual,
            outcome: BorrowOutcome {
                amount,
                account_borrows,
                total_borrows,
            },
        })
    }

    pub fn prepare_repay(
        &self,
        gate: &dyn RiskGate,
        payer: AccountId,
        borrower: AccountId,
        amount: RepayAmount,
        now: Timestamp,
    ) -> Result<Prepared<RepayOutcome>, LedgerError> {
        if amount == RepayAmount::Exact(0) {
            return Err(LedgerError::InvalidAmount("repay amount must be positive"));
        }
        let (mut state, accrual) = self.accrued(now)?;
        let owed = state.borrow_balance(borrower)?;
        let requested = match amount {
            RepayAmount::Full => owed,
            RepayAmount::Exact(requested) => requested.min(owed),
        };
        Self::require(
            gate,
            &AuthorizeRequest::Repay {
                market: self.id(),
                payer,
                borrower,
                amount: requested,
            },
        )?;

        let (repaid, account_borrows) = state.apply_repay(borrower, amount)?;
        let total_borrows = state.total_borrows;
        Ok(Prepared {
            state,
            transfer: Some(PendingTransfer::In {
                from: payer,
                amount: repaid,
            }),
            notices: vec![MutationNotice::Repaid {
                market: self.id(),
                payer,
                borrower,
                amount: repaid,
                account_borrows,
            }],
            accrual,
            outcome: RepayOutcome {
                amount: repaid,
                account_borrows,
                total_borrows,
            },
        })
    }

    /// Moves receipt units from `borrower` to `liquidator`. Only reachable with a
    /// ticket the controller issued for exactly these parties and amount.
    pub fn prepare_seize(
        &self,
        gate: &dyn RiskGate,
        ticket: &SeizeTicket,
        liquidator: AccountId,
        borrower: AccountId,
        receipt_amount: u128,
        now: Timestamp,
    ) -> Result<Prepared<ReceiptMoved>, LedgerError> {
        let (mut state, accrual) = self.accrued(now)?;
        let notice = self.stage_seize(&mut state, gate, ticket, liquidator, borrower, receipt_amount)?;
        Ok(Prepared {
            state,
            transfer: None,
            notices: vec![notice],
            accrual,
            outcome: ReceiptMoved {
                receipt: receipt_amount,
            },
        })
    }

    /// Seize staged on top of another prepared mutation of this same market, for
    /// liquidations that repay and seize in one pool. Both commit together.
    pub fn prepare_seize_after<T>(
        &self,
        prior: Prepared<T>,
        gate: &dyn RiskGate,
        ticket: &SeizeTicket,
        liquidator: AccountId,
        borrower: AccountId,
        receipt_amount: u128,
    ) -> Result<Prepared<(T, ReceiptMoved)>, LedgerError> {
        let mut prior = prior;
        let notice = self.stage_seize(&mut prior.state, gate, ticket, liquidator, borrower, receipt_amount)?;
        prior.notices.push(notice);
        Ok(Prepared {
            state: prior.state,
            transfer: prior.transfer,
            notices: prior.notices,
            accrual: prior.accrual,
            outcome: (
                prior.outcome,
                ReceiptMoved {
                    receipt: receipt_amount,
                },
            ),
        })
    }

    fn stage_seize(
        &self,
        state: &mut MarketState,
        gate: &dyn RiskGate,
        ticket: &SeizeTicket,
        liquidator: AccountId,
        borrower: AccountId,
        receipt_amount: u128,
    ) -> Result<MutationNotice, LedgerError> {
        if ticket.collateral_market != self.id()
            || ticket.liquidator != liquidator
            || ticket.borrower != borrower
            || ticket.receipt_amount != receipt_amount
        {
            return Err(LedgerError::Unauthorized("seize ticket does not match the request"));
        }
        if liquidator == borrower {
            return Err(LedgerError::Unauthorized("liquidator cannot seize from itself"));
        }

        Self::require(
            gate,
            &AuthorizeRequest::Seize {
                collateral_market: self.id(),
                borrowed_market: ticket.borrowed_market,
                liquidator,
                borrower,
                receipt_amount,
            },
        )?;
        state.apply_receipt_transfer(borrower, liquidator, receipt_amount)?;
        Ok(MutationNotice::Seized {
            market: self.id(),
            liquidator,
            borrower,
            receipt_amount,
        })
    }

    pub fn prepare_transfer(
        &self,
        gate: &dyn RiskGate,
        from: AccountId,
        to: AccountId,
        receipt_amount: u128,
        now: Timestamp,
    ) -> Result<Prepared<ReceiptMoved>, LedgerError> {
        if receipt_amount == 0 {
            return Err(LedgerError::InvalidAmount("transfer amount must be positive"));
        }
        if from == to {
            return Err(LedgerError::InvalidAmount("cannot transfer to self"));
        }
        let (mut state, accrual) = self.accrued(now)?;
        let available = state.receipt_balance(from);
        if available < receipt_amount {
            return Err(LedgerError::InsufficientBalance {
                requested: receipt_amount,
                available,
            });
        }
        Self::require(
            gate,
            &AuthorizeRequest::Transfer {
                market: self.id(),
                from,
                to,
                receipt_amount,
                position: state.snapshot(from)?,
            },
        )?;

        state.apply_receipt_transfer(from, to, receipt_amount)?;
        Ok(Prepared {
            state,
            transfer: None,
            notices: vec![MutationNotice::Transferred {
                market: self.id(),
                from,
                to,
                receipt_amount,
            }],
            accrual,
            outcome: ReceiptMoved {
                receipt: receipt_amount,
            },
        })
    }

    pub fn prepare_add_reserves(
        &self,
        from: AccountId,
        amount: u128,
        now: Timestamp,
    ) -> Result<Prepared<ReservesChanged>, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("reserve amount must be positive"));
        }
        let (mut state, accrual) = self.accrued(now)?;
        state.total_cash = state.total_cash.checked_add(amount).ok_or(MathError::Overflow)?;
        state.total_reserves = state.total_reserves.checked_add(amount).ok_or(MathError::Overflow)?;
        let total_reserves = state.total_reserves;
        Ok(Prepared {
            state,
            transfer: Some(PendingTransfer::In { from, amount }),
            notices: Vec::new(),
            accrual,
            outcome: ReservesChanged {
                amount,
                total_reserves,
            },
        })
    }

    pub fn prepare_reduce_reserves(
        &self,
        to: AccountId,
        amount: u128,
        now: Timestamp,
    ) -> Result<Prepared<ReservesChanged>, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("reserve amount must be positive"));
        }
        let (mut state, accrual) = self.accrued(now)?;
        if amount > state.total_reserves {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: state.total_reserves,
            });
        }
        if amount > state.total_cash {
            return Err(LedgerError::InsufficientCash {
                requested: amount,
                available: state.total_cash,
            });
        }
        state.total_reserves -= amount;
        state.total_cash -= amount;
        let total_reserves = state.total_reserves;
        Ok(Prepared {
            state,
            transfer: Some(PendingTransfer::Out { to, amount }),
            notices: Vec::new(),
            accrual,
            outcome: ReservesChanged {
                amount,
                total_reserves,
            },
        })
    }

    /// Performs the pending transfer, then swaps in the staged state. A failed
    /// transfer leaves the ledger exactly as it was.
    pub fn commit<T>(&mut self, prepared: Prepared<T>) -> Result<Committed<T>, LedgerError> {
        let pool = self.pool();
        match prepared.transfer {
            Some(PendingTransfer::In { from, amount }) if amount > 0 => self
                .token
                .transfer_from(pool, Holder::Account(from), pool, amount)
                .map_err(LedgerError::TransferFailed)?,
            Some(PendingTransfer::Out { to, amount }) if amount > 0 => self
                .token
                .transfer(pool, Holder::Account(to), amount)
                .map_err(LedgerError::TransferFailed)?,
            _ => {}
        }
        self.state = prepared.state;
        Ok(Committed {
            outcome: prepared.outcome,
            accrual: prepared.accrual,
            notices: prepared.notices,
        })
    }

    fn commit_and_notify<T>(
        &mut self,
        prepared: Prepared<T>,
        gate: &mut dyn RiskGate,
    ) -> Result<Committed<T>, LedgerError> {
        let committed = self.commit(prepared)?;
        for notice in &committed.notices {
            gate.mutation_completed(notice);
        }
        Ok(committed)
    }

    pub fn deposit(
        &mut self,
        gate: &mut dyn RiskGate,
        minter: AccountId,
        amount: u128,
        now: Timestamp,
    ) -> Result<Committed<MintOutcome>, LedgerError> {
        let prepared = self.prepare_deposit(&*gate, minter, amount, now)?;
        self.commit_and_notify(prepared, gate)
    }

    pub fn withdraw(
        &mut self,
        gate: &mut dyn RiskGate,
        redeemer: AccountId,
        amount: WithdrawAmount,
        now: Timestamp,
    ) -> Result<Committed<RedeemOutcome>, LedgerError> {
        let prepared = self.prepare_withdraw(&*gate, redeemer, amount, now)?;
        self.commit_and_notify(prepared, gate)
    }

    pub fn borrow(
        &mut self,
        gate: &mut dyn RiskGate,
        borrower: AccountId,
        amount: u128,
        now: Timestamp,
    ) -> Result<Committed<BorrowOutcome>, LedgerError> {
        let prepared = self.prepare_borrow(&*gate, borrower, amount, now)?;
        self.commit_and_notify(prepared, gate)
    }

    pub fn repay(
        &mut self,
        gate: &mut dyn RiskGate,
        payer: AccountId,
        borrower: AccountId,
        amount: RepayAmount,
        now: Timestamp,
    ) -> Result<Committed<RepayOutcome>, LedgerError> {
        let prepared = self.prepare_repay(&*gate, payer, borrower, amount, now)?;
        self.commit_and_notify(prepared, gate)
    }

    pub fn seize(
        &mut self,
        gate: &mut dyn RiskGate,
        ticket: &SeizeTicket,
        liquidator: AccountId,
        borrower: AccountId,
        receipt_amount: u128,
        now: Timestamp,
    ) -> Result<Committed<ReceiptMoved>, LedgerError> {
        let prepared = self.prepare_seize(&*gate, ticket, liquidator, borrower, receipt_amount, now)?;
        self.commit_and_notify(prepared, gate)
    }

    pub fn transfer_receipt(
        &mut self,
        gate: &mut dyn RiskGate,
        from: AccountId,
        to: AccountId,
        receipt_amount: u128,
        now: Timestamp,
    ) -> Result<Committed<ReceiptMoved>, LedgerError> {
        let prepared = self.prepare_transfer(&*gate, from, to, receipt_amount, now)?;
        self.commit_and_notify(prepared, gate)
    }

    /// Accrues under the current parameters, then applies the new reserve factor.
    pub fn set_reserve_factor(
        &mut self,
        reserve_factor: Wad,
        now: Timestamp,
    ) -> Result<(Wad, Option<AccrualOutcome>), LedgerError> {
        if reserve_factor > Wad::ONE {
            return Err(LedgerError::InvalidParameter {
                name: "reserve_factor",
                reason: "must not exceed 1",
            });
        }
        let (mut state, accrual) = self.accrued(now)?;
        let old = state.reserve_factor;
        state.reserve_factor = reserve_factor;
        self.state = state;
        Ok((old, accrual))
    }

    /// Accrues under the old model, then swaps in the new one.
    pub fn set_rate_model(
        &mut self,
        rate_model: Arc<dyn InterestRateModel>,
        now: Timestamp,
    ) -> Result<Option<AccrualOutcome>, LedgerError> {
        let (state, accrual) = self.accrued(now)?;
        self.state = state;
        self.rate_model = rate_model;
        Ok(accrual)
    }
}
