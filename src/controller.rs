//! Cross-market risk controller.
//!
//! The controller owns everything that spans markets: which markets are listed,
//! which markets each account uses as collateral, the risk parameters and the
//! price oracle. It never reads ledger state directly. Positions reach it either
//! inside an [`AuthorizeRequest`] or as a [`PositionBook`] the engine assembles
//! from the ledgers before a call.

use crate::hooks::{
    AccountSnapshot, Authorization, AuthorizeRequest, MutationNotice, RejectReason, RiskGate,
    SeizeTicket,
};
use crate::liquidation::{self, RiskStatus};
use crate::math::{MathError, Rounding, Wad};
use crate::price_feed::PriceOracle;
use crate::types::{AccountId, Action, MarketId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Per-market positions of one account, keyed by market.
pub type PositionBook = BTreeMap<MarketId, AccountSnapshot>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("rejected: {0}")]
    Rejected(RejectReason),

    #[error("{0} is already listed")]
    MarketAlreadyListed(MarketId),

    #[error("no price available for {0}")]
    PriceUnavailable(MarketId),

    #[error("insufficient liquidity: shortfall {shortfall}")]
    InsufficientLiquidity { shortfall: u128 },

    #[error("{0} is not the admin")]
    Unauthorized(AccountId),

    #[error("{reason}")]
    SelfLiquidation { reason: &'static str },

    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: &'static str },

    #[error("{borrower} has no shortfall")]
    InsolvencyNotDetected { borrower: AccountId },

    #[error("repay {requested} exceeds close factor limit {max}")]
    RepayTooLarge { requested: u128, max: u128 },

    #[error("invalid amount: {0}")]
    InvalidAmount(&'static str),

    #[error(transparent)]
    Math(#[from] MathError),
}

/// Global risk parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Fraction of one borrow repayable per liquidation, in (0, 1]
    pub close_factor: Wad,
    /// Collateral premium paid to liquidators, >= 1
    pub liquidation_incentive: Wad,
    /// Membership limit per account
    pub max_assets: usize,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            close_factor: Wad::from_raw(500_000_000_000_000_000),
            liquidation_incentive: Wad::from_raw(1_080_000_000_000_000_000),
            max_assets: 20,
        }
    }
}

impl RiskParams {
    pub fn validate(&self) -> Result<(), ControllerError> {
        validate_close_factor(self.close_factor)?;
        validate_incentive(self.liquidation_incentive)?;
        if self.max_assets == 0 {
            return Err(ControllerError::InvalidParameter {
                name: "max_assets",
                reason: "must allow at least one market",
            });
        }
        Ok(())
    }
}

fn validate_close_factor(close_factor: Wad) -> Result<(), ControllerError> {
    if close_factor.is_zero() || close_factor > Wad::ONE {
        return Err(ControllerError::InvalidParameter {
            name: "close_factor",
            reason: "must be in (0, 1]",
        });
    }
    Ok(())
}

fn validate_incentive(incentive: Wad) -> Result<(), ControllerError> {
    if incentive < Wad::ONE {
        return Err(ControllerError::InvalidParameter {
            name: "liquidation_incentive",
            reason: "must be at least 1",
        });
    }
    Ok(())
}

/// Per-market risk settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarketRisk {
    pub collateral_factor: Wad,
    /// 0 means no cap
    pub borrow_cap: u128,
    pub mint_paused: bool,
    pub borrow_paused: bool,
}

/// Before/after pair returned by every parameter change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChange<T> {
    pub old: T,
    pub new: T,
}

impl<T> ParamChange<T> {
    fn new(old: T, new: T) -> Self {
        Self { old, new }
    }
}

/// Aggregate position of an account. At most one field is nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountLiquidity {
    pub liquidity: u128,
    pub shortfall: u128,
}

impl AccountLiquidity {
    fn from_totals(collateral: u128, debt: u128) -> Self {
        if collateral >= debt {
            Self {
                liquidity: collateral - debt,
                shortfall: 0,
            }
        } else {
            Self {
                liquidity: 0,
                shortfall: debt - collateral,
            }
        }
    }

    pub fn status(&self) -> RiskStatus {
        if self.shortfall > 0 {
            RiskStatus::Shortfall
        } else {
            RiskStatus::Healthy
        }
    }
}

/// A hypothetical change layered on top of the book: redeem receipt units and/or
/// borrow underlying in one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HypotheticalChange {
    pub market: MarketId,
    pub redeem_receipt: u128,
    pub borrow_amount: u128,
}

impl HypotheticalChange {
    pub fn redeem(market: MarketId, receipt: u128) -> Self {
        Self {
            market,
            redeem_receipt: receipt,
            borrow_amount: 0,
        }
    }

    pub fn borrow(market: MarketId, amount: u128) -> Self {
        Self {
            market,
            redeem_receipt: 0,
            borrow_amount: amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationRequest {
    pub liquidator: AccountId,
    pub borrower: AccountId,
    pub borrowed_market: MarketId,
    pub collateral_market: MarketId,
    pub repay_amount: u128,
}

#[derive(Debug, Clone)]
pub struct RiskController {
    admin: AccountId,
    params: RiskParams,
    markets: BTreeMap<MarketId, MarketRisk>,
    membership: HashMap<AccountId, Vec<MarketId>>,
    // markets where the account has a nonzero borrow, fed by mutation notices
    debt_markets: HashMap<AccountId, BTreeSet<MarketId>>,
    oracle: Arc<dyn PriceOracle>,
    seize_paused: bool,
    transfer_paused: bool,
}

impl RiskController {
    pub fn new(
        admin: AccountId,
        params: RiskParams,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<Self, ControllerError> {
        params.validate()?;
        Ok(Self {
            admin,
            params,
            markets: BTreeMap::new(),
            membership: HashMap::new(),
            debt_markets: HashMap::new(),
            oracle,
            seize_paused: false,
            transfer_paused: false,
        })
    }

    pub fn admin(&self) -> AccountId {
        self.admin
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn oracle(&self) -> &Arc<dyn PriceOracle> {
        &self.oracle
    }

    pub fn market_risk(&self, market: MarketId) -> Option<&MarketRisk> {
        self.markets.get(&market)
    }

    pub fn is_listed(&self, market: MarketId) -> bool {
        self.markets.contains_key(&market)
    }

    pub fn listed_markets(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.markets.keys().copied()
    }

    pub fn seize_paused(&self) -> bool {
        self.seize_paused
    }

    pub fn transfer_paused(&self) -> bool {
        self.transfer_paused
    }

    /// Markets the account has entered, in entry order.
    pub fn assets_in(&self, account: AccountId) -> &[MarketId] {
        self.membership.get(&account).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_member(&self, account: AccountId, market: MarketId) -> bool {
        self.assets_in(account).contains(&market)
    }

    pub fn borrowed_markets(&self, account: AccountId) -> impl Iterator<Item = MarketId> + '_ {
        self.debt_markets.get(&account).into_iter().flatten().copied()
    }

    /// Every market whose position matters for the account's liquidity.
    pub fn markets_for(&self, account: AccountId) -> BTreeSet<MarketId> {
        self.assets_in(account)
            .iter()
            .copied()
            .chain(self.borrowed_markets(account))
            .collect()
    }

    fn price(&self, market: MarketId) -> Result<Wad, ControllerError> {
        self.oracle
            .underlying_price(market)
            .filter(|price| !price.is_zero())
            .ok_or(ControllerError::PriceUnavailable(market))
    }

    fn ensure_listed(&self, market: MarketId) -> Result<&MarketRisk, ControllerError> {
        self.markets
            .get(&market)
            .ok_or(ControllerError::Rejected(RejectReason::MarketNotListed(market)))
    }

    fn ensure_admin(&self, caller: AccountId) -> Result<(), ControllerError> {
        if caller != self.admin {
            return Err(ControllerError::Unauthorized(caller));
        }
        Ok(())
    }

    // --- liquidity -------------------------------------------------------

    pub fn account_liquidity(
        &self,
        account: AccountId,
        book: &PositionBook,
    ) -> Result<AccountLiquidity, ControllerError> {
        self.hypothetical_liquidity(account, book, None)
    }

    /// Collateral from member markets against debt from every market the book
    /// shows a borrow in, with an optional change applied on top. Prices are read
    /// fresh on every call.
    pub fn hypothetical_liquidity(
        &self,
        account: AccountId,
        book: &PositionBook,
        change: Option<HypotheticalChange>,
    ) -> Result<AccountLiquidity, ControllerError> {
        let members = self.assets_in(account);
        let mut markets: BTreeSet<MarketId> = members.iter().copied().collect();
        markets.extend(
            book.iter()
                .filter(|(_, snapshot)| snapshot.borrow_balance > 0)
                .map(|(market, _)| *market),
        );
        if let Some(change) = change {
            markets.insert(change.market);
        }

        let mut collateral: u128 = 0;
        let mut debt: u128 = 0;

        for market in markets {
            let snapshot = book.get(&market).copied().unwrap_or_default();
            let is_member = members.contains(&market);
            let applied = change.filter(|c| c.market == market);

            let counts_as_collateral = is_member && snapshot.receipt_balance > 0;
            let has_debt = snapshot.borrow_balance > 0;
            if !counts_as_collateral && !has_debt && applied.is_none() {
                continue;
            }

            let risk = self.ensure_listed(market)?;
            let price = self.price(market)?;
            // value of one receipt unit, risk weighted
            let tokens_to_denom = risk
                .collateral_factor
                .mul(snapshot.exchange_rate)?
                .mul(price)?;

            let redeemed = applied.map(|c| c.redeem_receipt).unwrap_or(0);
            let mut owed = price.mul_amount(snapshot.borrow_balance, Rounding::Up)?;

            if is_member {
                // the balance left after the redeem is floored once, so a full
                // redeem removes exactly what the balance contributed
                let kept = snapshot.receipt_balance.saturating_sub(redeemed);
                let value = tokens_to_denom.mul_amount(kept, Rounding::Down)?;
                collateral = collateral.checked_add(value).ok_or(MathError::Overflow)?;

                let overdrawn = redeemed.saturating_sub(snapshot.receipt_balance);
                owed = owed
                    .checked_add(tokens_to_denom.mul_amount(overdrawn, Rounding::Up)?)
                    .ok_or(MathError::Overflow)?;
            }

            if let Some(change) = applied {
                owed = owed
                    .checked_add(price.mul_amount(change.borrow_amount, Rounding::Up)?)
                    .ok_or(MathError::Overflow)?;
            }
            debt = debt.checked_add(owed).ok_or(MathError::Overflow)?;
        }

        Ok(AccountLiquidity::from_totals(collateral, debt))
    }

    // --- authorization ---------------------------------------------------

    /// Answers a ledger's pre-mutation request. The request's own position
    /// replaces the book entry for its market, since the ledger accrued it last.
    pub fn authorize(
        &self,
        request: &AuthorizeRequest,
        book: &PositionBook,
    ) -> Result<Authorization, ControllerError> {
        let decision = self.decide(request, book)?;
        if let Authorization::Denied(reason) = &decision {
            tracing::debug!(kind = request.kind(), market = %request.market(), %reason, "controller denied");
        }
        Ok(decision)
    }

    fn decide(&self, request: &AuthorizeRequest, book: &PositionBook) -> Result<Authorization, ControllerError> {
        let market = request.market();
        let Some(risk) = self.markets.get(&market) else {
            return Ok(Authorization::Denied(RejectReason::MarketNotListed(market)));
        };

        match *request {
            AuthorizeRequest::Mint { .. } => {
                if risk.mint_paused {
                    return Ok(paused(Some(market), Action::Mint));
                }
                Ok(Authorization::Allowed)
            }
            AuthorizeRequest::Repay { .. } => Ok(Authorization::Allowed),
            AuthorizeRequest::Redeem {
                redeemer,
                receipt_amount,
                position,
                ..
            } => self.redeem_allowed(redeemer, market, receipt_amount, position, book),
            AuthorizeRequest::Transfer {
                from,
                receipt_amount,
                position,
                ..
            } => {
                if self.transfer_paused {
                    return Ok(paused(None, Action::Transfer));
                }
                self.redeem_allowed(from, market, receipt_amount, position, book)
            }
            AuthorizeRequest::Borrow {
                borrower,
                amount,
                position,
                total_borrows,
                ..
            } => {
                if risk.borrow_paused {
                    return Ok(paused(Some(market), Action::Borrow));
                }
                self.price(market)?;
                if risk.borrow_cap != 0 {
                    let next_total_borrows = total_borrows.checked_add(amount).ok_or(MathError::Overflow)?;
                    if next_total_borrows > risk.borrow_cap {
                        return Ok(Authorization::Denied(RejectReason::BorrowCapReached {
                            cap: risk.borrow_cap,
                            next_total_borrows,
                        }));
                    }
                }
                let book = with_position(book, market, position);
                let outcome =
                    self.hypothetical_liquidity(borrower, &book, Some(HypotheticalChange::borrow(market, amount)))?;
                Ok(liquidity_decision(outcome))
            }
            AuthorizeRequest::Seize {
                borrowed_market, ..
            } => {
                if self.seize_paused {
                    return Ok(paused(None, Action::Seize));
                }
                if !self.is_listed(borrowed_market) {
                    return Ok(Authorization::Denied(RejectReason::MarketNotListed(borrowed_market)));
                }
                Ok(Authorization::Allowed)
            }
        }
    }

    fn redeem_allowed(
        &self,
        account: AccountId,
        market: MarketId,
        receipt_amount: u128,
        position: AccountSnapshot,
        book: &PositionBook,
    ) -> Result<Authorization, ControllerError> {
        // units outside the collateral set never back a borrow
        if !self.is_member(account, market) {
            return Ok(Authorization::Allowed);
        }
        let book = with_position(book, market, position);
        let outcome = self.hypothetical_liquidity(
            account,
            &book,
            Some(HypotheticalChange::redeem(market, receipt_amount)),
        )?;
        Ok(liquidity_decision(outcome))
    }

    /// Keeps the debt index current. Called after a ledger commits.
    pub fn mutation_completed(&mut self, notice: &MutationNotice) {
        match *notice {
            MutationNotice::Borrowed {
                market,
                borrower,
                account_borrows,
                ..
            } if account_borrows > 0 => {
                self.debt_markets.entry(borrower).or_default().insert(market);
            }
            MutationNotice::Repaid {
                market,
                borrower,
                account_borrows: 0,
                ..
            } => {
                if let Some(markets) = self.debt_markets.get_mut(&borrower) {
                    markets.remove(&market);
                    if markets.is_empty() {
                        self.debt_markets.remove(&borrower);
                    }
                }
            }
            _ => {}
        }
    }

    // --- membership ------------------------------------------------------

    /// Adds every market to the account's collateral set, or none of them.
    /// Returns the markets that were newly entered.
    pub fn enter_markets(
        &mut self,
        account: AccountId,
        markets: &[MarketId],
    ) -> Result<Vec<MarketId>, ControllerError> {
        let current = self.assets_in(account);
        let mut added: Vec<MarketId> = Vec::new();
        for &market in markets {
            self.ensure_listed(market)?;
            if !current.contains(&market) && !added.contains(&market) {
                added.push(market);
            }
        }
        if current.len() + added.len() > self.params.max_assets {
            return Err(ControllerError::Rejected(RejectReason::TooManyAssets {
                max: self.params.max_assets,
            }));
        }

        if !added.is_empty() {
            self.membership.entry(account).or_default().extend(added.iter().copied());
        }
        Ok(added)
    }

    /// Removes a market from the collateral set. Not being a member is a no-op
    /// (`Ok(false)`); otherwise the account must stay solvent without the market's
    /// receipt balance.
    pub fn exit_market(
        &mut self,
        account: AccountId,
        market: MarketId,
        book: &PositionBook,
    ) -> Result<bool, ControllerError> {
        if !self.is_member(account, market) {
            return Ok(false);
        }
        let held = book.get(&market).map(|s| s.receipt_balance).unwrap_or(0);
        let outcome = self.hypothetical_liquidity(account, book, Some(HypotheticalChange::redeem(market, held)))?;
        if outcome.shortfall > 0 {
            return Err(ControllerError::InsufficientLiquidity {
                shortfall: outcome.shortfall,
            });
        }

        if let Some(assets) = self.membership.get_mut(&account) {
            assets.retain(|m| *m != market);
            if assets.is_empty() {
                self.membership.remove(&account);
            }
        }
        Ok(true)
    }

    // --- liquidation -----------------------------------------------------

    /// Checks every precondition of a liquidation against the borrower's
    /// accrued book. Returns the borrower's liquidity before the repay.
    pub fn authorize_liquidation(
        &self,
        request: &LiquidationRequest,
        book: &PositionBook,
    ) -> Result<AccountLiquidity, ControllerError> {
        self.ensure_listed(request.borrowed_market)?;
        self.ensure_listed(request.collateral_market)?;
        if request.liquidator == request.borrower {
            return Err(ControllerError::SelfLiquidation {
                reason: "liquidator cannot be the borrower",
            });
        }
        if request.repay_amount == 0 {
            return Err(ControllerError::InvalidAmount("repay amount must be positive"));
        }
        if self.seize_paused {
            return Err(ControllerError::Rejected(RejectReason::ActionPaused {
                market: None,
                action: Action::Seize,
            }));
        }

        let liquidity = self.account_liquidity(request.borrower, book)?;
        if liquidity.shortfall == 0 {
            return Err(ControllerError::InsolvencyNotDetected {
                borrower: request.borrower,
            });
        }

        let borrow_balance = book
            .get(&request.borrowed_market)
            .map(|s| s.borrow_balance)
            .unwrap_or(0);
        let max = liquidation::max_repay(self.params.close_factor, borrow_balance)?;
        if request.repay_amount > max {
            return Err(ControllerError::RepayTooLarge {
                requested: request.repay_amount,
                max,
            });
        }
        Ok(liquidity)
    }

    /// Collateral receipt units owed to a liquidator repaying `repay_amount`.
    pub fn seize_tokens(
        &self,
        borrowed_market: MarketId,
        collateral_market: MarketId,
        repay_amount: u128,
        collateral_exchange_rate: Wad,
    ) -> Result<u128, ControllerError> {
        let price_borrowed = self.price(borrowed_market)?;
        let price_collateral = self.price(collateral_market)?;
        Ok(liquidation::seize_tokens(
            repay_amount,
            price_borrowed,
            price_collateral,
            collateral_exchange_rate,
            self.params.liquidation_incentive,
        )?)
    }

    pub(crate) fn issue_seize_ticket(&self, request: &LiquidationRequest, receipt_amount: u128) -> SeizeTicket {
        SeizeTicket::new(
            request.collateral_market,
            request.borrowed_market,
            request.liquidator,
            request.borrower,
            receipt_amount,
        )
    }

    // --- administration --------------------------------------------------

    pub fn support_market(&mut self, caller: AccountId, market: MarketId) -> Result<(), ControllerError> {
        self.ensure_admin(caller)?;
        if self.is_listed(market) {
            return Err(ControllerError::MarketAlreadyListed(market));
        }
        self.markets.insert(market, MarketRisk::default());
        Ok(())
    }

    pub fn set_collateral_factor(
        &mut self,
        caller: AccountId,
        market: MarketId,
        collateral_factor: Wad,
    ) -> Result<ParamChange<Wad>, ControllerError> {
        self.ensure_admin(caller)?;
        self.ensure_listed(market)?;
        if collateral_factor >= Wad::ONE {
            return Err(ControllerError::InvalidParameter {
                name: "collateral_factor",
                reason: "must be below 1",
            });
        }
        if !collateral_factor.is_zero() {
            self.price(market)?;
        }
        let risk = self.risk_mut(market)?;
        let old = std::mem::replace(&mut risk.collateral_factor, collateral_factor);
        Ok(ParamChange::new(old, collateral_factor))
    }

    pub fn set_close_factor(&mut self, caller: AccountId, close_factor: Wad) -> Result<ParamChange<Wad>, ControllerError> {
        self.ensure_admin(caller)?;
        validate_close_factor(close_factor)?;
        let old = std::mem::replace(&mut self.params.close_factor, close_factor);
        Ok(ParamChange::new(old, close_factor))
    }

    pub fn set_liquidation_incentive(
        &mut self,
        caller: AccountId,
        incentive: Wad,
    ) -> Result<ParamChange<Wad>, ControllerError> {
        self.ensure_admin(caller)?;
        validate_incentive(incentive)?;
        let old = std::mem::replace(&mut self.params.liquidation_incentive, incentive);
        Ok(ParamChange::new(old, incentive))
    }

    pub fn set_max_assets(&mut self, caller: AccountId, max_assets: usize) -> Result<ParamChange<usize>, ControllerError> {
        self.ensure_admin(caller)?;
        if max_assets == 0 {
            return Err(ControllerError::InvalidParameter {
                name: "max_assets",
                reason: "must allow at least one market",
            });
        }
        let old = std::mem::replace(&mut self.params.max_assets, max_assets);
        Ok(ParamChange::new(old, max_assets))
    }

    pub fn set_price_oracle(
        &mut self,
        caller: AccountId,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<ParamChange<String>, ControllerError> {
        self.ensure_admin(caller)?;
        let new = oracle.name().to_string();
        let old = std::mem::replace(&mut self.oracle, oracle);
        Ok(ParamChange::new(old.name().to_string(), new))
    }

    pub fn set_borrow_cap(
        &mut self,
        caller: AccountId,
        market: MarketId,
        cap: u128,
    ) -> Result<ParamChange<u128>, ControllerError> {
        self.ensure_admin(caller)?;
        let risk = self.risk_mut(market)?;
        let old = std::mem::replace(&mut risk.borrow_cap, cap);
        Ok(ParamChange::new(old, cap))
    }

    /// Pauses or resumes a per-market action (mint or borrow).
    pub fn set_market_paused(
        &mut self,
        caller: AccountId,
        market: MarketId,
        action: Action,
        paused: bool,
    ) -> Result<ParamChange<bool>, ControllerError> {
        self.ensure_admin(caller)?;
        let risk = self.risk_mut(market)?;
        let flag = match action {
            Action::Mint => &mut risk.mint_paused,
            Action::Borrow => &mut risk.borrow_paused,
            Action::Seize | Action::Transfer => {
                return Err(ControllerError::InvalidParameter {
                    name: "action",
                    reason: "seize and transfer pause globally",
                })
            }
        };
        let old = std::mem::replace(flag, paused);
        Ok(ParamChange::new(old, paused))
    }

    /// Pauses or resumes a global action (seize or transfer).
    pub fn set_global_paused(
        &mut self,
        caller: AccountId,
        action: Action,
        paused: bool,
    ) -> Result<ParamChange<bool>, ControllerError> {
        self.ensure_admin(caller)?;
        let flag = match action {
            Action::Seize => &mut self.seize_paused,
            Action::Transfer => &mut self.transfer_paused,
            Action::Mint | Action::Borrow => {
                return Err(ControllerError::InvalidParameter {
                    name: "action",
                    reason: "mint and borrow pause per market",
                })
            }
        };
        let old = std::mem::replace(flag, paused);
        Ok(ParamChange::new(old, paused))
    }

    fn risk_mut(&mut self, market: MarketId) -> Result<&mut MarketRisk, ControllerError> {
        self.markets
            .get_mut(&market)
            .ok_or(ControllerError::Rejected(RejectReason::MarketNotListed(market)))
    }
}

fn paused(market: Option<MarketId>, action: Action) -> Authorization {
    Authorization::Denied(RejectReason::ActionPaused { market, action })
}

fn liquidity_decision(outcome: AccountLiquidity) -> Authorization {
    if outcome.shortfall > 0 {
        Authorization::Denied(RejectReason::InsufficientLiquidity {
            shortfall: outcome.shortfall,
        })
    } else {
        Authorization::Allowed
    }
}

fn with_position(book: &PositionBook, market: MarketId, position: AccountSnapshot) -> PositionBook {
    let mut book = book.clone();
    book.insert(market, position);
    book
}

/// The controller as a ledger sees it for one call: the controller itself plus
/// the caller's positions in every other market.
#[derive(Debug)]
pub struct ControllerGate<'a> {
    controller: &'a mut RiskController,
    book: PositionBook,
}

impl<'a> ControllerGate<'a> {
    pub fn new(controller: &'a mut RiskController, book: PositionBook) -> Self {
        Self { controller, book }
    }
}

impl RiskGate for ControllerGate<'_> {
    fn authorize(&self, request: &AuthorizeRequest) -> Result<Authorization, ControllerError> {
        self.controller.authorize(request, &self.book)
    }

    fn mutation_completed(&mut self, notice: &MutationNotice) {
        self.controller.mutation_completed(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;
    use crate::price_feed::SimplePriceOracle;
    use rust_decimal_macros::dec;

    const ADMIN: AccountId = AccountId(0);
    const ALICE: AccountId = AccountId(1);
    const BOB: AccountId = AccountId(2);
    const UNI: MarketId = MarketId(1);
    const DAI: MarketId = MarketId(2);

    fn wad(value: rust_decimal::Decimal) -> Wad {
        Wad::from_decimal(value).unwrap()
    }

    fn setup() -> (RiskController, SimplePriceOracle) {
        let oracle = SimplePriceOracle::new();
        oracle.set_price(UNI, dec!(10), 18).unwrap();
        oracle.set_price(DAI, dec!(1), 18).unwrap();
        let params = RiskParams {
            close_factor: wad(dec!(0.5)),
            liquidation_incentive: wad(dec!(1.1)),
            max_assets: 20,
        };
        let mut controller = RiskController::new(ADMIN, params, Arc::new(oracle.clone())).unwrap();
        controller.support_market(ADMIN, UNI).unwrap();
        controller.support_market(ADMIN, DAI).unwrap();
        controller.set_collateral_factor(ADMIN, UNI, wad(dec!(0.5))).unwrap();
        (controller, oracle)
    }

    fn position(receipt: u128, borrow: u128) -> AccountSnapshot {
        AccountSnapshot {
            receipt_balance: receipt,
            borrow_balance: borrow,
            exchange_rate: Wad::ONE,
        }
    }

    fn book(entries: &[(MarketId, AccountSnapshot)]) -> PositionBook {
        entries.iter().copied().collect()
    }

    #[test]
    fn liquidity_counts_only_member_collateral() {
        let (mut controller, _) = setup();
        let positions = book(&[(UNI, position(1_000 * WAD, 0))]);

        let outside = controller.account_liquidity(ALICE, &positions).unwrap();
        assert_eq!(outside, AccountLiquidity::default());

        controller.enter_markets(ALICE, &[UNI]).unwrap();
        let inside = controller.account_liquidity(ALICE, &positions).unwrap();
        assert_eq!(inside.liquidity, 5_000 * WAD);
        assert_eq!(inside.shortfall, 0);
    }

    #[test]
    fn debt_counts_without_membership() {
        let (mut controller, _) = setup();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        let positions = book(&[(UNI, position(1_000 * WAD, 0)), (DAI, position(0, 6_000 * WAD))]);

        let outcome = controller.account_liquidity(ALICE, &positions).unwrap();
        assert_eq!(outcome.liquidity, 0);
        assert_eq!(outcome.shortfall, 1_000 * WAD);
        assert_eq!(outcome.status(), RiskStatus::Shortfall);
    }

    #[test]
    fn price_drop_creates_shortfall() {
        let (mut controller, oracle) = setup();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        let positions = book(&[(UNI, position(1_000 * WAD, 0)), (DAI, position(0, 5_000 * WAD))]);
        assert_eq!(
            controller.account_liquidity(ALICE, &positions).unwrap(),
            AccountLiquidity::default()
        );

        oracle.set_price(UNI, dec!(6.2), 18).unwrap();
        let outcome = controller.account_liquidity(ALICE, &positions).unwrap();
        assert_eq!(outcome.shortfall, 1_900 * WAD);
    }

    #[test]
    fn missing_price_fails_liquidity() {
        let (mut controller, oracle) = setup();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        oracle.set_underlying_price(UNI, Wad::ZERO);
        let positions = book(&[(UNI, position(1, 0))]);
        assert_eq!(
            controller.account_liquidity(ALICE, &positions),
            Err(ControllerError::PriceUnavailable(UNI))
        );
    }

    #[test]
    fn borrow_up_to_liquidity_and_not_beyond() {
        let (mut controller, _) = setup();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        let positions = book(&[(UNI, position(1_000 * WAD, 0))]);

        let exact = AuthorizeRequest::Borrow {
            market: DAI,
            borrower: ALICE,
            amount: 5_000 * WAD,
            position: AccountSnapshot::default(),
            total_borrows: 0,
        };
        assert_eq!(controller.authorize(&exact, &positions).unwrap(), Authorization::Allowed);

        let over = AuthorizeRequest::Borrow {
            market: DAI,
            borrower: ALICE,
            amount: 5_000 * WAD + 1,
            position: AccountSnapshot::default(),
            total_borrows: 0,
        };
        assert_eq!(
            controller.authorize(&over, &positions).unwrap(),
            Authorization::Denied(RejectReason::InsufficientLiquidity { shortfall: 1 })
        );
    }

    #[test]
    fn borrow_cap_and_pause_reject() {
        let (mut controller, _) = setup();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        let positions = book(&[(UNI, position(1_000 * WAD, 0))]);
        controller.set_borrow_cap(ADMIN, DAI, 100 * WAD).unwrap();

        let request = AuthorizeRequest::Borrow {
            market: DAI,
            borrower: ALICE,
            amount: 60 * WAD,
            position: AccountSnapshot::default(),
            total_borrows: 50 * WAD,
        };
        assert_eq!(
            controller.authorize(&request, &positions).unwrap(),
            Authorization::Denied(RejectReason::BorrowCapReached {
                cap: 100 * WAD,
                next_total_borrows: 110 * WAD
            })
        );

        controller.set_market_paused(ADMIN, DAI, Action::Borrow, true).unwrap();
        assert_eq!(
            controller.authorize(&request, &positions).unwrap(),
            paused(Some(DAI), Action::Borrow)
        );
    }

    #[test]
    fn unlisted_market_is_denied() {
        let (controller, _) = setup();
        let request = AuthorizeRequest::Mint {
            market: MarketId(9),
            minter: ALICE,
            amount: 1,
        };
        assert_eq!(
            controller.authorize(&request, &PositionBook::new()).unwrap(),
            Authorization::Denied(RejectReason::MarketNotListed(MarketId(9)))
        );
    }

    #[test]
    fn non_member_redeem_skips_liquidity() {
        let (controller, _) = setup();
        // no membership, plenty of debt: the redeem still goes through
        let positions = book(&[(DAI, position(0, 1_000_000 * WAD))]);
        let request = AuthorizeRequest::Redeem {
            market: UNI,
            redeemer: ALICE,
            receipt_amount: 10,
            position: position(10, 0),
        };
        assert!(controller.authorize(&request, &positions).unwrap().is_allowed());
    }

    #[test]
    fn member_redeem_into_shortfall_is_denied() {
        let (mut controller, _) = setup();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        let positions = book(&[(UNI, position(1_000 * WAD, 0)), (DAI, position(0, 4_000 * WAD))]);

        let fine = AuthorizeRequest::Redeem {
            market: UNI,
            redeemer: ALICE,
            receipt_amount: 200 * WAD,
            position: position(1_000 * WAD, 0),
        };
        assert!(controller.authorize(&fine, &positions).unwrap().is_allowed());

        let too_much = AuthorizeRequest::Redeem {
            market: UNI,
            redeemer: ALICE,
            receipt_amount: 201 * WAD,
            position: position(1_000 * WAD, 0),
        };
        assert_eq!(
            controller.authorize(&too_much, &positions).unwrap(),
            Authorization::Denied(RejectReason::InsufficientLiquidity { shortfall: 5 * WAD })
        );
    }

    #[test]
    fn debt_free_member_can_redeem_everything_at_odd_price() {
        let (mut controller, oracle) = setup();
        oracle.set_price(UNI, dec!(6.2), 18).unwrap();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        // 3.1 per unit leaves a fractional value on a balance of 1000e18 + 1
        let held = 1_000 * WAD + 1;
        let positions = book(&[(UNI, position(held, 0))]);

        let all = AuthorizeRequest::Redeem {
            market: UNI,
            redeemer: ALICE,
            receipt_amount: held,
            position: position(held, 0),
        };
        assert!(controller.authorize(&all, &positions).unwrap().is_allowed());

        let outcome = controller
            .hypothetical_liquidity(ALICE, &positions, Some(HypotheticalChange::redeem(UNI, held)))
            .unwrap();
        assert_eq!(outcome, AccountLiquidity::default());
        assert!(controller.exit_market(ALICE, UNI, &positions).unwrap());
    }

    #[test]
    fn partial_redeem_values_the_remainder_once() {
        let (mut controller, oracle) = setup();
        oracle.set_price(UNI, dec!(6.2), 18).unwrap();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        let positions = book(&[(UNI, position(1_000 * WAD + 1, 0))]);

        // the one unit left is worth 3.1, floored to 3
        let outcome = controller
            .hypothetical_liquidity(ALICE, &positions, Some(HypotheticalChange::redeem(UNI, 1_000 * WAD)))
            .unwrap();
        assert_eq!(outcome.liquidity, 3);

        // redeeming more than is held charges the excess as debt
        let outcome = controller
            .hypothetical_liquidity(ALICE, &positions, Some(HypotheticalChange::redeem(UNI, 1_000 * WAD + 2)))
            .unwrap();
        assert_eq!(outcome.shortfall, 4);
    }

    #[test]
    fn enter_markets_is_all_or_nothing() {
        let (mut controller, _) = setup();
        let result = controller.enter_markets(ALICE, &[UNI, MarketId(9)]);
        assert_eq!(
            result,
            Err(ControllerError::Rejected(RejectReason::MarketNotListed(MarketId(9))))
        );
        assert!(controller.assets_in(ALICE).is_empty());

        assert_eq!(controller.enter_markets(ALICE, &[UNI, UNI]).unwrap(), vec![UNI]);
        assert!(controller.enter_markets(ALICE, &[UNI]).unwrap().is_empty());
    }

    #[test]
    fn enter_markets_respects_max_assets() {
        let (mut controller, _) = setup();
        controller.set_max_assets(ADMIN, 1).unwrap();
        let result = controller.enter_markets(ALICE, &[UNI, DAI]);
        assert_eq!(
            result,
            Err(ControllerError::Rejected(RejectReason::TooManyAssets { max: 1 }))
        );
    }

    #[test]
    fn exit_market_checks_liquidity() {
        let (mut controller, _) = setup();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        let positions = book(&[(UNI, position(1_000 * WAD, 0)), (DAI, position(0, WAD))]);

        assert_eq!(
            controller.exit_market(ALICE, UNI, &positions),
            Err(ControllerError::InsufficientLiquidity { shortfall: WAD })
        );
        assert!(controller.is_member(ALICE, UNI));

        let clean = book(&[(UNI, position(1_000 * WAD, 0))]);
        assert!(controller.exit_market(ALICE, UNI, &clean).unwrap());
        assert!(!controller.exit_market(ALICE, UNI, &clean).unwrap());
    }

    #[test]
    fn liquidation_preconditions() {
        let (mut controller, oracle) = setup();
        controller.enter_markets(ALICE, &[UNI]).unwrap();
        let positions = book(&[(UNI, position(1_000 * WAD, 0)), (DAI, position(0, 5_000 * WAD))]);
        let mut request = LiquidationRequest {
            liquidator: BOB,
            borrower: ALICE,
            borrowed_market: DAI,
            collateral_market: UNI,
            repay_amount: 2_500 * WAD,
        };

        assert_eq!(
            controller.authorize_liquidation(&request, &positions),
            Err(ControllerError::InsolvencyNotDetected { borrower: ALICE })
        );

        oracle.set_price(UNI, dec!(6.2), 18).unwrap();
        assert!(controller.authorize_liquidation(&request, &positions).is_ok());

        request.repay_amount = 2_500 * WAD + 1;
        assert_eq!(
            controller.authorize_liquidation(&request, &positions),
            Err(ControllerError::RepayTooLarge {
                requested: 2_500 * WAD + 1,
                max: 2_500 * WAD
            })
        );

        request.liquidator = ALICE;
        assert!(matches!(
            controller.authorize_liquidation(&request, &positions),
            Err(ControllerError::SelfLiquidation { .. })
        ));
    }

    #[test]
    fn seize_tokens_use_current_prices() {
        let (controller, oracle) = setup();
        oracle.set_price(UNI, dec!(6.2), 18).unwrap();
        let seized = controller.seize_tokens(DAI, UNI, 2_500 * WAD, Wad::ONE).unwrap();
        assert_eq!(seized, 443_548_387_096_774_192_500);
    }

    #[test]
    fn debt_index_follows_notices() {
        let (mut controller, _) = setup();
        controller.mutation_completed(&MutationNotice::Borrowed {
            market: DAI,
            borrower: ALICE,
            amount: 10,
            account_borrows: 10,
        });
        assert_eq!(controller.borrowed_markets(ALICE).collect::<Vec<_>>(), vec![DAI]);

        controller.mutation_completed(&MutationNotice::Repaid {
            market: DAI,
            payer: ALICE,
            borrower: ALICE,
            amount: 4,
            account_borrows: 6,
        });
        assert_eq!(controller.borrowed_markets(ALICE).count(), 1);

        controller.mutation_completed(&MutationNotice::Repaid {
            market: DAI,
            payer: BOB,
            borrower: ALICE,
            amount: 6,
            account_borrows: 0,
        });
        assert_eq!(controller.borrowed_markets(ALICE).count(), 0);
    }

    #[test]
    fn admin_setters_validate_and_report_changes() {
        let (mut controller, oracle) = setup();
        assert_eq!(
            controller.set_close_factor(BOB, wad(dec!(0.4))),
            Err(ControllerError::Unauthorized(BOB))
        );
        assert!(controller.set_close_factor(ADMIN, Wad::ZERO).is_err());
        assert!(controller.set_close_factor(ADMIN, wad(dec!(1.01))).is_err());
        let change = controller.set_close_factor(ADMIN, wad(dec!(0.4))).unwrap();
        assert_eq!(change, ParamChange::new(wad(dec!(0.5)), wad(dec!(0.4))));

        assert!(controller.set_liquidation_incentive(ADMIN, wad(dec!(0.99))).is_err());
        assert!(controller.set_collateral_factor(ADMIN, UNI, Wad::ONE).is_err());

        oracle.set_underlying_price(DAI, Wad::ZERO);
        assert_eq!(
            controller.set_collateral_factor(ADMIN, DAI, wad(dec!(0.8))),
            Err(ControllerError::PriceUnavailable(DAI))
        );
        // zero factor needs no price
        assert!(controller.set_collateral_factor(ADMIN, DAI, Wad::ZERO).is_ok());

        assert_eq!(
            controller.support_market(ADMIN, UNI),
            Err(ControllerError::MarketAlreadyListed(UNI))
        );
    }

    #[test]
    fn pauses_are_scoped() {
        let (mut controller, _) = setup();
        assert!(controller.set_market_paused(ADMIN, UNI, Action::Seize, true).is_err());
        assert!(controller.set_global_paused(ADMIN, Action::Mint, true).is_err());

        controller.set_market_paused(ADMIN, UNI, Action::Mint, true).unwrap();
        let mint = AuthorizeRequest::Mint {
            market: UNI,
            minter: ALICE,
            amount: 1,
        };
        assert_eq!(
            controller.authorize(&mint, &PositionBook::new()).unwrap(),
            paused(Some(UNI), Action::Mint)
        );

        controller.set_global_paused(ADMIN, Action::Transfer, true).unwrap();
        let transfer = AuthorizeRequest::Transfer {
            market: DAI,
            from: ALICE,
            to: BOB,
            receipt_amount: 1,
            position: position(1, 0),
        };
        assert_eq!(
            controller.authorize(&transfer, &PositionBook::new()).unwrap(),
            paused(None, Action::Transfer)
        );
    }
}
