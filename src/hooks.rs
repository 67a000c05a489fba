//! Request/response protocol between a market ledger and the risk controller.
//!
//! A ledger never reaches into controller state. Before mutating it sends an
//! [`AuthorizeRequest`] through the [`RiskGate`] it was handed for the call and gets
//! back an [`Authorization`]. After the mutation has been committed it reports a
//! [`MutationNotice`] so the controller can refresh whatever it indexes.

use crate::controller::ControllerError;
use crate::math::Wad;
use crate::types::{AccountId, Action, MarketId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One account's position in one market, as the ledger sees it right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub receipt_balance: u128,
    pub borrow_balance: u128,
    pub exchange_rate: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeRequest {
    Mint {
        market: MarketId,
        minter: AccountId,
        amount: u128,
    },
    Redeem {
        market: MarketId,
        redeemer: AccountId,
        receipt_amount: u128,
        position: AccountSnapshot,
    },
    Borrow {
        market: MarketId,
        borrower: AccountId,
        amount: u128,
        position: AccountSnapshot,
        total_borrows: u128,
    },
    Repay {
        market: MarketId,
        payer: AccountId,
        borrower: AccountId,
        amount: u128,
    },
    Seize {
        collateral_market: MarketId,
        borrowed_market: MarketId,
        liquidator: AccountId,
        borrower: AccountId,
        receipt_amount: u128,
    },
    Transfer {
        market: MarketId,
        from: AccountId,
        to: AccountId,
        receipt_amount: u128,
        position: AccountSnapshot,
    },
}

impl AuthorizeRequest {
    pub fn market(&self) -> MarketId {
        match self {
            AuthorizeRequest::Mint { market, .. }
            | AuthorizeRequest::Redeem { market, .. }
            | AuthorizeRequest::Borrow { market, .. }
            | AuthorizeRequest::Repay { market, .. }
            | AuthorizeRequest::Transfer { market, .. } => *market,
            AuthorizeRequest::Seize { collateral_market, .. } => *collateral_market,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthorizeRequest::Mint { .. } => "mint",
            AuthorizeRequest::Redeem { .. } => "redeem",
            AuthorizeRequest::Borrow { .. } => "borrow",
            AuthorizeRequest::Repay { .. } => "repay",
            AuthorizeRequest::Seize { .. } => "seize",
            AuthorizeRequest::Transfer { .. } => "transfer",
        }
    }
}

/// Why the controller said no.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    MarketNotListed(MarketId),
    ActionPaused { market: Option<MarketId>, action: Action },
    BorrowCapReached { cap: u128, next_total_borrows: u128 },
    InsufficientLiquidity { shortfall: u128 },
    TooManyAssets { max: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MarketNotListed(market) => write!(f, "{market} is not listed"),
            RejectReason::ActionPaused { market: Some(market), action } => {
                write!(f, "{action} is paused on {market}")
            }
            RejectReason::ActionPaused { market: None, action } => write!(f, "{action} is paused"),
            RejectReason::BorrowCapReached { cap, next_total_borrows } => {
                write!(f, "borrow cap {cap} exceeded by {next_total_borrows}")
            }
            RejectReason::InsufficientLiquidity { shortfall } => {
                write!(f, "would leave a shortfall of {shortfall}")
            }
            RejectReason::TooManyAssets { max } => write!(f, "membership limited to {max} markets"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied(RejectReason),
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Authorization::Allowed)
    }
}

/// Completed mutation, delivered after the ledger committed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationNotice {
    Minted {
        market: MarketId,
        minter: AccountId,
        amount: u128,
        receipt_minted: u128,
    },
    Redeemed {
        market: MarketId,
        redeemer: AccountId,
        underlying: u128,
        receipt_burned: u128,
    },
    Borrowed {
        market: MarketId,
        borrower: AccountId,
        amount: u128,
        account_borrows: u128,
    },
    Repaid {
        market: MarketId,
        payer: AccountId,
        borrower: AccountId,
        amount: u128,
        account_borrows: u128,
    },
    Seized {
        market: MarketId,
        liquidator: AccountId,
        borrower: AccountId,
        receipt_amount: u128,
    },
    Transferred {
        market: MarketId,
        from: AccountId,
        to: AccountId,
        receipt_amount: u128,
    },
}

/// Capability a ledger receives for the duration of one entry point.
pub trait RiskGate {
    fn authorize(&self, request: &AuthorizeRequest) -> Result<Authorization, ControllerError>;

    fn mutation_completed(&mut self, notice: &MutationNotice);
}

/// Proof that the controller sanctioned a specific seizure. Only the controller can
/// mint one, so a ledger's seize cannot be reached from outside a liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeizeTicket {
    pub(crate) collateral_market: MarketId,
    pub(crate) borrowed_market: MarketId,
    pub(crate) liquidator: AccountId,
    pub(crate) borrower: AccountId,
    pub(crate) receipt_amount: u128,
}

impl SeizeTicket {
    pub(crate) fn new(
        collateral_market: MarketId,
        borrowed_market: MarketId,
        liquidator: AccountId,
        borrower: AccountId,
        receipt_amount: u128,
    ) -> Self {
        Self {
            collateral_market,
            borrowed_market,
            liquidator,
            borrower,
            receipt_amount,
        }
    }

    pub fn collateral_market(&self) -> MarketId {
        self.collateral_market
    }

    pub fn borrowed_market(&self) -> MarketId {
        self.borrowed_market
    }

    pub fn receipt_amount(&self) -> u128 {
        self.receipt_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_reports_its_market() {
        let request = AuthorizeRequest::Seize {
            collateral_market: MarketId(2),
            borrowed_market: MarketId(1),
            liquidator: AccountId(3),
            borrower: AccountId(4),
            receipt_amount: 10,
        };
        assert_eq!(request.market(), MarketId(2));
        assert_eq!(request.kind(), "seize");
    }

    #[test]
    fn reject_reasons_read_well() {
        let reason = RejectReason::ActionPaused {
            market: Some(MarketId(1)),
            action: Action::Mint,
        };
        assert_eq!(reason.to_string(), "mint is paused on market#1");
        assert!(!Authorization::Denied(reason).is_allowed());
    }
}
