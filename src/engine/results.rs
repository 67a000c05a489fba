// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::controller::{AccountLiquidity, ControllerError};
use crate::hooks::RejectReason;
use crate::market::LedgerError;
use crate::math::{MathError, Wad};
use crate::token::TransferError;
use crate::types::{AccountId, MarketId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationResult {
    pub liquidator: AccountId,
    pub borrower: AccountId,
    pub borrowed_market: MarketId,
    pub collateral_market: MarketId,
    pub repay_amount: u128,
    pub seized_receipt: u128,
    /// Borrower's position just before the repay
    pub liquidity_before: AccountLiquidity,
    /// Borrow left in the repaid market
    pub remaining_borrow: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(&'static str),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    #[error("Insufficient cash: requested {requested}, available {available}")]
    InsufficientCash { requested: u128, available: u128 },

    #[error("Insufficient liquidity: shortfall {shortfall}")]
    InsufficientLiquidity { shortfall: u128 },

    #[error("Rejected by risk controller: {0}")]
    ControllerRejected(RejectReason),

    #[error("Underlying transfer failed: {0}")]
    TransferFailed(TransferError),

    #[error("Account {0} has no shortfall")]
    InsolvencyNotDetected(AccountId),

    #[error("Repay {requested} exceeds close factor limit {max}")]
    RepayTooLarge { requested: u128, max: u128 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Market {0} not found")]
    MarketNotFound(MarketId),

    #[error("Market {0} is already listed")]
    MarketAlreadyListed(MarketId),

    #[error("No price available for market {0}")]
    PriceUnavailable(MarketId),

    #[error("Invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: &'static str },

    #[error("Borrow rate {0} per second is above the cap")]
    BorrowRateTooHigh(Wad),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

impl EngineError {
    /// Account-facing operations report an unknown market the way the controller
    /// reports an unlisted one.
    pub(crate) fn not_listed(market_id: MarketId) -> Self {
        EngineError::ControllerRejected(RejectReason::MarketNotListed(market_id))
    }
}

impl From<ControllerError> for EngineError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::Rejected(RejectReason::InsufficientLiquidity { shortfall }) => {
                EngineError::InsufficientLiquidity { shortfall }
            }
            ControllerError::Rejected(reason) => EngineError::ControllerRejected(reason),
            ControllerError::MarketAlreadyListed(market) => EngineError::MarketAlreadyListed(market),
            ControllerError::PriceUnavailable(market) => EngineError::PriceUnavailable(market),
            ControllerError::InsufficientLiquidity { shortfall } => {
                EngineError::InsufficientLiquidity { shortfall }
            }
            ControllerError::Unauthorized(caller) => {
                EngineError::Unauthorized(format!("{caller} is not the admin"))
            }
            ControllerError::SelfLiquidation { reason } => EngineError::Unauthorized(reason.to_string()),
            ControllerError::InvalidParameter { name, reason } => EngineError::InvalidParameter { name, reason },
            ControllerError::InsolvencyNotDetected { borrower } => EngineError::InsolvencyNotDetected(borrower),
            ControllerError::RepayTooLarge { requested, max } => EngineError::RepayTooLarge { requested, max },
            ControllerError::InvalidAmount(reason) => EngineError::InvalidAmount(reason),
            ControllerError::Math(err) => EngineError::Math(err),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount(reason) => EngineError::InvalidAmount(reason),
            LedgerError::InvalidParameter { name, reason } => EngineError::InvalidParameter { name, reason },
            LedgerError::InsufficientBalance { requested, available } => {
                EngineError::InsufficientBalance { requested, available }
            }
            LedgerError::InsufficientCash { requested, available } => {
                EngineError::InsufficientCash { requested, available }
            }
            LedgerError::InsufficientLiquidity { shortfall } => EngineError::InsufficientLiquidity { shortfall },
            LedgerError::Rejected(reason) => ControllerError::Rejected(reason).into(),
            LedgerError::Controller(err) => err.into(),
            LedgerError::TransferFailed(err) => EngineError::TransferFailed(err),
            LedgerError::Unauthorized(reason) => EngineError::Unauthorized(reason.to_string()),
            LedgerError::BorrowRateTooHigh { rate } => EngineError::BorrowRateTooHigh(rate),
            LedgerError::Math(err) => EngineError::Math(err),
        }
    }
}
