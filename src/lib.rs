// lending-core: pooled lending market engine.
// solvency-first accounting: every rounding favours the pool and every
// operation either commits completely or leaves no trace.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, AccountId, Timestamp, RepayAmount, Action
//   2.x  math.rs: Wad fixed point, 256-bit mul_div, resolve_borrow
//   3.x  rate_model.rs: white paper and jump rate models
//   4.x  market.rs: market ledger: accrual, mint/redeem/borrow/repay/seize
//   5.x  controller.rs: listing, membership, liquidity, authorization, admin
//   5.1  hooks.rs: ledger <-> controller request/notice protocol
//   6.x  liquidation.rs: close factor cap, seize token math, risk status
//   7.x  config.rs: risk params, market setups, env presets
//   8.x  engine/: coordinator: supply, borrowing, membership, liquidations, admin
//   9.x  price_feed.rs: oracle trait + admin-posted prices
//   9.1  clock.rs: injected time source
//   9.2  token.rs: underlying token trait + in-memory ERC-20
//   10.x account.rs: per-account position views
//   11.x events.rs: state transition events for audit

// core accounting modules
pub mod account;
pub mod controller;
pub mod engine;
pub mod events;
pub mod hooks;
pub mod liquidation;
pub mod market;
pub mod math;
pub mod rate_model;
pub mod types;

// integration modules
pub mod clock;
pub mod config;
pub mod price_feed;
pub mod token;

// re exports for convenience
pub use account::{AccountSummary, MarketPosition};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, Environment, LendingConfig, MarketSetup};
pub use controller::{
    AccountLiquidity, ControllerError, HypotheticalChange, MarketRisk, PositionBook, RiskController, RiskParams,
};
pub use engine::{Bootstrap, Engine, EngineConfig, EngineError, LiquidationResult};
pub use events::*;
pub use hooks::{AccountSnapshot, Authorization, AuthorizeRequest, MutationNotice, RejectReason, RiskGate};
pub use liquidation::RiskStatus;
pub use market::{
    AccrualOutcome, BorrowOutcome, LedgerError, MarketConfig, MarketLedger, MarketState, MintOutcome, RedeemOutcome,
    RepayOutcome, WithdrawAmount, MAX_BORROW_RATE_PER_SECOND,
};
pub use math::{MathError, Rounding, Wad, WAD};
pub use price_feed::{price_mantissa, PriceOracle, SimplePriceOracle};
pub use rate_model::{InterestRateModel, JumpRateModel, RateModelConfig, WhitePaperRateModel};
pub use token::{FailureMode, Holder, InMemoryToken, TransferError, UnderlyingToken};
pub use types::*;
