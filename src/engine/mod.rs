// 8.0: lending engine. owns every market ledger and the risk controller, exposes
// the public entry points (supply, borrow, membership, liquidation, admin) and
// records an audit event for each committed change.
// deterministic, single owner, no external I/O beyond the underlying tokens.

mod admin;
mod bootstrap;
mod borrowing;
mod config;
mod core;
mod liquidations;
mod membership;
mod results;
mod supply;
#[cfg(test)]
mod testkit;

pub use bootstrap::Bootstrap;
pub use config::EngineConfig;
pub use core::Engine;
pub use results::{EngineError, LiquidationResult};
