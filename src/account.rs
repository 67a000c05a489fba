//! Account views.
//!
//! Accounts have no storage of their own. Their receipt balances and borrow
//! snapshots live in each market ledger and their collateral set lives in the
//! controller. An [`AccountSummary`] stitches those together for reporting.

use crate::controller::AccountLiquidity;
use crate::hooks::AccountSnapshot;
use crate::liquidation::RiskStatus;
use crate::math::{MathError, Rounding};
use crate::types::{AccountId, MarketId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPosition {
    pub market_id: MarketId,
    pub receipt_balance: u128,
    /// Receipt balance valued at the market's exchange rate, rounded down
    pub underlying_balance: u128,
    pub borrow_balance: u128,
    /// Whether the market is in the account's collateral set
    pub is_collateral: bool,
}

impl MarketPosition {
    pub fn from_snapshot(
        market_id: MarketId,
        snapshot: &AccountSnapshot,
        is_collateral: bool,
    ) -> Result<Self, MathError> {
        Ok(Self {
            market_id,
            receipt_balance: snapshot.receipt_balance,
            underlying_balance: snapshot
                .exchange_rate
                .mul_amount(snapshot.receipt_balance, Rounding::Down)?,
            borrow_balance: snapshot.borrow_balance,
            is_collateral,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.receipt_balance == 0 && self.borrow_balance == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_id: AccountId,
    pub positions: Vec<MarketPosition>,
    pub liquidity: AccountLiquidity,
}

impl AccountSummary {
    pub fn position(&self, market_id: MarketId) -> Option<&MarketPosition> {
        self.positions.iter().find(|p| p.market_id == market_id)
    }

    pub fn status(&self) -> RiskStatus {
        self.liquidity.status()
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == RiskStatus::Healthy
    }

    pub fn collateral_markets(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.positions.iter().filter(|p| p.is_collateral).map(|p| p.market_id)
    }

    pub fn borrowed_markets(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.positions
            .iter()
            .filter(|p| p.borrow_balance > 0)
            .map(|p| p.market_id)
    }
}
