//! Collateral membership and account liquidity views.

use super::core::Engine;
use super::results::EngineError;
use crate::account::{AccountSummary, MarketPosition};
use crate::controller::{AccountLiquidity, HypotheticalChange};
use crate::events::{EventPayload, MembershipEvent};
use crate::types::{AccountId, MarketId};

impl Engine {
    /// Adds markets to the account's collateral set, all or none. Returns the
    /// markets that were newly entered.
    pub fn enter_markets(&mut self, account: AccountId, markets: &[MarketId]) -> Result<Vec<MarketId>, EngineError> {
        let entered = self.controller.enter_markets(account, markets)?;
        for &market_id in &entered {
            tracing::info!(market = %market_id, %account, "market entered");
            self.emit_event(EventPayload::MarketEntered(MembershipEvent {
                market_id,
                account_id: account,
            }));
        }
        Ok(entered)
    }

    /// Drops a market from the collateral set if the account stays solvent
    /// without it. Returns false when the account was not a member.
    pub fn exit_market(&mut self, account: AccountId, market_id: MarketId) -> Result<bool, EngineError> {
        self.ensure_market(market_id)?;
        let now = self.now();
        let book = self.position_book(account, Some(now))?;
        let exited = self.controller.exit_market(account, market_id, &book)?;
        if exited {
            tracing::info!(market = %market_id, %account, "market exited");
            self.emit_event(EventPayload::MarketExited(MembershipEvent {
                market_id,
                account_id: account,
            }));
        }
        Ok(exited)
    }

    pub fn assets_in(&self, account: AccountId) -> &[MarketId] {
        self.controller.assets_in(account)
    }

    /// Liquidity from stored market state.
    pub fn account_liquidity(&self, account: AccountId) -> Result<AccountLiquidity, EngineError> {
        let book = self.position_book(account, None)?;
        Ok(self.controller.account_liquidity(account, &book)?)
    }

    /// Liquidity with every involved market previewed to the clock. Nothing is
    /// committed.
    pub fn account_liquidity_current(&self, account: AccountId) -> Result<AccountLiquidity, EngineError> {
        let book = self.position_book(account, Some(self.now()))?;
        Ok(self.controller.account_liquidity(account, &book)?)
    }

    /// Liquidity as if the account redeemed `redeem_receipt` units of, and
    /// borrowed `borrow_amount` from, `market_id`.
    pub fn hypothetical_liquidity(
        &self,
        account: AccountId,
        market_id: MarketId,
        redeem_receipt: u128,
        borrow_amount: u128,
    ) -> Result<AccountLiquidity, EngineError> {
        let ledger = self.market(market_id)?;
        let mut book = self.position_book(account, None)?;
        book.entry(market_id).or_insert(ledger.snapshot(account)?);
        let change = HypotheticalChange {
            market: market_id,
            redeem_receipt,
            borrow_amount,
        };
        Ok(self.controller.hypothetical_liquidity(account, &book, Some(change))?)
    }

    /// Positions in every market the account is a member of or owes to.
    pub fn account_summary(&self, account: AccountId) -> Result<AccountSummary, EngineError> {
        let book = self.position_book(account, None)?;
        let liquidity = self.controller.account_liquidity(account, &book)?;
        let positions = book
            .iter()
            .map(|(market_id, snapshot)| {
                MarketPosition::from_snapshot(*market_id, snapshot, self.controller.is_member(account, *market_id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AccountSummary {
            account_id: account,
            positions,
            liquidity,
        })
    }
}
