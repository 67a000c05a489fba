// 9.2 token.rs: the underlying asset a market lends out. the engine only needs
// ERC-20 style transfer / transfer_from / approve. a failed transfer may come back
// as a plain "false" (Rejected) or as a revert; the ledger treats both the same way.

use crate::types::{AccountId, MarketId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

// Anyone who can hold underlying: a user account or a market's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Holder {
    Account(AccountId),
    Pool(MarketId),
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Account(id) => write!(f, "{id}"),
            Holder::Pool(id) => write!(f, "pool({id})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("transfer returned false")]
    Rejected,

    #[error("transfer reverted: {0}")]
    Reverted(String),
}

pub trait UnderlyingToken: fmt::Debug + Send + Sync {
    fn symbol(&self) -> &str;

    fn decimals(&self) -> u32;

    fn balance_of(&self, holder: Holder) -> u128;

    fn allowance(&self, owner: Holder, spender: Holder) -> u128;

    /// Moves `amount` out of the caller's own balance.
    fn transfer(&mut self, caller: Holder, to: Holder, amount: u128) -> Result<(), TransferError>;

    /// Moves `amount` from `from` to `to` using `spender`'s allowance.
    fn transfer_from(
        &mut self,
        spender: Holder,
        from: Holder,
        to: Holder,
        amount: u128,
    ) -> Result<(), TransferError>;

    fn approve(&mut self, owner: Holder, spender: Holder, amount: u128) -> Result<(), TransferError>;
}

// How an injected failure surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    None,
    ReturnFalse,
    Revert,
}

#[derive(Debug, Default)]
struct TokenBook {
    balances: HashMap<Holder, u128>,
    allowances: HashMap<(Holder, Holder), u128>,
    failure: FailureMode,
}

/// In-memory ERC-20. Clones are handles on the same book, so a test can keep one
/// while the market ledger owns another. `u128::MAX` allowances are never decremented.
#[derive(Debug, Clone)]
pub struct InMemoryToken {
    symbol: String,
    decimals: u32,
    book: Arc<Mutex<TokenBook>>,
}

impl InMemoryToken {
    pub fn new(symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            book: Arc::new(Mutex::new(TokenBook::default())),
        }
    }

    fn book(&self) -> std::sync::MutexGuard<'_, TokenBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credits new supply to `holder`.
    pub fn mint(&self, holder: Holder, amount: u128) {
        let mut book = self.book();
        let balance = book.balances.entry(holder).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Makes every following transfer fail until reset with `FailureMode::None`.
    pub fn set_failure_mode(&self, mode: FailureMode) {
        self.book().failure = mode;
    }

    pub fn total_held(&self) -> u128 {
        self.book().balances.values().fold(0u128, |acc, b| acc.saturating_add(*b))
    }

    fn check_failure(book: &TokenBook) -> Result<(), TransferError> {
        match book.failure {
            FailureMode::None => Ok(()),
            FailureMode::ReturnFalse => Err(TransferError::Rejected),
            FailureMode::Revert => Err(TransferError::Reverted("injected failure".to_string())),
        }
    }

    fn move_balance(book: &mut TokenBook, from: Holder, to: Holder, amount: u128) -> Result<(), TransferError> {
        let available = book.balances.get(&from).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::Reverted(format!(
                "{from} holds {available}, needs {amount}"
            )));
        }
        book.balances.insert(from, available - amount);
        let balance = book.balances.entry(to).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::Reverted("balance overflow".to_string()))?;
        Ok(())
    }
}

impl UnderlyingToken for InMemoryToken {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn decimals(&self) -> u32 {
        self.decimals
    }

    fn balance_of(&self, holder: Holder) -> u128 {
        self.book().balances.get(&holder).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: Holder, spender: Holder) -> u128 {
        self.book().allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }

    fn transfer(&mut self, caller: Holder, to: Holder, amount: u128) -> Result<(), TransferError> {
        let mut book = self.book();
        Self::check_failure(&book)?;
        Self::move_balance(&mut book, caller, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: Holder,
        from: Holder,
        to: Holder,
        amount: u128,
    ) -> Result<(), TransferError> {
        let mut book = self.book();
        Self::check_failure(&book)?;

        let allowed = if spender == from {
            u128::MAX
        } else {
            book.allowances.get(&(from, spender)).copied().unwrap_or(0)
        };
        if allowed < amount {
            return Err(TransferError::Reverted(format!(
                "allowance {allowed} below {amount}"
            )));
        }

        Self::move_balance(&mut book, from, to, amount)?;

        if allowed != u128::MAX {
            book.allowances.insert((from, spender), allowed - amount);
        }
        Ok(())
    }

    fn approve(&mut self, owner: Holder, spender: Holder, amount: u128) -> Result<(), TransferError> {
        let mut book = self.book();
        Self::check_failure(&book)?;
        book.allowances.insert((owner, spender), amount);
        Ok(())
    }
}
