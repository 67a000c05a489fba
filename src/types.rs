// 1.0: all the primitives live here. nothing in the engine works without these types.
// IDs, timestamps, repay sentinels and pausable actions. each is a newtype or enum so
// the compiler catches mixups between a market and an account.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketId(pub u32);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "market#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account#{}", self.0)
    }
}

// 1.1: logical time in whole seconds. interest accrues per elapsed second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    // zero when `later` is not actually later
    pub fn elapsed_secs(&self, later: &Timestamp) -> u64 {
        if later.0 > self.0 {
            (later.0 - self.0) as u64
        } else {
            0
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}s", self.0)
    }
}

// 1.2: how much of a borrow to repay. Full charges the resolved balance at repay time,
// so a payer never has to guess the interest that accrued in the same call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepayAmount {
    Exact(u128),
    Full,
}

impl From<u128> for RepayAmount {
    fn from(amount: u128) -> Self {
        RepayAmount::Exact(amount)
    }
}

// 1.3: actions the admin can pause. mint/borrow are per market, seize/transfer are global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Mint,
    Borrow,
    Seize,
    Transfer,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Mint => "mint",
            Action::Borrow => "borrow",
            Action::Seize => "seize",
            Action::Transfer => "transfer",
        };
        f.write_str(name)
    }
}
