// 11.0: every committed state change produces an event. used for audit trails and
// for notifying external systems. rejected withdrawals and liquidations are logged
// too, so a reader can see what was attempted and why it failed.

use crate::math::Wad;
use crate::types::{AccountId, Action, MarketId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Supply side
    Mint(MintEvent),
    Redeem(RedeemEvent),
    ReceiptTransfer(ReceiptTransferEvent),

    // Borrow side
    Borrow(BorrowEvent),
    RepayBorrow(RepayBorrowEvent),
    LiquidateBorrow(LiquidateBorrowEvent),

    // Market accounting
    AccrueInterest(AccrueInterestEvent),
    ReservesAdded(ReservesEvent),
    ReservesReduced(ReservesEvent),

    // Membership
    MarketEntered(MembershipEvent),
    MarketExited(MembershipEvent),

    // Administration
    MarketListed(MarketListedEvent),
    ParamChanged(ParamChangedEvent),
    PricePosted(PricePostedEvent),

    // Audit
    OperationRejected(OperationRejectedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub underlying: u128,
    pub receipt: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub underlying: u128,
    pub receipt: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptTransferEvent {
    pub market_id: MarketId,
    pub from: AccountId,
    pub to: AccountId,
    pub receipt: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepayBorrowEvent {
    pub market_id: MarketId,
    pub payer: AccountId,
    pub borrower: AccountId,
    pub amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidateBorrowEvent {
    pub liquidator: AccountId,
    pub borrower: AccountId,
    pub borrowed_market: MarketId,
    pub collateral_market: MarketId,
    pub repay_amount: u128,
    pub seized_receipt: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrueInterestEvent {
    pub market_id: MarketId,
    pub interest_accumulated: u128,
    pub borrow_index: Wad,
    pub total_borrows: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservesEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub amount: u128,
    pub total_reserves: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketListedEvent {
    pub market_id: MarketId,
    pub symbol: String,
    pub underlying_decimals: u32,
}

/// Which parameter an admin call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskParameter {
    CollateralFactor,
    CloseFactor,
    LiquidationIncentive,
    MaxAssets,
    BorrowCap,
    ReserveFactor,
    InterestRateModel,
    PriceOracle,
    Paused(Action),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Ratio(Wad),
    Amount(u128),
    Count(usize),
    Flag(bool),
    Name(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamChangedEvent {
    pub parameter: RiskParameter,
    // None for global parameters
    pub market_id: Option<MarketId>,
    pub old: ParamValue,
    pub new: ParamValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePostedEvent {
    pub market_id: MarketId,
    pub previous: Wad,
    pub new: Wad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRejectedEvent {
    pub operation: String,
    pub account_id: AccountId,
    pub market_id: Option<MarketId>,
    pub amount: u128,
    pub reason: String,
}

/// Bounded in-memory log. Oldest events are dropped once `capacity` is reached.
#[derive(Debug)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            capacity: capacity.max(1),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.push(Event::new(id, timestamp, payload));

        if self.events.len() > self.capacity {
            let drain_count = self.events.len() - self.capacity;
            self.events.drain(0..drain_count);
        }
        id
    }
}
