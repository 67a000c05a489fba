//! Property-based tests for the fixed-point core and pool accounting.
//!
//! These tests verify that rounding always favours the pool under random inputs.

use lending_core::liquidation::{max_repay, seize_tokens};
use lending_core::math::{mul_div, resolve_borrow};
use lending_core::rate_model::utilization_rate;
use lending_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const UNI: MarketId = MarketId(1);
const USDC: MarketId = MarketId(2);
const ALICE: AccountId = AccountId(1);
const BOB: AccountId = AccountId(2);
const CAROL: AccountId = AccountId(3);

// Strategies for generating test data
fn wad_strategy() -> impl Strategy<Value = Wad> {
    (1u128..=1_000_000u128).prop_map(|x| Wad::from_raw(x * 1_000_000_000_000)) // 1e-6 to 1.0
}

fn amount_strategy() -> impl Strategy<Value = u128> {
    1u128..=1_000_000_000_000_000_000_000_000u128 // up to a million 18-decimal tokens
}

fn index_strategy() -> impl Strategy<Value = Wad> {
    (WAD..=10 * WAD).prop_map(Wad::from_raw)
}

fn price_cents_strategy() -> impl Strategy<Value = i64> {
    1i64..=5_000i64 // $0.01 to $50
}

fn bootstrap(config: &LendingConfig) -> (Bootstrap, ManualClock) {
    let clock = ManualClock::new(Timestamp::from_secs(0));
    let boot = Engine::from_config(config, Arc::new(clock.clone())).unwrap();
    (boot, clock)
}

/// Alice posts 1,000 UNI as collateral, Bob supplies 10,000 USDC.
fn funded_pair(config: &LendingConfig) -> (Bootstrap, ManualClock) {
    let (mut boot, clock) = bootstrap(config);
    let uni = 1_000 * WAD;
    let usdc = 10_000 * 1_000_000;
    boot.fund(UNI, ALICE, uni).unwrap();
    boot.fund(USDC, BOB, usdc).unwrap();
    boot.engine.deposit(ALICE, UNI, uni).unwrap();
    boot.engine.enter_markets(ALICE, &[UNI]).unwrap();
    boot.engine.deposit(BOB, USDC, usdc).unwrap();
    (boot, clock)
}

proptest! {
    /// Rounding up never differs from rounding down by more than one unit
    #[test]
    fn mul_div_rounding_gap(
        a in 0u128..=u64::MAX as u128,
        b in 0u128..=u64::MAX as u128,
        d in 1u128..=u64::MAX as u128,
    ) {
        let down = mul_div(a, b, d, Rounding::Down).unwrap();
        let up = mul_div(a, b, d, Rounding::Up).unwrap();
        prop_assert!(up - down <= 1);
        prop_assert_eq!(up == down, (a * b) % d == 0);
        prop_assert!(down * d <= a * b);
    }

    /// Debt never resolves below the recorded principal
    #[test]
    fn debt_rounds_up(
        principal in amount_strategy(),
        snapshot_index in index_strategy(),
        growth in 0u128..=WAD,
    ) {
        let current = Wad::from_raw(snapshot_index.raw() + growth);
        let owed = resolve_borrow(principal, snapshot_index, current).unwrap();
        prop_assert!(owed >= principal);

        let unchanged = resolve_borrow(principal, snapshot_index, snapshot_index).unwrap();
        prop_assert_eq!(unchanged, principal);
    }

    /// The close factor cap never exceeds the borrow
    #[test]
    fn max_repay_bounded(
        close_factor in wad_strategy(),
        borrow in amount_strategy(),
    ) {
        let max = max_repay(close_factor, borrow).unwrap();
        prop_assert!(max <= borrow);
        if close_factor == Wad::ONE {
            prop_assert_eq!(max, borrow);
        }
    }

    /// Repaying more never seizes less
    #[test]
    fn seize_monotonic_in_repay(
        repay in amount_strategy(),
        extra in 0u128..=1_000_000_000_000_000_000u128,
        borrowed_cents in price_cents_strategy(),
        collateral_cents in price_cents_strategy(),
    ) {
        let price_borrowed = Wad::from_decimal(Decimal::new(borrowed_cents, 2)).unwrap();
        let price_collateral = Wad::from_decimal(Decimal::new(collateral_cents, 2)).unwrap();
        let incentive = Wad::from_decimal(dec!(1.1)).unwrap();

        let small = seize_tokens(repay, price_borrowed, price_collateral, Wad::ONE, incentive).unwrap();
        let large = seize_tokens(repay + extra, price_borrowed, price_collateral, Wad::ONE, incentive).unwrap();
        prop_assert!(small <= large);
    }

    /// Seized value never exceeds repay value times the incentive
    #[test]
    fn seize_never_overpays(
        repay in amount_strategy(),
        borrowed_cents in price_cents_strategy(),
        collateral_cents in price_cents_strategy(),
    ) {
        let price_borrowed = Wad::from_decimal(Decimal::new(borrowed_cents, 2)).unwrap();
        let price_collateral = Wad::from_decimal(Decimal::new(collateral_cents, 2)).unwrap();
        let incentive = Wad::from_decimal(dec!(1.08)).unwrap();

        let seized = seize_tokens(repay, price_borrowed, price_collateral, Wad::ONE, incentive).unwrap();
        let seized_value = price_collateral.mul_amount(seized, Rounding::Down).unwrap();
        let owed_value = incentive.mul(price_borrowed).unwrap().mul_amount(repay, Rounding::Up).unwrap();
        prop_assert!(seized_value <= owed_value);
    }

    /// Utilization stays within [0, 1] while reserves are zero
    #[test]
    fn utilization_bounded(
        cash in 0u128..=u64::MAX as u128,
        borrows in 0u128..=u64::MAX as u128,
    ) {
        prop_assume!(cash + borrows > 0);
        let util = utilization_rate(cash, borrows, 0).unwrap();
        prop_assert!(util <= Wad::ONE);
        if borrows == 0 {
            prop_assert_eq!(util, Wad::ZERO);
        }
    }

    /// Supplying then redeeming everything never returns more than was supplied
    #[test]
    fn deposit_withdraw_never_profits(
        first in 1u128..=1_000_000_000_000u128,
        second in 1u128..=1_000_000_000_000u128,
        as_collateral in any::<bool>(),
    ) {
        let (mut boot, _clock) = bootstrap(&LendingConfig::default());
        boot.fund(USDC, ALICE, first).unwrap();
        boot.fund(USDC, BOB, second).unwrap();
        boot.engine.deposit(ALICE, USDC, first).unwrap();
        boot.engine.deposit(BOB, USDC, second).unwrap();
        if as_collateral {
            boot.engine.enter_markets(ALICE, &[USDC]).unwrap();
            boot.engine.enter_markets(BOB, &[USDC]).unwrap();
        }

        for (account, supplied) in [(BOB, second), (ALICE, first)] {
            let receipt = boot.engine.receipt_balance(account, USDC).unwrap();
            let redeemed = boot.engine.withdraw(account, USDC, receipt).unwrap();
            prop_assert!(redeemed.underlying <= supplied);
            prop_assert_eq!(boot.balance(USDC, account).unwrap(), redeemed.underlying);
        }
        prop_assert_eq!(boot.engine.market_state(USDC).unwrap().total_supply, 0);
    }

    /// A member with no debt can always redeem its whole balance, whatever the
    /// price and however far interest has moved the exchange rate
    #[test]
    fn debt_free_member_redeems_everything(
        borrowed in 1u128..=5_000u128,
        elapsed in 1i64..=31_536_000i64,
        cents in price_cents_strategy(),
    ) {
        let (mut boot, clock) = funded_pair(&LendingConfig::testnet());
        boot.engine.enter_markets(BOB, &[USDC]).unwrap();
        boot.fund(USDC, CAROL, 100_000 * 1_000_000).unwrap();
        boot.engine.deposit(CAROL, USDC, 100_000 * 1_000_000).unwrap();
        boot.engine.borrow(ALICE, USDC, borrowed * 1_000_000).unwrap();

        let admin = boot.admin();
        let price = price_mantissa(Decimal::new(cents, 2), 6).unwrap();
        boot.engine.post_price(admin, &boot.oracle, USDC, price).unwrap();
        clock.advance(elapsed);
        boot.engine.accrue_interest(USDC).unwrap();

        let receipt = boot.engine.receipt_balance(BOB, USDC).unwrap();
        let redeemed = boot.engine.withdraw(BOB, USDC, receipt);
        prop_assert!(redeemed.is_ok(), "{:?}", redeemed);
        prop_assert_eq!(boot.engine.receipt_balance(BOB, USDC).unwrap(), 0);
        prop_assert!(boot.engine.exit_market(BOB, USDC).unwrap());
    }

    /// Accrual only ever raises the exchange rate
    #[test]
    fn exchange_rate_non_decreasing(
        borrowed in 1u128..=5_000u128,
        steps in proptest::collection::vec(1i64..=31_536_000i64, 1..6),
    ) {
        let (mut boot, clock) = funded_pair(&LendingConfig::testnet());
        boot.engine.borrow(ALICE, USDC, borrowed * 1_000_000).unwrap();

        let mut previous = boot.engine.market_state(USDC).unwrap().exchange_rate().unwrap();
        let mut previous_index = boot.engine.market_state(USDC).unwrap().borrow_index;
        for step in steps {
            clock.advance(step);
            boot.engine.accrue_interest(USDC).unwrap();
            let state = boot.engine.market_state(USDC).unwrap();
            let rate = state.exchange_rate().unwrap();
            prop_assert!(rate >= previous);
            prop_assert!(state.borrow_index >= previous_index);
            previous = rate;
            previous_index = state.borrow_index;
        }
    }

    /// An account is either liquid or short, never both
    #[test]
    fn liquidity_excludes_shortfall(cents in price_cents_strategy()) {
        let (mut boot, _clock) = funded_pair(&LendingConfig::default());
        boot.engine.borrow(ALICE, USDC, 5_000 * 1_000_000).unwrap();

        let admin = boot.admin();
        let price = price_mantissa(Decimal::new(cents, 2), 18).unwrap();
        boot.engine.post_price(admin, &boot.oracle, UNI, price).unwrap();

        let liquidity = boot.engine.account_liquidity(ALICE).unwrap();
        prop_assert!(liquidity.liquidity == 0 || liquidity.shortfall == 0);

        // 1,000 UNI at cf 0.5 is worth 5 * cents dollars against 5,000 owed
        let net = (5 * cents as i128 - 5_000) * WAD as i128;
        prop_assert_eq!(liquidity.liquidity as i128 - liquidity.shortfall as i128, net);
        prop_assert_eq!(liquidity.status() == RiskStatus::Shortfall, cents < 1_000);
    }
}
