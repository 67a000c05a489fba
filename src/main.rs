//! Lending market simulation.
//!
//! Walks the engine through supply and redeem, a price-driven liquidation, a
//! flash-funded liquidation and a year of interest accrual. Set `RUST_LOG=debug`
//! to see accrual and controller decisions as they happen.

use lending_core::math::{from_raw_units, to_raw_units};
use lending_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const UNI: MarketId = MarketId(1);
const USDC: MarketId = MarketId(2);

const ALICE: AccountId = AccountId(1);
const BOB: AccountId = AccountId(2);
const CAROL: AccountId = AccountId(3);
const LENDER: AccountId = AccountId(10);
const DEX: AccountId = AccountId(11);

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Lending Market Engine Simulation");
    println!("UNI (18 decimals) and USDC (6 decimals), admin-posted prices\n");

    scenario_1_supply_and_redeem()?;
    scenario_2_borrow_and_liquidate()?;
    scenario_3_flash_funded_liquidation()?;
    scenario_4_interest_accrual()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn bootstrap(config: &LendingConfig) -> Result<(Bootstrap, ManualClock), EngineError> {
    let clock = ManualClock::new(Timestamp::from_secs(0));
    let boot = Engine::from_config(config, Arc::new(clock.clone()))?;
    Ok((boot, clock))
}

fn usdc(amount: Decimal) -> Result<u128, EngineError> {
    Ok(to_raw_units(amount, 6)?)
}

fn uni(amount: Decimal) -> Result<u128, EngineError> {
    Ok(to_raw_units(amount, 18)?)
}

fn show(raw: u128, decimals: u32) -> Decimal {
    from_raw_units(raw, decimals)
}

/// Supplying mints receipt units; redeeming burns them for underlying.
fn scenario_1_supply_and_redeem() -> Result<(), EngineError> {
    println!("Scenario 1: Supply and Redeem\n");

    let (mut boot, _clock) = bootstrap(&LendingConfig::default())?;
    boot.fund(USDC, ALICE, usdc(dec!(10000))?)?;

    let minted = boot.engine.deposit(ALICE, USDC, usdc(dec!(10000))?)?;
    println!("  Alice supplies 10,000 USDC, receives {} cUSDC", show(minted.receipt, 18));

    let redeemed = boot.engine.withdraw(ALICE, USDC, minted.receipt / 2)?;
    println!("  Alice redeems half, gets back {} USDC", show(redeemed.underlying, 6));

    let redeemed = boot.engine.withdraw_underlying(ALICE, USDC, usdc(dec!(1234.5))?)?;
    println!(
        "  Alice withdraws exactly 1,234.5 USDC, burning {} cUSDC",
        show(redeemed.receipt, 18)
    );
    println!(
        "  Remaining: {} cUSDC, wallet {} USDC\n",
        show(boot.engine.receipt_balance(ALICE, USDC)?, 18),
        show(boot.balance(USDC, ALICE)?, 6)
    );
    Ok(())
}

fn underwater_borrower(boot: &mut Bootstrap) -> Result<(), EngineError> {
    let admin = boot.admin();
    boot.fund(UNI, ALICE, uni(dec!(1000))?)?;
    boot.fund(USDC, BOB, usdc(dec!(10000))?)?;

    boot.engine.deposit(ALICE, UNI, uni(dec!(1000))?)?;
    boot.engine.enter_markets(ALICE, &[UNI])?;
    boot.engine.deposit(BOB, USDC, usdc(dec!(10000))?)?;
    println!("  Alice supplies 1,000 UNI @ $10 (cf 0.5) and enters the market");
    println!("  Bob supplies 10,000 USDC");

    let liquidity = boot.engine.account_liquidity(ALICE)?;
    println!("  Alice's borrowing power: ${}", show(liquidity.liquidity, 18));

    boot.engine.borrow(ALICE, USDC, usdc(dec!(5000))?)?;
    println!("  Alice borrows 5,000 USDC");

    let price = price_mantissa(dec!(6.2), 18)?;
    boot.engine.post_price(admin, &boot.oracle, UNI, price)?;
    let liquidity = boot.engine.account_liquidity(ALICE)?;
    println!("  UNI drops to $6.2, shortfall ${}", show(liquidity.shortfall, 18));
    Ok(())
}

/// Price drop pushes a borrower under water; a liquidator repays half the debt.
fn scenario_2_borrow_and_liquidate() -> Result<(), EngineError> {
    println!("Scenario 2: Borrow and Liquidate\n");

    let (mut boot, _clock) = bootstrap(&LendingConfig::default())?;
    underwater_borrower(&mut boot)?;

    boot.fund(USDC, CAROL, usdc(dec!(2500))?)?;
    match boot.engine.liquidate_borrow(CAROL, ALICE, USDC, usdc(dec!(2600))?, UNI) {
        Err(err) => println!("  Carol tries to repay 2,600 USDC: {err}"),
        Ok(_) => println!("  Unexpected: oversized liquidation went through"),
    }

    let result = boot.engine.liquidate_borrow(CAROL, ALICE, USDC, usdc(dec!(2500))?, UNI)?;
    println!(
        "  Carol repays {} USDC, seizes {} cUNI",
        show(result.repay_amount, 6),
        show(result.seized_receipt, 18)
    );

    let summary = boot.engine.account_summary(ALICE)?;
    println!(
        "  Alice now owes {} USDC, status {:?}\n",
        show(result.remaining_borrow, 6),
        summary.status()
    );
    Ok(())
}

/// The liquidator starts with nothing: borrows USDC from a lender, liquidates,
/// redeems the seized UNI, sells it and pays the lender back with a fee.
fn scenario_3_flash_funded_liquidation() -> Result<(), EngineError> {
    println!("Scenario 3: Flash-Funded Liquidation\n");

    let (mut boot, _clock) = bootstrap(&LendingConfig::default())?;
    underwater_borrower(&mut boot)?;

    let loan = usdc(dec!(2500))?;
    let fee = usdc(dec!(2.25))?;
    boot.fund(USDC, LENDER, loan)?;
    boot.fund(USDC, DEX, usdc(dec!(100000))?)?;

    let mut usdc_token = boot.token(USDC)?.clone();
    let mut uni_token = boot.token(UNI)?.clone();
    usdc_token
        .transfer(Holder::Account(LENDER), Holder::Account(CAROL), loan)
        .map_err(EngineError::TransferFailed)?;
    boot.token(USDC)?
        .clone()
        .approve(Holder::Account(CAROL), Holder::Pool(USDC), u128::MAX)
        .map_err(EngineError::TransferFailed)?;
    println!("  Carol borrows 2,500 USDC from the lender");

    let result = boot.engine.liquidate_borrow(CAROL, ALICE, USDC, loan, UNI)?;
    let redeemed = boot.engine.withdraw(CAROL, UNI, result.seized_receipt)?;
    println!("  Carol liquidates and redeems {} UNI", show(redeemed.underlying, 18));

    // the dex pays the oracle price
    let proceeds = usdc(show(redeemed.underlying, 18) * dec!(6.2))?;
    uni_token
        .transfer(Holder::Account(CAROL), Holder::Account(DEX), redeemed.underlying)
        .map_err(EngineError::TransferFailed)?;
    usdc_token
        .transfer(Holder::Account(DEX), Holder::Account(CAROL), proceeds)
        .map_err(EngineError::TransferFailed)?;
    println!("  Carol sells the UNI for {} USDC", show(proceeds, 6));

    usdc_token
        .transfer(Holder::Account(CAROL), Holder::Account(LENDER), loan + fee)
        .map_err(EngineError::TransferFailed)?;
    println!(
        "  Carol repays the loan plus {} USDC fee, keeps {} USDC\n",
        show(fee, 6),
        show(boot.balance(USDC, CAROL)?, 6)
    );
    Ok(())
}

/// A year of interest at 50% utilization with a 10% reserve factor.
fn scenario_4_interest_accrual() -> Result<(), EngineError> {
    println!("Scenario 4: Interest Accrual\n");

    let (mut boot, clock) = bootstrap(&LendingConfig::testnet())?;
    boot.fund(UNI, ALICE, uni(dec!(1000))?)?;
    boot.fund(USDC, BOB, usdc(dec!(10000))?)?;
    boot.engine.deposit(ALICE, UNI, uni(dec!(1000))?)?;
    boot.engine.enter_markets(ALICE, &[UNI])?;
    boot.engine.deposit(BOB, USDC, usdc(dec!(10000))?)?;
    boot.engine.borrow(ALICE, USDC, usdc(dec!(5000))?)?;

    let ledger = boot.engine.market(USDC)?;
    println!(
        "  Borrow rate {}/s, supply rate {}/s",
        ledger.borrow_rate_per_second()?,
        ledger.supply_rate_per_second()?
    );

    clock.advance(31_536_000);
    boot.engine.accrue_interest(USDC)?;

    let state = boot.engine.market_state(USDC)?;
    println!("  After one year:");
    println!("    borrow index   {}", state.borrow_index);
    println!("    total borrows  {} USDC", show(state.total_borrows, 6));
    println!("    reserves       {} USDC", show(state.total_reserves, 6));
    println!("    exchange rate  {}", state.exchange_rate()?);
    println!(
        "    Alice owes     {} USDC",
        show(boot.engine.borrow_balance_stored(ALICE, USDC)?, 6)
    );
    println!(
        "    Bob can redeem {} USDC",
        show(boot.engine.underlying_balance(BOB, USDC)?, 6)
    );

    let events = boot.engine.events().len();
    println!("  {events} audit events recorded");
    Ok(())
}
