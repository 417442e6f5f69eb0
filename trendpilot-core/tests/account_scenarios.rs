//! Worked account scenarios: fees, cooldown, reserve, monthly settlement.

use chrono::{Duration, TimeZone, Utc};
use trendpilot_core::account::{RiskAccount, RiskParams};
use trendpilot_core::domain::{Candle, PositionState, Side};
use trendpilot_core::indicators::{IndicatorSet, IndicatorSnapshot};
use trendpilot_core::strategy::{
    NullSink, SkipReason, StrategyContext, StrategyEvaluator, StrategySettings,
};

const T_OPEN: &str = "2024-02-10 08:00:00.000000";
const T_CLOSE: &str = "2024-02-10 09:15:00.000000";

fn params() -> RiskParams {
    RiskParams {
        first_balance: 1000.0,
        tactical_balance: 1000.0,
        trade_amount_percent: 0.05,
        fee_rate: 0.0005,
        cooldown_after_big_pnl: 3,
        monthly_close_filter: false,
        ..RiskParams::default()
    }
}

// ── Fee scenario ─────────────────────────────────────────────────────

#[test]
fn long_trade_with_fee() {
    let mut account = RiskAccount::new(params());
    let mut position = PositionState::Flat;

    let opened = account
        .open_position(Side::Long, 100.0, T_OPEN, &mut position)
        .unwrap();
    assert_eq!(opened.margin, 50.0);
    assert_eq!(opened.leverage, 5);
    assert_eq!(opened.position_size, 2.5);

    let before_close = account.balance;
    let closed = account
        .close_position(Side::Long, 104.0, T_CLOSE, &mut position)
        .unwrap();

    assert!((closed.pnl - 10.0).abs() < 1e-12);
    assert!((closed.fee - 0.255).abs() < 1e-12);
    assert!((account.balance - before_close - 59.745).abs() < 1e-9);
    assert!((closed.profit - 9.745).abs() < 1e-9);
    // Shadow balance ignores the fee.
    assert!((account.balance_without_fee - 1010.0).abs() < 1e-9);
    assert_eq!(closed.duration.unwrap().total_minutes(), 75);
}

// ── Cooldown scenario ────────────────────────────────────────────────

fn candles(n: usize) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2024, 2, 10, 8, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let open_time = base + Duration::minutes(15 * i as i64);
            Candle {
                open_time,
                open: 100.0,
                high: 104.5,
                low: 99.5,
                close: 104.0,
                volume: 1500.0,
                close_time: open_time + Duration::minutes(15) - Duration::milliseconds(1),
            }
        })
        .collect()
}

fn bullish_set(len: usize) -> IndicatorSet {
    let snap = IndicatorSnapshot {
        ema: Some(103.0),
        ma: Some(100.0),
        trend_fast: Some(101.0),
        trend_slow: Some(100.0),
        adx: Some(30.0),
        avg_volume: Some(1000.0),
    };
    IndicatorSet {
        ema: vec![snap.ema; len],
        ma: vec![snap.ma; len],
        trend_fast: vec![snap.trend_fast; len],
        trend_slow: vec![snap.trend_slow; len],
        adx: vec![snap.adx; len],
        avg_volume: vec![snap.avg_volume; len],
    }
}

#[test]
fn big_win_triggers_cooldown() {
    let mut account = RiskAccount::new(params());
    let mut position = PositionState::Flat;
    account
        .open_position(Side::Long, 100.0, T_OPEN, &mut position)
        .unwrap();
    // pnl% = 2.5 * 4 / 50 * 100 = 20; unleveraged = 20 / 5 = 4 -> exactly at threshold
    let closed = account
        .close_position(Side::Long, 104.0, T_CLOSE, &mut position)
        .unwrap();

    assert!(closed.cooldown_activated);
    assert_eq!(account.cooldown_until_index, 3);
}

#[test]
fn small_win_leaves_cooldown_alone() {
    let mut account = RiskAccount::new(params());
    let mut position = PositionState::Flat;
    account
        .open_position(Side::Long, 100.0, T_OPEN, &mut position)
        .unwrap();
    let closed = account
        .close_position(Side::Long, 103.0, T_CLOSE, &mut position)
        .unwrap();

    assert!(!closed.cooldown_activated);
    assert_eq!(account.cooldown_until_index, 0);
}

#[test]
fn cooldown_suppresses_next_cycles() {
    let candles = candles(8);
    let set = bullish_set(candles.len());
    let mut ctx = StrategyContext::new(params());
    ctx.account.cooldown_until_index = 3;
    let mut evaluator = StrategyEvaluator::new(StrategySettings::default(), NullSink);

    for (i, expected_left) in [(1, 2), (2, 1), (3, 0)] {
        let outcome = evaluator.evaluate(&mut ctx, &candles, &set, i);
        assert_eq!(
            outcome.skipped,
            Some(SkipReason::Cooldown {
                remaining: expected_left
            })
        );
        assert!(outcome.is_idle());
        assert!(ctx.position.is_flat());
    }

    // Conditions held all along; the first free cycle opens.
    let outcome = evaluator.evaluate(&mut ctx, &candles, &set, 4);
    assert_eq!(outcome.skipped, None);
    assert_eq!(outcome.opened().count(), 1);
}

// ── Reserve replenishment ────────────────────────────────────────────

#[test]
fn reserve_refills_low_balance() {
    let mut account = RiskAccount::new(RiskParams {
        fee_rate: 0.0,
        ..params()
    });
    account.balance = 700.0;
    account.balance_without_fee = 700.0;
    account.save_money = 300.0;
    let mut position = PositionState::Flat;

    // 700 >= 500 -> margin = 50; total 700 <= 900 -> 3x
    let opened = account
        .open_position(Side::Long, 100.0, T_OPEN, &mut position)
        .unwrap();
    assert_eq!(opened.leverage, 3);

    let closed = account
        .close_position(Side::Long, 100.0, T_CLOSE, &mut position)
        .unwrap();

    assert_eq!(closed.replenished, Some(250.0));
    assert!((closed.balance_after_trade - 700.0).abs() < 1e-9);
    assert!((account.balance - 950.0).abs() < 1e-9);
    assert!((account.save_money - 50.0).abs() < 1e-9);
    assert_eq!(closed.save_money_at_close, 300.0);
}

#[test]
fn reserve_too_small_is_left_alone() {
    let mut account = RiskAccount::new(RiskParams {
        fee_rate: 0.0,
        ..params()
    });
    account.balance = 700.0;
    account.save_money = 249.0;
    let mut position = PositionState::Flat;
    account
        .open_position(Side::Short, 100.0, T_OPEN, &mut position)
        .unwrap();
    let closed = account
        .close_position(Side::Short, 100.0, T_CLOSE, &mut position)
        .unwrap();

    assert_eq!(closed.replenished, None);
    assert_eq!(account.save_money, 249.0);
}

// ── Monthly settlement ───────────────────────────────────────────────

#[test]
fn settlement_pauses_until_month_changes() {
    let base = Utc.with_ymd_and_hms(2024, 2, 29, 23, 0, 0).unwrap();
    let candles: Vec<Candle> = (0..6)
        .map(|i| {
            let open_time = base + Duration::minutes(15 * i as i64);
            Candle {
                open_time,
                open: if i < 2 { 100.0 } else { 140.0 },
                high: 145.0,
                low: 99.0,
                close: 140.0,
                volume: 1500.0,
                close_time: open_time + Duration::minutes(15) - Duration::milliseconds(1),
            }
        })
        .collect();

    let mut ctx = StrategyContext::new(RiskParams {
        fee_rate: 0.0,
        monthly_close_filter: true,
        monthly_profit_stop_percent: 6.0,
        monthly_compound_percent: 3.0,
        ..params()
    });
    ctx.account
        .open_position(Side::Long, 100.0, T_OPEN, &mut ctx.position)
        .unwrap();
    let closed = ctx
        .account
        .close_position(Side::Long, 140.0, T_CLOSE, &mut ctx.position)
        .unwrap();
    assert!(closed.settlement.is_some());
    assert!(!ctx.account.trading_enabled);

    let set = bullish_set(candles.len());
    let mut evaluator = StrategyEvaluator::new(StrategySettings::default(), NullSink);

    // 23:15, 23:30, 23:45 are still February.
    for i in 1..4 {
        let outcome = evaluator.evaluate(&mut ctx, &candles, &set, i);
        assert_eq!(outcome.skipped, Some(SkipReason::TradingPaused));
        assert!(ctx.position.is_flat());
    }

    // 00:00 on March 1st re-enables trading.
    let outcome = evaluator.evaluate(&mut ctx, &candles, &set, 4);
    assert!(outcome.month_rolled);
    assert!(ctx.account.trading_enabled);
    assert_eq!(ctx.account.profit_percent_per_month, 0.0);
    let archived = &ctx.account.monthly_history[0];
    assert_eq!((archived.year, archived.month), (2024, 2));
    assert!((archived.profit_percent - 10.0).abs() < 1e-9);
}
