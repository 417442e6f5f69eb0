//! Entry and exit conditions.
//!
//! Each filter reads the snapshot of the last closed candle. An undefined
//! indicator never passes a filter.

use super::StrategySettings;
use crate::domain::{Candle, Side};
use crate::indicators::IndicatorSnapshot;

/// Trend alignment: slow trend pair and fast EMA/MA pair agree on `side`.
pub fn trend_aligned(side: Side, snap: &IndicatorSnapshot) -> bool {
    let (Some(ema), Some(ma), Some(fast), Some(slow)) =
        (snap.ema, snap.ma, snap.trend_fast, snap.trend_slow)
    else {
        return false;
    };
    match side {
        Side::Long => fast >= slow && ema > ma,
        Side::Short => fast < slow && ema < ma,
    }
}

/// Either the EMA/MA gap or the candle's own move is wide enough.
pub fn volatile_enough(snap: &IndicatorSnapshot, candle: &Candle, settings: &StrategySettings) -> bool {
    let gap_ok = match (snap.ema, snap.ma) {
        (Some(ema), Some(ma)) if ma != 0.0 => (ema - ma).abs() / ma > settings.gap_threshold,
        _ => false,
    };
    gap_ok || candle.fractional_move() > settings.move_threshold
}

/// ADX at or above the threshold; passes trivially when the filter is off.
pub fn strong_enough(snap: &IndicatorSnapshot, settings: &StrategySettings) -> bool {
    if !settings.adx_filter {
        return true;
    }
    snap.adx.is_some_and(|adx| adx >= settings.adx_threshold)
}

/// Volume spike plus a full-bodied candle; passes trivially when the filter is off.
pub fn convincing(snap: &IndicatorSnapshot, candle: &Candle, settings: &StrategySettings) -> bool {
    if !settings.conviction_filter {
        return true;
    }
    let Some(avg_volume) = snap.avg_volume else {
        return false;
    };
    candle.volume >= settings.volume_multiplier * avg_volume
        && candle.body_ratio() >= settings.min_body_ratio
}

/// Every entry condition for `side`.
pub fn should_open(
    side: Side,
    snap: &IndicatorSnapshot,
    candle: &Candle,
    settings: &StrategySettings,
) -> bool {
    trend_aligned(side, snap)
        && volatile_enough(snap, candle, settings)
        && strong_enough(snap, settings)
        && convincing(snap, candle, settings)
}

/// Trend reversal against an open `side`.
pub fn should_close(side: Side, snap: &IndicatorSnapshot) -> bool {
    let (Some(ema), Some(ma), Some(fast), Some(slow)) =
        (snap.ema, snap.ma, snap.trend_fast, snap.trend_slow)
    else {
        return false;
    };
    match side {
        Side::Long => ema < ma || fast < slow,
        Side::Short => ema > ma || fast >= slow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    fn bullish() -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema: Some(103.0),
            ma: Some(100.0),
            trend_fast: Some(101.0),
            trend_slow: Some(100.0),
            adx: Some(25.0),
            avg_volume: Some(1000.0),
        }
    }

    fn bearish() -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema: Some(97.0),
            ma: Some(100.0),
            trend_fast: Some(99.0),
            trend_slow: Some(100.0),
            ..bullish()
        }
    }

    fn strong_candle() -> Candle {
        let mut candle = make_candles(&[100.0, 104.0])[1].clone();
        candle.high = 104.5;
        candle.low = 99.5;
        candle.volume = 1500.0;
        candle
    }

    #[test]
    fn trend_requires_both_pairs() {
        assert!(trend_aligned(Side::Long, &bullish()));
        assert!(!trend_aligned(Side::Short, &bullish()));
        assert!(trend_aligned(Side::Short, &bearish()));

        // Equal trend pair counts as long, never as short.
        let mut flat_trend = bullish();
        flat_trend.trend_fast = Some(100.0);
        assert!(trend_aligned(Side::Long, &flat_trend));
    }

    #[test]
    fn undefined_indicators_fail() {
        let mut snap = bullish();
        snap.trend_slow = None;
        assert!(!trend_aligned(Side::Long, &snap));
        assert!(!should_close(Side::Long, &snap));

        let mut snap = bullish();
        snap.adx = None;
        assert!(!strong_enough(&snap, &StrategySettings::default()));
    }

    #[test]
    fn strength_threshold_is_inclusive() {
        let settings = StrategySettings::default();
        let mut snap = bullish();
        snap.adx = Some(settings.adx_threshold);
        assert!(strong_enough(&snap, &settings));
        snap.adx = Some(settings.adx_threshold - 0.01);
        assert!(!strong_enough(&snap, &settings));

        let off = StrategySettings {
            adx_filter: false,
            ..settings
        };
        snap.adx = None;
        assert!(strong_enough(&snap, &off));
    }

    #[test]
    fn volatility_accepts_gap_or_move() {
        let settings = StrategySettings::default();
        let mut quiet = strong_candle();
        quiet.close = quiet.open;
        assert!(volatile_enough(&bullish(), &quiet, &settings));

        let mut narrow = bullish();
        narrow.ema = Some(100.01);
        assert!(!volatile_enough(&narrow, &quiet, &settings));
        assert!(volatile_enough(&narrow, &strong_candle(), &settings));
    }

    #[test]
    fn conviction_needs_volume_and_body() {
        let settings = StrategySettings::default();
        assert!(convincing(&bullish(), &strong_candle(), &settings));

        let mut thin = strong_candle();
        thin.volume = 1100.0;
        assert!(!convincing(&bullish(), &thin, &settings));

        let mut wicky = strong_candle();
        wicky.high = 110.0;
        assert!(!convincing(&bullish(), &wicky, &settings));

        let mut no_history = bullish();
        no_history.avg_volume = None;
        assert!(!convincing(&no_history, &strong_candle(), &settings));
    }

    #[test]
    fn exits_mirror_each_other() {
        assert!(!should_close(Side::Long, &bullish()));
        assert!(should_close(Side::Long, &bearish()));
        assert!(should_close(Side::Short, &bullish()));
        assert!(!should_close(Side::Short, &bearish()));

        // A tied trend pair exits a short.
        let mut snap = bearish();
        snap.trend_fast = Some(100.0);
        assert!(should_close(Side::Short, &snap));
    }

    #[test]
    fn full_entry_check() {
        let settings = StrategySettings::default();
        assert!(should_open(Side::Long, &bullish(), &strong_candle(), &settings));
        assert!(!should_open(Side::Short, &bullish(), &strong_candle(), &settings));
    }
}
