//! ADX: Average Directional Index (Wilder).
//!
//! Steps:
//! 1. True range and +DM / -DM from consecutive candles (undefined at index 0)
//! 2. Wilder-smooth TR, +DM and -DM (alpha = 1/period, no bias adjustment)
//! 3. +DI = 100 * smoothed(+DM) / smoothed(TR), -DI likewise
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 5. ADX = Wilder-smoothed DX
//!
//! DX is `None` ("no signal") wherever +DI + -DI == 0 or smoothed TR == 0.
//! The final smoothing carries the previous ADX across such gaps.

use super::{Indicator, IndicatorSeries};
use crate::domain::Candle;

/// True range per index; `None` at index 0 and where any input is NaN.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> IndicatorSeries {
    let n = aligned_len(high, low, close);
    let mut tr = vec![None; n];

    for i in 1..n {
        let (h, l, pc) = (high[i], low[i], close[i - 1]);
        if h.is_nan() || l.is_nan() || pc.is_nan() {
            continue;
        }
        tr[i] = Some((h - l).max((h - pc).abs()).max((l - pc).abs()));
    }

    tr
}

/// +DM and -DM per index; `None` at index 0.
pub fn directional_movement(high: &[f64], low: &[f64]) -> (IndicatorSeries, IndicatorSeries) {
    let n = high.len().min(low.len());
    let mut plus_dm = vec![None; n];
    let mut minus_dm = vec![None; n];

    for i in 1..n {
        if high[i].is_nan() || low[i].is_nan() || high[i - 1].is_nan() || low[i - 1].is_nan() {
            continue;
        }
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];

        plus_dm[i] = Some(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm[i] = Some(if down > up && down > 0.0 { down } else { 0.0 });
    }

    (plus_dm, minus_dm)
}

/// Wilder smoothing: exponential weighting with `alpha = 1/period`, no bias
/// adjustment, seeded from the first defined value.
///
/// Missing inputs still age the running weight, so the first value after a
/// gap counts for more than `alpha`. Output at a missing input repeats the
/// previous smoothed value; before the first defined input it is `None`.
pub fn wilder_smooth(series: &[Option<f64>], period: usize) -> IndicatorSeries {
    let n = series.len();
    let mut result = vec![None; n];
    if period == 0 || n == 0 {
        return result;
    }

    let alpha = 1.0 / period as f64;
    let decay = 1.0 - alpha;
    let mut weighted: Option<f64> = None;
    let mut old_weight = 1.0;

    for (i, &cur) in series.iter().enumerate() {
        let cur = cur.filter(|v| !v.is_nan());
        match (weighted, cur) {
            (None, Some(v)) => weighted = Some(v),
            (Some(w), obs) => {
                old_weight *= decay;
                if let Some(v) = obs {
                    if w != v {
                        weighted = Some((old_weight * w + alpha * v) / (old_weight + alpha));
                    }
                    old_weight = 1.0;
                }
            }
            (None, None) => {}
        }
        result[i] = weighted;
    }

    result
}

/// Directional strength index over parallel high/low/close series.
pub fn directional_strength_index(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> IndicatorSeries {
    let n = aligned_len(high, low, close);
    if period == 0 {
        return vec![None; n];
    }

    let tr = true_range(high, low, close);
    let (plus_dm, minus_dm) = directional_movement(&high[..n], &low[..n]);

    let smooth_tr = wilder_smooth(&tr, period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    let dx: IndicatorSeries = (0..n)
        .map(|i| match (smooth_tr[i], smooth_plus[i], smooth_minus[i]) {
            (Some(tr), Some(p), Some(m)) if tr != 0.0 => {
                let plus_di = 100.0 * p / tr;
                let minus_di = 100.0 * m / tr;
                let di_sum = plus_di + minus_di;
                if di_sum == 0.0 {
                    None
                } else {
                    Some(100.0 * (plus_di - minus_di).abs() / di_sum)
                }
            }
            _ => None,
        })
        .collect();

    wilder_smooth(&dx, period)
}

fn aligned_len(high: &[f64], low: &[f64], close: &[f64]) -> usize {
    debug_assert!(
        high.len() == low.len() && low.len() == close.len(),
        "high/low/close must be aligned"
    );
    high.len().min(low.len()).min(close.len())
}

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADX period must be >= 1");
        Self {
            period,
            name: format!("adx_{period}"),
        }
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period
    }

    fn compute(&self, candles: &[Candle]) -> IndicatorSeries {
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        directional_strength_index(&high, &low, &close, self.period)
    }
}
