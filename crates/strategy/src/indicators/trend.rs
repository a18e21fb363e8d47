use common::Candle;

use super::volatility::{atr_series, true_ranges};

/// Average Directional Index with Wilder smoothing.
///
/// DM and TR are smoothed from bar 1, DX is defined from index `period`
/// and the first ADX (mean of `period` DX values) lands at `2 * period - 1`.
pub fn adx_series(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    if period == 0 || candles.len() < 2 * period {
        return out;
    }

    let (plus_dm, minus_dm): (Vec<f64>, Vec<f64>) = candles
        .windows(2)
        .map(|w| {
            let up = w[1].high - w[0].high;
            let down = w[0].low - w[1].low;
            let plus = if up > down && up > 0.0 { up } else { 0.0 };
            let minus = if down > up && down > 0.0 { down } else { 0.0 };
            (plus, minus)
        })
        .unzip();
    let tr = true_ranges(candles);

    let n = period as f64;
    let mut s_tr = seed(&tr, period);
    let mut s_plus = seed(&plus_dm, period);
    let mut s_minus = seed(&minus_dm, period);

    let mut dx = Vec::with_capacity(tr.len() + 1 - period);
    dx.push(directional_index(s_tr, s_plus, s_minus));
    for i in period..tr.len() {
        s_tr = (s_tr * (n - 1.0) + tr[i]) / n;
        s_plus = (s_plus * (n - 1.0) + plus_dm[i]) / n;
        s_minus = (s_minus * (n - 1.0) + minus_dm[i]) / n;
        dx.push(directional_index(s_tr, s_plus, s_minus));
    }

    let mut adx = dx[..period].iter().sum::<f64>() / n;
    out[2 * period - 1] = adx;
    for (offset, value) in dx[period..].iter().enumerate() {
        adx = (adx * (n - 1.0) + value) / n;
        out[2 * period + offset] = adx;
    }
    out
}

fn seed(values: &[f64], period: usize) -> f64 {
    values[..period].iter().sum::<f64>() / period as f64
}

fn directional_index(tr: f64, plus_dm: f64, minus_dm: f64) -> f64 {
    if tr <= 0.0 {
        return 0.0;
    }
    let plus_di = 100.0 * plus_dm / tr;
    let minus_di = 100.0 * minus_dm / tr;
    let sum = plus_di + minus_di;
    if sum <= 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / sum
    }
}

/// Commodity Channel Index on the typical price, 0.015 scaling.
/// A window with no deviation reads 0.
pub fn cci_series(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    if period == 0 {
        return out;
    }
    let typical: Vec<f64> = candles
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();

    for i in period.saturating_sub(1)..typical.len() {
        let window = &typical[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let deviation = window.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;
        out[i] = if deviation > 0.0 {
            (typical[i] - mean) / (0.015 * deviation)
        } else {
            0.0
        };
    }
    out
}

/// Choppiness Index: `100 * log10(sum(TR) / (max high - min low)) / log10(period)`.
///
/// Low values mean trending, high values mean range-bound. Needs a
/// previous close for every true range, so the first value is at `period`.
pub fn choppiness_series(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    if period < 2 || candles.len() < period + 1 {
        return out;
    }
    let tr = true_ranges(candles);
    let scale = (period as f64).log10();

    for i in period..candles.len() {
        let window = &candles[i + 1 - period..=i];
        let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let range = high - low;
        if range <= 0.0 {
            continue;
        }
        // tr[j] belongs to candle j + 1
        let sum: f64 = tr[i - period..i].iter().sum();
        out[i] = 100.0 * (sum / range).log10() / scale;
    }
    out
}

/// Supertrend direction: `1.0` up, `-1.0` down, `NaN` before the ATR is defined.
///
/// Bands sit `multiplier` ATRs around the bar midpoint. The direction flips
/// when a close crosses the previous bar's opposite band, and the active
/// band only ratchets in the trend's favour.
pub fn supertrend_series(candles: &[Candle], period: usize, multiplier: f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    let atr = atr_series(candles, period);
    let Some(start) = atr.iter().position(|v| v.is_finite()) else {
        return out;
    };

    let bands = |i: usize| {
        let mid = (candles[i].high + candles[i].low) / 2.0;
        (mid + multiplier * atr[i], mid - multiplier * atr[i])
    };
    let (mut upper, mut lower) = bands(start);
    let mut direction = 1.0;
    out[start] = direction;

    for i in start + 1..candles.len() {
        let (mut next_upper, mut next_lower) = bands(i);
        let close = candles[i].close;
        if close > upper {
            direction = 1.0;
        } else if close < lower {
            direction = -1.0;
        } else {
            if direction > 0.0 && next_lower < lower {
                next_lower = lower;
            }
            if direction < 0.0 && next_upper > upper {
                next_upper = upper;
            }
        }
        upper = next_upper;
        lower = next_lower;
        out[i] = direction;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(closes: impl Iterator<Item = f64>) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .enumerate()
            .map(|(i, close)| Candle {
                open_time: start + Duration::minutes(5 * i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn adx_lookback_is_two_periods() {
        let cs = candles((0..40).map(|i| 100.0 + i as f64));
        let adx = adx_series(&cs, 14);
        assert!(adx[..27].iter().all(|v| v.is_nan()));
        assert!(adx[27..].iter().all(|v| v.is_finite()));
        assert!(adx_series(&cs[..27], 14).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn adx_is_high_in_one_way_markets_and_low_when_flat() {
        let up = candles((0..60).map(|i| 100.0 + i as f64));
        let down = candles((0..60).map(|i| 200.0 - i as f64));
        let flat = candles((0..60).map(|_| 100.0));
        assert!(*adx_series(&up, 14).last().unwrap() > 90.0);
        assert!(*adx_series(&down, 14).last().unwrap() > 90.0);
        assert_eq!(*adx_series(&flat, 14).last().unwrap(), 0.0);
    }

    #[test]
    fn cci_on_a_linear_rise() {
        // Deviation from the mean over 20 evenly spaced values: 9.5 / (0.015 * 5)
        let cs = candles((0..30).map(|i| 100.0 + i as f64));
        let cci = cci_series(&cs, 20);
        assert!(cci[..19].iter().all(|v| v.is_nan()));
        assert!((cci[29] - 126.666_666).abs() < 1e-3, "cci {}", cci[29]);
    }

    #[test]
    fn cci_is_zero_without_deviation() {
        let cs = candles((0..25).map(|_| 50.0));
        assert_eq!(*cci_series(&cs, 20).last().unwrap(), 0.0);
    }

    #[test]
    fn choppiness_separates_trend_from_range() {
        let trend = candles((0..30).map(|i| 100.0 + 2.0 * i as f64));
        let range = candles((0..30).map(|i| if i % 2 == 0 { 100.0 } else { 102.0 }));
        let trending = *choppiness_series(&trend, 14).last().unwrap();
        let choppy = *choppiness_series(&range, 14).last().unwrap();
        assert!(trending < 35.0, "trend chop {trending}");
        assert!(choppy > 60.0, "range chop {choppy}");
        assert!(choppiness_series(&trend, 14)[..14].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn supertrend_follows_the_trend_and_flips() {
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        closes.extend((1..=20).map(|i| 129.0 - 3.0 * i as f64));
        let st = supertrend_series(&candles(closes.into_iter()), 7, 3.0);
        assert!(st[..7].iter().all(|v| v.is_nan()));
        assert_eq!(st[29], 1.0);
        assert_eq!(*st.last().unwrap(), -1.0);
    }

    #[test]
    fn short_history_is_undefined() {
        let cs = candles((0..5).map(|i| i as f64));
        assert!(supertrend_series(&cs, 7, 3.0).iter().all(|v| v.is_nan()));
        assert!(cci_series(&cs, 20).iter().all(|v| v.is_nan()));
        assert!(choppiness_series(&cs, 14).iter().all(|v| v.is_nan()));
    }
}
