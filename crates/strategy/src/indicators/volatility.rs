use common::Candle;

use super::moving::sma_series;

/// Average True Range with Wilder smoothing.
///
/// The first value is the plain mean of the first `period` true ranges
/// and lands at index `period` (the first bar has no previous close).
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    let ranges = true_ranges(candles);
    let mut atr = ranges[..period].iter().sum::<f64>() / period as f64;
    out[period] = atr;
    for (offset, tr) in ranges[period..].iter().enumerate() {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
        out[period + 1 + offset] = atr;
    }
    out
}

/// True range of every candle after the first; `result[i]` belongs to
/// `candles[i + 1]`.
pub(crate) fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let c = &w[1];
            (c.high - c.low)
                .max((c.high - prev_close).abs())
                .max((c.low - prev_close).abs())
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger bands: SMA(period) ± `width` population standard deviations.
pub fn bollinger_series(closes: &[f64], period: usize, width: f64) -> Bands {
    let middle = sma_series(closes, period);
    let mut upper = vec![f64::NAN; closes.len()];
    let mut lower = vec![f64::NAN; closes.len()];

    for i in 0..closes.len() {
        let mean = middle[i];
        if !mean.is_finite() {
            continue;
        }
        let window = &closes[i + 1 - period..=i];
        let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / period as f64;
        let dev = variance.sqrt() * width;
        upper[i] = mean + dev;
        lower[i] = mean - dev;
    }

    Bands {
        upper,
        middle,
        lower,
    }
}
