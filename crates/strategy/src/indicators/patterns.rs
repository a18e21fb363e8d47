//! Single and two-candle patterns, as `1.0` (present) / `0.0` series.

use common::Candle;

/// Bullish engulfing: a down candle followed by an up candle whose body
/// covers the previous body. The first bar has no predecessor and is `NaN`.
pub fn bullish_engulfing_series(candles: &[Candle]) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    for (i, w) in candles.windows(2).enumerate() {
        let (prev, curr) = (&w[0], &w[1]);
        let engulfs = prev.close < prev.open
            && curr.close > curr.open
            && curr.close >= prev.open
            && curr.open <= prev.close
            && (curr.close > prev.open || curr.open < prev.close);
        out[i + 1] = flag(engulfs);
    }
    out
}

/// Hammer: small body in the top of the range, a lower shadow at least
/// twice the body and most of the range, almost no upper shadow.
pub fn hammer_series(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .map(|c| {
            let range = c.high - c.low;
            if range <= 0.0 {
                return 0.0;
            }
            let body = (c.close - c.open).abs();
            let lower_shadow = c.open.min(c.close) - c.low;
            let upper_shadow = c.high - c.open.max(c.close);
            flag(
                body <= 0.3 * range
                    && lower_shadow >= 2.0 * body
                    && lower_shadow >= 0.6 * range
                    && upper_shadow <= 0.1 * range,
            )
        })
        .collect()
}

fn flag(present: bool) -> f64 {
    if present {
        1.0
    } else {
        0.0
    }
}
