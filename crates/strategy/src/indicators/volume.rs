use common::Candle;

/// On-balance volume, starting from zero at the first bar.
pub fn obv_series(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let mut obv = 0.0;
    for (i, c) in candles.iter().enumerate() {
        if i > 0 {
            let prev = candles[i - 1].close;
            if c.close > prev {
                obv += c.volume;
            } else if c.close < prev {
                obv -= c.volume;
            }
        }
        out.push(obv);
    }
    out
}

/// Volume-weighted average of the typical price, re-anchored at each UTC day.
pub fn vwap_series(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let mut day = None;
    let mut pv = 0.0;
    let mut vol = 0.0;
    for c in candles {
        let d = c.open_time.date_naive();
        if day != Some(d) {
            day = Some(d);
            pv = 0.0;
            vol = 0.0;
        }
        let typical = (c.high + c.low + c.close) / 3.0;
        pv += typical * c.volume;
        vol += c.volume;
        out.push(if vol > 0.0 { pv / vol } else { f64::NAN });
    }
    out
}
