//! Column-oriented candle frame with indicator columns, plus the as-of
//! merge used to join a higher timeframe onto a lower one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::Candle;

use crate::indicators::{
    adx_series, atr_series, bollinger_series, bullish_engulfing_series, cci_series,
    choppiness_series, ema_series, hammer_series, obv_series, supertrend_series, vwap_series,
    MacdIndicator, RsiIndicator,
};

pub const RSI_PERIOD: usize = 9;
pub const ATR_PERIOD: usize = 14;
pub const BB_PERIOD: usize = 20;
pub const ADX_PERIOD: usize = 14;
pub const CCI_PERIOD: usize = 20;
pub const CHOP_PERIOD: usize = 14;
pub const SUPERTREND_PERIOD: usize = 7;
pub const SUPERTREND_MULTIPLIER: f64 = 3.0;

/// Candles plus derived columns, all aligned on `times` (candle open time).
#[derive(Debug, Clone, Default)]
pub struct Frame {
    times: Vec<DateTime<Utc>>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.times.len());
        self.columns.insert(name.into(), values);
    }

    /// Value of `name` at row `index`, `NaN` when absent.
    pub fn value(&self, name: &str, index: usize) -> f64 {
        self.columns
            .get(name)
            .and_then(|col| col.get(index))
            .copied()
            .unwrap_or(f64::NAN)
    }

    pub fn row(&self, index: usize) -> Row {
        Row(self
            .columns
            .iter()
            .filter_map(|(name, col)| col.get(index).map(|v| (name.clone(), *v)))
            .collect())
    }

    /// The most recent row; empty if the frame has no rows.
    pub fn latest(&self) -> Row {
        match self.len() {
            0 => Row::default(),
            n => self.row(n - 1),
        }
    }
}

/// One row of a frame, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, f64>);

impl Row {
    /// Column value, `NaN` if the column does not exist.
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(f64::NAN)
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }
}

/// Build a frame from candles (oldest first) with every indicator column.
pub fn compute_indicators(candles: &[Candle]) -> Frame {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let mut frame = Frame {
        times: candles.iter().map(|c| c.open_time).collect(),
        columns: BTreeMap::new(),
    };

    frame.insert("open", candles.iter().map(|c| c.open).collect());
    frame.insert("high", candles.iter().map(|c| c.high).collect());
    frame.insert("low", candles.iter().map(|c| c.low).collect());
    frame.insert("volume", candles.iter().map(|c| c.volume).collect());

    frame.insert("ema8", ema_series(&closes, 8));
    frame.insert("ema21", ema_series(&closes, 21));
    frame.insert("ema200", ema_series(&closes, 200));
    frame.insert("rsi", RsiIndicator::new(RSI_PERIOD).series(&closes));

    let macd = MacdIndicator::new(12, 26, 9).series(&closes);
    frame.insert("macd", macd.macd);
    frame.insert("macd_signal", macd.signal);
    frame.insert("macd_hist", macd.hist);

    let bands = bollinger_series(&closes, BB_PERIOD, 2.0);
    frame.insert("bb_upper", bands.upper);
    frame.insert("bb_middle", bands.middle);
    frame.insert("bb_lower", bands.lower);

    frame.insert("atr", atr_series(candles, ATR_PERIOD));
    frame.insert("adx", adx_series(candles, ADX_PERIOD));
    frame.insert("cci", cci_series(candles, CCI_PERIOD));
    frame.insert("chop", choppiness_series(candles, CHOP_PERIOD));
    frame.insert(
        "supertrend",
        supertrend_series(candles, SUPERTREND_PERIOD, SUPERTREND_MULTIPLIER),
    );
    frame.insert("engulfing", bullish_engulfing_series(candles));
    frame.insert("hammer", hammer_series(candles));
    frame.insert("obv", obv_series(candles));
    frame.insert("vwap", vwap_series(candles));
    frame.insert("close", closes);
    frame
}

/// Backward as-of merge: each `lower` row receives the columns of the most
/// recent `higher` row whose open time is not after its own, renamed with
/// `suffix`. Rows with no such higher row get `NaN`.
pub fn align(lower: &Frame, higher: &Frame, suffix: &str) -> Frame {
    let mut merged = lower.clone();

    // Index into `higher` for each lower row; `times` are ascending in both.
    let mut matches = Vec::with_capacity(lower.len());
    let mut j = 0;
    for t in &lower.times {
        while j < higher.len() && higher.times[j] <= *t {
            j += 1;
        }
        matches.push(j.checked_sub(1));
    }

    for (name, col) in &higher.columns {
        let values = matches
            .iter()
            .map(|m| m.map_or(f64::NAN, |idx| col[idx]))
            .collect();
        merged.insert(format!("{name}{suffix}"), values);
    }
    merged
}
