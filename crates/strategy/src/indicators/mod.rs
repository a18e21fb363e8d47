//! Series indicators over close/OHLCV data.
//!
//! Every function returns a vector aligned with its input, holding `NaN`
//! wherever the lookback is not yet satisfied.

pub mod macd;
pub mod moving;
pub mod patterns;
pub mod rsi;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use macd::{MacdIndicator, MacdSeries};
pub use moving::{ema_series, sma_series};
pub use patterns::{bullish_engulfing_series, hammer_series};
pub use rsi::RsiIndicator;
pub use trend::{adx_series, cci_series, choppiness_series, supertrend_series};
pub use volatility::{atr_series, bollinger_series, Bands};
pub use volume::{obv_series, vwap_series};

/// Last value of a series, `NaN` if empty.
pub fn last(series: &[f64]) -> f64 {
    series.last().copied().unwrap_or(f64::NAN)
}
