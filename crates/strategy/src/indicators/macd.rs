use super::moving::ema_series;

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// Computes: MACD line = EMA(fast) − EMA(slow), Signal = EMA(macd_line, signal_period),
/// Histogram = MACD − Signal.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(
            fast < slow,
            "MACD fast period must be less than slow period"
        );
        Self { fast, slow, signal }
    }

    /// MACD, signal and histogram lines for a slice of closes (oldest first).
    pub fn series(&self, closes: &[f64]) -> MacdSeries {
        let fast = ema_series(closes, self.fast);
        let slow = ema_series(closes, self.slow);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_series(&macd, self.signal);
        let hist = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();
        MacdSeries { macd, signal, hist }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_is_nan_with_insufficient_data() {
        let macd = MacdIndicator::new(12, 26, 9);
        let series = macd.series(&[100.0; 30]); // need >= 34 for the signal line
        assert!(series.hist.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn macd_defined_with_sufficient_data() {
        let macd = MacdIndicator::new(12, 26, 9);
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let series = macd.series(&prices);
        assert!(series.hist.last().unwrap().is_finite());
    }

    #[test]
    fn macd_positive_on_steady_uptrend() {
        let macd = MacdIndicator::new(3, 6, 3);
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + i as f64 * 0.5).collect();
        let series = macd.series(&prices);
        assert!(*series.macd.last().unwrap() > 0.0);
    }

    #[test]
    fn macd_sharp_reversal_turns_histogram_positive() {
        let macd = MacdIndicator::new(3, 6, 3);
        let mut prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64 * 0.5).collect();
        prices.extend((0..5).map(|i| 90.0 + i as f64 * 3.0));
        let series = macd.series(&prices);
        assert!(*series.hist.last().unwrap() > 0.0);
    }
}
