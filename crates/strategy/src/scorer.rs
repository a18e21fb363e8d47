use common::MarketSnapshot;

use crate::config::ScoringConfig;
use crate::frame::{align, compute_indicators, Row};

/// Suffix given to higher-timeframe columns after alignment.
pub const HIGHER_TF_SUFFIX: &str = "_15m";

/// Result of scoring one snapshot.
#[derive(Debug, Clone)]
pub struct Assessment {
    /// Weighted share of passed checks, clamped into [0, 1].
    pub confidence: f64,
    /// Passed checks and context notes, in evaluation order.
    pub reasons: Vec<String>,
    /// Latest close of the lower timeframe.
    pub price: f64,
    /// Latest ATR of the lower timeframe; `NaN` if history is too short.
    pub atr: f64,
    /// Latest merged indicator row, for rationale building.
    pub row: Row,
}

/// Turns a market snapshot into a confidence score.
///
/// Implementations must be deterministic for identical snapshots and must
/// treat missing indicator values as failed checks.
pub trait Scorer: Send + Sync {
    fn assess(&self, snapshot: &MarketSnapshot) -> Assessment;
}

/// Weighted checklist over 5m/15m indicators, order book and trending set.
#[derive(Debug, Clone, Default)]
pub struct ChecklistScorer {
    config: ScoringConfig,
}

/// Every weighted check key, in evaluation order.
const CHECKS: &[&str] = &[
    "ema_trend",
    "ema_trend_15m",
    "rsi",
    "rsi_15m",
    "macd_positive",
    "supertrend",
    "adx",
    "choppiness",
    "cci",
    "obv_rising",
    "price_above_vwap",
    "orderbook_buy_pressure",
    "heatmap_trending",
    "bullish_engulfing",
    "bullish_hammer",
];

struct Tally<'a> {
    config: &'a ScoringConfig,
    score: f64,
    reasons: Vec<String>,
}

impl Tally<'_> {
    /// NaN comparisons are false, so undefined indicators never pass.
    fn check(&mut self, passed: bool, key: &str, reason: &str) {
        if passed {
            self.score += self.config.weight(key);
            self.reasons.push(reason.to_string());
        }
    }

    fn note(&mut self, reason: &str) {
        self.reasons.push(reason.to_string());
    }
}

impl ChecklistScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    fn max_score(&self) -> f64 {
        CHECKS.iter().map(|k| self.config.weight(k)).sum()
    }
}

impl Scorer for ChecklistScorer {
    fn assess(&self, snapshot: &MarketSnapshot) -> Assessment {
        let fast = compute_indicators(&snapshot.fast);
        let slow = compute_indicators(&snapshot.slow);
        let merged = align(&fast, &slow, HIGHER_TF_SUFFIX);
        let row = merged.latest();
        let th = &self.config.thresholds;

        let mut tally = Tally {
            config: &self.config,
            score: 0.0,
            reasons: Vec::new(),
        };

        // Multi-timeframe trend context
        let trends = [trend(&row, ""), trend(&row, HIGHER_TF_SUFFIX)];
        let bullish = trends.iter().filter(|t| **t == Some(true)).count();
        let bearish = trends.iter().filter(|t| **t == Some(false)).count();
        if bullish == trends.len() {
            tally.note("MULTI-TF BULLISH ALIGNMENT: 5m and 15m EMA21 above EMA200");
        } else if bearish == trends.len() {
            tally.note("MULTI-TF BEARISH ALIGNMENT: 5m and 15m EMA21 below EMA200");
        } else if bullish + bearish == trends.len() {
            tally.note("WARNING: Mixed timeframe regime");
        }

        tally.check(trends[0] == Some(true), "ema_trend", "5m: EMA21 above EMA200");
        tally.check(
            trends[1] == Some(true),
            "ema_trend_15m",
            "15m: EMA21 above EMA200",
        );
        tally.check(
            row.get("rsi") > th.rsi_bullish,
            "rsi",
            "5m: RSI above bullish threshold",
        );
        tally.check(
            row.get("rsi_15m") > th.rsi_bullish_15m,
            "rsi_15m",
            "15m: RSI above bullish threshold",
        );
        tally.check(
            row.get("macd_hist") > 0.0,
            "macd_positive",
            "5m: MACD histogram positive",
        );
        tally.check(
            row.get("supertrend") == 1.0,
            "supertrend",
            "5m: Supertrend bullish",
        );
        tally.check(
            row.get("adx") > th.adx_strong_trend,
            "adx",
            "Strong trend (ADX)",
        );
        tally.check(
            row.get("chop") < th.choppiness_trending,
            "choppiness",
            "Market is trending (low Choppiness Index)",
        );
        tally.check(row.get("cci") > th.cci_bullish, "cci", "CCI strong uptrend");

        let obv_prev = match merged.len() {
            n if n >= 2 => merged.value("obv", n - 2),
            _ => f64::NAN,
        };
        tally.check(row.get("obv") > obv_prev, "obv_rising", "OBV rising");
        tally.check(
            row.get("close") > row.get("vwap"),
            "price_above_vwap",
            "Price above VWAP",
        );

        // Volatility squeeze: bands narrower than one ATR
        let bb_width = row.get("bb_upper") - row.get("bb_lower");
        let atr = row.get("atr");
        if bb_width.is_finite() && atr.is_finite() && bb_width / (atr + 1e-8) < 1.0 {
            tally.note("VOLATILITY SQUEEZE: Narrow BB vs ATR, breakout setup");
        }

        let imbalance = snapshot.order_book.imbalance();
        tally.check(
            imbalance.is_some_and(|i| i > th.orderbook_imbalance),
            "orderbook_buy_pressure",
            "ORDER BOOK DOMINATED BY BUY BIDS",
        );
        if imbalance.is_some_and(|i| i < -th.orderbook_imbalance) {
            tally.note("ORDER BOOK DOMINATED BY SELL ASKS");
        }

        tally.check(
            snapshot.is_trending(),
            "heatmap_trending",
            "TRENDING ON MARKET HEATMAP",
        );

        tally.check(
            row.get("engulfing") == 1.0,
            "bullish_engulfing",
            "Bullish engulfing candle",
        );
        tally.check(
            row.get("hammer") == 1.0,
            "bullish_hammer",
            "Bullish hammer pattern",
        );

        let max = self.max_score();
        let confidence = if max > 0.0 { tally.score / max } else { 0.0 };

        Assessment {
            confidence: confidence.clamp(0.0, 1.0),
            reasons: tally.reasons,
            price: row.get("close"),
            atr,
            row,
        }
    }
}

/// `Some(true)` bullish, `Some(false)` bearish, `None` undefined or flat.
fn trend(row: &Row, suffix: &str) -> Option<bool> {
    let fast = row.get(&format!("ema21{suffix}"));
    let slow = row.get(&format!("ema200{suffix}"));
    if !fast.is_finite() || !slow.is_finite() || fast == slow {
        return None;
    }
    Some(fast > slow)
}
