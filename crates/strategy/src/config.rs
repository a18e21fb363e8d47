use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use common::{Error, Result};

/// Longest accepted warmup window (one day).
pub const MAX_WARMUP_SECS: u64 = 86_400;

/// Top-level agent config file (TOML).
///
/// Example `config/agent.toml`:
/// ```toml
/// symbols = ["SOL/USDT", "ETH/USDT", "AVAX/USDT"]
///
/// [decision]
/// warmup_secs = 300
/// sticky_confirms = 3
///
/// [scoring.weights]
/// ema_trend = 2.0
/// ```
///
/// Every field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentFileConfig {
    /// Watched instruments in `BASE/QUOTE` form.
    pub symbols: Vec<String>,
    pub decision: DecisionConfig,
    pub scoring: ScoringConfig,
    pub market: MarketConfig,
}

impl Default for AgentFileConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "SOL/USDT".to_string(),
                "ETH/USDT".to_string(),
                "AVAX/USDT".to_string(),
            ],
            decision: DecisionConfig::default(),
            scoring: ScoringConfig::default(),
            market: MarketConfig::default(),
        }
    }
}

impl AgentFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read agent config at '{path}': {e}")))?;
        let cfg = Self::parse(&content)
            .map_err(|e| Error::Config(format!("failed to parse agent config at '{path}': {e}")))?;
        info!(path, symbols = cfg.symbols.len(), "Agent config loaded");
        Ok(cfg)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(Error::Config("at least one symbol is required".into()));
        }
        let d = &self.decision;
        if d.sticky_confirms == 0 {
            return Err(Error::Config("decision.sticky_confirms must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&d.short_below) || !(0.0..=1.0).contains(&d.long_above) {
            return Err(Error::Config("classification thresholds must lie in [0, 1]".into()));
        }
        if d.short_below > d.long_above {
            return Err(Error::Config(
                "decision.short_below must not exceed decision.long_above".into(),
            ));
        }
        let intervals = [d.cycle_interval_ms, d.data_gap_backoff_ms, d.evaluator_interval_secs];
        if intervals.contains(&0) {
            return Err(Error::Config(
                "decision cycle, backoff and evaluator intervals must be > 0".into(),
            ));
        }
        if d.warmup_secs > MAX_WARMUP_SECS {
            return Err(Error::Config(format!(
                "decision.warmup_secs must not exceed {MAX_WARMUP_SECS}"
            )));
        }
        if d.min_hold_minutes < 0 || d.cooldown_minutes < 0 {
            return Err(Error::Config(
                "decision.min_hold_minutes and cooldown_minutes must not be negative".into(),
            ));
        }
        if d.signal_hold_minutes <= 0 {
            return Err(Error::Config("decision.signal_hold_minutes must be > 0".into()));
        }
        Ok(())
    }
}

/// Timing and gating parameters of the decision engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Confidence strictly above this classifies as LONG.
    pub long_above: f64,
    /// Confidence strictly below this classifies as SHORT.
    pub short_below: f64,
    /// Warmup window measured from process start.
    pub warmup_secs: u64,
    /// Minimum share of directional warmup observations for a consensus fire.
    pub consensus_ratio: f64,
    /// Consecutive identical directions required before firing (K).
    pub sticky_confirms: usize,
    /// Minimum time between two fires on the same symbol.
    pub min_hold_minutes: i64,
    /// Per-(symbol, side) cooldown.
    pub cooldown_minutes: i64,
    pub target_pct: f64,
    pub stop_pct: f64,
    /// Hold duration after which a pending signal expires.
    pub signal_hold_minutes: i64,
    pub cycle_interval_ms: u64,
    pub data_gap_backoff_ms: u64,
    pub evaluator_interval_secs: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            long_above: 0.7,
            short_below: 0.3,
            warmup_secs: 300,
            consensus_ratio: 0.6,
            sticky_confirms: 3,
            min_hold_minutes: 120,
            cooldown_minutes: 30,
            target_pct: 0.02,
            stop_pct: 0.01,
            signal_hold_minutes: 120,
            cycle_interval_ms: 1_000,
            data_gap_backoff_ms: 2_000,
            evaluator_interval_secs: 300,
        }
    }
}

/// Market-data request parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Candles requested per timeframe. EMA200 needs at least 200.
    pub candle_limit: usize,
    /// Order book depth requested.
    pub book_depth: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            candle_limit: 250,
            book_depth: 100,
        }
    }
}

/// Check weights and thresholds used by the checklist scorer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight per check key; unknown keys are ignored, missing keys weigh 1.0.
    pub weights: HashMap<String, f64>,
    pub thresholds: Thresholds,
}

impl ScoringConfig {
    pub fn weight(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(1.0)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let weights = [
            ("ema_trend", 2.0),
            ("ema_trend_15m", 2.0),
            ("rsi", 1.5),
            ("rsi_15m", 1.5),
            ("macd_positive", 1.5),
            ("supertrend", 1.5),
            ("adx", 1.2),
            ("choppiness", 1.2),
            ("cci", 1.2),
            ("obv_rising", 1.0),
            ("price_above_vwap", 1.0),
            ("orderbook_buy_pressure", 1.5),
            ("heatmap_trending", 1.0),
            ("bullish_engulfing", 1.5),
            ("bullish_hammer", 1.5),
        ]
        .into_iter()
        .map(|(k, w)| (k.to_string(), w))
        .collect();
        Self {
            weights,
            thresholds: Thresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    pub rsi_bullish: f64,
    pub rsi_bullish_15m: f64,
    pub orderbook_imbalance: f64,
    /// ADX above this counts as a strong trend.
    pub adx_strong_trend: f64,
    /// Choppiness below this counts as trending.
    pub choppiness_trending: f64,
    pub cci_bullish: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rsi_bullish: 75.0,
            rsi_bullish_15m: 65.0,
            orderbook_imbalance: 0.2,
            adx_strong_trend: 25.0,
            choppiness_trending: 35.0,
            cci_bullish: 120.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = AgentFileConfig::parse("").unwrap();
        assert_eq!(cfg.symbols.len(), 3);
        assert_eq!(cfg.decision.sticky_confirms, 3);
        assert_eq!(cfg.decision.cooldown_minutes, 30);
        assert!((cfg.scoring.weight("ema_trend") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AgentFileConfig::parse(
            r#"
            symbols = ["BTC/USDT"]

            [decision]
            warmup_secs = 60

            [scoring.weights]
            rsi = 3.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.symbols, vec!["BTC/USDT".to_string()]);
        assert_eq!(cfg.decision.warmup_secs, 60);
        assert_eq!(cfg.decision.min_hold_minutes, 120);
        assert!((cfg.scoring.weight("rsi") - 3.0).abs() < 1e-9);
        // replaced map: unspecified keys fall back to 1.0
        assert!((cfg.scoring.weight("ema_trend") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_empty_symbol_list() {
        assert!(AgentFileConfig::parse("symbols = []").is_err());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let err = AgentFileConfig::parse("[decision]\nlong_above = 0.2\nshort_below = 0.5");
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_zero_intervals() {
        for field in ["cycle_interval_ms", "data_gap_backoff_ms", "evaluator_interval_secs"] {
            let err = AgentFileConfig::parse(&format!("[decision]\n{field} = 0"));
            assert!(matches!(err, Err(Error::Config(_))), "{field} = 0 accepted");
        }
    }

    #[test]
    fn warmup_is_capped_at_one_day() {
        let at_cap = format!("[decision]\nwarmup_secs = {MAX_WARMUP_SECS}");
        assert!(AgentFileConfig::parse(&at_cap).is_ok());
        let huge = format!("[decision]\nwarmup_secs = {}", MAX_WARMUP_SECS + 1);
        assert!(matches!(AgentFileConfig::parse(&huge), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_negative_durations() {
        let err = AgentFileConfig::parse("[decision]\ncooldown_minutes = -5");
        assert!(matches!(err, Err(Error::Config(_))));
        let err = AgentFileConfig::parse("[decision]\nsignal_hold_minutes = 0");
        assert!(matches!(err, Err(Error::Config(_))));
    }
}
