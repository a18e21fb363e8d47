//! Deterministic multi-line rationale for a scored snapshot.

use common::MarketSnapshot;

use crate::frame::Row;
use crate::scorer::{Assessment, HIGHER_TF_SUFFIX};

const TIMEFRAMES: [(&str, &str); 2] = [("5m", ""), ("15m", HIGHER_TF_SUFFIX)];

fn trend_state(row: &Row, suffix: &str) -> &'static str {
    let fast = row.get(&format!("ema21{suffix}"));
    let slow = row.get(&format!("ema200{suffix}"));
    if !fast.is_finite() || !slow.is_finite() {
        "Indeterminate"
    } else if fast > slow {
        "Bullish"
    } else if fast < slow {
        "Bearish"
    } else {
        "Neutral"
    }
}

fn momentum_state(rsi: f64) -> &'static str {
    if !rsi.is_finite() {
        "Unknown"
    } else if rsi > 70.0 {
        "Overbought"
    } else if rsi < 30.0 {
        "Oversold"
    } else {
        "Balanced"
    }
}

fn strength(confidence: f64) -> &'static str {
    if confidence >= 0.85 {
        "Very strong"
    } else if confidence >= 0.7 {
        "Strong"
    } else if confidence >= 0.4 {
        "Moderate"
    } else {
        "Weak or Mixed"
    }
}

/// Build the rationale text attached to a normal-mode signal.
pub fn explain(snapshot: &MarketSnapshot, assessment: &Assessment) -> String {
    let row = &assessment.row;
    let mut lines = vec![format!(
        "[{}] Signal strength: {} ({:.2} confidence)",
        snapshot.symbol,
        strength(assessment.confidence),
        assessment.confidence
    )];

    let trends: Vec<&str> = TIMEFRAMES
        .iter()
        .map(|(_, suffix)| trend_state(row, suffix))
        .collect();
    let defined: Vec<&&str> = trends.iter().filter(|t| **t != "Indeterminate").collect();
    let regime = if !defined.is_empty() && defined.iter().all(|t| **t == "Bullish") {
        "UPTREND"
    } else if !defined.is_empty() && defined.iter().all(|t| **t == "Bearish") {
        "DOWNTREND"
    } else {
        "MIXED/UNCERTAIN"
    };
    let by_tf: Vec<String> = TIMEFRAMES
        .iter()
        .zip(&trends)
        .map(|((label, _), state)| format!("{label}:{state}"))
        .collect();
    lines.push(format!("Market regime: {regime}. Trends by TF: {}", by_tf.join(" ")));

    let momentum: Vec<String> = TIMEFRAMES
        .iter()
        .map(|(label, suffix)| {
            format!("{label}:{}", momentum_state(row.get(&format!("rsi{suffix}"))))
        })
        .collect();
    lines.push(format!("Momentum (RSI) by TF: {}", momentum.join(" ")));

    let width = row.get("bb_upper") - row.get("bb_lower");
    let atr = row.get("atr");
    let volatility = if width.is_finite() && atr.is_finite() {
        let ratio = width / (atr + 1e-8);
        if ratio > 2.5 {
            "High volatility breakout (watch for whipsaw risk)"
        } else if ratio < 1.0 {
            "Low volatility consolidation"
        } else {
            "Medium volatility"
        }
    } else {
        "Unknown"
    };
    lines.push(format!("Volatility status: {volatility}"));

    let fmt_level = |level: Option<f64>| level.map_or("N/A".to_string(), |p| format!("{p:.4}"));
    lines.push(format!(
        "Order book: top bid {}, top ask {}",
        fmt_level(snapshot.order_book.best_bid()),
        fmt_level(snapshot.order_book.best_ask())
    ));
    lines.push(format!(
        "Heatmap/trending: {}",
        if snapshot.is_trending() {
            "Trending on heatmap"
        } else {
            "Not trending"
        }
    ));

    if !assessment.reasons.is_empty() {
        let shown: Vec<&str> = assessment.reasons.iter().take(5).map(String::as_str).collect();
        let more = if assessment.reasons.len() > 5 { ", ..." } else { "" };
        lines.push(format!("{}{more}", shown.join(", ")));
    }

    if regime == "MIXED/UNCERTAIN" {
        lines.push("[!] Timeframes are not aligned. Consider reduced size.".to_string());
    }

    lines.push(if assessment.price.is_finite() {
        format!("Latest price: {:.2}", assessment.price)
    } else {
        "Latest price: N/A".to_string()
    });
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderBook;
    use std::collections::HashSet;

    fn snapshot(trending: bool) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "ETH/USDT".into(),
            fast: vec![],
            slow: vec![],
            order_book: OrderBook {
                bids: vec![(2000.0, 1.0)],
                asks: vec![],
            },
            trending: if trending {
                HashSet::from(["eth".to_string()])
            } else {
                HashSet::new()
            },
        }
    }

    fn assessment(row: Row, reasons: usize) -> Assessment {
        Assessment {
            confidence: 0.9,
            reasons: (0..reasons).map(|i| format!("reason {i}")).collect(),
            price: 2001.5,
            atr: f64::NAN,
            row,
        }
    }

    #[test]
    fn bullish_row_reads_as_uptrend() {
        let mut row = Row::default();
        row.set("ema21", 10.0);
        row.set("ema200", 9.0);
        row.set("ema21_15m", 10.0);
        row.set("ema200_15m", 8.0);
        row.set("rsi", 80.0);
        let text = explain(&snapshot(true), &assessment(row, 2));
        assert!(text.contains("Market regime: UPTREND"));
        assert!(text.contains("5m:Overbought 15m:Unknown"));
        assert!(text.contains("top bid 2000.0000, top ask N/A"));
        assert!(text.contains("Trending on heatmap"));
        assert!(text.ends_with("Latest price: 2001.50"));
    }

    #[test]
    fn missing_indicators_are_reported_not_fatal() {
        let text = explain(&snapshot(false), &assessment(Row::default(), 7));
        assert!(text.contains("MIXED/UNCERTAIN"));
        assert!(text.contains("Volatility status: Unknown"));
        assert!(text.contains("reason 4, ..."));
        assert!(!text.contains("reason 5"));
    }
}
