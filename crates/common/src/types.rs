use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a trading call.
///
/// An observation that is neither long nor short is represented as
/// `Option<Side>::None` rather than a third variant, so that a fired
/// `SignalEntry` can never carry a non-directional side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short. Used to place targets and stops.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Display helper for an optional observation direction (`NONE` when absent).
pub fn direction_label(direction: Option<Side>) -> &'static str {
    match direction {
        Some(Side::Long) => "LONG",
        Some(Side::Short) => "SHORT",
        None => "NONE",
    }
}

/// One scored market observation for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub direction: Option<Side>,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub price: f64,
}

/// Candle interval requested from the market-data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OHLCV record for one time bucket. `open_time` is the bucket start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One price level: (price, quantity).
pub type BookLevel = (f64, f64);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|(price, _)| *price)
    }

    /// (bid volume - ask volume) / total volume, or `None` for an empty book.
    pub fn imbalance(&self) -> Option<f64> {
        let bid_volume: f64 = self.bids.iter().map(|(_, qty)| qty).sum();
        let ask_volume: f64 = self.asks.iter().map(|(_, qty)| qty).sum();
        let total = bid_volume + ask_volume;
        if total > 0.0 {
            Some((bid_volume - ask_volume) / total)
        } else {
            None
        }
    }
}

/// Everything one monitor cycle needs to score a symbol.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    /// Lower timeframe (5m) candles, oldest first.
    pub fast: Vec<Candle>,
    /// Higher timeframe (15m) candles, oldest first.
    pub slow: Vec<Candle>,
    pub order_book: OrderBook,
    /// Lower-case base symbols currently trending (e.g. "sol").
    pub trending: HashSet<String>,
}

impl MarketSnapshot {
    /// Base asset code in lower case: "SOL/USDT" -> "sol".
    pub fn base_symbol(&self) -> String {
        base_symbol(&self.symbol)
    }

    pub fn is_trending(&self) -> bool {
        self.trending.contains(&self.base_symbol())
    }
}

pub fn base_symbol(symbol: &str) -> String {
    symbol
        .split('/')
        .next()
        .unwrap_or(symbol)
        .to_lowercase()
}
