use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Candle, MarketData, OrderBook, Timeframe};

/// Scripted in-memory market-data provider.
///
/// Serves whatever candles, books, prices and trending symbols were last
/// loaded into it. Nothing is fetched from the network, so it backs offline
/// runs and tests of the decision engine.
#[derive(Default)]
pub struct PaperFeed {
    candles: Arc<RwLock<HashMap<(String, Timeframe), Vec<Candle>>>>,
    books: Arc<RwLock<HashMap<String, OrderBook>>>,
    /// Latest known price per symbol, updated via `set_price`.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    trending: Arc<RwLock<HashSet<String>>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl PaperFeed {
    pub fn new() -> Self {
        info!("PaperFeed initialized");
        Self::default()
    }

    pub async fn set_candles(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.candles
            .write()
            .await
            .insert((symbol.to_string(), timeframe), candles);
    }

    pub async fn set_order_book(&self, symbol: &str, book: OrderBook) {
        self.books.write().await.insert(symbol.to_string(), book);
    }

    /// Drop the book so that the next snapshot for `symbol` is incomplete.
    pub async fn clear_order_book(&self, symbol: &str) {
        self.books.write().await.remove(symbol);
    }

    /// Update the latest price for a symbol (what the evaluator sees).
    pub async fn set_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    pub async fn set_trending(&self, symbols: impl IntoIterator<Item = &str>) {
        *self.trending.write().await = symbols.into_iter().map(str::to_lowercase).collect();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketData for PaperFeed {
    async fn candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        let candles = self.candles.read().await;
        let series = candles
            .get(&(symbol.to_string(), timeframe))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let start = series.len().saturating_sub(limit);
        debug!(symbol, %timeframe, count = series.len() - start, "Paper candles served");
        series[start..].to_vec()
    }

    async fn order_book(&self, symbol: &str) -> Option<OrderBook> {
        self.books.read().await.get(symbol).cloned()
    }

    async fn trending(&self) -> HashSet<String> {
        self.trending.read().await.clone()
    }

    async fn latest_price(&self, symbol: &str) -> Option<f64> {
        if let Some(price) = self.prices.read().await.get(symbol).copied() {
            return Some(price);
        }
        self.candles(symbol, Timeframe::M1, 1)
            .await
            .last()
            .map(|c| c.close)
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("PaperFeed closed");
        }
    }
}

/// Flat candles (open = high = low = close) spaced `step` apart, oldest first.
pub fn flat_candles(start: DateTime<Utc>, step: Duration, closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time: start + step * i as i32,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn candles_respect_limit_and_keep_latest() {
        let feed = PaperFeed::new();
        let series = flat_candles(Utc::now(), Duration::minutes(5), &[1.0, 2.0, 3.0, 4.0]);
        feed.set_candles("SOL/USDT", Timeframe::M5, series).await;

        let served = feed.candles("SOL/USDT", Timeframe::M5, 2).await;
        assert_eq!(served.iter().map(|c| c.close).collect::<Vec<_>>(), vec![3.0, 4.0]);
        assert!(feed.candles("SOL/USDT", Timeframe::M15, 2).await.is_empty());
    }

    #[tokio::test]
    async fn explicit_price_overrides_candles() {
        let feed = PaperFeed::new();
        feed.set_candles(
            "ETH/USDT",
            Timeframe::M1,
            flat_candles(Utc::now(), Duration::minutes(1), &[10.0, 11.0]),
        )
        .await;
        assert_eq!(feed.latest_price("ETH/USDT").await, Some(11.0));

        feed.set_price("ETH/USDT", 12.5).await;
        assert_eq!(feed.latest_price("ETH/USDT").await, Some(12.5));
        assert_eq!(feed.latest_price("AVAX/USDT").await, None);
    }

    #[tokio::test]
    async fn trending_symbols_are_lower_cased() {
        let feed = PaperFeed::new();
        feed.set_trending(["SOL", "pepe"]).await;
        let trending = feed.trending().await;
        assert!(trending.contains("sol") && trending.contains("pepe"));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let feed = PaperFeed::new();
        feed.close().await;
        feed.close().await;
        assert!(feed.is_closed());
        assert_eq!(feed.close_calls(), 2);
    }
}
