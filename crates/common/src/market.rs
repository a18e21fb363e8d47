use std::collections::HashSet;

use async_trait::async_trait;

use crate::{Candle, OrderBook, Timeframe};

/// Abstraction over the market-data source.
///
/// `BinanceMarketData` implements this for the live exchange.
/// `PaperFeed` implements this for scripted runs and tests.
///
/// Implementations swallow their own transport errors: a failed call is
/// logged and reported as an empty result so that the caller can skip
/// the cycle.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent `limit` candles, oldest first. Empty on failure.
    async fn candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle>;

    /// Current order book snapshot. `None` on failure.
    async fn order_book(&self, symbol: &str) -> Option<OrderBook>;

    /// Lower-case base symbols currently trending. Empty on failure.
    async fn trending(&self) -> HashSet<String>;

    /// Latest traded price, taken from the last 1-minute close.
    async fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.candles(symbol, Timeframe::M1, 1)
            .await
            .last()
            .map(|c| c.close)
    }

    /// Release connections. Safe to call more than once.
    async fn close(&self);
}
