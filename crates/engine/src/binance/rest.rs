use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use common::{Candle, Error, MarketData, OrderBook, Result, Timeframe};

const BASE_URL: &str = "https://api.binance.com";
const TRENDING_URL: &str = "https://api.coingecko.com/api/v3/search/trending";

/// Public-endpoint market data from Binance, trending set from CoinGecko.
/// No credentials are needed.
pub struct BinanceMarketData {
    base_url: String,
    trending_url: String,
    book_depth: usize,
    http: Client,
    closed: AtomicBool,
}

impl BinanceMarketData {
    pub fn new(book_depth: usize) -> Result<Self> {
        Self::with_endpoints(BASE_URL, TRENDING_URL, book_depth)
    }

    pub fn with_endpoints(
        base_url: impl Into<String>,
        trending_url: impl Into<String>,
        book_depth: usize,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            trending_url: trending_url.into(),
            book_depth,
            http,
            closed: AtomicBool::new(false),
        })
    }

    async fn get(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// "SOL/USDT" → "SOLUSDT".
pub fn exchange_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_uppercase()
}

#[async_trait]
impl MarketData for BinanceMarketData {
    async fn candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        if self.is_closed() {
            return Vec::new();
        }
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={limit}",
            self.base_url,
            exchange_symbol(symbol),
            timeframe.as_str()
        );
        debug!(symbol, %timeframe, limit, "Fetching candles");
        match self.get(&url).await.and_then(|body| parse_klines(&body)) {
            Ok(candles) => candles,
            Err(e) => {
                warn!(symbol, %timeframe, error = %e, "Candle fetch failed");
                Vec::new()
            }
        }
    }

    async fn order_book(&self, symbol: &str) -> Option<OrderBook> {
        if self.is_closed() {
            return None;
        }
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.base_url,
            exchange_symbol(symbol),
            self.book_depth
        );
        debug!(symbol, "Fetching order book");
        match self.get(&url).await.and_then(|body| parse_depth(&body)) {
            Ok(book) => Some(book),
            Err(e) => {
                warn!(symbol, error = %e, "Order book fetch failed");
                None
            }
        }
    }

    async fn trending(&self) -> HashSet<String> {
        if self.is_closed() {
            return HashSet::new();
        }
        debug!("Fetching trending coins");
        match self
            .get(&self.trending_url)
            .await
            .and_then(|body| parse_trending(&body))
        {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "Trending fetch failed");
                HashSet::new()
            }
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Binance market data closed");
        }
    }
}

// ─── Response parsing ─────────────────────────────────────────────────────────

/// Klines arrive as arrays: [open_time_ms, "open", "high", "low", "close", "volume", ...].
pub fn parse_klines(body: &str) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
    rows.iter()
        .map(|row| {
            let open_ms = row
                .first()
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::Exchange("kline without open time".into()))?;
            let open_time = DateTime::<Utc>::from_timestamp_millis(open_ms)
                .ok_or_else(|| Error::Exchange(format!("bad kline timestamp {open_ms}")))?;
            Ok(Candle {
                open_time,
                open: number_at(row, 1)?,
                high: number_at(row, 2)?,
                low: number_at(row, 3)?,
                close: number_at(row, 4)?,
                volume: number_at(row, 5)?,
            })
        })
        .collect()
}

fn number_at(row: &[Value], idx: usize) -> Result<f64> {
    match row.get(idx) {
        Some(Value::String(s)) => s
            .parse::<f64>()
            .map_err(|e| Error::Exchange(format!("kline field {idx}: {e}"))),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::Exchange(format!("kline field {idx} out of range"))),
        _ => Err(Error::Exchange(format!("kline field {idx} missing"))),
    }
}

#[derive(Deserialize)]
struct DepthResponse {
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

pub fn parse_depth(body: &str) -> Result<OrderBook> {
    let depth: DepthResponse = serde_json::from_str(body)?;
    let levels = |raw: Vec<(String, String)>| -> Result<Vec<(f64, f64)>> {
        raw.into_iter()
            .map(|(p, q)| {
                let price = p.parse::<f64>().map_err(|e| Error::Exchange(e.to_string()))?;
                let qty = q.parse::<f64>().map_err(|e| Error::Exchange(e.to_string()))?;
                Ok((price, qty))
            })
            .collect()
    };
    Ok(OrderBook {
        bids: levels(depth.bids)?,
        asks: levels(depth.asks)?,
    })
}

#[derive(Deserialize)]
struct TrendingResponse {
    #[serde(default)]
    coins: Vec<TrendingCoin>,
}

#[derive(Deserialize)]
struct TrendingCoin {
    item: TrendingItem,
}

#[derive(Deserialize)]
struct TrendingItem {
    symbol: String,
}

pub fn parse_trending(body: &str) -> Result<HashSet<String>> {
    let resp: TrendingResponse = serde_json::from_str(body)?;
    Ok(resp
        .coins
        .into_iter()
        .map(|c| c.item.symbol.to_lowercase())
        .collect())
}
