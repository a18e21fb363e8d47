use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use common::{MarketData, Outcome};

use crate::book::SharedBook;
use crate::export::{request_export, ExportReason};

/// Periodically resolves pending signals against the latest price.
pub struct OutcomeEvaluator {
    market: Arc<dyn MarketData>,
    book: SharedBook,
    export_tx: mpsc::Sender<ExportReason>,
    interval: Duration,
}

impl OutcomeEvaluator {
    pub fn new(
        market: Arc<dyn MarketData>,
        book: SharedBook,
        export_tx: mpsc::Sender<ExportReason>,
        interval: Duration,
    ) -> Self {
        Self {
            market,
            book,
            export_tx,
            interval,
        }
    }

    /// Check every pending entry once. Returns how many resolved.
    pub async fn evaluate_once(&self, now: DateTime<Utc>) -> usize {
        let pending = self.book.read().await.pending();
        if pending.is_empty() {
            return 0;
        }

        // One price lookup per distinct symbol, outside the lock.
        let symbols: BTreeSet<&str> = pending.iter().map(|(_, s)| s.as_str()).collect();
        let mut prices: HashMap<&str, f64> = HashMap::new();
        for symbol in symbols {
            match self.market.latest_price(symbol).await {
                Some(price) => {
                    prices.insert(symbol, price);
                }
                None => debug!(symbol, "No price, pending entries left for next cycle"),
            }
        }

        let mut resolved: Vec<(String, Outcome, f64)> = Vec::new();
        {
            let mut book = self.book.write().await;
            for (id, symbol) in &pending {
                let Some(&price) = prices.get(symbol.as_str()) else {
                    continue;
                };
                if let Some(outcome) = book.resolve(id, price, now) {
                    resolved.push((symbol.clone(), outcome, price));
                }
            }
        }

        for (symbol, outcome, price) in &resolved {
            info!(symbol = %symbol, %outcome, exit = price, "Signal resolved");
        }
        if !resolved.is_empty() {
            request_export(&self.export_tx, ExportReason::Resolved);
        }
        resolved.len()
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Outcome evaluator started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let cycle = AssertUnwindSafe(self.evaluate_once(Utc::now()))
                .catch_unwind()
                .await;
            match cycle {
                Ok(count) if count > 0 => debug!(count, "Evaluator cycle resolved entries"),
                Ok(_) => {}
                Err(_) => error!("Evaluator cycle panicked"),
            }
        }
        info!("Outcome evaluator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use common::{Offsets, Side, SignalEntry};
    use paper::PaperFeed;

    use crate::book::SignalBook;

    fn entry(symbol: &str, side: Side, at: DateTime<Utc>) -> SignalEntry {
        SignalEntry::new(
            symbol,
            side,
            0.8,
            "",
            100.0,
            at,
            Offsets::default(),
            ChronoDuration::minutes(120),
        )
    }

    #[tokio::test]
    async fn resolves_every_pending_entry_with_a_price() {
        let feed = Arc::new(PaperFeed::new());
        let book = SignalBook::shared();
        let (tx, mut rx) = mpsc::channel(4);
        let now = Utc::now();

        let long = entry("SOL/USDT", Side::Long, now);
        let short = entry("ETH/USDT", Side::Short, now);
        let unpriced = entry("AVAX/USDT", Side::Long, now);
        let (long_id, short_id, unpriced_id) = (long.id(), short.id(), unpriced.id());
        for e in [long, short, unpriced] {
            book.write().await.insert(e).unwrap();
        }
        feed.set_price("SOL/USDT", 102.0).await;
        feed.set_price("ETH/USDT", 101.0).await;

        let evaluator = OutcomeEvaluator::new(feed, book.clone(), tx, Duration::from_secs(300));
        let later = now + ChronoDuration::minutes(10);
        assert_eq!(evaluator.evaluate_once(later).await, 2);

        let book = book.read().await;
        assert_eq!(book.get(&long_id).unwrap().outcome(), Some(Outcome::TargetHit));
        assert_eq!(book.get(&short_id).unwrap().outcome(), Some(Outcome::StopHit));
        assert_eq!(book.get(&short_id).unwrap().exit_time(), Some(later));
        assert!(book.is_active(&unpriced_id));
        assert_eq!(book.active_len(), 1);
        assert_eq!(rx.try_recv().unwrap(), ExportReason::Resolved);
    }

    #[tokio::test]
    async fn expiry_applies_after_hold_and_nothing_changes_afterwards() {
        let feed = Arc::new(PaperFeed::new());
        let book = SignalBook::shared();
        let (tx, mut rx) = mpsc::channel(4);
        let now = Utc::now();
        let e = entry("SOL/USDT", Side::Long, now);
        let id = e.id();
        book.write().await.insert(e).unwrap();
        feed.set_price("SOL/USDT", 100.5).await;

        let evaluator =
            OutcomeEvaluator::new(feed.clone(), book.clone(), tx, Duration::from_secs(300));
        assert_eq!(evaluator.evaluate_once(now + ChronoDuration::minutes(60)).await, 0);
        assert!(rx.try_recv().is_err());

        let expiry = now + ChronoDuration::minutes(121);
        assert_eq!(evaluator.evaluate_once(expiry).await, 1);
        feed.set_price("SOL/USDT", 150.0).await;
        assert_eq!(evaluator.evaluate_once(expiry + ChronoDuration::minutes(5)).await, 0);

        let book = book.read().await;
        let logged = book.get(&id).unwrap();
        assert_eq!(logged.outcome(), Some(Outcome::TimeExpired));
        assert_eq!(logged.exit_price(), Some(100.5));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let feed = Arc::new(PaperFeed::new());
        let (tx, _rx) = mpsc::channel(4);
        let evaluator =
            OutcomeEvaluator::new(feed, SignalBook::shared(), tx, Duration::from_secs(3600));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(evaluator.run(shutdown_rx));
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("evaluator should stop promptly")
            .unwrap();
    }
}
