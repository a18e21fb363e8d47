use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use common::signal::classify_with;
use common::{
    direction_label, MarketData, MarketSnapshot, NarrativeContext, Narrator, Observation, Offsets,
    Result, Side, SignalEntry, Timeframe,
};
use strategy::{reasoning, Assessment, DecisionConfig, MarketConfig, Scorer};

use crate::book::SharedBook;
use crate::export::{request_export, ExportReason};
use crate::gate::{BlockReason, CooldownTable, Gate, GateDecision};
use crate::state::SymbolState;
use crate::warmup::WarmupVerdict;

/// Collaborators and settings shared by every symbol monitor.
#[derive(Clone)]
pub struct MonitorContext {
    pub market: Arc<dyn MarketData>,
    pub scorer: Arc<dyn Scorer>,
    pub narrator: Arc<dyn Narrator>,
    pub book: SharedBook,
    pub cooldowns: Arc<CooldownTable>,
    pub export_tx: mpsc::Sender<ExportReason>,
    pub decision: DecisionConfig,
    pub market_config: MarketConfig,
    /// Warmup is measured from here, not from each monitor's first cycle.
    pub started_at: DateTime<Utc>,
}

/// What one monitor cycle did.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// A candle series was empty or the book was missing; state untouched.
    DataGap,
    Warmup { buffered: usize },
    /// The one-time warmup review ran; carries the entry if it fired.
    WarmupReviewed(Option<SignalEntry>),
    Watching {
        direction: Option<Side>,
        reason: BlockReason,
    },
    Fired(SignalEntry),
}

/// Observation loop for a single symbol.
pub struct SymbolMonitor {
    state: SymbolState,
    gate: Gate,
    ctx: MonitorContext,
}

impl SymbolMonitor {
    pub fn new(symbol: impl Into<String>, ctx: MonitorContext) -> Self {
        let state = SymbolState::new(symbol, ctx.decision.sticky_confirms);
        let gate = Gate {
            min_hold: Duration::minutes(ctx.decision.min_hold_minutes),
        };
        Self { state, gate, ctx }
    }

    pub fn symbol(&self) -> &str {
        &self.state.symbol
    }

    pub fn state(&self) -> &SymbolState {
        &self.state
    }

    /// Run cycles until `shutdown` flips to true. A failing or panicking
    /// cycle is logged and the loop carries on.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = std::time::Duration::from_millis(self.ctx.decision.cycle_interval_ms);
        let backoff = std::time::Duration::from_millis(self.ctx.decision.data_gap_backoff_ms);
        info!(symbol = %self.state.symbol, "Monitor started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = AssertUnwindSafe(self.cycle(Utc::now())).catch_unwind().await;
            let pause = match result {
                Ok(Ok(CycleOutcome::DataGap)) => {
                    warn!(symbol = %self.state.symbol, "Incomplete market data, backing off");
                    backoff
                }
                Ok(Ok(outcome)) => {
                    self.log_outcome(&outcome);
                    interval
                }
                Ok(Err(e)) => {
                    error!(symbol = %self.state.symbol, error = %e, "Monitor cycle failed");
                    interval
                }
                Err(_) => {
                    error!(symbol = %self.state.symbol, "Monitor cycle panicked");
                    interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(symbol = %self.state.symbol, "Monitor stopped");
    }

    fn log_outcome(&self, outcome: &CycleOutcome) {
        let symbol = &self.state.symbol;
        match outcome {
            CycleOutcome::Warmup { buffered } => {
                debug!(symbol = %symbol, buffered, "Warmup observation buffered")
            }
            CycleOutcome::Watching { direction, reason } => debug!(
                symbol = %symbol,
                direction = direction_label(*direction),
                ?reason,
                "No fire"
            ),
            CycleOutcome::WarmupReviewed(None) => {
                info!(symbol = %symbol, "Warmup review finished without a signal")
            }
            CycleOutcome::WarmupReviewed(Some(_)) | CycleOutcome::Fired(_) => {}
            CycleOutcome::DataGap => {}
        }
    }

    /// One observation cycle at time `now`.
    pub async fn cycle(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let Some(snapshot) = self.gather().await else {
            return Ok(CycleOutcome::DataGap);
        };

        let assessment = self.ctx.scorer.assess(&snapshot);
        if !assessment.price.is_finite() {
            return Ok(CycleOutcome::DataGap);
        }
        let confidence = assessment.confidence.clamp(0.0, 1.0);
        let direction = classify_with(
            confidence,
            self.ctx.decision.long_above,
            self.ctx.decision.short_below,
        );

        let warmup = i64::try_from(self.ctx.decision.warmup_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        if now - self.ctx.started_at < warmup {
            self.state.warmup.push(Observation {
                timestamp: now,
                direction,
                confidence,
                reasons: assessment.reasons.clone(),
                price: assessment.price,
            });
            return Ok(CycleOutcome::Warmup {
                buffered: self.state.warmup.len(),
            });
        }

        if !self.state.warmup.is_reviewed() {
            let fired = self.review_warmup(&snapshot, &assessment, now).await?;
            return Ok(CycleOutcome::WarmupReviewed(fired));
        }

        match self
            .gate
            .decide(&mut self.state, direction, &self.ctx.cooldowns, now)
            .await
        {
            GateDecision::Fire(side) => {
                let offsets = Offsets::Percent {
                    target: self.ctx.decision.target_pct,
                    stop: self.ctx.decision.stop_pct,
                };
                let (target, stop) = offsets.levels(side, assessment.price);
                let rationale = format!(
                    "{}\nSL: {stop:.2}, TP: {target:.2}",
                    reasoning::explain(&snapshot, &assessment)
                );
                let entry = self
                    .confirm(side, confidence, rationale, assessment.price, now, offsets)
                    .await?;
                self.narrate(&entry, &snapshot).await;
                Ok(CycleOutcome::Fired(entry))
            }
            GateDecision::Blocked(reason) => Ok(CycleOutcome::Watching { direction, reason }),
        }
    }

    async fn gather(&self) -> Option<MarketSnapshot> {
        let symbol = self.state.symbol.as_str();
        let limit = self.ctx.market_config.candle_limit;
        let market = &self.ctx.market;

        let fast = market.candles(symbol, Timeframe::M5, limit).await;
        let slow = market.candles(symbol, Timeframe::M15, limit).await;
        let order_book = market.order_book(symbol).await;
        let trending = market.trending().await;

        if fast.is_empty() || slow.is_empty() {
            return None;
        }
        Some(MarketSnapshot {
            symbol: symbol.to_string(),
            fast,
            slow,
            order_book: order_book?,
            trending,
        })
    }

    async fn review_warmup(
        &mut self,
        snapshot: &MarketSnapshot,
        assessment: &Assessment,
        now: DateTime<Utc>,
    ) -> Result<Option<SignalEntry>> {
        let consensus = match self.state.warmup.review(self.ctx.decision.consensus_ratio) {
            WarmupVerdict::Consensus(c) => c,
            WarmupVerdict::NoConsensus { side, ratio } => {
                info!(symbol = %self.state.symbol, %side, ratio, "No warmup consensus");
                return Ok(None);
            }
            WarmupVerdict::NoSignalSeen => {
                info!(symbol = %self.state.symbol, "No directional signal during warmup");
                return Ok(None);
            }
            WarmupVerdict::AlreadyReviewed => return Ok(None),
        };

        let offsets = if assessment.atr.is_finite() && assessment.atr > 0.0 {
            Offsets::from_volatility(assessment.atr)
        } else {
            warn!(symbol = %self.state.symbol, "ATR unavailable, using percentage offsets");
            Offsets::Percent {
                target: self.ctx.decision.target_pct,
                stop: self.ctx.decision.stop_pct,
            }
        };
        let (target, stop) = offsets.levels(consensus.side, assessment.price);
        let rationale = format!("{}\nSL: {stop:.2}, TP: {target:.2}", consensus.rationale());

        let entry = self
            .confirm(
                consensus.side,
                consensus.avg_confidence,
                rationale,
                assessment.price,
                now,
                offsets,
            )
            .await?;
        self.narrate(&entry, snapshot).await;
        Ok(Some(entry))
    }

    /// Create the entry, register it, remember the fire and ask for an export.
    async fn confirm(
        &mut self,
        side: Side,
        confidence: f64,
        rationale: String,
        price: f64,
        now: DateTime<Utc>,
        offsets: Offsets,
    ) -> Result<SignalEntry> {
        let entry = SignalEntry::new(
            self.state.symbol.clone(),
            side,
            confidence,
            rationale,
            price,
            now,
            offsets,
            Duration::minutes(self.ctx.decision.signal_hold_minutes),
        );
        self.ctx.book.write().await.insert(entry.clone())?;
        self.state.record_fire(side, now);

        info!(
            symbol = %entry.symbol(),
            side = %side,
            confidence = entry.confidence(),
            entry = entry.entry_price(),
            target = entry.target_price(),
            stop = entry.stop_price(),
            id = %entry.id(),
            "Signal confirmed"
        );

        request_export(&self.ctx.export_tx, ExportReason::Fired);
        Ok(entry)
    }

    async fn narrate(&self, entry: &SignalEntry, snapshot: &MarketSnapshot) {
        let mut trending: Vec<String> = snapshot.trending.iter().cloned().collect();
        trending.sort();
        let context = NarrativeContext {
            confidence: Some(entry.confidence()),
            stop_price: Some(entry.stop_price()),
            target_price: Some(entry.target_price()),
            best_bid: snapshot.order_book.best_bid(),
            best_ask: snapshot.order_book.best_ask(),
            trending,
        };
        let commentary = self
            .ctx
            .narrator
            .describe(entry.symbol(), entry.side(), entry.rationale(), &context)
            .await;
        info!(symbol = %entry.symbol(), id = %entry.id(), %commentary, "Signal commentary");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use paper::{flat_candles, PaperFeed};
    use strategy::Row;

    use super::*;
    use crate::book::SignalBook;

    /// Replays a fixed confidence sequence; the last value repeats.
    struct ScriptedScorer {
        script: Mutex<VecDeque<f64>>,
        atr: f64,
    }

    impl ScriptedScorer {
        fn new(script: &[f64], atr: f64) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
                atr,
            }
        }
    }

    impl Scorer for ScriptedScorer {
        fn assess(&self, snapshot: &MarketSnapshot) -> Assessment {
            let mut script = self.script.lock().unwrap();
            let confidence = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                *script.front().unwrap()
            };
            Assessment {
                confidence,
                reasons: vec![format!("scripted {confidence}")],
                price: snapshot.fast.last().map_or(f64::NAN, |c| c.close),
                atr: self.atr,
                row: Row::default(),
            }
        }
    }

    struct PanickingScorer;

    impl Scorer for PanickingScorer {
        fn assess(&self, _snapshot: &MarketSnapshot) -> Assessment {
            panic!("scorer blew up");
        }
    }

    struct EchoNarrator;

    #[async_trait]
    impl Narrator for EchoNarrator {
        async fn describe(
            &self,
            symbol: &str,
            side: Side,
            _: &str,
            _: &NarrativeContext,
        ) -> String {
            format!("{side} {symbol}")
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    async fn feed_with_data() -> Arc<PaperFeed> {
        let feed = Arc::new(PaperFeed::new());
        let start = t0() - Duration::hours(10);
        let five = flat_candles(start, Duration::minutes(5), &[100.0; 30]);
        let fifteen = flat_candles(start, Duration::minutes(15), &[100.0; 30]);
        feed.set_candles("SOL/USDT", Timeframe::M5, five).await;
        feed.set_candles("SOL/USDT", Timeframe::M15, fifteen).await;
        feed.set_order_book(
            "SOL/USDT",
            common::OrderBook {
                bids: vec![(99.9, 5.0)],
                asks: vec![(100.1, 4.0)],
            },
        )
        .await;
        feed
    }

    fn context(
        feed: Arc<PaperFeed>,
        scorer: Arc<dyn Scorer>,
        started_at: DateTime<Utc>,
    ) -> (MonitorContext, mpsc::Receiver<ExportReason>) {
        let (export_tx, export_rx) = mpsc::channel(8);
        let decision = DecisionConfig::default();
        let ctx = MonitorContext {
            market: feed,
            scorer,
            narrator: Arc::new(EchoNarrator),
            book: SignalBook::shared(),
            cooldowns: Arc::new(CooldownTable::new(
                ["SOL/USDT"],
                Duration::minutes(decision.cooldown_minutes),
            )),
            export_tx,
            decision,
            market_config: MarketConfig::default(),
            started_at,
        };
        (ctx, export_rx)
    }

    #[tokio::test]
    async fn missing_order_book_is_a_data_gap() {
        let feed = feed_with_data().await;
        feed.clear_order_book("SOL/USDT").await;
        let (ctx, _rx) = context(feed, Arc::new(ScriptedScorer::new(&[0.9], 1.0)), t0());
        let mut monitor = SymbolMonitor::new("SOL/USDT", ctx);

        let outcome = monitor.cycle(t0()).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::DataGap));
        assert!(monitor.state().warmup.is_empty());
        assert!(monitor.state().trailing.to_vec().is_empty());
    }

    #[tokio::test]
    async fn warmup_buffers_then_reviews_once_with_atr_levels() {
        let feed = feed_with_data().await;
        let scorer = Arc::new(ScriptedScorer::new(&[0.8, 0.9, 0.1, 0.75, 0.5], 1.5));
        let (ctx, mut rx) = context(feed, scorer, t0());
        let book = ctx.book.clone();
        let mut monitor = SymbolMonitor::new("SOL/USDT", ctx);

        for i in 0..4 {
            let outcome = monitor.cycle(t0() + Duration::seconds(i * 10)).await.unwrap();
            let expected = i as usize + 1;
            assert!(matches!(outcome, CycleOutcome::Warmup { buffered } if buffered == expected));
        }
        assert!(book.read().await.log().is_empty());

        let after = t0() + Duration::seconds(301);
        let CycleOutcome::WarmupReviewed(Some(entry)) = monitor.cycle(after).await.unwrap() else {
            panic!("expected a warmup fire");
        };
        assert_eq!(entry.side(), Side::Long);
        assert!((entry.confidence() - 0.8166666).abs() < 1e-6);
        assert!((entry.target_price() - 103.0).abs() < 1e-9);
        assert!((entry.stop_price() - 98.5).abs() < 1e-9);
        assert!(entry.rationale().contains("75% persistence"));
        assert!(entry.rationale().ends_with("SL: 98.50, TP: 103.00"));
        assert_eq!(monitor.state().last_fired_side(), Some(Side::Long));
        assert_eq!(rx.try_recv().unwrap(), ExportReason::Fired);

        // Review never runs again
        let next = monitor.cycle(after + Duration::seconds(1)).await.unwrap();
        assert!(matches!(next, CycleOutcome::Watching { .. }));
        assert_eq!(book.read().await.log().len(), 1);
    }

    #[tokio::test]
    async fn warmup_without_atr_falls_back_to_percent_levels() {
        let feed = feed_with_data().await;
        let scorer = Arc::new(ScriptedScorer::new(&[0.1, 0.1], f64::NAN));
        let (ctx, _rx) = context(feed, scorer, t0());
        let mut monitor = SymbolMonitor::new("SOL/USDT", ctx);

        monitor.cycle(t0()).await.unwrap();
        let CycleOutcome::WarmupReviewed(Some(entry)) =
            monitor.cycle(t0() + Duration::seconds(400)).await.unwrap()
        else {
            panic!("expected a warmup fire");
        };
        assert_eq!(entry.side(), Side::Short);
        assert!((entry.target_price() - 98.0).abs() < 1e-9);
        assert!((entry.stop_price() - 101.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn normal_mode_needs_three_agreeing_cycles() {
        let feed = feed_with_data().await;
        let scorer = Arc::new(ScriptedScorer::new(&[0.9], 1.0));
        // Warmup long over, nothing buffered
        let (ctx, mut rx) = context(feed, scorer, t0() - Duration::hours(1));
        let book = ctx.book.clone();
        let mut monitor = SymbolMonitor::new("SOL/USDT", ctx);

        let reviewed = monitor.cycle(t0()).await.unwrap();
        assert!(matches!(reviewed, CycleOutcome::WarmupReviewed(None)));

        for i in 1..3 {
            let outcome = monitor.cycle(t0() + Duration::seconds(i)).await.unwrap();
            assert!(matches!(
                outcome,
                CycleOutcome::Watching {
                    reason: BlockReason::NotSticky,
                    ..
                }
            ));
        }
        let fired = monitor.cycle(t0() + Duration::seconds(3)).await.unwrap();
        let CycleOutcome::Fired(entry) = fired else {
            panic!("expected a fire");
        };
        assert_eq!(entry.side(), Side::Long);
        assert!((entry.target_price() - 102.0).abs() < 1e-9);
        assert!((entry.stop_price() - 99.0).abs() < 1e-9);
        assert!(entry.rationale().ends_with("SL: 99.00, TP: 102.00"));
        assert!(book.read().await.is_active(&entry.id()));
        assert_eq!(rx.try_recv().unwrap(), ExportReason::Fired);

        let again = monitor.cycle(t0() + Duration::seconds(4)).await.unwrap();
        assert!(matches!(
            again,
            CycleOutcome::Watching {
                reason: BlockReason::SameAsLastFired,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn boundary_confidence_is_not_directional() {
        let feed = feed_with_data().await;
        let scorer = Arc::new(ScriptedScorer::new(&[0.7], 1.0));
        let (ctx, _rx) = context(feed, scorer, t0() - Duration::hours(1));
        let mut monitor = SymbolMonitor::new("SOL/USDT", ctx);
        monitor.cycle(t0()).await.unwrap();

        let outcome = monitor.cycle(t0() + Duration::seconds(1)).await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Watching {
                direction: None,
                reason: BlockReason::NoDirection
            }
        ));
    }

    #[tokio::test]
    async fn oversized_warmup_keeps_buffering() {
        let feed = feed_with_data().await;
        let scorer = Arc::new(ScriptedScorer::new(&[0.9], 1.0));
        let (mut ctx, _rx) = context(feed, scorer, t0());
        ctx.decision.warmup_secs = u64::MAX;
        let mut monitor = SymbolMonitor::new("SOL/USDT", ctx);

        let outcome = monitor.cycle(t0() + Duration::days(365)).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Warmup { buffered: 1 }));
    }

    #[tokio::test]
    async fn panicking_cycle_does_not_kill_the_loop() {
        let feed = feed_with_data().await;
        let (mut ctx, _rx) = context(feed, Arc::new(PanickingScorer), t0());
        ctx.decision.cycle_interval_ms = 5;
        let monitor = SymbolMonitor::new("SOL/USDT", ctx);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(monitor.run(shutdown_rx));
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        assert!(!task.is_finished());

        shutdown_tx.send(true).unwrap();
        task.await.expect("monitor task should exit cleanly");
    }
}
