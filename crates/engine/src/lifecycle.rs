use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use common::{MarketData, Narrator};
use strategy::{DecisionConfig, MarketConfig, Scorer};

use crate::book::{SharedBook, SignalBook};
use crate::evaluator::OutcomeEvaluator;
use crate::export::{self, ExportReason, SignalExporter};
use crate::gate::CooldownTable;
use crate::monitor::{MonitorContext, SymbolMonitor};

/// Cloneable handle for whoever owns the process (the binary, tests).
#[derive(Clone)]
pub struct AgentHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    book: SharedBook,
}

impl AgentHandle {
    /// Ask every task to stop after its current cycle.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn book(&self) -> SharedBook {
        self.book.clone()
    }
}

/// Owns the monitors, the evaluator and the exporter, and tears them
/// down in order.
pub struct Agent {
    symbols: Vec<String>,
    market: Arc<dyn MarketData>,
    scorer: Arc<dyn Scorer>,
    narrator: Arc<dyn Narrator>,
    exporter: Arc<dyn SignalExporter>,
    decision: DecisionConfig,
    market_config: MarketConfig,
    book: SharedBook,
    shutdown_rx: watch::Receiver<bool>,
    started_at: DateTime<Utc>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbols: Vec<String>,
        market: Arc<dyn MarketData>,
        scorer: Arc<dyn Scorer>,
        narrator: Arc<dyn Narrator>,
        exporter: Arc<dyn SignalExporter>,
        decision: DecisionConfig,
        market_config: MarketConfig,
    ) -> (Self, AgentHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let book = SignalBook::shared();

        let handle = AgentHandle {
            shutdown_tx: Arc::new(shutdown_tx),
            book: book.clone(),
        };

        let agent = Agent {
            symbols,
            market,
            scorer,
            narrator,
            exporter,
            decision,
            market_config,
            book,
            shutdown_rx,
            started_at: Utc::now(),
        };

        (agent, handle)
    }

    /// Run until the handle's `shutdown` is called, then join monitors and
    /// evaluator, drain the exporter and write a final snapshot. The export
    /// backend is closed before the market-data provider.
    pub async fn run(self) {
        info!(symbols = ?self.symbols, "Agent starting");

        let (export_tx, export_rx) = mpsc::channel::<ExportReason>(16);
        let exporter_task = tokio::spawn(export::run_exporter(
            export_rx,
            self.book.clone(),
            self.exporter.clone(),
        ));

        let ctx = MonitorContext {
            market: self.market.clone(),
            scorer: self.scorer.clone(),
            narrator: self.narrator.clone(),
            book: self.book.clone(),
            cooldowns: Arc::new(CooldownTable::new(
                self.symbols.iter().cloned(),
                ChronoDuration::minutes(self.decision.cooldown_minutes),
            )),
            export_tx: export_tx.clone(),
            decision: self.decision.clone(),
            market_config: self.market_config.clone(),
            started_at: self.started_at,
        };

        let mut tasks: Vec<(String, JoinHandle<()>)> = self
            .symbols
            .iter()
            .map(|symbol| {
                let monitor = SymbolMonitor::new(symbol.clone(), ctx.clone());
                (symbol.clone(), tokio::spawn(monitor.run(self.shutdown_rx.clone())))
            })
            .collect();

        let evaluator = OutcomeEvaluator::new(
            self.market.clone(),
            self.book.clone(),
            export_tx.clone(),
            Duration::from_secs(self.decision.evaluator_interval_secs),
        );
        tasks.push((
            "evaluator".to_string(),
            tokio::spawn(evaluator.run(self.shutdown_rx.clone())),
        ));

        let mut shutdown = self.shutdown_rx.clone();
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("Shutdown requested, stopping tasks");

        for (name, task) in tasks {
            if let Err(e) = task.await {
                error!(task = %name, error = %e, "Task ended abnormally");
            }
        }

        // Every sender must be gone before the exporter can drain.
        drop(ctx);
        drop(export_tx);
        if let Err(e) = exporter_task.await {
            error!(error = %e, "Exporter task ended abnormally");
        }

        export::flush(&self.book, self.exporter.as_ref(), ExportReason::Shutdown).await;
        self.exporter.close().await;
        self.market.close().await;

        let book = self.book.read().await;
        info!(
            signals = book.log().len(),
            pending = book.active_len(),
            "Agent stopped"
        );
    }
}
