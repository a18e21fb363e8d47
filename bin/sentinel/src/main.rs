use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, ExportBackend, Narrator};
use engine::{Agent, BinanceMarketData, CsvExporter, SignalExporter, SqliteExporter};
use narrative::{LlmNarrator, OfflineNarrator};
use strategy::{AgentFileConfig, ChecklistScorer};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let agent_cfg = AgentFileConfig::load(&cfg.agent_config_path)
        .unwrap_or_else(|e| panic!("Failed to load agent config: {e}"));
    info!(
        symbols = ?agent_cfg.symbols,
        config = %cfg.agent_config_path,
        "Sentinel starting"
    );

    // ── Signal log export ─────────────────────────────────────────────────────
    let exporter: Arc<dyn SignalExporter> = match &cfg.export {
        ExportBackend::Csv { path } => {
            info!(path = %path, "Exporting signal log to CSV");
            Arc::new(CsvExporter::new(path))
        }
        ExportBackend::Sqlite { database_url } => Arc::new(
            SqliteExporter::connect(database_url)
                .await
                .unwrap_or_else(|e| panic!("Failed to open signal database: {e}")),
        ),
    };

    // ── Narrative ─────────────────────────────────────────────────────────────
    let narrator: Arc<dyn Narrator> = match &cfg.hf_api_key {
        Some(key) => {
            info!(model = %cfg.narrative_model, "LLM commentary enabled");
            Arc::new(
                LlmNarrator::new(&cfg.narrative_endpoint, &cfg.narrative_model, key)
                    .unwrap_or_else(|e| panic!("Failed to build narrative client: {e}")),
            )
        }
        None => {
            warn!("HF_API_KEY not set, using offline commentary");
            Arc::new(OfflineNarrator)
        }
    };

    // ── Market data + scorer ──────────────────────────────────────────────────
    let market = Arc::new(
        BinanceMarketData::new(agent_cfg.market.book_depth)
            .unwrap_or_else(|e| panic!("Failed to build market-data client: {e}")),
    );
    let scorer = Arc::new(ChecklistScorer::new(agent_cfg.scoring.clone()));

    // ── Agent ─────────────────────────────────────────────────────────────────
    let (agent, handle) = Agent::new(
        agent_cfg.symbols.clone(),
        market,
        scorer,
        narrator,
        exporter,
        agent_cfg.decision.clone(),
        agent_cfg.market.clone(),
    );
    let agent_task = tokio::spawn(agent.run());

    info!("All monitors started. Press Ctrl-C to stop.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown signal received. Stopping agent.");
    handle.shutdown();

    if let Err(e) = agent_task.await {
        warn!(error = %e, "Agent task ended abnormally");
    }
    info!("Sentinel stopped.");
}
