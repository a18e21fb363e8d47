pub mod binance;
pub mod book;
pub mod evaluator;
pub mod export;
pub mod gate;
pub mod lifecycle;
pub mod monitor;
pub mod state;
pub mod warmup;

pub use binance::BinanceMarketData;
pub use book::{SharedBook, SignalBook};
pub use evaluator::OutcomeEvaluator;
pub use export::{CsvExporter, ExportReason, SignalExporter, SqliteExporter};
pub use gate::{BlockReason, CooldownTable, Gate, GateDecision};
pub use lifecycle::{Agent, AgentHandle};
pub use monitor::{CycleOutcome, MonitorContext, SymbolMonitor};
pub use warmup::{Consensus, WarmupVerdict};
