pub mod config;
pub mod frame;
pub mod indicators;
pub mod reasoning;
pub mod scorer;

pub use config::{
    AgentFileConfig, DecisionConfig, MarketConfig, ScoringConfig, Thresholds, MAX_WARMUP_SECS,
};
pub use frame::{align, compute_indicators, Frame, Row};
pub use scorer::{Assessment, ChecklistScorer, Scorer};
