pub mod config;
pub mod error;
pub mod market;
pub mod narrator;
pub mod signal;
pub mod types;

pub use config::{Config, ExportBackend};
pub use error::{Error, Result};
pub use market::MarketData;
pub use narrator::{NarrativeContext, Narrator, NARRATIVE_FALLBACK};
pub use signal::{classify, Offsets, Outcome, SignalEntry, SignalStatus};
pub use types::*;
