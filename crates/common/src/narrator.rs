use async_trait::async_trait;

use crate::Side;

/// Text returned whenever commentary could not be produced.
pub const NARRATIVE_FALLBACK: &str = "No AI commentary available due to error.";

/// Optional market context handed to the narrator alongside the rationale.
#[derive(Debug, Clone, Default)]
pub struct NarrativeContext {
    pub confidence: Option<f64>,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub trending: Vec<String>,
}

/// Produces short human-readable commentary for a fired signal.
///
/// Implementations never fail: on any error they return
/// [`NARRATIVE_FALLBACK`] so the decision pipeline is never aborted.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn describe(
        &self,
        symbol: &str,
        side: Side,
        rationale: &str,
        context: &NarrativeContext,
    ) -> String;
}
