use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::{Error, NarrativeContext, Narrator, Result, Side, NARRATIVE_FALLBACK};

/// Narrator backed by an OpenAI-compatible chat-completion endpoint
/// (the Hugging Face inference router by default).
pub struct LlmNarrator {
    endpoint: String,
    model: String,
    api_key: String,
    http: Client,
}

impl LlmNarrator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            http,
        })
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Http(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.map(|m| m.content).or(c.text))
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| Error::Other("completion contained no text".into()))
    }
}

#[async_trait]
impl Narrator for LlmNarrator {
    async fn describe(
        &self,
        symbol: &str,
        side: Side,
        rationale: &str,
        context: &NarrativeContext,
    ) -> String {
        debug!(symbol, "Requesting signal commentary");
        match self.complete(build_prompt(symbol, side, rationale, context)).await {
            Ok(text) => text,
            Err(e) => {
                warn!(symbol, error = %e, "Commentary generation failed");
                NARRATIVE_FALLBACK.to_string()
            }
        }
    }
}

/// Narrator used when no API key is configured: a one-line summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineNarrator;

#[async_trait]
impl Narrator for OfflineNarrator {
    async fn describe(
        &self,
        symbol: &str,
        side: Side,
        _rationale: &str,
        context: &NarrativeContext,
    ) -> String {
        format!(
            "{side} {symbol} (confidence {}, SL {}, TP {}).",
            fmt_pct(context.confidence),
            fmt_price(context.stop_price),
            fmt_price(context.target_price)
        )
    }
}

fn fmt_price(value: Option<f64>) -> String {
    value.map_or("N/A".to_string(), |v| format!("{v:.4}"))
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or("N/A".to_string(), |v| format!("{:.2}%", v * 100.0))
}

/// Prompt sent to the completion endpoint.
pub fn build_prompt(
    symbol: &str,
    side: Side,
    rationale: &str,
    context: &NarrativeContext,
) -> String {
    let book = match (context.best_bid, context.best_ask) {
        (None, None) => "N/A".to_string(),
        (bid, ask) => format!("Top bid: {}, Top ask: {}", fmt_price(bid), fmt_price(ask)),
    };
    let trending = if context.trending.is_empty() {
        "None".to_string()
    } else {
        format!("Trending coins: {}", context.trending.join(", "))
    };

    format!(
        "You are a crypto long/short market analyst. Assess the following signal for {symbol}.\n\
         Signal produced: {side} (Confidence: {}).\n\
         Stop Loss: {}, Take Profit: {}.\n\
         Order Book Snapshot:\n{book}\n\
         Market Heatmap:\n{trending}\n\
         Model rationale & reasonings:\n{rationale}\n\
         Please provide a concise, factual trading idea in 1-2 sentences \
         suitable for terminal output. \
         Do not speculate or exaggerate. Warn if data is inconclusive.",
        fmt_pct(context.confidence),
        fmt_price(context.stop_price),
        fmt_price(context.target_price),
    )
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}
