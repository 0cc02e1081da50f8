//! # Insight Collaborator
//!
//! Turns a metrics payload into analyst prose through an external text
//! generator.
//!
//! ## Request Flow
//! ```text
//! ┌────────────────┐   metrics JSON    ┌──────────────────┐   POST /api/generate   ┌──────────┐
//! │   Aggregator   │ ── truncated ───► │ InsightGenerator │ ─────────────────────► │  Ollama  │
//! │                │   + instruction   │  (OllamaClient)  │ ◄───── {"response"} ── │          │
//! └────────────────┘                   └──────────────────┘                        └──────────┘
//! ```
//!
//! Failures (transport, timeout, non-2xx, unreadable body) surface as
//! `EngineError::DownstreamCollaborator`. Nothing is retried.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::InsightSettings;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Instructions
// =============================================================================

/// Which analyst instruction accompanies a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightKind {
    /// One upload's metrics.
    Single,
    /// One sales and one inventory upload.
    Pair,
    /// Everything ready in a batch.
    Batch,
}

impl InsightKind {
    pub fn instruction(&self) -> &'static str {
        match self {
            InsightKind::Single => {
                "You are a retail analyst. Using the JSON below, return:\n\
                 1) 5 concise, numbered insights\n\
                 2) 3 actions (bullets)\n\
                 Keep it short and practical."
            }
            InsightKind::Pair => {
                "You are a retail analyst. Using the combined JSON (sales + inventory), return:\n\
                 1) 6 concise, numbered insights that connect sales and inventory \
                 (e.g., stockouts impacting revenue, high AOV items vs. on-hand)\n\
                 2) 4 prioritized actions (bullets), referencing SKUs/dates if relevant\n\
                 Keep it short and practical."
            }
            InsightKind::Batch => {
                "You are a retail analyst. Using the aggregated JSON (may include multiple \
                 sales and inventory files), return:\n\
                 1) 6 concise, numbered insights connecting sales and inventory \
                 (e.g., stockouts causing missed revenue, fast movers vs on-hand).\n\
                 2) 4 prioritized actions (bullets), referencing SKUs/dates if relevant.\n\
                 Be brief and practical."
            }
        }
    }
}

/// Cuts `payload` to at most `budget` characters without splitting a
/// character.
pub fn truncate_payload(payload: &str, budget: usize) -> &str {
    match payload.char_indices().nth(budget) {
        Some((byte_idx, _)) => &payload[..byte_idx],
        None => payload,
    }
}

/// Full prompt text: instruction, then the JSON payload.
pub fn build_prompt(instruction: &str, metrics_json: &str) -> String {
    format!("{instruction}\nJSON:\n{metrics_json}\n")
}

// =============================================================================
// Generator Trait
// =============================================================================

/// External text generator.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    /// Produces free text for an instruction over a metrics payload.
    async fn generate(&self, instruction: &str, metrics_json: &str) -> EngineResult<String>;
}

// =============================================================================
// Ollama Client
// =============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// `InsightGenerator` backed by an Ollama `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(settings: &InsightSettings) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| EngineError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.host.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl InsightGenerator for OllamaClient {
    async fn generate(&self, instruction: &str, metrics_json: &str) -> EngineResult<String> {
        let prompt = build_prompt(instruction, metrics_json);
        let url = self.endpoint();

        debug!(url = %url, model = %self.model, prompt_chars = prompt.chars().count(), "Requesting insight");

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt: &prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "Insight request failed");
                EngineError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Insight service returned an error");
            return Err(EngineError::downstream(Some(status.as_u16()), body));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Insight response could not be decoded");
            EngineError::from(e)
        })?;

        Ok(body.response.trim().to_string())
    }
}
