//! LLM-structured extraction of trade confirmations
//!
//! Converts raw email/PDF text into the canonical payload. Provider
//! failures and malformed output degrade to a fallback payload; the
//! pipeline continues and matching simply finds no candidates.

pub mod openai;
pub mod prompt;

use async_trait::async_trait;
use fxrecon_common::model::LlmPayload;
use thiserror::Error;
use tracing::{debug, warn};

/// Context handed to the extractor for one ingestion unit
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub subject: String,
    pub body: String,
    pub sender_email: String,
    pub attachments_text: String,
    pub client_name: String,
}

/// Provider failure classification
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned unusable output: {0}")]
    BadOutput(String),
}

/// Capability interface for the completion provider.
///
/// Production bindings call a hosted model; tests use canned fakes.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Result of one extraction: the payload plus a flag recording
/// whether the fallback path was taken.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub payload: LlmPayload,
    pub failed: bool,
}

/// Run the extraction for one context.
///
/// Never errors: on provider failure, malformed JSON or schema
/// validation failure the fallback payload is returned with
/// `failed = true`.
pub async fn extract(provider: &dyn LlmProvider, context: &ExtractionContext) -> Extraction {
    let user = prompt::render_user_prompt(
        &context.subject,
        &context.body,
        &context.sender_email,
        &context.attachments_text,
        &context.client_name,
    );

    let raw = match provider.complete(prompt::SYSTEM_PROMPT, &user).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!(%err, "LLM provider failed, using fallback payload");
            return Extraction {
                payload: LlmPayload::fallback(),
                failed: true,
            };
        }
    };

    match parse_payload(&raw) {
        Ok(payload) => {
            debug!(
                confirmation = payload.email.confirmation,
                trades = payload.trades.len(),
                "extraction parsed"
            );
            Extraction {
                payload,
                failed: false,
            }
        }
        Err(err) => {
            warn!(%err, "LLM output failed to parse, using fallback payload");
            Extraction {
                payload: LlmPayload::fallback(),
                failed: true,
            }
        }
    }
}

/// Parse the provider output, with a single re-parse attempt that
/// strips markdown fences and surrounding prose.
fn parse_payload(raw: &str) -> Result<LlmPayload, LlmError> {
    match serde_json::from_str::<LlmPayload>(raw.trim()) {
        Ok(payload) => validate(payload),
        Err(first_err) => {
            let stripped = strip_to_json_object(raw)
                .ok_or_else(|| LlmError::BadOutput(first_err.to_string()))?;
            let payload = serde_json::from_str::<LlmPayload>(stripped)
                .map_err(|e| LlmError::BadOutput(e.to_string()))?;
            validate(payload)
        }
    }
}

/// Reject structurally valid JSON that violates the schema contract.
fn validate(mut payload: LlmPayload) -> Result<LlmPayload, LlmError> {
    if !payload.email.confirmation && !payload.trades.is_empty() {
        // non-confirmations carry no trades
        payload.trades.clear();
    }
    if payload.email.confirmation && payload.trades.is_empty() {
        return Err(LlmError::BadOutput(
            "confirmation with empty trades list".to_string(),
        ));
    }
    // the header count is advisory; trust the actual list
    payload.email.num_trades = payload.trades.len() as u32;
    Ok(payload)
}

/// Cut the substring between the first `{` and the last `}`.
fn strip_to_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}
