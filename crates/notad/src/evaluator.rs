//! Rubric evaluator client backed by a local Ollama endpoint.
//!
//! One call per rubric. Robust output handling for common LLM variations:
//! - JSON wrapped in markdown code fences
//! - JSON wrapped in prose
//! - missing optional fields
//!
//! Every failure (network error, non-2xx, parse failure, deadline) is
//! reported on the returned rubric result. This client never raises out of
//! `evaluate`: sibling rubric calls must not be aborted by one bad call.

use anyhow::{Context, Result};
use async_trait::async_trait;
use nota_common::config::{EvaluatorConfig, RubricPrompts};
use nota_common::rubric::{RubricKind, RubricPayload, RubricResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Immutable input bundle shared by the four rubric calls.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    /// Methodology reference document for the scenario, possibly empty.
    pub reference_document: String,
    /// Rendered transcript of the session.
    pub transcript: String,
    /// Free-form scenario context, possibly empty.
    pub scenario_context: String,
}

/// One rubric evaluation against an opaque scoring service.
#[async_trait]
pub trait RubricEvaluator: Send + Sync {
    /// Evaluate one rubric. Always returns a result object: failures are
    /// carried in `RubricResult::error`, never raised.
    async fn evaluate(&self, kind: RubricKind, request: &EvaluationRequest) -> RubricResult;
}

/// Ollama chat request (the subset of the API we use)
#[derive(Debug, Clone, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

/// Ollama message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama chat response
#[derive(Debug, Clone, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

/// Rubric evaluator speaking to a local Ollama instance.
pub struct OllamaEvaluator {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    keep_alive: String,
    call_timeout: Duration,
    prompts: RubricPrompts,
}

impl OllamaEvaluator {
    pub fn new(config: &EvaluatorConfig, prompts: RubricPrompts) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            keep_alive: config.keep_alive.clone(),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            prompts,
        }
    }

    /// Check if the evaluation service answers at all.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        self.http_client.get(&url).send().await.is_ok()
    }

    fn build_user_prompt(&self, request: &EvaluationRequest) -> String {
        let mut prompt = String::new();
        if !request.reference_document.is_empty() {
            prompt.push_str("=== DOCUMENT DE RÉFÉRENCE ===\n");
            prompt.push_str(&request.reference_document);
            prompt.push_str("\n\n");
        }
        if !request.scenario_context.is_empty() {
            prompt.push_str("=== CONTEXTE DU SCÉNARIO ===\n");
            prompt.push_str(&request.scenario_context);
            prompt.push_str("\n\n");
        }
        prompt.push_str("=== TRANSCRIPTION DE L'APPEL ===\n");
        prompt.push_str(&request.transcript);
        prompt
    }

    /// Raw chat call with the configured model.
    async fn call_chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            stream: false,
            format: Some("json".to_string()),
            keep_alive: Some(self.keep_alive.clone()),
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to evaluator")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Evaluator returned error {}: {}", status, error_text);
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse evaluator response")?;

        Ok(chat_response.message.content)
    }

    async fn evaluate_inner(
        &self,
        kind: RubricKind,
        request: &EvaluationRequest,
    ) -> Result<RubricPayload> {
        let system_prompt = self.prompts.for_kind(kind);
        let user_prompt = self.build_user_prompt(request);
        let text = self.call_chat(system_prompt, &user_prompt).await?;
        parse_rubric_payload(kind, &text).map_err(|e| anyhow::anyhow!(e))
    }
}

#[async_trait]
impl RubricEvaluator for OllamaEvaluator {
    async fn evaluate(&self, kind: RubricKind, request: &EvaluationRequest) -> RubricResult {
        let start = Instant::now();
        match tokio::time::timeout(self.call_timeout, self.evaluate_inner(kind, request)).await {
            Ok(Ok(payload)) => {
                info!(
                    "[{}] evaluated in {:.1}s",
                    kind,
                    start.elapsed().as_secs_f64()
                );
                RubricResult::ok(kind, payload)
            }
            Ok(Err(e)) => {
                warn!("[{}] evaluation failed: {:#}", kind, e);
                RubricResult::failed(kind, format!("{:#}", e))
            }
            Err(_) => {
                warn!(
                    "[{}] evaluation timed out after {}s",
                    kind,
                    self.call_timeout.as_secs()
                );
                RubricResult::failed(
                    kind,
                    format!("timeout after {}s", self.call_timeout.as_secs()),
                )
            }
        }
    }
}

/// Strip surrounding markdown code fences from model output.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // the opening fence may carry a language tag ("```json")
    let inner = match inner.find('\n') {
        Some(idx) => &inner[idx + 1..],
        None => inner,
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Extract the JSON object span when the model wraps it in prose.
fn extract_json(text: &str) -> &str {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }
    text
}

/// Parse raw model output into the typed payload for `kind`.
pub fn parse_rubric_payload(kind: RubricKind, text: &str) -> Result<RubricPayload, String> {
    let cleaned = strip_code_fences(text);
    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(v) => v,
        Err(_) => serde_json::from_str::<Value>(extract_json(cleaned))
            .map_err(|e| format!("invalid JSON from evaluator: {}", e))?,
    };
    RubricPayload::from_value(kind, value).map_err(|e| format!("unexpected payload shape: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nota_common::scoring::StepCode;

    #[test]
    fn test_strip_code_fences_with_language_tag() {
        let fenced = "```json\n{\"etapes\": []}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"etapes\": []}");
    }

    #[test]
    fn test_strip_code_fences_plain_text_untouched() {
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = "Voici mon évaluation : {\"observations\": []} en espérant que ça aide";
        assert_eq!(extract_json(text), "{\"observations\": []}");
    }

    #[test]
    fn test_parse_payload_fenced_methodologie() {
        let raw = "```json\n{\"etapes\": [{\"code\": \"A\", \"titre\": \"2. Accroche\", \"score\": 60}]}\n```";
        let payload = parse_rubric_payload(RubricKind::Methodologie, raw).unwrap();
        let steps = payload.as_methodologie().unwrap().resolved_steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].code, StepCode::A);
        assert_eq!(steps[0].score, 60.0);
    }

    #[test]
    fn test_parse_payload_with_prose_wrapper() {
        let raw = "Bien sûr ! {\"corrections\": [\"'Nexa' entendu 'Nexia'\"]} Voilà.";
        let payload = parse_rubric_payload(RubricKind::Transcription, raw).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["corrections"][0], "'Nexa' entendu 'Nexia'");
    }

    #[test]
    fn test_parse_payload_invalid_json_is_error() {
        let err = parse_rubric_payload(RubricKind::Discours, "pas du json").unwrap_err();
        assert!(err.contains("invalid JSON"));
    }

    #[test]
    fn test_parse_payload_wrong_shape_is_error() {
        // etapes must be an array
        let err =
            parse_rubric_payload(RubricKind::Methodologie, "{\"etapes\": \"oui\"}").unwrap_err();
        assert!(err.contains("unexpected payload shape"));
    }
}
