//! Google Gemini LLM Provider
//!
//! Implements `Provider` for the Gemini `generateContent` API: canonical
//! transcript → `contents`, tool definitions → `functionDeclarations` (with
//! schema translation), tool results → `functionResponse` parts paired by
//! tool name.

mod schema;

pub use schema::to_gemini_schema;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use quill_core::config::debug_prompts_enabled;
use quill_core::provider::{CompletionResponse, FinishReason, Provider, TokenUsage};
use quill_core::types::{Message, MessageContent, Role, ToolCall, ToolDefinition};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct GeminiProvider {
    api_key: String,
    model: String,
    base_url: String,
    max_output_tokens: u32,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, "https://generativelanguage.googleapis.com")
    }

    /// Point the provider at a different endpoint (used by tests).
    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_output_tokens: 8192,
            temperature: None,
            client: reqwest::Client::new(),
        }
    }

    /// Constrain generation (the summarizer runs with a small budget and
    /// low temperature).
    pub fn with_generation(mut self, max_output_tokens: u32, temperature: f32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self.temperature = Some(temperature);
        self
    }

    /// Convert the canonical transcript to the Gemini request body.
    fn build_request_body(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
    ) -> serde_json::Value {
        let mut contents = Vec::new();

        for msg in messages {
            match (&msg.role, &msg.content) {
                (Role::User, MessageContent::Text(t)) => {
                    contents.push(serde_json::json!({
                        "role": "user",
                        "parts": [{ "text": t }]
                    }));
                }
                (Role::Assistant, MessageContent::Text(t)) => {
                    contents.push(serde_json::json!({
                        "role": "model",
                        "parts": [{ "text": t }]
                    }));
                }
                (Role::Assistant, MessageContent::ToolUse { text, calls }) => {
                    let mut parts = Vec::new();
                    if !text.is_empty() {
                        parts.push(serde_json::json!({ "text": text }));
                    }
                    for call in calls {
                        parts.push(serde_json::json!({
                            "functionCall": {
                                "name": call.name,
                                "args": call.arguments
                            }
                        }));
                    }
                    contents.push(serde_json::json!({ "role": "model", "parts": parts }));
                }
                (Role::Tool, MessageContent::ToolResults(results)) => {
                    let parts: Vec<serde_json::Value> = results
                        .iter()
                        .map(|r| {
                            serde_json::json!({
                                "functionResponse": {
                                    "name": r.name,
                                    "response": { "result": r.output }
                                }
                            })
                        })
                        .collect();
                    contents.push(serde_json::json!({ "role": "user", "parts": parts }));
                }
                _ => {}
            }
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": self.max_output_tokens,
            }
        });
        if let Some(temperature) = self.temperature {
            body["generationConfig"]["temperature"] = serde_json::json!(temperature);
        }

        if !system.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": system }]
            });
        }

        if !tools.is_empty() {
            let declarations: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": to_gemini_schema(&t.parameters)
                    })
                })
                .collect();
            body["tools"] = serde_json::json!([{
                "functionDeclarations": declarations
            }]);
            body["toolConfig"] = serde_json::json!({
                "functionCallingConfig": { "mode": "AUTO" }
            });
        }

        body
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<CompletionResponse> {
        let body = self.build_request_body(messages, tools, system);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = %self.model, "calling Gemini API");
        if debug_prompts_enabled() {
            eprintln!(
                "[gemini request]\n{}",
                serde_json::to_string_pretty(&body).unwrap_or_default()
            );
        }

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("gemini provider: request failed")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("gemini provider: API error (HTTP {}): {}", status, body);
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .context("gemini provider: failed to decode response")?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        if let Some(parts) = parsed
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|p| p.as_array())
        {
            for part in parts {
                if let Some(chunk) = part.get("text").and_then(|t| t.as_str()) {
                    text.push_str(chunk);
                }
                if let Some(call) = part.get("functionCall") {
                    tool_calls.push(ToolCall {
                        // Gemini pairs responses by name; synthesize an id
                        // for the canonical model.
                        id: uuid::Uuid::new_v4().to_string(),
                        name: call
                            .get("name")
                            .and_then(|n| n.as_str())
                            .unwrap_or("")
                            .to_string(),
                        arguments: call
                            .get("args")
                            .cloned()
                            .unwrap_or_else(|| serde_json::json!({})),
                    });
                }
            }
        }

        let finish_reason = if !tool_calls.is_empty() {
            FinishReason::ToolCalls
        } else if parsed
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|candidate| candidate.get("finishReason"))
            .and_then(|r| r.as_str())
            == Some("MAX_TOKENS")
        {
            FinishReason::MaxTokens
        } else {
            FinishReason::Stop
        };

        let usage = parsed.get("usageMetadata").map(|meta| TokenUsage {
            input_tokens: meta
                .get("promptTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            output_tokens: meta
                .get("candidatesTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
        });

        Ok(CompletionResponse {
            text,
            tool_calls,
            usage,
            finish_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
