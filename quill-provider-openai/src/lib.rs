//! OpenAI LLM Provider
//!
//! Implements `Provider` for the Chat Completions API, including
//! OpenAI-compatible endpoints via a custom base URL. Tool-call arguments
//! travel as JSON strings on the wire and are parsed back into values.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use quill_core::config::debug_prompts_enabled;
use quill_core::provider::{CompletionResponse, FinishReason, Provider, TokenUsage};
use quill_core::types::{Message, MessageContent, Role, ToolCall, ToolDefinition};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.unwrap_or("https://api.openai.com").to_string(),
            max_tokens: None,
            temperature: None,
            client: reqwest::Client::new(),
        }
    }

    /// Constrain generation (the summarizer runs with a small budget and
    /// low temperature).
    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = Some(max_tokens);
        self.temperature = Some(temperature);
        self
    }

    /// Convert the canonical transcript to the Chat Completions body.
    fn build_request_body(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
    ) -> serde_json::Value {
        let mut api_messages = Vec::new();

        if !system.is_empty() {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": system
            }));
        }

        for msg in messages {
            match (&msg.role, &msg.content) {
                (Role::User, MessageContent::Text(t)) => {
                    api_messages.push(serde_json::json!({
                        "role": "user",
                        "content": t
                    }));
                }
                (Role::Assistant, MessageContent::Text(t)) => {
                    api_messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": t
                    }));
                }
                (Role::Assistant, MessageContent::ToolUse { text, calls }) => {
                    let tool_calls: Vec<serde_json::Value> = calls
                        .iter()
                        .map(|c| {
                            serde_json::json!({
                                "id": c.id,
                                "type": "function",
                                "function": {
                                    "name": c.name,
                                    "arguments": c.arguments.to_string()
                                }
                            })
                        })
                        .collect();
                    let mut entry = serde_json::json!({
                        "role": "assistant",
                        "tool_calls": tool_calls
                    });
                    if !text.is_empty() {
                        entry["content"] = serde_json::json!(text);
                    }
                    api_messages.push(entry);
                }
                (Role::Tool, MessageContent::ToolResults(results)) => {
                    for r in results {
                        api_messages.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": r.call_id,
                            "content": r.output
                        }));
                    }
                }
                _ => {}
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": api_messages,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if !tools.is_empty() {
            let api_tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(api_tools);
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %self.model, url = %url, "calling OpenAI API");
        if debug_prompts_enabled() {
            eprintln!(
                "[openai request]\n{}",
                serde_json::to_string_pretty(&body).unwrap_or_default()
            );
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("openai provider: request failed")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("openai provider: API error (HTTP {}): {}", status, body);
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .context("openai provider: failed to decode response")?;

        let message = parsed
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .cloned()
            .unwrap_or_default();

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let tool_calls: Vec<ToolCall> = message
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .map(|calls| {
                calls
                    .iter()
                    .map(|c| {
                        let function = c.get("function").cloned().unwrap_or_default();
                        let arguments = function
                            .get("arguments")
                            .and_then(|a| a.as_str())
                            .and_then(|a| serde_json::from_str(a).ok())
                            .unwrap_or_else(|| serde_json::json!({}));
                        ToolCall {
                            id: c.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                            name: function
                                .get("name")
                                .and_then(|v| v.as_str())
                                .unwrap_or("")
                                .to_string(),
                            arguments,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let finish_reason = if !tool_calls.is_empty() {
            FinishReason::ToolCalls
        } else {
            match parsed
                .get("choices")
                .and_then(|c| c.as_array())
                .and_then(|c| c.first())
                .and_then(|choice| choice.get("finish_reason"))
                .and_then(|r| r.as_str())
            {
                Some("length") => FinishReason::MaxTokens,
                _ => FinishReason::Stop,
            }
        };

        let usage = parsed.get("usage").map(|u| TokenUsage {
            input_tokens: u
                .get("prompt_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            output_tokens: u
                .get("completion_tokens")
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
