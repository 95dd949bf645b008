//! Anthropic LLM Provider
//!
//! Implements `Provider` for the Anthropic Messages API: `tool_use` and
//! `tool_result` content blocks paired by call id, JSON Schema passed
//! through as `input_schema`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use quill_core::config::debug_prompts_enabled;
use quill_core::provider::{CompletionResponse, FinishReason, Provider, TokenUsage};
use quill_core::types::{Message, MessageContent, Role, ToolCall, ToolDefinition};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.unwrap_or("https://api.anthropic.com").to_string(),
            max_tokens: 8192,
            temperature: None,
            client: reqwest::Client::new(),
        }
    }

    /// Constrain generation (the summarizer runs with a small budget and
    /// low temperature).
    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = Some(temperature);
        self
    }

    /// Convert the canonical transcript to the Messages API body.
    fn build_request_body(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
    ) -> serde_json::Value {
        let mut api_messages = Vec::new();

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
                    let mut content = Vec::new();
                    if !text.is_empty() {
                        content.push(serde_json::json!({ "type": "text", "text": text }));
                    }
                    for call in calls {
                        content.push(serde_json::json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments
                        }));
                    }
                    api_messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": content
                    }));
                }
                (Role::Tool, MessageContent::ToolResults(results)) => {
                    let content: Vec<serde_json::Value> = results
                        .iter()
                        .map(|r| {
                            serde_json::json!({
                                "type": "tool_result",
                                "tool_use_id": r.call_id,
                                "content": r.output,
                                "is_error": r.is_error
                            })
                        })
                        .collect();
                    api_messages.push(serde_json::json!({
                        "role": "user",
                        "content": content
                    }));
                }
                _ => {}
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": api_messages,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if !system.is_empty() {
            body["system"] = serde_json::json!(system);
        }

        if !tools.is_empty() {
            let api_tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(api_tools);
            body["tool_choice"] = serde_json::json!({ "type": "auto" });
        }

        body
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
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
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %self.model, url = %url, "calling Anthropic API");
        if debug_prompts_enabled() {
            eprintln!(
                "[anthropic request]\n{}",
                serde_json::to_string_pretty(&body).unwrap_or_default()
            );
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("anthropic provider: request failed")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("anthropic provider: API error (HTTP {}): {}", status, body);
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .context("anthropic provider: failed to decode response")?;

        let blocks = parsed
            .get("content")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();

        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        let tool_calls: Vec<ToolCall> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
            .map(|b| ToolCall {
                id: b.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                name: b
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                arguments: b
                    .get("input")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({})),
            })
            .collect();

        let finish_reason = if !tool_calls.is_empty() {
            FinishReason::ToolCalls
        } else {
            match parsed.get("stop_reason").and_then(|s| s.as_str()) {
                Some("max_tokens") => FinishReason::MaxTokens,
                _ => FinishReason::Stop,
            }
        };

        let usage = parsed.get("usage").map(|u| TokenUsage {
            input_tokens: u
                .get("input_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            output_tokens: u
                .get("output_tokens")
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

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::types::ToolResult;
    use serde_json::json;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new("test-key", "claude-sonnet-4-20250514", None)
    }

    #[test]
    fn system_rides_out_of_band() {
        let body = provider().build_request_body(&[Message::user("hi")], &[], "be brief");
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn tool_use_blocks_carry_call_ids() {
        let messages = vec![
            Message::tool_use(
                "",
                vec![ToolCall {
                    id: "toolu_1".into(),
                    name: "list_dir".into(),
                    arguments: json!({}),
                }],
            ),
            Message::tool_results(vec![ToolResult {
                call_id: "toolu_1".into(),
                name: "list_dir".into(),
                output: "src/".into(),
                is_error: false,
            }]),
        ];
        let body = provider().build_request_body(&messages, &[], "");

        assert_eq!(body["messages"][0]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][0]["content"][0]["id"], "toolu_1");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_result");
        assert_eq!(body["messages"][1]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(body["messages"][1]["content"][0]["is_error"], false);
    }

    #[test]
    fn schema_passes_through_and_choice_is_auto() {
        let tools = vec![ToolDefinition {
            name: "echo".into(),
            description: "Echo".into(),
            parameters: json!({
                "type": "object",
                "properties": { "message": { "type": "string" } }
            }),
        }];
        let body = provider().build_request_body(&[], &tools, "");

        assert_eq!(
            body["tools"][0]["input_schema"]["properties"]["message"]["type"],
            "string"
        );
        assert_eq!(body["tool_choice"]["type"], "auto");
    }
}
