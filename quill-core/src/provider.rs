//! LLM Provider Trait and Types
//!
//! Defines the `Provider` trait and the canonical completion response every
//! vendor implementation maps into.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Message, ToolCall, ToolDefinition};

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Token usage for a single LLM call, as reported by the vendor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    MaxTokens,
    Error,
}

/// Canonical response from a `Provider::chat` call.
///
/// `finish_reason` is `ToolCalls` iff at least one tool call is present.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Text content (may be empty when the model only called tools).
    pub text: String,
    /// Tool calls requested by the model, in declared order.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage, when the vendor reports it.
    pub usage: Option<TokenUsage>,
    pub finish_reason: FinishReason,
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Uniform request/response contract over an LLM vendor.
///
/// Implementations own the translation between the canonical transcript and
/// the vendor's native message shape, and between the JSON-Schema subset and
/// the vendor's schema vocabulary. Any transport, auth, rate-limit, or
/// decoding failure surfaces as a single error whose context names the
/// provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g. "gemini", "anthropic", "openai").
    fn name(&self) -> &str;

    /// Active model name.
    fn model(&self) -> &str;

    /// Send a completion request. `system` is attached out-of-band; the
    /// transcript contains only user/assistant/tool-result elements.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<CompletionResponse>;
}
