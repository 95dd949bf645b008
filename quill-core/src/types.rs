//! Conversation Data Model
//!
//! Message, tool-call, and tool-definition types shared across the agent.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// An element of the ordered conversation transcript.
///
/// The system prompt is not part of the transcript; it travels out-of-band
/// on every provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

/// Message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Message content: plain text, an assistant turn with tool calls, or the
/// batch of results for the preceding turn's calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolUse {
        text: String,
        calls: Vec<ToolCall>,
    },
    ToolResults(Vec<ToolResult>),
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// An assistant turn that requested tool calls. `text` may be empty.
    pub fn tool_use(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolUse {
                text: text.into(),
                calls,
            },
        }
    }

    /// The batch of results paired 1:1, in order, with the most recent
    /// assistant turn's tool calls.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResults(results),
        }
    }

    pub fn is_tool_result_batch(&self) -> bool {
        matches!(self.content, MessageContent::ToolResults(_))
    }
}

// ---------------------------------------------------------------------------
// Tool types
// ---------------------------------------------------------------------------

/// A tool call requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id assigned by the provider (or synthesized when the vendor
    /// pairs results by name instead).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub arguments: serde_json::Value,
}

/// Result of executing a single tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call id this result answers.
    pub call_id: String,
    /// Name of the tool that produced the result.
    pub name: String,
    /// UTF-8 output of the tool.
    pub output: String,
    /// Whether the tool execution failed or was denied.
    pub is_error: bool,
}

/// A tool definition advertised to the LLM.
///
/// `parameters` is a JSON Schema restricted to the subset every supported
/// vendor understands: `type` in {string, number, integer, boolean, array,
/// object}, `description`, `properties`, `required`, `items`, `enum`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}
