//! # Quill Agent Core
//!
//! Core library for the Quill interactive coding agent: the conversation
//! data model, the provider abstraction, the sandboxed tool catalog, the
//! cost ledger, history compaction, and the agent loop that ties them
//! together.

pub mod agent;
pub mod compact;
pub mod config;
pub mod cost;
pub mod provider;
pub mod safety;
pub mod system_prompt;
pub mod tools;
pub mod types;

// Re-export key types
pub use agent::{Agent, AgentSettings, MAX_ROUNDS_MESSAGE};
pub use compact::{ProviderSummarizer, Summarizer};
pub use config::RuntimeConfig;
pub use cost::{CostLedger, PricingProfile, UsageEntry};
pub use provider::{CompletionResponse, FinishReason, Provider, TokenUsage};
pub use safety::{ConfirmationHandler, SafetyGate};
pub use system_prompt::{SystemPromptManager, DEFAULT_SYSTEM_PROMPT};
pub use tools::{Tool, ToolRegistry};
pub use types::{Message, MessageContent, Role, ToolCall, ToolDefinition, ToolResult};
