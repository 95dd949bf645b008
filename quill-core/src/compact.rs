//! History Compaction
//!
//! Keeps the transcript bounded: once more than `history_window`
//! tool-result batches exist, the oldest prefix is replaced by a one-message
//! summary (when a summarizer is available) or its tool outputs are
//! truncated in place.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::provider::Provider;
use crate::tools::truncate_utf8;
use crate::types::{Message, MessageContent};

/// System instruction for the compacting model.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You condense coding-assistant conversations. Reply with \
a factual 2-3 sentence summary of what the user asked and what was done. Plain prose only: no \
code, no lists, no headings.";

pub const TRUNCATION_MARKER: &str = "… [truncated]";
const TRUNCATED_OUTPUT_MAX: usize = 200;

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// Single-method capability for turning a transcript rendering into a short
/// summary. Absence selects the truncation fallback.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<String>;
}

/// Summarizer backed by a (typically cheaper) provider.
pub struct ProviderSummarizer {
    provider: Arc<dyn Provider>,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<String> {
        let messages = vec![Message::user(transcript)];
        let response = self
            .provider
            .chat(&messages, &[], SUMMARY_SYSTEM_PROMPT)
            .await?;
        let summary = response.text.trim();
        if summary.is_empty() {
            bail!("summarizer returned no text");
        }
        Ok(summary.to_string())
    }
}

// ---------------------------------------------------------------------------
// Compaction
// ---------------------------------------------------------------------------

/// Bound the transcript to `history_window` full-fidelity tool-result
/// batches. The prefix up to (and including) the excess batches is
/// replaced with a single user-role summary message. When no summarizer
/// is configured or it fails, the prefix stays and its tool outputs are
/// truncated in place instead. Structural messages always survive
/// truncation, so the call/result pairing of the remaining tail is
/// untouched.
pub async fn compact_history(
    messages: &mut Vec<Message>,
    history_window: usize,
    summarizer: Option<&Arc<dyn Summarizer>>,
) {
    let batch_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_tool_result_batch())
        .map(|(i, _)| i)
        .collect();

    if batch_indices.len() <= history_window {
        return;
    }
    let excess = batch_indices.len() - history_window;
    let cutoff = batch_indices[excess - 1] + 1;

    if let Some(summarizer) = summarizer {
        let rendered = render_transcript(&messages[..cutoff]);
        match summarizer.summarize(&rendered).await {
            Ok(summary) => {
                let note = Message::user(format!(
                    "[Context from earlier in this conversation: {}]",
                    summary
                ));
                messages.splice(..cutoff, [note]);
                tracing::debug!(replaced = cutoff, "compacted history via summarizer");
                return;
            }
            Err(e) => {
                tracing::warn!(err = %e, "summarizer failed, falling back to truncation");
            }
        }
    }

    let mut truncated = 0;
    for &idx in batch_indices.iter().take(excess) {
        if let MessageContent::ToolResults(results) = &mut messages[idx].content {
            for result in results {
                if result.output.len() > TRUNCATED_OUTPUT_MAX {
                    let mut short =
                        truncate_utf8(&result.output, TRUNCATED_OUTPUT_MAX).to_string();
                    short.push_str(TRUNCATION_MARKER);
                    result.output = short;
                    truncated += 1;
                }
            }
        }
    }
    tracing::debug!(truncated, "compacted history via truncation");
}

/// Plain-text rendering of a transcript slice for the summarizer.
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        match &message.content {
            MessageContent::Text(text) => {
                let speaker = match message.role {
                    crate::types::Role::Assistant => "Agent",
                    _ => "User",
                };
                out.push_str(&format!("{}: {}\n", speaker, text));
            }
            MessageContent::ToolUse { text, calls } => {
                let annotations: Vec<String> = calls
                    .iter()
                    .map(|c| format!("{}({})", c.name, c.arguments))
                    .collect();
                out.push_str(&format!(
                    "Agent: {} [called: {}]\n",
                    text,
                    annotations.join(", ")
                ));
            }
            MessageContent::ToolResults(results) => {
                for result in results {
                    out.push_str(&format!(
                        "Result({}): {}\n",
                        result.name,
                        truncate_utf8(&result.output, 120)
                    ));
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
