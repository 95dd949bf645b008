//! End-to-end agent-loop tests against the real tool catalog: a scripted
//! provider walks the loop through genuine filesystem effects in a
//! temporary project.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use quill_core::provider::{CompletionResponse, FinishReason, Provider, TokenUsage};
use quill_core::safety::{deny_all, SafetyGate};
use quill_core::types::{Message, MessageContent, ToolCall, ToolDefinition};
use quill_core::{Agent, AgentSettings, ToolRegistry};

struct ScriptedProvider {
    responses: Mutex<Vec<CompletionResponse>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<CompletionResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
        })
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "gemini-2.5-pro"
    }

    async fn chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _system: &str,
    ) -> Result<CompletionResponse> {
        Ok(self.responses.lock().unwrap().remove(0))
    }
}

fn tool_round(name: &str, args: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        text: String::new(),
        tool_calls: vec![ToolCall {
            id: format!("call-{}", name),
            name: name.into(),
            arguments: args,
        }],
        usage: Some(TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        }),
        finish_reason: FinishReason::ToolCalls,
    }
}

fn final_text(text: &str) -> CompletionResponse {
    CompletionResponse {
        text: text.into(),
        tool_calls: vec![],
        usage: Some(TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        }),
        finish_reason: FinishReason::Stop,
    }
}

fn batch_outputs(agent: &Agent) -> Vec<(String, bool)> {
    agent
        .messages()
        .iter()
        .filter_map(|m| match &m.content {
            MessageContent::ToolResults(results) => Some(
                results
                    .iter()
                    .map(|r| (r.output.clone(), r.is_error))
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        })
        .flatten()
        .collect()
}

#[tokio::test]
async fn write_edit_read_cycle_touches_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    let path = file.to_str().unwrap();

    let provider = ScriptedProvider::new(vec![
        tool_round("write_file", json!({"path": path, "content": "alpha\nbeta\n"})),
        tool_round(
            "edit_file",
            json!({"path": path, "old_text": "beta", "new_text": "gamma"}),
        ),
        tool_round("read_file", json!({"path": path})),
        final_text("done"),
    ]);

    let gate = Arc::new(SafetyGate::new(dir.path(), deny_all()));
    let registry = ToolRegistry::with_builtin_tools(gate);
    let mut agent = Agent::new(provider, registry, "sys", AgentSettings::default());

    let reply = agent.process_message("take notes").await.unwrap();
    assert_eq!(reply, "done");

    assert_eq!(
        tokio::fs::read_to_string(&file).await.unwrap(),
        "alpha\ngamma\n"
    );

    let outputs = batch_outputs(&agent);
    assert_eq!(outputs.len(), 3);
    assert!(outputs.iter().all(|(_, is_error)| !is_error));
    assert!(outputs[2].0.contains("2: gamma"));

    // Three provider calls of 100/20 each land in the ledger.
    assert_eq!(agent.ledger().call_count(), 4);
    assert_eq!(agent.ledger().total_input_tokens(), 400);
}

#[tokio::test]
async fn denied_destructive_command_leaves_project_intact() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    tokio::fs::create_dir(&src).await.unwrap();
    tokio::fs::write(src.join("main.rs"), "fn main() {}\n")
        .await
        .unwrap();

    let provider = ScriptedProvider::new(vec![
        tool_round(
            "run_command",
            json!({"command": format!("rm -rf {}", src.display())}),
        ),
        final_text("I could not delete that."),
    ]);

    let gate = Arc::new(SafetyGate::new(dir.path(), deny_all()));
    let registry = ToolRegistry::with_builtin_tools(gate);
    let mut agent = Agent::new(provider, registry, "sys", AgentSettings::default());

    let reply = agent.process_message("clean up src").await.unwrap();
    assert_eq!(reply, "I could not delete that.");

    let outputs = batch_outputs(&agent);
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].1, "denial must surface as an error result");
    assert!(outputs[0].0.contains("Denied"));
    assert!(src.join("main.rs").exists());
}

#[tokio::test]
async fn unknown_tool_keeps_the_loop_alive() {
    let provider = ScriptedProvider::new(vec![
        tool_round("summon_demons", json!({})),
        final_text("never mind"),
    ]);

    let gate = Arc::new(SafetyGate::for_cwd());
    let registry = ToolRegistry::with_builtin_tools(gate);
    let mut agent = Agent::new(provider, registry, "sys", AgentSettings::default());

    let reply = agent.process_message("do the thing").await.unwrap();
    assert_eq!(reply, "never mind");

    let outputs = batch_outputs(&agent);
    assert!(outputs[0].1);
    assert!(outputs[0].0.contains("Unknown tool 'summon_demons'"));
    assert!(outputs[0].0.contains("read_file"));
}

#[tokio::test]
async fn grep_and_list_round() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("lib.rs"), "pub fn quirk() {}\n")
        .await
        .unwrap();
    let root = dir.path().to_str().unwrap();

    let provider = ScriptedProvider::new(vec![
        tool_round("grep_search", json!({"pattern": "quirk", "path": root})),
        tool_round("list_dir", json!({"path": root})),
        final_text("found it"),
    ]);

    let gate = Arc::new(SafetyGate::new(dir.path(), deny_all()));
    let registry = ToolRegistry::with_builtin_tools(gate);
    let mut agent = Agent::new(provider, registry, "sys", AgentSettings::default());

    agent.process_message("where is quirk?").await.unwrap();

    let outputs = batch_outputs(&agent);
    assert!(outputs[0].0.contains("lib.rs:1: pub fn quirk() {}"));
    assert!(outputs[1].0.contains("lib.rs (18 B)"));
}
