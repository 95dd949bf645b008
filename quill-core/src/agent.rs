//! Agent Loop
//!
//! The turn-taking state machine: user message → LLM call → tool dispatch →
//! history compaction → repeat until the model answers with text. Detects
//! exact tool-call repetition across consecutive rounds and steers the model
//! back to a text answer.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::compact::{compact_history, Summarizer};
use crate::cost::CostLedger;
use crate::provider::{FinishReason, Provider};
use crate::tools::ToolRegistry;
use crate::types::{Message, ToolResult};

/// Sentinel returned when a turn exhausts its tool rounds.
pub const MAX_ROUNDS_MESSAGE: &str =
    "Maximum tool rounds reached for this request. Ask again to continue from here.";

/// Synthetic user note injected when the model repeats itself.
const REPETITION_NOTE: &str = "You are repeating the same tool calls. Stop calling tools and \
answer the user with a summary of what you have found so far.";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Loop configuration, frozen per agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Tool rounds allowed per user turn.
    pub max_tool_rounds: usize,
    /// Narrate rounds and tool calls to stderr.
    pub verbose: bool,
    /// Consecutive identical rounds tolerated before steering to text.
    pub max_repetitions: usize,
    /// Tool-result batches kept at full fidelity.
    pub history_window: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: 25,
            verbose: false,
            max_repetitions: 2,
            history_window: 6,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    ledger: CostLedger,
    summarizer: Option<Arc<dyn Summarizer>>,
    system_prompt: String,
    settings: AgentSettings,
    messages: Vec<Message>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: ToolRegistry,
        system_prompt: impl Into<String>,
        settings: AgentSettings,
    ) -> Self {
        let ledger = CostLedger::new(provider.model());
        Self {
            provider,
            registry,
            ledger,
            summarizer: None,
            system_prompt: system_prompt.into(),
            settings,
            messages: Vec::new(),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn verbose(&self) -> bool {
        self.settings.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.settings.verbose = verbose;
    }

    /// Drop the conversation transcript. The cost ledger keeps running.
    pub fn clear_transcript(&mut self) -> usize {
        let removed = self.messages.len();
        self.messages.clear();
        removed
    }

    /// Process one user turn: append the input, loop through provider calls
    /// and tool rounds, and return the model's final text.
    pub async fn process_message(&mut self, input: &str) -> Result<String> {
        self.messages.push(Message::user(input));

        let mut tool_round = 0usize;
        let mut last_fingerprint = String::new();
        let mut repetition_count = 0usize;

        while tool_round < self.settings.max_tool_rounds {
            debug!(round = tool_round, transcript = self.messages.len(), "provider call");
            let response = self
                .provider
                .chat(&self.messages, self.registry.definitions(), &self.system_prompt)
                .await?;

            if let Some(usage) = response.usage {
                self.ledger
                    .record_usage(usage.input_tokens, usage.output_tokens);
            }

            if response.finish_reason != FinishReason::ToolCalls || response.tool_calls.is_empty() {
                self.messages.push(Message::assistant(response.text.clone()));
                return Ok(response.text);
            }

            tool_round += 1;
            if self.settings.verbose {
                eprintln!(
                    "· round {}: {} tool call(s)",
                    tool_round,
                    response.tool_calls.len()
                );
            }

            let fingerprint = round_fingerprint(&response.tool_calls);
            if fingerprint == last_fingerprint {
                repetition_count += 1;
                info!(repetition_count, "identical tool round detected");
                if repetition_count >= self.settings.max_repetitions {
                    warn!("repetition limit hit, forcing text answer");
                    if self.settings.verbose {
                        eprintln!("· repetition detected, disabling tools for one call");
                    }
                    self.messages.push(Message::user(REPETITION_NOTE));
                    let forced = self
                        .provider
                        .chat(&self.messages, &[], &self.system_prompt)
                        .await?;
                    if let Some(usage) = forced.usage {
                        self.ledger
                            .record_usage(usage.input_tokens, usage.output_tokens);
                    }
                    self.messages.push(Message::assistant(forced.text.clone()));
                    return Ok(forced.text);
                }
            } else {
                last_fingerprint = fingerprint;
                repetition_count = 0;
            }

            self.messages.push(Message::tool_use(
                response.text.clone(),
                response.tool_calls.clone(),
            ));

            let mut results: Vec<ToolResult> = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                info!(tool = %call.name, id = %call.id, "executing tool call");
                if self.settings.verbose {
                    eprintln!("  → {}({})", call.name, call.arguments);
                }
                let result = self.registry.execute(call).await;
                if self.settings.verbose {
                    let status = if result.is_error { "error" } else { "ok" };
                    eprintln!(
                        "  ← {} [{}] {} bytes",
                        call.name,
                        status,
                        result.output.len()
                    );
                }
                results.push(result);
            }
            self.messages.push(Message::tool_results(results));

            compact_history(
                &mut self.messages,
                self.settings.history_window,
                self.summarizer.as_ref(),
            )
            .await;
        }

        warn!(max = self.settings.max_tool_rounds, "tool round limit reached");
        Ok(MAX_ROUNDS_MESSAGE.to_string())
    }
}

// ---------------------------------------------------------------------------
// Fingerprinting
// ---------------------------------------------------------------------------

/// Canonical string for a round's tool calls. Two rounds fingerprint
/// equal iff they request the same tools with the same arguments in the
/// same order.
pub fn round_fingerprint(calls: &[crate::types::ToolCall]) -> String {
    calls
        .iter()
        .map(|c| format!("{}::{}", c.name, canonical_json(&c.arguments)))
        .collect::<Vec<_>>()
        .join("|")
}

/// JSON rendering with lexicographically sorted object keys at every level.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        Value::String((*k).clone()),
                        canonical_json(&map[k.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        scalar => scalar.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact::Summarizer;
    use crate::provider::{CompletionResponse, TokenUsage};
    use crate::tools::Tool;
    use crate::types::{MessageContent, Role, ToolCall, ToolDefinition};
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider that pops scripted responses; repeats the last one forever.
    struct MockProvider {
        responses: Mutex<Vec<CompletionResponse>>,
        calls: AtomicUsize,
        /// Tool definitions seen on the most recent call.
        last_tool_count: AtomicUsize,
    }

    impl MockProvider {
        fn new(responses: Vec<CompletionResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
                last_tool_count: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            "gemini-2.5-pro"
        }

        async fn chat(
            &self,
            _messages: &[Message],
            tools: &[ToolDefinition],
            _system: &str,
        ) -> Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_tool_count.store(tools.len(), Ordering::SeqCst);
            let mut queue = self.responses.lock().unwrap();
            if queue.len() > 1 {
                Ok(queue.remove(0))
            } else {
                Ok(queue[0].clone())
            }
        }
    }

    fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.into(),
            tool_calls: vec![],
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            }),
            finish_reason: FinishReason::Stop,
        }
    }

    fn tool_response(name: &str, args: Value) -> CompletionResponse {
        CompletionResponse {
            text: String::new(),
            tool_calls: vec![ToolCall {
                id: "tc1".into(),
                name: name.into(),
                arguments: args,
            }],
            usage: None,
            finish_reason: FinishReason::ToolCalls,
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "echo".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn execute(&self, args: Value) -> Result<String> {
            Ok(format!(
                "Echo: {}",
                args.get("message").and_then(|v| v.as_str()).unwrap_or("")
            ))
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    fn agent_with(
        provider: Arc<MockProvider>,
        registry: ToolRegistry,
        settings: AgentSettings,
    ) -> Agent {
        Agent::new(provider, registry, "You are a coding agent.", settings)
    }

    #[tokio::test]
    async fn simple_echo_turn() {
        let provider = MockProvider::new(vec![text_response("hi")]);
        let mut agent = agent_with(provider, ToolRegistry::new(), AgentSettings::default());

        let reply = agent.process_message("hello").await.unwrap();

        assert_eq!(reply, "hi");
        assert_eq!(agent.messages().len(), 2);
        assert_eq!(agent.messages()[0].role, Role::User);
        assert_eq!(agent.messages()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn single_tool_call_turn() {
        let provider = MockProvider::new(vec![
            tool_response("echo", json!({"message": "x"})),
            text_response("got Echo: x"),
        ]);
        let mut agent = agent_with(provider, echo_registry(), AgentSettings::default());

        let reply = agent.process_message("call echo").await.unwrap();

        assert_eq!(reply, "got Echo: x");
        // user, tool_use, batch, assistant
        assert_eq!(agent.messages().len(), 4);
        match &agent.messages()[2].content {
            MessageContent::ToolResults(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].output, "Echo: x");
                assert!(!results[0].is_error);
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn batch_follows_every_tool_use() {
        let provider = MockProvider::new(vec![
            tool_response("echo", json!({"message": "a"})),
            tool_response("echo", json!({"message": "b"})),
            tool_response("echo", json!({"message": "c"})),
            text_response("done"),
        ]);
        let mut agent = agent_with(provider, echo_registry(), AgentSettings::default());

        agent.process_message("go").await.unwrap();

        let messages = agent.messages();
        for (i, message) in messages.iter().enumerate() {
            if let MessageContent::ToolUse { calls, .. } = &message.content {
                match &messages[i + 1].content {
                    MessageContent::ToolResults(results) => {
                        assert_eq!(results.len(), calls.len());
                        for (call, result) in calls.iter().zip(results) {
                            assert_eq!(call.name, result.name);
                            assert_eq!(call.id, result.call_id);
                        }
                    }
                    other => panic!("tool_use not followed by batch: {:?}", other),
                }
            }
        }
    }

    #[tokio::test]
    async fn repetition_brake_forces_text() {
        // The mock repeats the identical tool round forever.
        let provider = MockProvider::new(vec![tool_response("echo", json!({"message": "loop"}))]);
        let settings = AgentSettings {
            max_repetitions: 2,
            ..AgentSettings::default()
        };
        let mut agent = agent_with(provider.clone(), echo_registry(), settings);

        // Once the brake engages, the mock's only (tool) response comes back
        // from the tools-disabled call as well; its text is empty but the
        // loop must still terminate with it.
        let reply = agent.process_message("spin").await.unwrap();

        assert_eq!(reply, "");
        // Final call was made with tools disabled.
        assert_eq!(provider.last_tool_count.load(Ordering::SeqCst), 0);
        // Rounds executed: 1 fresh + 2 repeats, then the forced call.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        // The synthetic steering note is in the transcript.
        assert!(agent.messages().iter().any(|m| {
            matches!(&m.content, MessageContent::Text(t)
                if m.role == Role::User && t.contains("Stop calling tools"))
        }));
    }

    #[tokio::test]
    async fn round_cap_returns_sentinel() {
        let provider = MockProvider::new(vec![
            tool_response("echo", json!({"message": "1"})),
            tool_response("echo", json!({"message": "2"})),
            tool_response("echo", json!({"message": "3"})),
            tool_response("echo", json!({"message": "4"})),
        ]);
        let settings = AgentSettings {
            max_tool_rounds: 3,
            max_repetitions: 99,
            ..AgentSettings::default()
        };
        let mut agent = agent_with(provider, echo_registry(), settings);

        let reply = agent.process_message("go").await.unwrap();
        assert_eq!(reply, MAX_ROUNDS_MESSAGE);
    }

    #[tokio::test]
    async fn compaction_with_summarizer_rewrites_prefix() {
        struct FixedSummarizer(AtomicUsize);

        #[async_trait]
        impl Summarizer for FixedSummarizer {
            async fn summarize(&self, _t: &str) -> Result<String> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok("S".to_string())
            }
        }

        let provider = MockProvider::new(vec![
            tool_response("echo", json!({"message": "1"})),
            tool_response("echo", json!({"message": "2"})),
            tool_response("echo", json!({"message": "3"})),
            tool_response("echo", json!({"message": "4"})),
            text_response("finished"),
        ]);
        let settings = AgentSettings {
            history_window: 2,
            max_repetitions: 99,
            ..AgentSettings::default()
        };
        let summarizer = Arc::new(FixedSummarizer(AtomicUsize::new(0)));
        let invocations = summarizer.clone();
        let mut agent = agent_with(provider, echo_registry(), settings)
            .with_summarizer(summarizer as Arc<dyn Summarizer>);

        let reply = agent.process_message("work").await.unwrap();

        assert_eq!(reply, "finished");
        assert!(invocations.0.load(Ordering::SeqCst) >= 1);
        match &agent.messages()[0].content {
            MessageContent::Text(t) => {
                assert!(t.starts_with("[Context from earlier in this conversation: S]"))
            }
            other => panic!("unexpected head: {:?}", other),
        }
    }

    #[tokio::test]
    async fn provider_error_aborts_turn() {
        struct FailingProvider;

        #[async_trait]
        impl Provider for FailingProvider {
            fn name(&self) -> &str {
                "failing"
            }
            fn model(&self) -> &str {
                "gemini-2.5-pro"
            }
            async fn chat(
                &self,
                _m: &[Message],
                _t: &[ToolDefinition],
                _s: &str,
            ) -> Result<CompletionResponse> {
                bail!("boom")
            }
        }

        let mut agent = Agent::new(
            Arc::new(FailingProvider),
            ToolRegistry::new(),
            "sys",
            AgentSettings::default(),
        );

        assert!(agent.process_message("hi").await.is_err());
        // The user message stays; nothing after the failed call mutated.
        assert_eq!(agent.messages().len(), 1);
    }

    #[tokio::test]
    async fn usage_lands_in_ledger() {
        let provider = MockProvider::new(vec![text_response("hi")]);
        let mut agent = agent_with(provider, ToolRegistry::new(), AgentSettings::default());

        agent.process_message("hello").await.unwrap();

        assert_eq!(agent.ledger().call_count(), 1);
        assert_eq!(agent.ledger().total_input_tokens(), 10);
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let a = json!({"b": 1, "a": {"z": true, "y": [1, 2]}});
        let b = json!({"a": {"y": [1, 2], "z": true}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"y":[1,2],"z":true},"b":1}"#
        );
    }

    #[test]
    fn fingerprint_distinguishes_order_and_args() {
        let call = |name: &str, args: Value| ToolCall {
            id: "x".into(),
            name: name.into(),
            arguments: args,
        };

        let a = round_fingerprint(&[call("read", json!({"path": "a"}))]);
        let b = round_fingerprint(&[call("read", json!({"path": "b"}))]);
        assert_ne!(a, b);

        let two = round_fingerprint(&[
            call("read", json!({"path": "a"})),
            call("grep", json!({"pattern": "x"})),
        ]);
        let swapped = round_fingerprint(&[
            call("grep", json!({"pattern": "x"})),
            call("read", json!({"path": "a"})),
        ]);
        assert_ne!(two, swapped);
    }
}
