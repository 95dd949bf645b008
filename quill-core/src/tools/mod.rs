//! Tool Catalog
//!
//! Named, self-describing effects the LLM may invoke. Each tool declares a
//! `ToolDefinition` and an async executor; the registry dispatches by name
//! and reifies every failure into a `ToolResult`; no error ever crosses
//! the dispatch boundary.

mod directory;
mod edit;
mod file_ops;
mod search;
mod terminal;

pub use directory::ListDir;
pub use edit::{DeleteLines, EditFile, InsertLines};
pub use file_ops::{ReadFile, WriteFile};
pub use search::GrepSearch;
pub use terminal::RunCommand;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::safety::SafetyGate;
use crate::types::{ToolCall, ToolDefinition, ToolResult};

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// A single tool. Executors type-check their own arguments at the top and
/// return domain failures as `Err`; the registry converts those into
/// `is_error` results.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, args: Value) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Mapping from tool name to implementation. Enumeration order is
/// registration order (stable for the system prompt and `/tools`);
/// re-registering a name replaces the previous tool in place.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    definitions: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the eight built-in tools wired to the given gate.
    pub fn with_builtin_tools(gate: Arc<SafetyGate>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReadFile));
        registry.register(Arc::new(WriteFile::new(gate.clone())));
        registry.register(Arc::new(EditFile::new(gate.clone())));
        registry.register(Arc::new(InsertLines::new(gate.clone())));
        registry.register(Arc::new(DeleteLines::new(gate.clone())));
        registry.register(Arc::new(GrepSearch));
        registry.register(Arc::new(ListDir));
        registry.register(Arc::new(RunCommand::new(gate)));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let definition = tool.definition();
        match self.index.get(&definition.name) {
            Some(&i) => {
                self.tools[i] = tool;
                self.definitions[i] = definition;
            }
            None => {
                self.index.insert(definition.name.clone(), self.tools.len());
                self.tools.push(tool);
                self.definitions.push(definition);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.name.clone()).collect()
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a call. Unknown names and executor failures both come back
    /// as `is_error` results, never as an `Err`.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(&i) = self.index.get(&call.name) else {
            return ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                output: format!(
                    "Unknown tool '{}'. Registered tools: {}",
                    call.name,
                    self.names().join(", ")
                ),
                is_error: true,
            };
        };

        match self.tools[i].execute(call.arguments.clone()).await {
            Ok(output) => ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                output,
                is_error: false,
            },
            Err(e) => ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                output: format!("{:#}", e),
                is_error: true,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Resolve a tool path argument against the process cwd.
pub fn resolve_tool_path(path_str: &str) -> PathBuf {
    let path = Path::new(path_str);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

/// Truncate to at most `max_bytes`, backing up to a char boundary.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing required string argument '{}'", key))
}

pub(crate) fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// Integer argument that tolerates the model sending a number as a string.
pub(crate) fn opt_int(args: &Value, key: &str) -> Result<Option<i64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| anyhow!("argument '{}' is not an integer", key)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| anyhow!("argument '{}' is not an integer: '{}'", key, s)),
        Some(other) => Err(anyhow!(
            "argument '{}' must be an integer, got {}",
            key,
            other
        )),
    }
}

pub(crate) fn require_int(args: &Value, key: &str) -> Result<i64> {
    opt_int(args, key)?.ok_or_else(|| anyhow!("missing required integer argument '{}'", key))
}

pub(crate) fn opt_bool(args: &Value, key: &str) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
