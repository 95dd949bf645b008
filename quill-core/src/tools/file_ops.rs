//! File reading and writing tools.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{opt_int, require_str, resolve_tool_path, Tool};
use crate::safety::SafetyGate;
use crate::types::ToolDefinition;

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

/// Read a file with numbered lines and an optional 1-indexed line range.
pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a file's contents with line numbers. Optionally restrict to a \
                          1-indexed inclusive line range."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path, relative to the working directory or absolute"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "First line to show (1-indexed, default 1)"
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "Last line to show (inclusive, default end of file)"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let path = require_str(&args, "path")?;
        let abs = resolve_tool_path(path);

        if abs.is_dir() {
            bail!("'{}' is a directory, not a file", abs.display());
        }

        let content = tokio::fs::read_to_string(&abs)
            .await
            .with_context(|| format!("failed to read '{}'", abs.display()))?;

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();

        if total == 0 {
            return Ok(format!(
                "File: {} (0 lines total, showing 0-0)\n",
                abs.display()
            ));
        }

        // Clamp the requested range into [1, total].
        let start = opt_int(&args, "start_line")?
            .unwrap_or(1)
            .clamp(1, total as i64) as usize;
        let end = opt_int(&args, "end_line")?
            .unwrap_or(total as i64)
            .clamp(1, total as i64) as usize;
        if start > end {
            bail!("start_line ({}) is past end_line ({})", start, end);
        }

        let mut out = format!(
            "File: {} ({} lines total, showing {}-{})\n",
            abs.display(),
            total,
            start,
            end
        );
        for (offset, line) in lines[start - 1..end].iter().enumerate() {
            out.push_str(&format!("{}: {}", start + offset, line));
            out.push('\n');
        }
        // The final newline above belongs to the file only when it ends
        // with one; otherwise the last numbered line is left unterminated
        // so stripping the prefixes reproduces the file byte-for-byte.
        if end == total && !content.ends_with('\n') {
            out.pop();
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// write_file
// ---------------------------------------------------------------------------

/// Write content verbatim, creating parent directories as needed.
pub struct WriteFile {
    gate: Arc<SafetyGate>,
}

impl WriteFile {
    pub fn new(gate: Arc<SafetyGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".into(),
            description: "Create or overwrite a file with the given content. Creates parent \
                          directories as needed. Prefer edit_file for changing existing files."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path, relative to the working directory or absolute"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write verbatim"
                    }
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let path = require_str(&args, "path")?;
        let content = require_str(&args, "content")?;
        let abs = resolve_tool_path(path);

        if let Some(denial) = self.gate.check_write(&abs) {
            bail!("{}", denial);
        }

        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
        }

        tokio::fs::write(&abs, content)
            .await
            .with_context(|| format!("failed to write '{}'", abs.display()))?;

        Ok(format!(
            "Wrote {} ({} lines)",
            abs.display(),
            content.lines().count()
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
