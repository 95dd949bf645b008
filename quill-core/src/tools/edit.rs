//! Surgical file editing tools: search-and-replace, line insertion, line
//! deletion. All three resolve paths against the process cwd and are
//! subject to the path sandbox.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{opt_str, require_int, require_str, resolve_tool_path, Tool};
use crate::safety::SafetyGate;
use crate::types::ToolDefinition;

/// Reassemble lines, restoring the original file's trailing-newline state.
fn join_lines(lines: &[String], had_trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if had_trailing_newline && !lines.is_empty() {
        out.push('\n');
    }
    out
}

async fn read_lines(abs: &std::path::Path) -> Result<(Vec<String>, bool)> {
    let content = tokio::fs::read_to_string(abs)
        .await
        .with_context(|| format!("failed to read '{}'", abs.display()))?;
    let lines = content.lines().map(String::from).collect();
    Ok((lines, content.ends_with('\n')))
}

// ---------------------------------------------------------------------------
// edit_file
// ---------------------------------------------------------------------------

/// Replace either the unique occurrence of `old_text` or a 1-indexed line
/// range with `new_text`.
pub struct EditFile {
    gate: Arc<SafetyGate>,
}

impl EditFile {
    pub fn new(gate: Arc<SafetyGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Tool for EditFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "edit_file".into(),
            description: "Edit a file surgically. Preferred mode: pass old_text (a unique \
                          snippet) and new_text. Alternative: pass start_line and end_line \
                          (1-indexed, inclusive) to replace that range; an empty new_text \
                          deletes it."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path, relative to the working directory or absolute"
                    },
                    "old_text": {
                        "type": "string",
                        "description": "Exact text to replace; must occur exactly once"
                    },
                    "new_text": {
                        "type": "string",
                        "description": "Replacement text"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "First line of the range to replace (1-indexed)"
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "Last line of the range to replace (inclusive)"
                    }
                },
                "required": ["path", "new_text"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let path = require_str(&args, "path")?;
        let new_text = require_str(&args, "new_text")?;
        let abs = resolve_tool_path(path);

        if let Some(denial) = self.gate.check_path(&abs) {
            bail!("{}", denial);
        }

        let content = tokio::fs::read_to_string(&abs)
            .await
            .with_context(|| format!("failed to read '{}'", abs.display()))?;
        let old_total = content.lines().count() as i64;

        let new_content = if let Some(old_text) = opt_str(&args, "old_text") {
            match content.matches(old_text).count() {
                0 => bail!("old_text not found in '{}'", abs.display()),
                1 => content.replacen(old_text, new_text, 1),
                n => bail!(
                    "old_text matches {} locations in '{}'; provide a larger unique snippet",
                    n,
                    abs.display()
                ),
            }
        } else if args.get("start_line").is_some() {
            let start = require_int(&args, "start_line")?;
            let end = require_int(&args, "end_line")?;
            if start < 1 || end < start || start > old_total.max(0) {
                bail!(
                    "invalid line range {}-{} (file has {} lines)",
                    start,
                    end,
                    old_total
                );
            }
            let had_trailing = content.ends_with('\n');
            let mut lines: Vec<String> = content.lines().map(String::from).collect();
            let end = (end as usize).min(lines.len());
            let replacement: Vec<String> = new_text.lines().map(String::from).collect();
            lines.splice(start as usize - 1..end, replacement);
            join_lines(&lines, had_trailing)
        } else {
            bail!("edit_file needs either old_text or start_line/end_line");
        };

        let new_total = new_content.lines().count() as i64;
        tokio::fs::write(&abs, &new_content)
            .await
            .with_context(|| format!("failed to write '{}'", abs.display()))?;

        Ok(format!(
            "Edited {} ({:+} lines, now {} lines)",
            abs.display(),
            new_total - old_total,
            new_total
        ))
    }
}

// ---------------------------------------------------------------------------
// insert_lines
// ---------------------------------------------------------------------------

/// Insert content before a 1-indexed line; 0 prepends, -1 appends.
pub struct InsertLines {
    gate: Arc<SafetyGate>,
}

impl InsertLines {
    pub fn new(gate: Arc<SafetyGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Tool for InsertLines {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "insert_lines".into(),
            description: "Insert lines into a file. line=0 prepends, line=-1 appends, \
                          otherwise content is inserted before the given 1-indexed line."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path, relative to the working directory or absolute"
                    },
                    "line": {
                        "type": "integer",
                        "description": "Insertion point: 0 = start, -1 = end, 1..=N+1 = before that line"
                    },
                    "content": {
                        "type": "string",
                        "description": "Lines to insert"
                    }
                },
                "required": ["path", "line", "content"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let path = require_str(&args, "path")?;
        let line = require_int(&args, "line")?;
        let content = require_str(&args, "content")?;
        let abs = resolve_tool_path(path);

        if let Some(denial) = self.gate.check_path(&abs) {
            bail!("{}", denial);
        }

        let (mut lines, had_trailing) = read_lines(&abs).await?;
        let total = lines.len() as i64;

        let at = match line {
            0 => 0,
            -1 => lines.len(),
            l if l >= 1 && l <= total + 1 => l as usize - 1,
            _ => bail!(
                "line {} is out of range (file has {} lines; use 0, -1, or 1..={})",
                line,
                total,
                total + 1
            ),
        };

        let inserted: Vec<String> = content.lines().map(String::from).collect();
        let inserted_count = inserted.len();
        lines.splice(at..at, inserted);

        tokio::fs::write(&abs, join_lines(&lines, had_trailing))
            .await
            .with_context(|| format!("failed to write '{}'", abs.display()))?;

        Ok(format!(
            "Inserted {} lines into {} ({} lines total)",
            inserted_count,
            abs.display(),
            lines.len()
        ))
    }
}

// ---------------------------------------------------------------------------
// delete_lines
// ---------------------------------------------------------------------------

/// Delete a 1-indexed inclusive line range; `end_line` is clamped to the
/// file length.
pub struct DeleteLines {
    gate: Arc<SafetyGate>,
}

impl DeleteLines {
    pub fn new(gate: Arc<SafetyGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Tool for DeleteLines {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delete_lines".into(),
            description: "Delete a range of lines from a file (1-indexed, inclusive).".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path, relative to the working directory or absolute"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "First line to delete (1-indexed)"
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "Last line to delete (inclusive, clamped to file length)"
                    }
                },
                "required": ["path", "start_line", "end_line"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let path = require_str(&args, "path")?;
        let start = require_int(&args, "start_line")?;
        let end = require_int(&args, "end_line")?;
        let abs = resolve_tool_path(path);

        if let Some(denial) = self.gate.check_path(&abs) {
            bail!("{}", denial);
        }

        let (mut lines, had_trailing) = read_lines(&abs).await?;
        let total = lines.len() as i64;

        if start < 1 || end < start || start > total {
            bail!(
                "invalid line range {}-{} (file has {} lines)",
                start,
                end,
                total
            );
        }
        let end = end.min(total) as usize;
        let start = start as usize;

        let deleted = end - start + 1;
        lines.drain(start - 1..end);

        tokio::fs::write(&abs, join_lines(&lines, had_trailing))
            .await
            .with_context(|| format!("failed to write '{}'", abs.display()))?;

        Ok(format!(
            "Deleted {} lines from {} ({} lines remaining)",
            deleted,
            abs.display(),
            lines.len()
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
