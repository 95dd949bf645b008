//! Content search tool: recursive grep over the project tree.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::{opt_bool, opt_str, require_str, resolve_tool_path, Tool};
use crate::types::ToolDefinition;

/// Directory names never descended into (in addition to dot-prefixed dirs).
const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    ".next",
    "__pycache__",
    ".venv",
    "venv",
    ".agent",
];

/// Extensions treated as binary and skipped.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "woff", "woff2", "ttf", "eot", "zip", "tar", "gz",
    "bz2", "pdf", "doc", "docx", "exe", "dll", "so", "dylib",
];

const MAX_MATCHES: usize = 50;
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Search file contents, line by line, under a directory.
pub struct GrepSearch;

fn is_searchable(path: &Path) -> bool {
    let binary = path
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false);
    if binary {
        return false;
    }
    path.metadata()
        .map(|m| m.len() <= MAX_FILE_SIZE)
        .unwrap_or(false)
}

#[async_trait]
impl Tool for GrepSearch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "grep_search".into(),
            description: "Search file contents recursively for a pattern. Skips binary files, \
                          oversized files, and dependency/build directories. Returns up to 50 \
                          matches as path:line: text."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Text or regex to search for"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search (default: working directory)"
                    },
                    "is_regex": {
                        "type": "boolean",
                        "description": "Treat the pattern as a regular expression (default false)"
                    },
                    "case_insensitive": {
                        "type": "boolean",
                        "description": "Ignore case when matching (default false)"
                    }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let pattern = require_str(&args, "pattern")?;
        let root = resolve_tool_path(opt_str(&args, "path").unwrap_or("."));
        let is_regex = opt_bool(&args, "is_regex");
        let case_insensitive = opt_bool(&args, "case_insensitive");

        if !root.is_dir() {
            bail!("'{}' is not a directory", root.display());
        }

        let source = if is_regex {
            pattern.to_string()
        } else {
            regex::escape(pattern)
        };
        let matcher = RegexBuilder::new(&source)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| anyhow!("invalid pattern '{}': {}", pattern, e))?;

        let mut matches = Vec::new();
        let mut capped = false;

        let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !IGNORED_DIRS.contains(&name.as_ref())
        });

        'walk: for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || !is_searchable(entry.path()) {
                continue;
            }
            // Non-UTF-8 files are skipped like binaries.
            let Ok(content) = tokio::fs::read_to_string(entry.path()).await else {
                continue;
            };

            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .display()
                .to_string();

            for (i, line) in content.lines().enumerate() {
                if matcher.is_match(line) {
                    if matches.len() >= MAX_MATCHES {
                        capped = true;
                        break 'walk;
                    }
                    matches.push(format!("{}:{}: {}", rel, i + 1, line.trim()));
                }
            }
        }

        if matches.is_empty() {
            return Ok(format!("No matches found for '{}'", pattern));
        }

        let count = if capped {
            "50+".to_string()
        } else {
            matches.len().to_string()
        };
        Ok(format!("Found {} matches:\n{}", count, matches.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
