//! Directory listing tool.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{opt_bool, opt_str, resolve_tool_path, Tool};
use crate::types::ToolDefinition;

/// Names filtered from listings unless `show_hidden` is set.
const IGNORED_NAMES: &[&str] = &["node_modules", ".git", "dist"];

fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// List a directory: directories first, then files with human sizes.
pub struct ListDir;

#[async_trait]
impl Tool for ListDir {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_dir".into(),
            description: "List a directory's entries, directories first. Hidden entries and \
                          dependency/build directories are filtered unless show_hidden is set."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path (default: working directory)"
                    },
                    "show_hidden": {
                        "type": "boolean",
                        "description": "Include hidden and ignored entries (default false)"
                    }
                }
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let root = resolve_tool_path(opt_str(&args, "path").unwrap_or("."));
        let show_hidden = opt_bool(&args, "show_hidden");

        if !root.exists() {
            bail!("directory not found: '{}'", root.display());
        }
        if !root.is_dir() {
            bail!("'{}' is not a directory", root.display());
        }

        let mut reader = tokio::fs::read_dir(&root)
            .await
            .with_context(|| format!("failed to list '{}'", root.display()))?;

        // (is_dir, name, size)
        let mut entries: Vec<(bool, String, u64)> = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !show_hidden && (name.starts_with('.') || IGNORED_NAMES.contains(&name.as_str())) {
                continue;
            }
            let meta = entry.metadata().await?;
            entries.push((meta.is_dir(), name, meta.len()));
        }

        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        if entries.is_empty() {
            return Ok(format!("{} is empty", root.display()));
        }

        let listing: Vec<String> = entries
            .iter()
            .map(|(is_dir, name, size)| {
                if *is_dir {
                    format!("{}/", name)
                } else {
                    format!("{} ({})", name, human_size(*size))
                }
            })
            .collect();

        Ok(listing.join("\n"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_dirs_first_then_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("zeta.txt"), "x").await.unwrap();
        tokio::fs::write(dir.path().join("alpha.txt"), "xy").await.unwrap();
        tokio::fs::create_dir(dir.path().join("src")).await.unwrap();
        tokio::fs::create_dir(dir.path().join("docs")).await.unwrap();

        let out = ListDir
            .execute(json!({"path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "docs/");
        assert_eq!(lines[1], "src/");
        assert_eq!(lines[2], "alpha.txt (2 B)");
        assert_eq!(lines[3], "zeta.txt (1 B)");
    }

    #[tokio::test]
    async fn hides_dot_and_ignored_entries_unless_asked() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join(".git")).await.unwrap();
        tokio::fs::create_dir(dir.path().join("node_modules")).await.unwrap();
        tokio::fs::write(dir.path().join(".env"), "SECRET=1").await.unwrap();
        tokio::fs::write(dir.path().join("main.rs"), "fn main() {}").await.unwrap();

        let out = ListDir
            .execute(json!({"path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("main.rs"));

        let all = ListDir
            .execute(json!({
                "path": dir.path().to_str().unwrap(),
                "show_hidden": true
            }))
            .await
            .unwrap();
        assert!(all.contains(".git/"));
        assert!(all.contains("node_modules/"));
        assert!(all.contains(".env"));
    }

    #[tokio::test]
    async fn human_sizes() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn missing_directory_errors() {
        let err = ListDir
            .execute(json!({"path": "/definitely/not/here"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
