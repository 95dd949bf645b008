//! System Prompt
//!
//! Default system prompt with template variable substitution and an
//! optional project-level override from `.quill/system_prompt.md`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

/// Default system prompt for the agent.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Quill, an interactive coding agent working inside the operator's project at {{cwd}}.

Current model: {{model}}
Available tools: {{tools}}

Guidelines:
- Read files before editing them; prefer edit_file over write_file for existing files
- Use grep_search and list_dir to orient yourself before making changes
- Run commands to verify your changes when a test or build exists
- Keep answers concise; show only the code that changed
- Ask before destructive operations; the operator must confirm them"#;

/// Resolves the system prompt: project override beats the default, then
/// `{{key}}` variables are substituted.
pub struct SystemPromptManager {
    default_prompt: String,
    project_root: PathBuf,
    project_override: Option<String>,
}

impl SystemPromptManager {
    pub fn new(default_prompt: &str, project_root: &Path) -> Self {
        Self {
            default_prompt: default_prompt.to_string(),
            project_root: project_root.to_path_buf(),
            project_override: None,
        }
    }

    /// Load `.quill/system_prompt.md` if the project provides one.
    pub fn load_project_override(&mut self) -> Result<bool> {
        let path = self.project_root.join(".quill").join("system_prompt.md");
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            info!(path = %path.display(), "loaded project system prompt override");
            self.project_override = Some(content);
            Ok(true)
        } else {
            debug!("no project system prompt at {}", path.display());
            self.project_override = None;
            Ok(false)
        }
    }

    pub fn resolve(&self) -> &str {
        self.project_override
            .as_deref()
            .unwrap_or(&self.default_prompt)
    }

    pub fn resolve_with_variables(&self, variables: &HashMap<String, String>) -> String {
        let mut prompt = self.resolve().to_string();
        for (key, value) in variables {
            let placeholder = format!("{{{{{}}}}}", key);
            prompt = prompt.replace(&placeholder, value);
        }
        prompt
    }

    /// Standard variables for the default prompt.
    pub fn default_variables(
        model: &str,
        tools: &[String],
        cwd: &Path,
    ) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("model".to_string(), model.to_string());
        vars.insert("tools".to_string(), tools.join(", "));
        vars.insert("cwd".to_string(), cwd.display().to_string());
        vars
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
