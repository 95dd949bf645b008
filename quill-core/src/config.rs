//! Configuration
//!
//! Environment-first runtime configuration: `LLM_PROVIDER`, `LLM_MODEL`,
//! and per-provider API-key variables select the model; an optional TOML
//! file supplies agent-loop settings. Includes startup validation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::AgentSettings;

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

// ---------------------------------------------------------------------------
// Optional TOML overlay
// ---------------------------------------------------------------------------

/// On-disk settings (`quill.toml` in the working directory, then
/// `<config_dir>/quill/config.toml`). Everything is optional; the
/// environment wins for provider, model, and keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub agent: AgentFileSettings,
    #[serde(default)]
    pub summarizer: SummarizerFileSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentFileSettings {
    pub max_tool_rounds: Option<usize>,
    pub max_repetitions: Option<usize>,
    pub history_window: Option<usize>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarizerFileSettings {
    /// Compact model for history summaries; defaults per provider.
    pub model: Option<String>,
}

impl FileConfig {
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("quill.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("quill").join("config.toml"));
        }
        paths
    }

    /// Load the first config file that exists, or defaults.
    pub fn load() -> Result<Self> {
        for path in Self::candidate_paths() {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?;
                let config: Self = toml::from_str(&content)
                    .with_context(|| format!("failed to parse config: {}", path.display()))?;
                info!(path = %path.display(), "loaded config file");
                return Ok(config);
            }
        }
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Fully resolved configuration the CLI wires the agent from.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub settings: AgentSettings,
    pub summarizer_model: String,
}

impl RuntimeConfig {
    /// Resolve configuration from the environment plus the optional file
    /// overlay.
    pub fn load() -> Result<Self> {
        let file = FileConfig::load()?;

        let provider = std::env::var("LLM_PROVIDER")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
            .to_lowercase();
        let model = std::env::var("LLM_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut settings = AgentSettings::default();
        if let Some(v) = file.agent.max_tool_rounds {
            settings.max_tool_rounds = v;
        }
        if let Some(v) = file.agent.max_repetitions {
            settings.max_repetitions = v;
        }
        if let Some(v) = file.agent.history_window {
            settings.history_window = v;
        }
        if let Some(v) = file.agent.verbose {
            settings.verbose = v;
        }

        let summarizer_model = file
            .summarizer
            .model
            .unwrap_or_else(|| default_summarizer_model(&provider).to_string());

        Ok(Self {
            api_key: resolve_api_key(&provider),
            provider,
            model,
            settings,
            summarizer_model,
        })
    }

    /// Fail fast when the active provider has no usable key.
    pub fn validate(&self) -> Result<()> {
        let Some(var) = api_key_var(&self.provider) else {
            bail!(
                "unknown provider '{}'. Expected: gemini, anthropic, or openai",
                self.provider
            );
        };
        if self.api_key.is_none() {
            bail!(
                "no API key for provider '{}'. Set the {} environment variable \
                 (placeholder values containing 'your_' are ignored).",
                self.provider,
                var
            );
        }
        Ok(())
    }
}

/// Environment variable holding the API key for a provider.
pub fn api_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "gemini" => Some("GEMINI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

/// Read the provider's key, treating template placeholders as unset.
pub fn resolve_api_key(provider: &str) -> Option<String> {
    let var = api_key_var(provider)?;
    let key = std::env::var(var).ok()?;
    let key = key.trim().to_string();
    if key.is_empty() || is_placeholder(&key) {
        return None;
    }
    Some(key)
}

fn is_placeholder(key: &str) -> bool {
    key.contains("your_") || key.contains("YOUR_")
}

/// Compact model used by the history summarizer for a provider.
pub fn default_summarizer_model(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "claude-3-5-haiku-20241022",
        "openai" => "gpt-4o-mini",
        _ => "gemini-2.0-flash",
    }
}

/// Whether each provider call should dump its request payload to stderr.
pub fn debug_prompts_enabled() -> bool {
    std::env::var("DEBUG_PROMPTS").map(|v| v == "1").unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
