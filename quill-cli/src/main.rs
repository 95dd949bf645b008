//! Quill CLI
//!
//! Binary entry point: resolves configuration from the environment, wires
//! the active provider, tool registry, safety gate, and summarizer into an
//! agent, and hands control to the interactive REPL.

mod repl;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use quill_core::config::RuntimeConfig;
use quill_core::safety::SafetyGate;
use quill_core::system_prompt::{SystemPromptManager, DEFAULT_SYSTEM_PROMPT};
use quill_core::{Agent, Provider, ProviderSummarizer, Summarizer, ToolRegistry};
use quill_provider_anthropic::AnthropicProvider;
use quill_provider_gemini::GeminiProvider;
use quill_provider_openai::OpenAiProvider;

#[derive(Parser)]
#[command(
    name = "quill",
    version,
    about = "Quill, an interactive coding agent for your terminal"
)]
struct Cli {
    /// Start with verbose round-by-round narration
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    // All logging goes to stderr; disable ANSI when stderr is piped.
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_ansi(is_tty)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("❌ quill: {}", e);
        for cause in e.chain().skip(1) {
            eprintln!("   caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut runtime_config = RuntimeConfig::load().context("failed to load configuration")?;
    runtime_config.validate()?;
    if cli.verbose {
        runtime_config.settings.verbose = true;
    }

    let api_key = runtime_config
        .api_key
        .clone()
        .context("no API key resolved")?;
    let provider = build_provider(&runtime_config.provider, &runtime_config.model, &api_key, None)?;
    let summarizer_provider = build_provider(
        &runtime_config.provider,
        &runtime_config.summarizer_model,
        &api_key,
        Some(SUMMARIZER_GENERATION),
    )?;

    info!(
        provider = %runtime_config.provider,
        model = %runtime_config.model,
        "starting quill"
    );

    let cwd = std::env::current_dir().context("failed to determine working directory")?;
    let gate = Arc::new(SafetyGate::new(
        cwd.clone(),
        quill_core::safety::deny_all(),
    ));
    let registry = ToolRegistry::with_builtin_tools(gate.clone());

    let mut prompt_manager = SystemPromptManager::new(DEFAULT_SYSTEM_PROMPT, &cwd);
    prompt_manager.load_project_override()?;
    let variables =
        SystemPromptManager::default_variables(&runtime_config.model, &registry.names(), &cwd);
    let system_prompt = prompt_manager.resolve_with_variables(&variables);

    let summarizer: Arc<dyn Summarizer> =
        Arc::new(ProviderSummarizer::new(summarizer_provider));
    let agent = Agent::new(
        provider,
        registry,
        system_prompt,
        runtime_config.settings.clone(),
    )
    .with_summarizer(summarizer);

    repl::run(agent, gate, &runtime_config).await
}

/// (max output tokens, temperature) for the history summarizer.
const SUMMARIZER_GENERATION: (u32, f32) = (256, 0.2);

fn build_provider(
    provider: &str,
    model: &str,
    api_key: &str,
    generation: Option<(u32, f32)>,
) -> Result<Arc<dyn Provider>> {
    match provider {
        "gemini" => {
            let mut p = GeminiProvider::new(api_key, model);
            if let Some((max_tokens, temperature)) = generation {
                p = p.with_generation(max_tokens, temperature);
            }
            Ok(Arc::new(p))
        }
        "anthropic" => {
            let mut p = AnthropicProvider::new(api_key, model, None);
            if let Some((max_tokens, temperature)) = generation {
                p = p.with_generation(max_tokens, temperature);
            }
            Ok(Arc::new(p))
        }
        "openai" => {
            let mut p = OpenAiProvider::new(api_key, model, None);
            if let Some((max_tokens, temperature)) = generation {
                p = p.with_generation(max_tokens, temperature);
            }
            Ok(Arc::new(p))
        }
        other => bail!(
            "unknown provider '{}'. Set LLM_PROVIDER to gemini, anthropic, or openai.",
            other
        ),
    }
}
