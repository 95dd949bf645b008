//! Interactive REPL
//!
//! Line-driven loop: slash commands are handled locally, everything else
//! becomes a user turn for the agent. The confirmation prompt for risky
//! tool actions reads a y/N answer from the same stdin between turns.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;

use quill_core::config::RuntimeConfig;
use quill_core::safety::SafetyGate;
use quill_core::Agent;

/// Ask the operator a yes/no question on the controlling terminal.
/// Tool execution is serial, so this never races the REPL's own reads.
fn confirm_on_stdin(prompt: &str) -> bool {
    eprint!("\n⚠ {} [y/N] ", prompt);
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Read one line of operator input without blocking the runtime.
async fn read_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        let mut buf = String::new();
        match std::io::stdin().read_line(&mut buf) {
            Ok(0) => None, // EOF
            Ok(_) => Some(buf),
            Err(_) => None,
        }
    })
    .await
    .ok()
    .flatten()
}

fn print_help() {
    eprintln!("Available commands:");
    eprintln!("  /help     - Show this help");
    eprintln!("  /clear    - Reset the conversation");
    eprintln!("  /tools    - List registered tools");
    eprintln!("  /cost     - Show the session usage report");
    eprintln!("  /verbose  - Toggle round-by-round narration");
    eprintln!("  /exit     - Quit (also /quit)");
    eprintln!("Anything else is sent to the model.");
}

pub async fn run(mut agent: Agent, gate: Arc<SafetyGate>, config: &RuntimeConfig) -> Result<()> {
    // Swap the startup deny-all handler for the interactive prompt.
    gate.set_handler(Arc::new(confirm_on_stdin));

    eprintln!("🪶 Quill");
    eprintln!("   Provider: {} | Model: {}", config.provider, config.model);
    eprintln!("   Project: {}", gate.project_root().display());
    eprintln!("   Tools: {} available", agent.registry().len());
    eprintln!("   Type /help for commands, /quit to exit\n");

    loop {
        eprint!("{}> ", config.provider);
        let _ = std::io::stderr().flush();

        let line = match read_line().await {
            Some(l) => l.trim().to_string(),
            None => break,
        };

        if line.is_empty() {
            continue;
        }

        if line.starts_with('/') {
            match line.as_str() {
                "/quit" | "/exit" | "/q" => {
                    eprintln!("Goodbye!");
                    break;
                }
                "/help" | "/h" => print_help(),
                "/clear" => {
                    let removed = agent.clear_transcript();
                    eprintln!("🧹 Conversation cleared ({} messages dropped).", removed);
                }
                "/tools" => {
                    for def in agent.registry().definitions() {
                        let mut description = def.description.replace('\n', " ");
                        if description.len() > 60 {
                            description.truncate(57);
                            description.push_str("...");
                        }
                        eprintln!("  {:<14} {}", def.name, description);
                    }
                }
                "/cost" => eprintln!("{}", agent.ledger().report()),
                "/verbose" => {
                    let verbose = !agent.verbose();
                    agent.set_verbose(verbose);
                    eprintln!(
                        "Verbose narration {}.",
                        if verbose { "enabled" } else { "disabled" }
                    );
                }
                _ => {
                    eprintln!("Unknown command: {}. Type /help for available commands.", line);
                }
            }
            continue;
        }

        match agent.process_message(&line).await {
            Ok(reply) => {
                eprintln!("\n{}\n", reply);
                eprintln!("   [{}]", agent.ledger().summary());
            }
            Err(e) => {
                // Provider failures end the turn, not the session.
                eprintln!("❌ {:#}", e);
            }
        }
    }

    Ok(())
}
