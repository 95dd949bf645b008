//! Cost Ledger
//!
//! Per-call and cumulative token/dollar accounting against a fixed pricing
//! table, including tiered long-context rates. Tier selection uses the
//! session's running cumulative input: once the threshold is crossed, every
//! later call prices at the long-context rates until `reset()`.

use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Pricing table
// ---------------------------------------------------------------------------

/// Model used when the requested model has no pricing entry.
pub const DEFAULT_PRICING_MODEL: &str = "gemini-2.5-pro";

/// Dollar rates per million tokens, with optional long-context tier.
#[derive(Debug, Clone, Copy)]
pub struct PricingProfile {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub long_context_threshold: Option<u64>,
    pub long_input_per_million: Option<f64>,
    pub long_output_per_million: Option<f64>,
}

impl PricingProfile {
    const fn flat(input: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
            long_context_threshold: None,
            long_input_per_million: None,
            long_output_per_million: None,
        }
    }

    const fn tiered(input: f64, output: f64, threshold: u64, long_input: f64, long_output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
            long_context_threshold: Some(threshold),
            long_input_per_million: Some(long_input),
            long_output_per_million: Some(long_output),
        }
    }
}

/// Collapse versioned model names to the pricing table's keys.
fn normalize_model(model: &str) -> &str {
    let m = model.trim();
    match m {
        s if s.contains("gemini-2.5-pro") => "gemini-2.5-pro",
        s if s.contains("gemini-2.5-flash") => "gemini-2.5-flash",
        s if s.contains("gemini-2.0-flash") => "gemini-2.0-flash",
        s if s.contains("claude-opus-4") || s.contains("claude-4-opus") => "claude-opus-4",
        s if s.contains("claude-sonnet-4") || s.contains("claude-4-sonnet") => "claude-sonnet-4",
        s if s.contains("claude-3-5-haiku") || s.contains("claude-3.5-haiku") => "claude-3-5-haiku",
        s if s.contains("gpt-4o-mini") => "gpt-4o-mini",
        s if s.contains("gpt-4o") => "gpt-4o",
        _ => m,
    }
}

/// Look up the pricing profile for a model, falling back to
/// [`DEFAULT_PRICING_MODEL`] for unknown names.
pub fn profile_for_model(model: &str) -> PricingProfile {
    match normalize_model(model) {
        "gemini-2.5-pro" => PricingProfile::tiered(1.25, 10.0, 200_000, 2.5, 15.0),
        "gemini-2.5-flash" => PricingProfile::flat(0.15, 0.60),
        "gemini-2.0-flash" => PricingProfile::flat(0.10, 0.40),
        "claude-sonnet-4" => PricingProfile::tiered(3.0, 15.0, 200_000, 6.0, 22.5),
        "claude-opus-4" => PricingProfile::flat(15.0, 75.0),
        "claude-3-5-haiku" => PricingProfile::flat(0.80, 4.0),
        "gpt-4o" => PricingProfile::flat(2.50, 10.0),
        "gpt-4o-mini" => PricingProfile::flat(0.15, 0.60),
        _ => {
            tracing::debug!(model, "no pricing entry, using default model rates");
            profile_for_model(DEFAULT_PRICING_MODEL)
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// One priced provider call.
#[derive(Debug, Clone)]
pub struct UsageEntry {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Streaming usage ledger for one session.
pub struct CostLedger {
    model: String,
    profile: PricingProfile,
    entries: Vec<UsageEntry>,
    /// Running input total; drives long-context tier selection and never
    /// decreases except through `reset()`.
    cumulative_input: u64,
    total_output: u64,
    total_cost: f64,
}

impl CostLedger {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            profile: profile_for_model(model),
            entries: Vec::new(),
            cumulative_input: 0,
            total_output: 0,
            total_cost: 0.0,
        }
    }

    /// Price one call and append it to the ledger.
    pub fn record_usage(&mut self, input_tokens: u64, output_tokens: u64) -> UsageEntry {
        self.cumulative_input += input_tokens;

        let long_context = self
            .profile
            .long_context_threshold
            .is_some_and(|threshold| self.cumulative_input > threshold);
        let (input_rate, output_rate) = if long_context {
            (
                self.profile
                    .long_input_per_million
                    .unwrap_or(self.profile.input_per_million),
                self.profile
                    .long_output_per_million
                    .unwrap_or(self.profile.output_per_million),
            )
        } else {
            (self.profile.input_per_million, self.profile.output_per_million)
        };

        let cost = input_tokens as f64 / 1e6 * input_rate + output_tokens as f64 / 1e6 * output_rate;

        let entry = UsageEntry {
            input_tokens,
            output_tokens,
            cost,
            timestamp: Utc::now(),
        };
        self.total_output += output_tokens;
        self.total_cost += cost;
        self.entries.push(entry.clone());
        entry
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn call_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.cumulative_input
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn entries(&self) -> &[UsageEntry] {
        &self.entries
    }

    /// One-line rendering: `"<total tokens> tokens | $<cost>"`.
    pub fn summary(&self) -> String {
        format!(
            "{} tokens | ${:.4}",
            format_thousands(self.cumulative_input + self.total_output),
            self.total_cost
        )
    }

    /// Multi-line report with totals and the last five calls.
    pub fn report(&self) -> String {
        let mut out = format!(
            "Usage for {}\n  calls:         {}\n  input tokens:  {}\n  output tokens: {}\n  total tokens:  {}\n  total cost:    ${:.4}",
            self.model,
            self.entries.len(),
            format_thousands(self.cumulative_input),
            format_thousands(self.total_output),
            format_thousands(self.cumulative_input + self.total_output),
            self.total_cost
        );
        if !self.entries.is_empty() {
            out.push_str("\n  recent calls:");
            let start = self.entries.len().saturating_sub(5);
            for entry in &self.entries[start..] {
                out.push_str(&format!(
                    "\n    {} | {} in / {} out | ${:.4}",
                    entry.timestamp.format("%H:%M:%S"),
                    format_thousands(entry.input_tokens),
                    format_thousands(entry.output_tokens),
                    entry.cost
                ));
            }
        }
        out
    }

    /// Clear all state, including the cumulative tier counter.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.cumulative_input = 0;
        self.total_output = 0;
        self.total_cost = 0.0;
    }
}

/// Comma-grouped decimal rendering (12345 → "12,345").
fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
