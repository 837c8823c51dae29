use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Prompt;

const NANOS_PER_MS: f64 = 1_000_000.0;

/// Per-call statistics as the backend reports them, in nanoseconds and tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    #[serde(default)]
    pub total_duration: u64,
    #[serde(default)]
    pub load_duration: u64,
    #[serde(default)]
    pub prompt_eval_count: u64,
    #[serde(default)]
    pub prompt_eval_duration: u64,
    #[serde(default)]
    pub eval_count: u64,
    #[serde(default)]
    pub eval_duration: u64,
}

/// Measurements for one successfully executed prompt. Durations are in
/// milliseconds, counts in tokens. The tok/s fields are derived once here and
/// never recomputed by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResult {
    pub prompt_id: String,
    pub category: String,
    pub total_duration: f64,
    pub load_duration: f64,
    pub prompt_eval_count: u64,
    pub prompt_eval_duration: f64,
    pub prompt_eval_tps: f64,
    pub eval_count: u64,
    pub eval_duration: f64,
    pub eval_tps: f64,
    pub ttft: f64,
}

impl PromptResult {
    pub fn new(prompt: &Prompt, stats: &GenerationStats, ttft: Duration) -> Self {
        let prompt_eval_ms = stats.prompt_eval_duration as f64 / NANOS_PER_MS;
        let eval_ms = stats.eval_duration as f64 / NANOS_PER_MS;

        Self {
            prompt_id: prompt.id.to_string(),
            category: prompt.category.to_string(),
            total_duration: round2(stats.total_duration as f64 / NANOS_PER_MS),
            load_duration: round2(stats.load_duration as f64 / NANOS_PER_MS),
            prompt_eval_count: stats.prompt_eval_count,
            prompt_eval_duration: round2(prompt_eval_ms),
            prompt_eval_tps: round2(tokens_per_sec(stats.prompt_eval_count, prompt_eval_ms)),
            eval_count: stats.eval_count,
            eval_duration: round2(eval_ms),
            eval_tps: round2(tokens_per_sec(stats.eval_count, eval_ms)),
            ttft: round2(ttft.as_secs_f64() * 1000.0),
        }
    }
}

/// Tokens per second over a millisecond duration; zero when nothing was timed.
pub fn tokens_per_sec(count: u64, duration_ms: f64) -> f64 {
    if duration_ms > 0.0 {
        count as f64 / (duration_ms / 1000.0)
    } else {
        0.0
    }
}

/// A prompt whose request did not produce usable stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptFailure {
    pub prompt_id: String,
    pub category: String,
    pub error: String,
}

impl PromptFailure {
    pub fn new(prompt: &Prompt, error: impl ToString) -> Self {
        Self {
            prompt_id: prompt.id.to_string(),
            category: prompt.category.to_string(),
            error: error.to_string(),
        }
    }
}

/// One slot per attempted prompt, in run order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PromptOutcome {
    Completed(PromptResult),
    Failed(PromptFailure),
}

impl PromptOutcome {
    pub fn prompt_id(&self) -> &str {
        match self {
            PromptOutcome::Completed(r) => &r.prompt_id,
            PromptOutcome::Failed(f) => &f.prompt_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PromptOutcome::Completed(_))
    }

    pub fn completed(&self) -> Option<&PromptResult> {
        match self {
            PromptOutcome::Completed(r) => Some(r),
            PromptOutcome::Failed(_) => None,
        }
    }
}

/// Successful results of a run, in order.
pub fn completed_results(outcomes: &[PromptOutcome]) -> Vec<PromptResult> {
    outcomes
        .iter()
        .filter_map(PromptOutcome::completed)
        .cloned()
        .collect()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
