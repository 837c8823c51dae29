//! Reduction of per-prompt measurements into the headline scores.
//!
//! `performance_score = avg_prompt_eval_tps * 0.3 + avg_eval_tps * 0.7`, with
//! unweighted means across prompts. `efficiency_score` divides that composite
//! by the average power draw and is only present when a usable wattage exists.

use serde::{Deserialize, Serialize};

use crate::metrics::{round2, round4};
use crate::{AiBenchError, PowerSummary, PromptResult, Result};

pub const PROMPT_EVAL_WEIGHT: f64 = 0.3;
pub const EVAL_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub performance_score: f64,
    pub efficiency_score: Option<f64>,
    pub avg_prompt_eval_tps: f64,
    pub avg_eval_tps: f64,
    pub avg_ttft_ms: f64,
    /// Informational only, not for cross-system ranking.
    pub total_tokens_generated: u64,
    /// Informational only, not for cross-system ranking.
    pub total_prompt_tokens: u64,
    pub prompts_completed: u32,
}

/// Compute scores over successful results. Fails when there are none, since
/// zero scores would be indistinguishable from a slow but working system.
pub fn compute_scores(results: &[PromptResult], power: &PowerSummary) -> Result<Scores> {
    if results.is_empty() {
        return Err(AiBenchError::NoSuccessfulPrompts { attempted: 0 });
    }

    let avg_prompt_eval_tps = mean(results.iter().map(|r| r.prompt_eval_tps));
    let avg_eval_tps = mean(results.iter().map(|r| r.eval_tps));
    let avg_ttft_ms = mean(results.iter().map(|r| r.ttft));

    let performance_score =
        round2(avg_prompt_eval_tps * PROMPT_EVAL_WEIGHT + avg_eval_tps * EVAL_WEIGHT);
    let efficiency_score = power
        .usable_avg_watts()
        .map(|watts| round4(performance_score / watts));

    tracing::debug!(
        performance_score,
        ?efficiency_score,
        prompts = results.len(),
        "Computed scores"
    );

    Ok(Scores {
        performance_score,
        efficiency_score,
        avg_prompt_eval_tps: round2(avg_prompt_eval_tps),
        avg_eval_tps: round2(avg_eval_tps),
        avg_ttft_ms: round2(avg_ttft_ms),
        total_tokens_generated: results.iter().map(|r| r.eval_count).sum(),
        total_prompt_tokens: results.iter().map(|r| r.prompt_eval_count).sum(),
        prompts_completed: results.len() as u32,
    })
}

/// Mean of values already rounded to hundredths. Summing whole hundredths as
/// integers keeps the result independent of the order of the inputs.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0i64, 0i64), |(sum, n), v| {
        (sum + (v * 100.0).round() as i64, n + 1)
    });
    sum as f64 / (n as f64 * 100.0)
}
