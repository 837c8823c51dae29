use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::metrics::{completed_results, round2};
use crate::scoring::compute_scores;
use crate::{AiBenchError, PowerSummary, PromptOutcome, Result, Scores, SystemInfo};

/// Version of the persisted/submitted record layout.
pub const RESULT_FORMAT_VERSION: &str = "1.0.0";

/// Raw output of one measured run, before scoring.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub model: String,
    pub backend_version: String,
    pub outcomes: Vec<PromptOutcome>,
    pub power: PowerSummary,
    pub started_at: SystemTime,
    pub duration: Duration,
}

/// The assembled result of a benchmark invocation. Built once by
/// [`assemble`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    version: String,
    run_id: Uuid,
    timestamp: i64,
    model: String,
    backend_version: String,
    duration_s: f64,
    system: SystemInfo,
    scores: Scores,
    power: PowerSummary,
    results: Vec<PromptOutcome>,
}

impl BenchmarkRun {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Unix seconds at which the measured window opened.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend_version(&self) -> &str {
        &self.backend_version
    }

    pub fn duration_s(&self) -> f64 {
        self.duration_s
    }

    pub fn system(&self) -> &SystemInfo {
        &self.system
    }

    pub fn scores(&self) -> &Scores {
        &self.scores
    }

    pub fn power(&self) -> &PowerSummary {
        &self.power
    }

    /// Every attempted prompt in run order, failures included.
    pub fn results(&self) -> &[PromptOutcome] {
        &self.results
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|o| !o.is_completed()).count()
    }
}

/// Combine system identification and a measured run into the final record.
/// A run with no successful prompt is an error, never a zero-scored record.
pub fn assemble(system: SystemInfo, report: RunReport) -> Result<BenchmarkRun> {
    let completed = completed_results(&report.outcomes);
    if completed.is_empty() {
        return Err(AiBenchError::NoSuccessfulPrompts {
            attempted: report.outcomes.len(),
        });
    }

    let scores = compute_scores(&completed, &report.power)?;

    let timestamp = report
        .started_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let run = BenchmarkRun {
        version: RESULT_FORMAT_VERSION.to_string(),
        run_id: Uuid::new_v4(),
        timestamp,
        model: report.model,
        backend_version: report.backend_version,
        duration_s: round2(report.duration.as_secs_f64()),
        system,
        scores,
        power: report.power,
        results: report.outcomes,
    };

    info!(
        run_id = %run.run_id,
        completed = run.scores.prompts_completed,
        failed = run.failed_count(),
        "Assembled benchmark run"
    );

    Ok(run)
}
