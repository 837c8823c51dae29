use serde::{Deserialize, Serialize};

use crate::metrics::round2;

/// One power reading. `timestamp` is milliseconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub timestamp: u64,
    pub watts: f64,
}

/// Power statistics over a run. When `available` is false every numeric
/// field is `None` and `method` carries the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSummary {
    pub available: bool,
    pub method: String,
    pub avg_watts: Option<f64>,
    pub max_watts: Option<f64>,
    pub min_watts: Option<f64>,
    pub sample_count: usize,
}

impl PowerSummary {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            method: reason.into(),
            avg_watts: None,
            max_watts: None,
            min_watts: None,
            sample_count: 0,
        }
    }

    /// Summarize collected samples. An empty buffer means nothing was
    /// measured, so the summary is unavailable rather than a division by zero.
    pub fn from_samples(method: &str, samples: &[PowerSample]) -> Self {
        if samples.is_empty() {
            return Self::unavailable(format!("{} (no samples collected)", method));
        }

        let n = samples.len() as f64;
        let sum: f64 = samples.iter().map(|s| s.watts).sum();
        let max = samples
            .iter()
            .map(|s| s.watts)
            .fold(f64::NEG_INFINITY, f64::max);
        let min = samples.iter().map(|s| s.watts).fold(f64::INFINITY, f64::min);

        Self {
            available: true,
            method: method.to_string(),
            avg_watts: Some(round2(sum / n)),
            max_watts: Some(round2(max)),
            min_watts: Some(round2(min)),
            sample_count: samples.len(),
        }
    }

    /// Average draw usable as a divisor.
    pub fn usable_avg_watts(&self) -> Option<f64> {
        match (self.available, self.avg_watts) {
            (true, Some(w)) if w > 0.0 => Some(w),
            _ => None,
        }
    }
}
