//! Power draw measurement during a run.
//!
//! A [`PowerSource`] is started right before the first prompt and stopped
//! right after the last one. Vendor tools are wrapped as [`PowerProbe`]s and
//! polled on a background thread by [`PowerSampler`]; when no tool works the
//! run gets a [`NoPowerSource`] and reports power as unavailable.

mod detect;
mod probes;
mod sampler;

pub use detect::{detect_power, detect_power_source};
pub use probes::{
    parse_nvidia_smi, parse_powermetrics, parse_rocm_smi, NvidiaSmiProbe, PowermetricsProbe,
    RocmSmiProbe, TOOL_TIMEOUT,
};
pub use sampler::PowerSampler;

use std::time::Duration;

use aibench_core::PowerSummary;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PowerError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Failed to execute {tool}: {source}")]
    ExecutionFailed {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}")]
    ExitStatus { tool: &'static str, status: String },
    #[error("{tool} did not finish within {after:?}")]
    Timeout { tool: &'static str, after: Duration },
    #[error("No power reading in {0} output")]
    NoReading(&'static str),
}

/// A single platform power query.
pub trait PowerProbe: Send + Sync {
    fn method(&self) -> &'static str;

    /// Current draw in watts.
    fn read_watts(&self) -> Result<f64, PowerError>;
}

/// Measures power over the window between `start` and `stop`.
pub trait PowerSource: Send + Sync {
    fn method(&self) -> &str;

    fn is_available(&self) -> bool;

    fn start(&mut self);

    fn stop(&mut self) -> PowerSummary;
}

/// Stand-in when no power tool could be queried.
#[derive(Debug, Clone)]
pub struct NoPowerSource {
    reason: String,
}

impl NoPowerSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PowerSource for NoPowerSource {
    fn method(&self) -> &str {
        &self.reason
    }

    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self) {}

    fn stop(&mut self) -> PowerSummary {
        PowerSummary::unavailable(self.reason.clone())
    }
}
