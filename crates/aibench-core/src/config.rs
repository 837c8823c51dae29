use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::prompt::BENCHMARK_MODEL;
use crate::{AiBenchError, Result};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// File-level configuration. Every section falls back to its defaults, so an
/// empty JSON object is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub run: RunDefaults,
    #[serde(default)]
    pub power: PowerConfig,
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: BenchConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ollama.host.trim().is_empty() {
            return Err(AiBenchError::Config("ollama.host must not be empty".into()));
        }
        if self.run.model.trim().is_empty() {
            return Err(AiBenchError::Config("run.model must not be empty".into()));
        }
        if self.run.request_timeout_secs == 0 {
            return Err(AiBenchError::Config(
                "run.request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.power.interval_ms == 0 {
            return Err(AiBenchError::Config(
                "power.interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Explicit per-run configuration handed to the runner.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            endpoint: self.ollama.host.trim_end_matches('/').to_string(),
            model: self.run.model.clone(),
            options: GenerationOptions {
                temperature: self.run.temperature,
                seed: self.run.seed,
                num_predict: self.run.num_predict,
            },
            request_timeout: Duration::from_secs(self.run.request_timeout_secs),
            warmup_runs: self.run.warmup_runs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub host: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    pub model: String,
    pub temperature: f32,
    pub seed: i64,
    pub num_predict: u32,
    pub request_timeout_secs: u64,
    pub warmup_runs: u32,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            model: BENCHMARK_MODEL.to_string(),
            temperature: 0.7,
            seed: 42,
            num_predict: 256,
            request_timeout_secs: 300,
            warmup_runs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 500,
        }
    }
}

impl PowerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub seed: i64,
    pub num_predict: u32,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub endpoint: String,
    pub model: String,
    pub options: GenerationOptions,
    pub request_timeout: Duration,
    pub warmup_runs: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        BenchConfig::default().run_config()
    }
}
