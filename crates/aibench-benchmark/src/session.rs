use aibench_core::{assemble, benchmark_prompts, BenchConfig, BenchmarkRun, Result, SystemInfo};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::backend::InferenceBackend;
use crate::ollama::OllamaClient;
use crate::power::{detect_power, PowerSource};
use crate::runner::{PromptRunner, RunEvent};

impl PromptRunner<OllamaClient> {
    /// Runner for the standard prompt catalogue against the configured Ollama
    /// host, measuring with `power`.
    pub fn from_config(config: &BenchConfig, power: Box<dyn PowerSource>) -> Result<Self> {
        config.validate()?;
        let run = config.run_config();
        let client = OllamaClient::new(&run.endpoint)?;
        Ok(Self::new(client, run, benchmark_prompts(), power))
    }
}

/// Execute one full benchmark and assemble the uploadable record.
#[instrument(skip_all)]
pub async fn run_benchmark<B: InferenceBackend>(
    runner: PromptRunner<B>,
    system: SystemInfo,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<RunEvent>>,
) -> Result<BenchmarkRun> {
    let report = runner.run(cancel, events).await?;
    let run = assemble(system, report)?;
    info!(
        performance = run.scores().performance_score,
        efficiency = ?run.scores().efficiency_score,
        "Benchmark complete"
    );
    Ok(run)
}

/// [`run_benchmark`] with Ollama and auto-detected power measurement.
pub async fn run_with_config(
    config: &BenchConfig,
    system: SystemInfo,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<RunEvent>>,
) -> Result<BenchmarkRun> {
    let power = detect_power(&config.power).await;
    let runner = PromptRunner::from_config(config, power)?;
    run_benchmark(runner, system, cancel, events).await
}
