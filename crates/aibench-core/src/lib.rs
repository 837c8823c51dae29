pub mod config;
pub mod error;
pub mod metrics;
pub mod power;
pub mod prompt;
pub mod run;
pub mod scoring;
pub mod system;

pub use config::{
    BenchConfig, GenerationOptions, OllamaConfig, PowerConfig, RunConfig, RunDefaults,
    DEFAULT_OLLAMA_HOST,
};
pub use error::{AiBenchError, Result};
pub use metrics::{
    completed_results, tokens_per_sec, GenerationStats, PromptFailure, PromptOutcome,
    PromptResult,
};
pub use power::{PowerSample, PowerSummary};
pub use prompt::{benchmark_prompts, Prompt, BENCHMARK_MODEL, BENCHMARK_PROMPTS, WARMUP_PROMPT};
pub use run::{assemble, BenchmarkRun, RunReport, RESULT_FORMAT_VERSION};
pub use scoring::{compute_scores, Scores, EVAL_WEIGHT, PROMPT_EVAL_WEIGHT};
pub use system::{CpuInfo, GpuInfo, OsInfo, RamInfo, SystemInfo};
