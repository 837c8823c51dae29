pub mod backend;
pub mod ollama;
pub mod power;
pub mod runner;
pub mod session;

pub use backend::{ChunkStream, GenerateChunk, InferenceBackend};
pub use ollama::OllamaClient;
pub use power::{detect_power, detect_power_source, NoPowerSource, PowerError, PowerProbe, PowerSampler, PowerSource};
pub use runner::{PromptRunner, RunEvent};
pub use session::{run_benchmark, run_with_config};
