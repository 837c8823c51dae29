use std::pin::Pin;

use aibench_core::{GenerationOptions, GenerationStats, Result};
use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;

/// One streamed piece of a generation. The final chunk has `done` set and
/// carries the backend's per-call statistics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(flatten)]
    pub stats: GenerationStats,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerateChunk>> + Send>>;

/// The inference server as seen by the prompt runner.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Liveness probe; returns the server version.
    async fn version(&self) -> Result<String>;

    /// Dispatch one generation request and return its token stream.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<ChunkStream>;
}
