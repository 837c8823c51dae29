use std::collections::VecDeque;
use std::time::Duration;

use aibench_core::{AiBenchError, GenerationOptions, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::backend::{ChunkStream, GenerateChunk, InferenceBackend};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct OllamaClient {
    host: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerationOptions,
}

impl OllamaClient {
    pub fn new(host: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AiBenchError::Http(e.to_string()))?;

        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.host);
        let resp = self
            .client
            .get(&url)
            .timeout(LIVENESS_TIMEOUT)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !resp.status().is_success() {
            return Err(AiBenchError::Backend(format!(
                "Failed to list models: {}",
                resp.status()
            )));
        }

        let tags: TagsResponse = resp.json().await.map_err(map_reqwest_error)?;
        info!(count = tags.models.len(), "Fetched models from Ollama");
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether `model` is installed. An untagged name matches its `:latest`
    /// tag (`llama3.1` matches `llama3.1:latest`).
    pub async fn has_model(&self, model: &str) -> Result<bool> {
        let names = self.list_models().await?;
        Ok(model_matches(&names, model))
    }
}

fn model_matches(installed: &[String], model: &str) -> bool {
    let latest = format!("{}:latest", model);
    installed
        .iter()
        .any(|name| name == model || (!model.contains(':') && *name == latest))
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    #[instrument(skip(self), fields(host = %self.host))]
    async fn version(&self) -> Result<String> {
        let url = format!("{}/api/version", self.host);
        let resp = self
            .client
            .get(&url)
            .timeout(LIVENESS_TIMEOUT)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !resp.status().is_success() {
            return Err(AiBenchError::Backend(format!(
                "Version check failed: {}",
                resp.status()
            )));
        }

        let body: VersionResponse = resp.json().await.map_err(map_reqwest_error)?;
        debug!(version = %body.version, "Ollama is reachable");
        Ok(body.version)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<ChunkStream> {
        let url = format!("{}/api/generate", self.host);
        let request = GenerateRequest {
            model,
            prompt,
            stream: true,
            options,
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AiBenchError::Backend(format!(
                "Generate failed: {} - {}",
                status,
                truncate(&body, 500)
            )));
        }

        let bytes = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error));

        Ok(decode_ndjson(Box::pin(bytes)))
    }
}

/// Map reqwest errors, separating "nothing is listening" from other failures.
fn map_reqwest_error(e: reqwest::Error) -> AiBenchError {
    if e.is_connect() {
        error!("Connection to Ollama failed: {}", e);
        return AiBenchError::BackendUnreachable(e.to_string());
    }

    error!("HTTP error: {}", e);
    AiBenchError::Http(e.to_string())
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Accumulates raw bytes and yields complete newline-terminated lines.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines.retain(|l| !l.is_empty());
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

fn parse_chunk(line: &str) -> Result<GenerateChunk> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        AiBenchError::MalformedStats(format!(
            "Invalid stream line: {} - {}",
            e,
            truncate(line, 200)
        ))
    })?;

    if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
        return Err(AiBenchError::Backend(message.to_string()));
    }

    serde_json::from_value(value).map_err(|e| AiBenchError::MalformedStats(e.to_string()))
}

struct DecodeState<S> {
    bytes: S,
    lines: LineBuffer,
    ready: VecDeque<Result<GenerateChunk>>,
    exhausted: bool,
}

/// Turn a byte stream of newline-delimited JSON into generation chunks.
/// Lines may be split across network reads.
fn decode_ndjson<S, B>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        bytes,
        lines: LineBuffer::default(),
        ready: VecDeque::new(),
        exhausted: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            if st.exhausted {
                return None;
            }

            match st.bytes.next().await {
                Some(Ok(bytes)) => {
                    let parsed = st.lines.push(bytes.as_ref());
                    st.ready.extend(parsed.iter().map(|l| parse_chunk(l)));
                }
                Some(Err(e)) => {
                    st.exhausted = true;
                    st.ready.push_back(Err(e));
                }
                None => {
                    st.exhausted = true;
                    if let Some(line) = st.lines.finish() {
                        st.ready.push_back(parse_chunk(&line));
                    }
                }
            }
        }
    }))
}
