use std::time::{Duration, Instant, SystemTime};

use aibench_core::{
    AiBenchError, GenerationStats, Prompt, PromptFailure, PromptOutcome, PromptResult, PowerSummary,
    Result, RunConfig, RunReport, WARMUP_PROMPT,
};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::InferenceBackend;
use crate::power::PowerSource;

/// Progress notifications emitted while a run is in flight.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Warmup { current: u32, total: u32 },
    PowerStarted { available: bool, method: String },
    Prompt { current: u32, total: u32, prompt_id: String, category: String },
    PromptComplete { result: PromptResult },
    PromptFailed { prompt_id: String, error: String },
    PowerStopped { summary: PowerSummary },
}

/// Runs the prompt catalogue once, sequentially, while the power source
/// measures. Built fresh for every invocation and consumed by [`run`].
///
/// [`run`]: PromptRunner::run
pub struct PromptRunner<B> {
    backend: B,
    config: RunConfig,
    prompts: Vec<Prompt>,
    power: Box<dyn PowerSource>,
}

impl<B: InferenceBackend> PromptRunner<B> {
    pub fn new(
        backend: B,
        config: RunConfig,
        prompts: &[Prompt],
        power: Box<dyn PowerSource>,
    ) -> Self {
        Self {
            backend,
            config,
            prompts: prompts.to_vec(),
            power,
        }
    }

    #[instrument(skip_all, fields(model = %self.config.model, prompts = self.prompts.len()))]
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<RunEvent>>,
    ) -> Result<RunReport> {
        let emit = |event: RunEvent| {
            let events = events.clone();
            async move {
                if let Some(tx) = events {
                    let _ = tx.send(event).await;
                }
            }
        };

        let backend_version = self.backend.version().await.map_err(|e| {
            error!("Backend liveness check failed: {}", e);
            match e {
                AiBenchError::BackendUnreachable(_) => e,
                other => AiBenchError::BackendUnreachable(other.to_string()),
            }
        })?;
        info!(version = %backend_version, "Backend reachable");

        for i in 0..self.config.warmup_runs {
            if cancel.is_cancelled() {
                return Err(AiBenchError::Cancelled);
            }
            emit(RunEvent::Warmup {
                current: i + 1,
                total: self.config.warmup_runs,
            })
            .await;
            debug!("Warmup run {}/{}", i + 1, self.config.warmup_runs);
            if let Err(e) = self.execute(WARMUP_PROMPT).await {
                warn!("Warmup request failed: {}", e);
            }
        }

        let total = self.prompts.len() as u32;
        let mut outcomes = Vec::with_capacity(self.prompts.len());
        let mut any_success = false;

        let started_at = SystemTime::now();
        let clock = Instant::now();
        self.power.start();
        emit(RunEvent::PowerStarted {
            available: self.power.is_available(),
            method: self.power.method().to_string(),
        })
        .await;

        for (idx, prompt) in self.prompts.iter().enumerate() {
            if cancel.is_cancelled() {
                self.power.stop();
                info!("Benchmark cancelled before prompt {}", prompt.id);
                return Err(AiBenchError::Cancelled);
            }

            emit(RunEvent::Prompt {
                current: idx as u32 + 1,
                total,
                prompt_id: prompt.id.to_string(),
                category: prompt.category.to_string(),
            })
            .await;

            match self.execute(prompt.text).await {
                Ok((stats, ttft)) => {
                    let result = PromptResult::new(prompt, &stats, ttft);
                    info!(
                        prompt = prompt.id,
                        eval_tps = result.eval_tps,
                        ttft_ms = result.ttft,
                        "Prompt complete"
                    );
                    any_success = true;
                    emit(RunEvent::PromptComplete {
                        result: result.clone(),
                    })
                    .await;
                    outcomes.push(PromptOutcome::Completed(result));
                }
                Err(e) if e.is_connection_failure() && !any_success => {
                    self.power.stop();
                    error!(prompt = prompt.id, "Backend unreachable, aborting run: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(prompt = prompt.id, "Prompt failed: {}", e);
                    emit(RunEvent::PromptFailed {
                        prompt_id: prompt.id.to_string(),
                        error: e.to_string(),
                    })
                    .await;
                    outcomes.push(PromptOutcome::Failed(PromptFailure::new(prompt, e)));
                }
            }
        }

        let power = self.power.stop();
        let duration = clock.elapsed();
        emit(RunEvent::PowerStopped {
            summary: power.clone(),
        })
        .await;

        Ok(RunReport {
            model: self.config.model.clone(),
            backend_version,
            outcomes,
            power,
            started_at,
            duration,
        })
    }

    /// One request, consumed to its final stats block. TTFT is taken at the
    /// first non-empty token as observed here, not as reported by the backend.
    async fn execute(&self, text: &str) -> Result<(GenerationStats, Duration)> {
        let timeout = self.config.request_timeout;
        let dispatched = Instant::now();

        let request = async {
            let mut stream = self
                .backend
                .generate(&self.config.model, text, &self.config.options)
                .await?;

            let mut ttft = None;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if ttft.is_none() && !chunk.response.is_empty() {
                    ttft = Some(dispatched.elapsed());
                }
                if chunk.done {
                    let ttft = ttft.unwrap_or_else(|| dispatched.elapsed());
                    return Ok((chunk.stats, ttft));
                }
            }

            Err(AiBenchError::MalformedStats(
                "stream ended without a final stats block".into(),
            ))
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(AiBenchError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChunkStream, GenerateChunk};
    use crate::power::NoPowerSource;
    use aibench_core::{GenerationOptions, BENCHMARK_PROMPTS};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    enum Reply {
        Tokens(Vec<&'static str>),
        Unreachable,
        ErrorResponse,
        Stall,
        NoFinalBlock,
        /// Chunks released after the given delays; the last one is final.
        Paced(Vec<(Duration, &'static str)>),
    }

    struct ScriptedBackend {
        reachable: bool,
        replies: Mutex<VecDeque<Reply>>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                reachable: true,
                replies: Mutex::new(replies.into()),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn offline() -> Self {
            Self {
                reachable: false,
                ..Self::new(vec![])
            }
        }
    }

    fn final_stats() -> GenerationStats {
        GenerationStats {
            total_duration: 2_000_000_000,
            load_duration: 5_000_000,
            prompt_eval_count: 20,
            prompt_eval_duration: 200_000_000,
            eval_count: 100,
            eval_duration: 2_000_000_000,
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        async fn version(&self) -> Result<String> {
            match self.reachable {
                true => Ok("0.5.7".into()),
                false => Err(AiBenchError::BackendUnreachable("connection refused".into())),
            }
        }

        async fn generate(
            &self,
            _model: &str,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<ChunkStream> {
            self.requests.lock().unwrap().push(prompt.to_string());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Tokens(vec!["ok"]));

            match reply {
                Reply::Tokens(tokens) => {
                    let mut chunks: Vec<Result<GenerateChunk>> = tokens
                        .into_iter()
                        .map(|t| {
                            Ok(GenerateChunk {
                                response: t.to_string(),
                                ..Default::default()
                            })
                        })
                        .collect();
                    chunks.push(Ok(GenerateChunk {
                        response: String::new(),
                        done: true,
                        stats: final_stats(),
                    }));
                    Ok(Box::pin(futures::stream::iter(chunks)))
                }
                Reply::Unreachable => Err(AiBenchError::BackendUnreachable("connection refused".into())),
                Reply::ErrorResponse => Err(AiBenchError::Backend("500 - out of memory".into())),
                Reply::Stall => Ok(Box::pin(futures::stream::pending::<Result<GenerateChunk>>())),
                Reply::NoFinalBlock => {
                    let partial: Result<GenerateChunk> = Ok(GenerateChunk {
                        response: "partial".into(),
                        ..Default::default()
                    });
                    Ok(Box::pin(futures::stream::iter(vec![partial])))
                }
                Reply::Paced(steps) => {
                    let last = steps.len().saturating_sub(1);
                    let stream = futures::stream::iter(steps.into_iter().enumerate()).then(
                        move |(i, (delay, token))| async move {
                            tokio::time::sleep(delay).await;
                            let chunk = GenerateChunk {
                                response: token.to_string(),
                                done: i == last,
                                stats: if i == last { final_stats() } else { Default::default() },
                            };
                            Ok::<_, AiBenchError>(chunk)
                        },
                    );
                    Ok(Box::pin(stream))
                }
            }
        }
    }

    /// Records start/stop calls without touching hardware.
    struct CountingPower {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl PowerSource for CountingPower {
        fn method(&self) -> &str {
            "counting"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn start(&mut self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&mut self) -> PowerSummary {
            self.stops.fetch_add(1, Ordering::SeqCst);
            PowerSummary::from_samples(
                "counting",
                &[aibench_core::PowerSample {
                    timestamp: 0,
                    watts: 200.0,
                }],
            )
        }
    }

    fn config() -> RunConfig {
        RunConfig {
            request_timeout: Duration::from_millis(100),
            warmup_runs: 0,
            ..RunConfig::default()
        }
    }

    fn runner(backend: ScriptedBackend) -> PromptRunner<ScriptedBackend> {
        PromptRunner::new(
            backend,
            config(),
            BENCHMARK_PROMPTS,
            Box::new(NoPowerSource::new("none")),
        )
    }

    #[tokio::test]
    async fn test_all_prompts_complete_in_order() {
        let backend = ScriptedBackend::new(vec![]);
        let requests = backend.requests.clone();

        let report = runner(backend).run(CancellationToken::new(), None).await.unwrap();

        assert_eq!(report.outcomes.len(), 5);
        assert!(report.outcomes.iter().all(|o| o.is_completed()));
        let ids: Vec<_> = report.outcomes.iter().map(|o| o.prompt_id()).collect();
        assert_eq!(ids, BENCHMARK_PROMPTS.iter().map(|p| p.id).collect::<Vec<_>>());
        assert_eq!(requests.lock().unwrap().len(), 5);
        assert_eq!(report.backend_version, "0.5.7");

        let first = report.outcomes[0].completed().unwrap();
        assert_eq!(first.eval_tps, 50.0);
        assert_eq!(first.prompt_eval_tps, 100.0);
    }

    fn paced_runner(reply: Reply) -> PromptRunner<ScriptedBackend> {
        let config = RunConfig {
            request_timeout: Duration::from_secs(5),
            ..config()
        };
        PromptRunner::new(
            ScriptedBackend::new(vec![reply]),
            config,
            &BENCHMARK_PROMPTS[..1],
            Box::new(NoPowerSource::new("none")),
        )
    }

    #[tokio::test]
    async fn test_ttft_taken_at_first_token_not_final_chunk() {
        let reply = Reply::Paced(vec![
            (Duration::from_millis(60), ""),
            (Duration::from_millis(60), "The"),
            (Duration::from_millis(400), " farmer"),
            (Duration::from_millis(10), ""),
        ]);

        let report = paced_runner(reply).run(CancellationToken::new(), None).await.unwrap();

        let result = report.outcomes[0].completed().unwrap();
        assert!(result.ttft >= 120.0, "ttft {} before first token", result.ttft);
        assert!(result.ttft < 400.0, "ttft {} includes the tail", result.ttft);
    }

    #[tokio::test]
    async fn test_ttft_falls_back_to_final_chunk_without_tokens() {
        let reply = Reply::Paced(vec![
            (Duration::from_millis(50), ""),
            (Duration::from_millis(100), ""),
        ]);

        let report = paced_runner(reply).run(CancellationToken::new(), None).await.unwrap();

        let result = report.outcomes[0].completed().unwrap();
        assert!(result.ttft >= 150.0, "ttft {} before final chunk", result.ttft);
    }

    #[tokio::test]
    async fn test_partial_failures_continue() {
        let backend = ScriptedBackend::new(vec![
            Reply::Tokens(vec!["a"]),
            Reply::ErrorResponse,
            Reply::Tokens(vec!["b"]),
            Reply::Stall,
            Reply::Unreachable,
        ]);

        let report = runner(backend).run(CancellationToken::new(), None).await.unwrap();

        let completed: Vec<_> = report.outcomes.iter().map(|o| o.is_completed()).collect();
        assert_eq!(completed, [true, false, true, false, false]);
        match &report.outcomes[3] {
            PromptOutcome::Failed(f) => assert!(f.error.contains("timed out")),
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_liveness_is_fatal() {
        let err = runner(ScriptedBackend::offline())
            .run(CancellationToken::new(), None)
            .await
            .unwrap_err();

        assert!(err.is_connection_failure());
    }

    #[tokio::test]
    async fn test_unreachable_before_any_success_aborts() {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let power = CountingPower {
            starts: starts.clone(),
            stops: stops.clone(),
        };
        let backend = ScriptedBackend::new(vec![Reply::ErrorResponse, Reply::Unreachable]);
        let requests = backend.requests.clone();

        let err = PromptRunner::new(backend, config(), BENCHMARK_PROMPTS, Box::new(power))
            .run(CancellationToken::new(), None)
            .await
            .unwrap_err();

        assert!(err.is_connection_failure());
        assert_eq!(requests.lock().unwrap().len(), 2);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_final_block_is_per_prompt_failure() {
        let backend = ScriptedBackend::new(vec![Reply::NoFinalBlock]);

        let report = runner(backend).run(CancellationToken::new(), None).await.unwrap();

        assert!(!report.outcomes[0].is_completed());
        assert!(report.outcomes[1..].iter().all(|o| o.is_completed()));
    }

    #[tokio::test]
    async fn test_power_brackets_prompts() {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let power = CountingPower {
            starts: starts.clone(),
            stops: stops.clone(),
        };

        let report = PromptRunner::new(
            ScriptedBackend::new(vec![]),
            config(),
            BENCHMARK_PROMPTS,
            Box::new(power),
        )
        .run(CancellationToken::new(), None)
        .await
        .unwrap();

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(report.power.avg_watts, Some(200.0));
    }

    #[tokio::test]
    async fn test_warmup_not_recorded() {
        let backend = ScriptedBackend::new(vec![Reply::ErrorResponse]);
        let requests = backend.requests.clone();
        let config = RunConfig {
            warmup_runs: 1,
            ..config()
        };

        let report = PromptRunner::new(
            backend,
            config,
            BENCHMARK_PROMPTS,
            Box::new(NoPowerSource::new("none")),
        )
        .run(CancellationToken::new(), None)
        .await
        .unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 6);
        assert_eq!(requests[0], WARMUP_PROMPT);
        assert_eq!(report.outcomes.len(), 5);
        assert!(report.outcomes.iter().all(|o| o.is_completed()));
    }

    #[tokio::test]
    async fn test_cancelled_run_is_not_reported() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = runner(ScriptedBackend::new(vec![]))
            .run(cancel, None)
            .await
            .unwrap_err();

        assert!(matches!(err, AiBenchError::Cancelled));
    }

    #[tokio::test]
    async fn test_events_stream_progress() {
        let (tx, mut rx) = mpsc::channel(64);
        let backend = ScriptedBackend::new(vec![Reply::Tokens(vec!["x"]), Reply::ErrorResponse]);

        runner(backend).run(CancellationToken::new(), Some(tx)).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(RunEvent::PowerStarted { available: false, .. })));
        assert!(matches!(events.last(), Some(RunEvent::PowerStopped { .. })));
        let completes = events
            .iter()
            .filter(|e| matches!(e, RunEvent::PromptComplete { .. }))
            .count();
        let failures = events
            .iter()
            .filter(|e| matches!(e, RunEvent::PromptFailed { .. }))
            .count();
        assert_eq!(completes, 4);
        assert_eq!(failures, 1);
    }
}
