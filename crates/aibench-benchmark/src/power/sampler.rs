use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aibench_core::{PowerSample, PowerSummary};
use tracing::{debug, info, instrument, warn};

use super::{PowerProbe, PowerSource};

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<Vec<PowerSample>>,
}

/// Polls a [`PowerProbe`] on a dedicated thread. The thread is the only
/// writer of the sample buffer and hands it back when joined in `stop`.
pub struct PowerSampler {
    probe: Arc<dyn PowerProbe>,
    interval: Duration,
    running: Option<Running>,
    start_failure: Option<String>,
}

impl PowerSampler {
    pub fn new(probe: Arc<dyn PowerProbe>, interval: Duration) -> Self {
        Self {
            probe,
            interval,
            running: None,
            start_failure: None,
        }
    }
}

impl PowerSource for PowerSampler {
    fn method(&self) -> &str {
        self.probe.method()
    }

    fn is_available(&self) -> bool {
        self.start_failure.is_none()
    }

    #[instrument(skip(self), fields(method = self.probe.method(), interval_ms = self.interval.as_millis()))]
    fn start(&mut self) {
        if self.running.is_some() {
            warn!("Power sampler already running");
            return;
        }

        let (stop_tx, stop_rx) = channel::<()>();
        let probe = self.probe.clone();
        let interval = self.interval;

        let spawned = thread::Builder::new()
            .name("power-sampler".into())
            .spawn(move || {
                let mut samples = Vec::new();
                loop {
                    match probe.read_watts() {
                        Ok(watts) if watts > 0.0 => samples.push(PowerSample {
                            timestamp: now_ms(),
                            watts,
                        }),
                        Ok(watts) => debug!(watts, "Discarding non-positive power reading"),
                        Err(e) => debug!("Power sample skipped: {}", e),
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                samples
            });

        match spawned {
            Ok(handle) => {
                info!("Power sampling started");
                self.running = Some(Running { stop_tx, handle });
            }
            Err(e) => {
                warn!("Failed to spawn power sampler: {}", e);
                self.start_failure = Some(format!(
                    "{} (sampler failed to start: {})",
                    self.probe.method(),
                    e
                ));
            }
        }
    }

    fn stop(&mut self) -> PowerSummary {
        if let Some(reason) = &self.start_failure {
            return PowerSummary::unavailable(reason.clone());
        }

        let Some(running) = self.running.take() else {
            return PowerSummary::unavailable(format!("{} (not started)", self.probe.method()));
        };

        let _ = running.stop_tx.send(());
        match running.handle.join() {
            Ok(samples) => {
                let summary = PowerSummary::from_samples(self.probe.method(), &samples);
                info!(
                    samples = summary.sample_count,
                    avg_watts = ?summary.avg_watts,
                    "Power sampling stopped"
                );
                summary
            }
            Err(_) => {
                warn!("Power sampler thread panicked");
                PowerSummary::unavailable(format!("{} (sampler panicked)", self.probe.method()))
            }
        }
    }
}

impl Drop for PowerSampler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(());
            let _ = running.handle.join();
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
