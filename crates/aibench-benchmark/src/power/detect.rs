use std::sync::Arc;

use aibench_core::PowerConfig;
use tracing::{debug, info, instrument, warn};

use super::{
    NoPowerSource, NvidiaSmiProbe, PowerProbe, PowerSampler, PowerSource, PowermetricsProbe,
    RocmSmiProbe,
};

/// Probes applicable to `os`, in detection order.
fn candidate_probes(os: &str) -> Vec<Arc<dyn PowerProbe>> {
    let mut probes: Vec<Arc<dyn PowerProbe>> = vec![Arc::new(NvidiaSmiProbe)];
    match os {
        "linux" => probes.push(Arc::new(RocmSmiProbe)),
        "macos" => probes.push(Arc::new(PowermetricsProbe)),
        _ => {}
    }
    probes
}

/// Select the power source for this run: the first probe that yields a
/// reading wins.
#[instrument(skip(config), fields(enabled = config.enabled))]
pub fn detect_power_source(config: &PowerConfig) -> Box<dyn PowerSource> {
    if !config.enabled {
        info!("Power monitoring disabled by configuration");
        return Box::new(NoPowerSource::new("disabled"));
    }

    select_source(candidate_probes(std::env::consts::OS), config)
}

/// [`detect_power_source`] on the blocking pool, so slow vendor tools never
/// stall an async worker.
pub async fn detect_power(config: &PowerConfig) -> Box<dyn PowerSource> {
    let config = config.clone();
    match tokio::task::spawn_blocking(move || detect_power_source(&config)).await {
        Ok(source) => source,
        Err(e) => {
            warn!("Power detection failed: {}", e);
            Box::new(NoPowerSource::new("power detection failed"))
        }
    }
}

fn select_source(probes: Vec<Arc<dyn PowerProbe>>, config: &PowerConfig) -> Box<dyn PowerSource> {
    for probe in probes {
        match probe.read_watts() {
            Ok(watts) => {
                info!(method = probe.method(), watts, "Power monitoring available");
                return Box::new(PowerSampler::new(probe, config.interval()));
            }
            Err(e) => debug!(method = probe.method(), "Power probe unavailable: {}", e),
        }
    }

    info!("Power monitoring not available");
    Box::new(NoPowerSource::new("no supported power tool detected"))
}
