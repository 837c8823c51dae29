use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use super::{PowerError, PowerProbe};

const NVIDIA_SMI: &str = "nvidia-smi";
const ROCM_SMI: &str = "rocm-smi";
const POWERMETRICS: &str = "powermetrics";

/// Longest a single vendor query may take before it is killed.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_STEP: Duration = Duration::from_millis(20);

/// "Average Graphics Package Power (W): 35.0" or "... Power: 35.0W"
static ROCM_POWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)power[^:\n]*:\s*([0-9]+(?:\.[0-9]+)?)\s*W?").expect("valid regex")
});

/// "GPU Power: 1234 mW"
static POWERMETRICS_GPU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"GPU Power:\s*([0-9]+(?:\.[0-9]+)?)\s*mW").expect("valid regex"));

fn run_tool(tool: &'static str, program: &str, args: &[&str]) -> Result<String, PowerError> {
    run_tool_with_deadline(tool, program, args, TOOL_TIMEOUT)
}

/// Runs `program` and returns its stdout, killing it once `deadline` passes.
fn run_tool_with_deadline(
    tool: &'static str,
    program: &str,
    args: &[&str],
    deadline: Duration,
) -> Result<String, PowerError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PowerError::NotFound(tool),
            _ => PowerError::ExecutionFailed { tool, source: e },
        })?;

    // Drained on its own thread so a chatty tool cannot fill the pipe and stall.
    let reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf);
            buf
        })
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                debug!(tool, "Killed power tool after {:?}", deadline);
                return Err(PowerError::Timeout { tool, after: deadline });
            }
            Ok(None) => thread::sleep(POLL_STEP),
            Err(e) => return Err(PowerError::ExecutionFailed { tool, source: e }),
        }
    };

    let stdout = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        return Err(PowerError::ExitStatus {
            tool,
            status: status.to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&stdout).to_string())
}

/// NVIDIA GPUs on any OS. Sums draw across all GPUs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NvidiaSmiProbe;

impl PowerProbe for NvidiaSmiProbe {
    fn method(&self) -> &'static str {
        NVIDIA_SMI
    }

    fn read_watts(&self) -> Result<f64, PowerError> {
        let stdout = run_tool(
            NVIDIA_SMI,
            NVIDIA_SMI,
            &["--query-gpu=power.draw", "--format=csv,noheader,nounits"],
        )?;
        parse_nvidia_smi(&stdout).ok_or(PowerError::NoReading(NVIDIA_SMI))
    }
}

/// AMD GPUs on Linux.
#[derive(Debug, Default, Clone, Copy)]
pub struct RocmSmiProbe;

impl PowerProbe for RocmSmiProbe {
    fn method(&self) -> &'static str {
        ROCM_SMI
    }

    fn read_watts(&self) -> Result<f64, PowerError> {
        let stdout = run_tool(ROCM_SMI, ROCM_SMI, &["--showpower"])?;
        parse_rocm_smi(&stdout).ok_or(PowerError::NoReading(ROCM_SMI))
    }
}

/// Apple Silicon GPU power. Needs passwordless sudo; `-n` makes sudo fail
/// instead of prompting.
#[derive(Debug, Default, Clone, Copy)]
pub struct PowermetricsProbe;

impl PowerProbe for PowermetricsProbe {
    fn method(&self) -> &'static str {
        POWERMETRICS
    }

    fn read_watts(&self) -> Result<f64, PowerError> {
        let stdout = run_tool(
            POWERMETRICS,
            "sudo",
            &["-n", POWERMETRICS, "-n", "1", "-i", "100", "--samplers", "gpu_power"],
        )?;
        parse_powermetrics(&stdout).ok_or(PowerError::NoReading(POWERMETRICS))
    }
}

/// One reading per line, in watts. Lines like `[N/A]` are ignored.
pub fn parse_nvidia_smi(stdout: &str) -> Option<f64> {
    let readings: Vec<f64> = stdout
        .lines()
        .filter_map(|line| line.trim().parse::<f64>().ok())
        .collect();

    if readings.is_empty() {
        debug!("nvidia-smi reported no numeric power values");
        return None;
    }
    Some(readings.iter().sum())
}

/// Sums the first wattage on every line that mentions power.
pub fn parse_rocm_smi(stdout: &str) -> Option<f64> {
    let total: f64 = stdout
        .lines()
        .filter_map(|line| ROCM_POWER.captures(line))
        .filter_map(|caps| caps[1].parse::<f64>().ok())
        .sum();

    (total > 0.0).then_some(total)
}

/// GPU power from powermetrics, converted from mW to W.
pub fn parse_powermetrics(stdout: &str) -> Option<f64> {
    POWERMETRICS_GPU
        .captures(stdout)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|mw| mw / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_slow_tool_is_killed_at_deadline() {
        let begin = Instant::now();
        let err = run_tool_with_deadline(NVIDIA_SMI, "sleep", &["30"], Duration::from_millis(200))
            .unwrap_err();

        assert!(matches!(err, PowerError::Timeout { tool: NVIDIA_SMI, .. }));
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_fast_tool_output_is_returned() {
        let out = run_tool_with_deadline(NVIDIA_SMI, "echo", &["87.5"], TOOL_TIMEOUT).unwrap();
        assert_eq!(parse_nvidia_smi(&out), Some(87.5));
    }

    #[test]
    fn test_missing_tool_is_not_found() {
        let err = run_tool("missing-tool", "aibench-no-such-binary", &[]).unwrap_err();
        assert!(matches!(err, PowerError::NotFound("missing-tool")));
    }

    #[test]
    fn test_nvidia_sums_gpus() {
        assert_eq!(parse_nvidia_smi("245.31\n118.69\n"), Some(364.0));
        assert_eq!(parse_nvidia_smi("  87.5  \n"), Some(87.5));
    }

    #[test]
    fn test_nvidia_ignores_unsupported() {
        assert_eq!(parse_nvidia_smi("[N/A]\n"), None);
        assert_eq!(parse_nvidia_smi("[N/A]\n50.0\n"), Some(50.0));
        assert_eq!(parse_nvidia_smi(""), None);
    }

    #[test]
    fn test_rocm_current_format() {
        let out = "\
============================ ROCm System Management Interface ============================
================================== Power Consumption ===================================
GPU[0]\t\t: Average Graphics Package Power (W): 35.0
GPU[1]\t\t: Average Graphics Package Power (W): 212.5
==========================================================================================
";
        assert_eq!(parse_rocm_smi(out), Some(247.5));
    }

    #[test]
    fn test_rocm_legacy_format() {
        let out = "GPU[0] : Average Graphics Package Power: 41.0W\n";
        assert_eq!(parse_rocm_smi(out), Some(41.0));
    }

    #[test]
    fn test_rocm_without_readings() {
        let out = "GPU[0]\t\t: Not supported\n";
        assert_eq!(parse_rocm_smi(out), None);
    }

    #[test]
    fn test_powermetrics_converts_milliwatts() {
        let out = "**** GPU usage ****\n\nGPU HW active frequency: 1398 MHz\nGPU Power: 5120 mW\n";
        assert_eq!(parse_powermetrics(out), Some(5.12));
        assert_eq!(parse_powermetrics("CPU Power: 900 mW\n"), None);
    }
}
