//! Host identification attached to every submitted run.

use std::process::Command;

use aibench_core::{CpuInfo, GpuInfo, OsInfo, RamInfo, SystemInfo};
use tracing::debug;
use uuid::Uuid;

pub fn collect() -> SystemInfo {
    let os = OsInfo {
        os_name: os_name(),
        os_family: std::env::consts::FAMILY.to_string(),
        architecture: std::env::consts::ARCH.to_string(),
    };
    let cpu = CpuInfo {
        cpu_name: cpu_name(),
        logical_cores: std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    };

    SystemInfo {
        machine_uuid: machine_uuid(&hostname(), &os, &cpu).to_string(),
        os,
        cpu,
        ram: RamInfo {
            total_gb: total_ram_gb(),
        },
        gpu: nvidia_gpus(),
    }
}

/// Stable per-host identifier; the same machine always maps to the same id.
fn machine_uuid(hostname: &str, os: &OsInfo, cpu: &CpuInfo) -> Uuid {
    let key = format!(
        "{}|{}|{}|{}",
        hostname,
        os.os_name,
        os.architecture,
        cpu.cpu_name.as_deref().unwrap_or("unknown")
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn os_name() -> String {
    let pretty = std::fs::read_to_string("/etc/os-release")
        .ok()
        .and_then(|s| parse_os_release(&s));
    pretty.unwrap_or_else(|| std::env::consts::OS.to_string())
}

fn parse_os_release(contents: &str) -> Option<String> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim_matches('"').to_string())
}

fn cpu_name() -> Option<String> {
    if let Ok(info) = std::fs::read_to_string("/proc/cpuinfo") {
        return parse_cpuinfo(&info);
    }
    command_stdout("sysctl", &["-n", "machdep.cpu.brand_string"])
}

fn parse_cpuinfo(contents: &str) -> Option<String> {
    contents
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, name)| name.trim().to_string())
}

fn total_ram_gb() -> Option<f64> {
    if let Ok(info) = std::fs::read_to_string("/proc/meminfo") {
        return parse_meminfo_gb(&info);
    }
    command_stdout("sysctl", &["-n", "hw.memsize"])
        .and_then(|s| s.parse::<u64>().ok())
        .map(|bytes| round1(bytes as f64 / 1024f64.powi(3)))
}

fn parse_meminfo_gb(contents: &str) -> Option<f64> {
    let kb = contents
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))?
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse::<u64>()
        .ok()?;
    Some(round1(kb as f64 / 1024f64.powi(2)))
}

fn nvidia_gpus() -> Vec<GpuInfo> {
    command_stdout(
        "nvidia-smi",
        &["--query-gpu=name,memory.total", "--format=csv,noheader,nounits"],
    )
    .map(|out| parse_nvidia_gpus(&out))
    .unwrap_or_default()
}

fn parse_nvidia_gpus(stdout: &str) -> Vec<GpuInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let (name, vram) = line.split_once(',')?;
            Some(GpuInfo {
                vendor: "NVIDIA".to_string(),
                name: name.trim().to_string(),
                vram_mb: vram.trim().parse().ok(),
            })
        })
        .collect()
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        debug!(program, status = %output.status, "System query failed");
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!stdout.is_empty()).then_some(stdout)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
