mod report;
mod system;

use std::io::{self, Write};
use std::path::PathBuf;

use aibench_benchmark::{detect_power, run_with_config, InferenceBackend, OllamaClient, RunEvent};
use aibench_core::BenchConfig;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aibench")]
#[command(about = "AI Benchmark - local inference hardware scoring", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ollama host URL (overrides OLLAMA_HOST)
    #[arg(long, global = true)]
    ollama_host: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark once
    Run {
        /// Model to benchmark
        #[arg(short, long)]
        model: Option<String>,

        /// Number of warmup requests
        #[arg(short, long)]
        warmup: Option<u32>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip power measurement
        #[arg(long)]
        no_power: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Save the run record as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show backend and power monitoring status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            model,
            warmup,
            timeout,
            no_power,
            format,
            output,
        } => {
            if let Some(model) = model {
                config.run.model = model;
            }
            if let Some(warmup) = warmup {
                config.run.warmup_runs = warmup;
            }
            if let Some(timeout) = timeout {
                config.run.request_timeout_secs = timeout;
            }
            if no_power {
                config.power.enabled = false;
            }
            config.validate()?;
            cmd_run(&config, format, output).await?
        }
        Commands::Status => cmd_status(&config).await?,
    }

    Ok(())
}

/// File, then environment, then flags.
fn load_config(args: &ConfigArgs) -> Result<BenchConfig> {
    let mut config = match &args.config {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BenchConfig::default(),
    };

    if let Ok(host) = std::env::var("OLLAMA_HOST") {
        config.ollama.host = normalize_host(&host);
    }
    if let Some(host) = &args.ollama_host {
        config.ollama.host = normalize_host(host);
    }

    Ok(config)
}

/// OLLAMA_HOST is often set as a bare `host:port`.
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, PartialEq, Eq)]
enum ProgressStream {
    Stdout,
    Stderr,
}

/// With JSON output stdout carries nothing but the record.
fn progress_stream(format: OutputFormat) -> ProgressStream {
    match format {
        OutputFormat::Table => ProgressStream::Stdout,
        OutputFormat::Json => ProgressStream::Stderr,
    }
}

/// Banner and progress lines for `run`.
struct Progress<'a> {
    out: Box<dyn Write + 'a>,
}

impl Progress<'static> {
    fn for_format(format: OutputFormat) -> Self {
        let out: Box<dyn Write> = match progress_stream(format) {
            ProgressStream::Stdout => Box::new(io::stdout()),
            ProgressStream::Stderr => Box::new(io::stderr()),
        };
        Self { out }
    }
}

impl Progress<'_> {
    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{}", text);
    }
}

async fn cmd_run(config: &BenchConfig, format: OutputFormat, output: Option<PathBuf>) -> Result<()> {
    let mut progress = Progress::for_format(format);
    progress.line("");
    progress.line("Running benchmark...");
    progress.line(&format!("  Model:  {}", config.run.model));
    progress.line(&format!("  Ollama: {}", config.ollama.host));
    progress.line("");

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<RunEvent>(32);

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current prompt");
            ctrl_c.cancel();
        }
    });

    let system = system::collect();
    let run_config = config.clone();
    let task = tokio::spawn(async move {
        run_with_config(&run_config, system, cancel, Some(tx)).await
    });

    while let Some(event) = rx.recv().await {
        if let Some(line) = event_line(&event) {
            progress.line(&line);
        }
    }

    let run = task.await.context("benchmark task failed")??;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run)?),
        OutputFormat::Table => {
            println!();
            report::print_table(&run);
        }
    }

    if let Some(path) = output {
        report::save_json(&run, &path)?;
        info!(path = %path.display(), "Saved run record");
        progress.line("");
        progress.line(&format!("  Saved to {}", path.display()));
    }
    progress.line("");

    Ok(())
}

fn event_line(event: &RunEvent) -> Option<String> {
    let line = match event {
        RunEvent::Warmup { current, total } => format!("  Warming up ({}/{})...", current, total),
        RunEvent::PowerStarted { available: true, method } => {
            format!("  Power monitoring: {}", method)
        }
        RunEvent::PowerStarted { method, .. } => {
            format!("  Power monitoring: unavailable ({})", method)
        }
        RunEvent::Prompt {
            current,
            total,
            category,
            ..
        } => format!("  [{}/{}] {}...", current, total, category),
        RunEvent::PromptComplete { result } => format!("        {:.1} tok/s", result.eval_tps),
        RunEvent::PromptFailed { error, .. } => format!("        failed: {}", error),
        RunEvent::PowerStopped { summary } => match (summary.available, summary.avg_watts) {
            (true, Some(avg)) => format!(
                "  Average power: {:.1} W over {} samples",
                avg, summary.sample_count
            ),
            _ => return None,
        },
    };
    Some(line)
}

async fn cmd_status(config: &BenchConfig) -> Result<()> {
    println!("System Status:");
    println!("{:-<40}", "");
    println!("  Ollama Host: {}", config.ollama.host);

    let client = OllamaClient::new(&config.ollama.host)?;
    match client.version().await {
        Ok(version) => {
            println!("  Ollama: connected (version {})", version);
            match client.has_model(&config.run.model).await {
                Ok(true) => println!("  Model {}: installed", config.run.model),
                Ok(false) => println!(
                    "  Model {}: not installed (ollama pull {})",
                    config.run.model, config.run.model
                ),
                Err(e) => println!("  Model {}: unknown ({})", config.run.model, e),
            }
        }
        Err(e) => println!("  Ollama: disconnected ({})", e),
    }

    let power = detect_power(&config.power).await;
    match power.is_available() {
        true => println!("  Power monitoring: {}", power.method()),
        false => println!("  Power monitoring: unavailable ({})", power.method()),
    }

    let system = system::collect();
    println!(
        "  System: {} {} ({} cores)",
        system.os.os_name, system.os.architecture, system.cpu.logical_cores
    );
    for gpu in &system.gpu {
        println!("  GPU: {}", gpu.name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aibench_core::PowerSummary;

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(normalize_host("https://gpu-box:11434"), "https://gpu-box:11434");
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "aibench", "run", "--model", "qwen2.5:7b", "--no-power", "-o", "out.json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                model,
                no_power,
                output,
                format,
                ..
            } => {
                assert_eq!(model.as_deref(), Some("qwen2.5:7b"));
                assert!(no_power);
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert_eq!(format, OutputFormat::Table);
            }
            Commands::Status => panic!("expected run"),
        }
    }

    #[test]
    fn test_json_format_keeps_progress_off_stdout() {
        let cli = Cli::try_parse_from(["aibench", "run", "--format", "json"]).unwrap();
        let Commands::Run { format, .. } = cli.command else {
            panic!("expected run");
        };

        assert_eq!(format, OutputFormat::Json);
        assert_eq!(progress_stream(format), ProgressStream::Stderr);
        assert_eq!(progress_stream(OutputFormat::Table), ProgressStream::Stdout);

        let mut buf = Vec::new();
        let mut progress = Progress {
            out: Box::new(&mut buf),
        };
        progress.line("  [1/5] Code Generation...");
        drop(progress);
        assert_eq!(String::from_utf8(buf).unwrap(), "  [1/5] Code Generation...\n");
    }

    #[test]
    fn test_event_lines() {
        let started = RunEvent::Prompt {
            current: 2,
            total: 5,
            prompt_id: "reasoning".into(),
            category: "Reasoning".into(),
        };
        assert_eq!(event_line(&started).as_deref(), Some("  [2/5] Reasoning..."));

        let no_power = RunEvent::PowerStopped {
            summary: PowerSummary::unavailable("disabled"),
        };
        assert_eq!(event_line(&no_power), None);
    }

    #[test]
    fn test_config_file_and_flag_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aibench.json");
        std::fs::write(&path, r#"{"ollama": {"host": "http://from-file:11434"}, "run": {"seed": 1}}"#)
            .unwrap();

        let args = ConfigArgs {
            config: Some(path),
            ollama_host: Some("flag-host:11434".into()),
        };
        let config = load_config(&args).unwrap();

        assert_eq!(config.ollama.host, "http://flag-host:11434");
        assert_eq!(config.run.seed, 1);
    }
}
