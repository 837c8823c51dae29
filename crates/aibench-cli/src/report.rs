use std::path::Path;

use aibench_core::{BenchmarkRun, PromptOutcome};
use anyhow::{Context, Result};

pub fn save_json(run: &BenchmarkRun, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(run)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn print_table(run: &BenchmarkRun) {
    let scores = run.scores();
    let power = run.power();

    println!("Results:");
    println!("{:-<60}", "");
    println!("  Model:            {}", run.model());
    println!("  Ollama:           {}", run.backend_version());
    println!("  Run ID:           {}", run.run_id());
    println!("  Duration:         {:.2} s", run.duration_s());
    println!();
    println!("  {:<24} {:>10} {:>10} {:>10}", "Prompt", "PP tok/s", "TG tok/s", "TTFT ms");
    for outcome in run.results() {
        match outcome {
            PromptOutcome::Completed(r) => println!(
                "  {:<24} {:>10.2} {:>10.2} {:>10.2}",
                r.category, r.prompt_eval_tps, r.eval_tps, r.ttft
            ),
            PromptOutcome::Failed(f) => println!("  {:<24} failed: {}", f.category, f.error),
        }
    }
    println!();
    println!("  Prompt eval avg:  {:.2} tok/s", scores.avg_prompt_eval_tps);
    println!("  Generation avg:   {:.2} tok/s", scores.avg_eval_tps);
    println!("  TTFT avg:         {:.2} ms", scores.avg_ttft_ms);
    println!("  Tokens generated: {}", scores.total_tokens_generated);

    match power.avg_watts {
        Some(avg) if power.available => println!(
            "  Power:            {:.2} W avg, {:.2} W max ({})",
            avg,
            power.max_watts.unwrap_or(avg),
            power.method
        ),
        _ => println!("  Power:            unavailable ({})", power.method),
    }

    println!();
    println!("  Performance score: {:.2}", scores.performance_score);
    match scores.efficiency_score {
        Some(e) => println!("  Efficiency score:  {:.4}", e),
        None => println!("  Efficiency score:  n/a"),
    }
    if run.failed_count() > 0 {
        println!(
            "  ({} of {} prompts failed)",
            run.failed_count(),
            run.results().len()
        );
    }
}
