//! `ivan-replay`: the offline replay / autotune pipeline CLI.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ivan_locomotion::autotune::{
    AutotuneError, TuningAdjustment, autotune_apply, autotune_rollback, autotune_suggest,
    evaluate_route_guardrails,
};
use ivan_locomotion::replays::{
    compare_exported_summaries, list_replays, unix_now, verify_replay_determinism,
};
use ivan_locomotion::replays::telemetry::export_replay_telemetry;
use ivan_locomotion::tuning::PhysicsTuning;

#[derive(Parser)]
#[command(name = "ivan-replay", about = "Replay telemetry and route autotune tooling", version)]
struct Cli {
    /// Override the state directory (replays, exports, backups, tuning)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Suggest invariant-only tuning deltas from feedback text
    #[command(name = "autotune_suggest")]
    AutotuneSuggest {
        route_tag: String,
        feedback_text: String,
        out_dir: Option<PathBuf>,
    },
    /// Backup, then apply route-scoped autotune suggestions
    #[command(name = "autotune_apply")]
    AutotuneApply {
        route_tag: String,
        feedback_text: String,
        out_dir: Option<PathBuf>,
    },
    /// Evaluate the latest route run against guardrails
    #[command(name = "autotune_eval")]
    AutotuneEval {
        route_tag: String,
        out_dir: Option<PathBuf>,
    },
    /// Restore the latest tuning backup (or a referenced one)
    #[command(name = "autotune_rollback")]
    AutotuneRollback { backup_ref: Option<String> },
    /// Export a demo to per-tick CSV plus a summary JSON
    Export {
        /// Demo file; defaults to the newest recording
        replay: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        route_tag: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Compare two exported summaries
    Compare {
        latest_summary: PathBuf,
        reference_summary: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        route_tag: Option<String>,
    },
    /// Resimulate a demo N times and verify per-tick hash stability
    Verify {
        /// Demo file; defaults to the newest recording
        replay: Option<PathBuf>,
        #[arg(long, default_value_t = 5)]
        runs: u32,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

struct StateDirs {
    replays: PathBuf,
    exports: PathBuf,
    backups: PathBuf,
    tuning_file: PathBuf,
}

fn resolve_dirs(state_dir: Option<PathBuf>) -> StateDirs {
    let base = state_dir.unwrap_or_else(|| {
        directories::ProjectDirs::from("", "", "ivan")
            .map(|dirs| dirs.data_local_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".ivan"))
    });
    StateDirs {
        replays: base.join("replays"),
        exports: base.join("replays").join("telemetry_exports"),
        backups: base.join("tuning_backups"),
        tuning_file: base.join("tuning.json"),
    }
}

fn load_tuning(dirs: &StateDirs) -> PhysicsTuning {
    match fs::read_to_string(&dirs.tuning_file) {
        Ok(text) => serde_json::from_str::<PhysicsTuning>(&text)
            .map(PhysicsTuning::clamped)
            .unwrap_or_default(),
        Err(_) => PhysicsTuning::default(),
    }
}

fn save_tuning(dirs: &StateDirs, tuning: &PhysicsTuning) -> Result<()> {
    if let Some(parent) = dirs.tuning_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut text = serde_json::to_string_pretty(tuning)?;
    text.push('\n');
    fs::write(&dirs.tuning_file, text)
        .with_context(|| format!("writing {}", dirs.tuning_file.display()))
}

fn latest_replay(dirs: &StateDirs) -> Result<PathBuf> {
    list_replays(&dirs.replays)
        .into_iter()
        .next()
        .with_context(|| format!("no replay files found in {}", dirs.replays.display()))
}

fn print_adjustment(adj: &TuningAdjustment) {
    println!("{}: {:.4} -> {:.4} | {}", adj.field, adj.before, adj.after, adj.reason);
}

fn run(cli: Cli) -> Result<()> {
    let dirs = resolve_dirs(cli.state_dir);
    match cli.command {
        Command::AutotuneSuggest {
            route_tag,
            feedback_text,
            out_dir,
        } => {
            let exports = out_dir.unwrap_or(dirs.exports.clone());
            let tuning = load_tuning(&dirs);
            let (context, adjustments) =
                autotune_suggest(&exports, &route_tag, &feedback_text, &tuning, unix_now())?;
            println!("route: {}", context.route_tag);
            println!("context: {}", context.note);
            println!("suggested: {} invariant change(s)", adjustments.len());
            if let Some(path) = &context.latest_summary_path {
                println!("latest_summary: {}", path.display());
            }
            if let Some(path) = &context.comparison_path {
                println!("comparison: {}", path.display());
            }
            if let Some(path) = &context.history_path {
                println!("history: {}", path.display());
            }
            for adj in &adjustments {
                print_adjustment(adj);
            }
        }
        Command::AutotuneApply {
            route_tag,
            feedback_text,
            out_dir,
        } => {
            let exports = out_dir.unwrap_or(dirs.exports.clone());
            let mut tuning = load_tuning(&dirs);
            let mut changed = Vec::new();
            let (context, adjustments, backup) = autotune_apply(
                &exports,
                &dirs.backups,
                &route_tag,
                &feedback_text,
                &mut tuning,
                unix_now(),
                |field| changed.push(field.to_owned()),
            )?;
            if !adjustments.is_empty() {
                save_tuning(&dirs, &tuning)?;
            }
            println!("route: {}", context.route_tag);
            println!("context: {}", context.note);
            println!("applied: {} invariant change(s)", adjustments.len());
            match backup {
                Some(path) => println!("backup: {}", path.display()),
                None => println!("backup: skipped (no changes)"),
            }
            for adj in &adjustments {
                print_adjustment(adj);
            }
        }
        Command::AutotuneEval { route_tag, out_dir } => {
            let exports = out_dir.unwrap_or(dirs.exports.clone());
            let result = evaluate_route_guardrails(&exports, &route_tag, unix_now())?;
            println!("route: {}", result.route_tag);
            println!("guardrails: {}", if result.passed { "pass" } else { "fail" });
            println!("score: {:+.4}", result.score);
            println!(
                "result: +{} / -{} / ={}",
                result.improved_count, result.regressed_count, result.equal_count
            );
            println!("comparison: {}", result.comparison_path.display());
            if let Some(path) = &result.history_path {
                println!("history: {}", path.display());
            }
            for check in &result.checks {
                let state = if check.passed { "ok" } else { "fail" };
                println!("{state}: {} ({})", check.name, check.detail);
            }
        }
        Command::AutotuneRollback { backup_ref } => {
            let mut tuning = load_tuning(&dirs);
            let restored = autotune_rollback(
                &dirs.backups,
                backup_ref.as_deref(),
                &mut tuning,
                |_field| {},
            )?;
            save_tuning(&dirs, &tuning)?;
            println!("restored: {}", restored.display());
        }
        Command::Export {
            replay,
            out_dir,
            route_tag,
            comment,
        } => {
            let replay = match replay {
                Some(path) => path,
                None => latest_replay(&dirs)?,
            };
            let exports = out_dir.unwrap_or(dirs.exports.clone());
            let result = export_replay_telemetry(
                &replay,
                &exports,
                route_tag.as_deref(),
                comment.as_deref(),
                unix_now(),
            )?;
            println!("demo: {}", result.source_demo.display());
            println!("csv: {}", result.csv_path.display());
            println!("summary: {}", result.summary_path.display());
            println!(
                "ticks: {} ({} with telemetry)",
                result.tick_count, result.telemetry_tick_count
            );
        }
        Command::Compare {
            latest_summary,
            reference_summary,
            out,
            route_tag,
        } => {
            let out = out.unwrap_or_else(|| dirs.exports.join("comparison.json"));
            let (path, counts) = compare_exported_summaries(
                &latest_summary,
                &reference_summary,
                &out,
                route_tag.as_deref(),
                unix_now(),
            )?;
            println!("comparison: {}", path.display());
            println!(
                "result: +{} / -{} / ={}",
                counts.improved, counts.regressed, counts.equal
            );
        }
        Command::Verify {
            replay,
            runs,
            out_dir,
        } => {
            let replay = match replay {
                Some(path) => path,
                None => latest_replay(&dirs)?,
            };
            let exports = out_dir.unwrap_or(dirs.exports.clone());
            let report = verify_replay_determinism(&replay, runs, &exports, unix_now())?;
            println!("demo: {}", report.source_demo.display());
            println!("report: {}", report.report_path.display());
            println!("runs: {} over {} ticks", report.runs, report.tick_count);
            println!("stable: {}", report.stable);
            println!("baseline_trace_hash: {}", report.baseline_trace_hash);
            println!("divergence_runs: {}", report.divergence_runs);
            println!(
                "recorded hashes: {} checked, {} mismatched",
                report.recorded_hash_checked, report.recorded_hash_mismatches
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            match err.downcast_ref::<AutotuneError>() {
                // Invalid or unusable route input is the documented exit 2;
                // everything else is a plain failure.
                Some(
                    AutotuneError::InvalidRouteTag(_)
                    | AutotuneError::RouteContextMissing { .. }
                    | AutotuneError::ReferenceMissing { .. },
                ) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
