//! Route-scoped autotune: turn feedback text plus telemetry history into
//! invariant-only tuning adjustments, guarded by backups.

mod guardrails;
mod suggest;

pub use guardrails::{AutotuneEvaluation, GuardrailCheck, evaluate_route_guardrails};
pub use suggest::{TuningAdjustment, suggest_invariant_adjustments};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use thiserror::Error;

use crate::replays::compare::{compare_exported_summaries, metric_at_path};
use crate::tuning::backups::{BackupError, create_tuning_backup, load_tuning_backup};
use crate::tuning::{NUMERIC_FIELDS, PhysicsTuning, TuningValue};

/// Curated traversal routes that may be compared over time.
pub const ROUTE_TAGS: &[&str] = &["A", "B", "C"];

/// Ranked metrics recorded into the per-route history payload.
const HISTORY_METRICS: &[(&str, bool)] = &[
    ("metrics.horizontal_speed_avg", true),
    ("metrics.jump_takeoff.success_rate", true),
    ("metrics.landing_speed_loss_avg", false),
    ("metrics.ground_flicker_per_min", false),
];

/// Minimum summaries before history ranking kicks in.
const HISTORY_MIN_ENTRIES: usize = 3;

#[derive(Debug, Error)]
pub enum AutotuneError {
    #[error("invalid route tag '{0}' (expected one of A, B, C)")]
    InvalidRouteTag(String),
    #[error("no telemetry summary found for route {route_tag}")]
    RouteContextMissing { route_tag: String },
    #[error("route {route_tag} has no reference summary to compare against")]
    ReferenceMissing { route_tag: String },
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Everything known about a route at suggestion time.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub route_tag: String,
    pub note: String,
    pub latest_summary: Option<Value>,
    pub latest_summary_path: Option<PathBuf>,
    pub comparison_path: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
    pub history_payload: Option<Value>,
}

pub fn normalize_route_tag(route_tag: &str) -> Result<String, AutotuneError> {
    let tag = route_tag.trim().to_uppercase();
    if ROUTE_TAGS.contains(&tag.as_str()) {
        Ok(tag)
    } else {
        Err(AutotuneError::InvalidRouteTag(route_tag.to_owned()))
    }
}

/// Summaries tagged for this route, oldest first by export stamp.
fn route_summaries(out_dir: &Path, route_tag: &str) -> Vec<(PathBuf, Value, f64)> {
    let Ok(entries) = fs::read_dir(out_dir) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".summary.json") {
            continue;
        }
        let Ok(text) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let tag = value
            .pointer("/export_metadata/route_tag")
            .and_then(Value::as_str)
            .map(|t| t.trim().to_uppercase());
        if tag.as_deref() != Some(route_tag) {
            continue;
        }
        let exported_at = value
            .pointer("/export_metadata/exported_at_unix")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        out.push((path, value, exported_at));
    }
    out.sort_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Rank of the latest run per history metric: 1 is best among all entries.
fn history_ranks(summaries: &[(PathBuf, Value, f64)]) -> Value {
    let mut metrics = serde_json::Map::new();
    let latest = &summaries[summaries.len() - 1].1;
    for (key, higher_is_better) in HISTORY_METRICS {
        let latest_v = metric_at_path(latest, key);
        let prior: Vec<f64> = summaries[..summaries.len() - 1]
            .iter()
            .map(|(_, v, _)| metric_at_path(v, key))
            .collect();
        let beaten_by = prior
            .iter()
            .filter(|p| {
                if *higher_is_better {
                    **p > latest_v
                } else {
                    **p < latest_v
                }
            })
            .count();
        let short = key.rsplit_once('.').map(|(_, s)| s).unwrap_or(key);
        metrics.insert(
            short.to_owned(),
            json!({
                "rank": beaten_by + 1,
                "prior_count": prior.len(),
                "latest": latest_v,
            }),
        );
    }
    json!({ "metrics": Value::Object(metrics) })
}

/// Loads the route's latest summary, runs the latest-vs-previous comparison
/// when possible, and refreshes the rank history payload.
pub fn load_route_context(out_dir: &Path, route_tag: &str, now_unix: f64) -> Result<RouteContext, AutotuneError> {
    let route_tag = normalize_route_tag(route_tag)?;
    let summaries = route_summaries(out_dir, &route_tag);
    if summaries.is_empty() {
        return Err(AutotuneError::RouteContextMissing { route_tag });
    }

    let Some((latest_path, latest_value, _)) = summaries.last().cloned() else {
        return Err(AutotuneError::RouteContextMissing { route_tag });
    };
    let latest_path = latest_path.canonicalize().unwrap_or(latest_path);

    let mut comparison_path = None;
    let mut note;
    if summaries.len() >= 2 {
        let reference_path = &summaries[summaries.len() - 2].0;
        let out_path = out_dir.join(format!("route-{route_tag}.compare.json"));
        match compare_exported_summaries(
            &latest_path,
            reference_path,
            &out_path,
            Some(&route_tag),
            now_unix,
        ) {
            Ok((path, counts)) => {
                note = format!(
                    "route compare ready (+{}/-{}/={})",
                    counts.improved, counts.regressed, counts.equal
                );
                comparison_path = Some(path);
            }
            Err(err) => {
                tracing::warn!(route = %route_tag, error = %err, "route comparison failed");
                note = "compare failed; using latest route summary only".to_owned();
            }
        }
    } else {
        note = "no reference run; using latest route summary only".to_owned();
    }

    let mut history_path = None;
    let mut history_payload = None;
    if summaries.len() >= HISTORY_MIN_ENTRIES {
        let payload = json!({
            "format_version": 1,
            "route_tag": route_tag,
            "created_at_unix": now_unix,
            "entry_count": summaries.len(),
            "metrics": history_ranks(&summaries),
        });
        let path = out_dir.join(format!("route-{route_tag}.history.json"));
        fs::write(&path, format!("{}\n", serde_json::to_string_pretty(&payload)?))?;
        note.push_str(&format!("; history over {} runs", summaries.len()));
        history_path = Some(path);
        history_payload = Some(payload);
    }

    Ok(RouteContext {
        route_tag,
        note,
        latest_summary: Some(latest_value),
        latest_summary_path: Some(latest_path),
        comparison_path,
        history_path,
        history_payload,
    })
}

/// Suggests adjustments for a route from feedback text plus its context.
pub fn autotune_suggest(
    out_dir: &Path,
    route_tag: &str,
    feedback_text: &str,
    tuning: &PhysicsTuning,
    now_unix: f64,
) -> Result<(RouteContext, Vec<TuningAdjustment>), AutotuneError> {
    let context = load_route_context(out_dir, route_tag, now_unix)?;
    let adjustments = suggest_invariant_adjustments(
        feedback_text,
        tuning,
        context.latest_summary.as_ref(),
        context.history_payload.as_ref(),
    );
    Ok((context, adjustments))
}

/// Suggest, then backup-and-apply: a backup lands on disk before the first
/// field write, and the change callback fires once per written field.
#[allow(clippy::type_complexity)]
pub fn autotune_apply(
    out_dir: &Path,
    backups_dir: &Path,
    route_tag: &str,
    feedback_text: &str,
    tuning: &mut PhysicsTuning,
    now_unix: f64,
    mut on_tuning_change: impl FnMut(&str),
) -> Result<(RouteContext, Vec<TuningAdjustment>, Option<PathBuf>), AutotuneError> {
    let (context, adjustments) = autotune_suggest(out_dir, route_tag, feedback_text, tuning, now_unix)?;
    if adjustments.is_empty() {
        return Ok((context, adjustments, None));
    }

    let backup_path = create_tuning_backup(
        tuning,
        &format!("route-{}", context.route_tag),
        "pre-autotune-apply",
        backups_dir,
        now_unix,
    )?;

    for adj in &adjustments {
        tuning.set(&adj.field, TuningValue::Number(adj.after));
        on_tuning_change(&adj.field);
    }
    tracing::info!(
        route = %context.route_tag,
        changes = adjustments.len(),
        backup = %backup_path.display(),
        "applied autotune adjustments"
    );
    Ok((context, adjustments, Some(backup_path)))
}

/// Restores a backup (latest when `backup_ref` is empty) onto the live
/// tuning and re-fires the change callback for every invariant field.
pub fn autotune_rollback(
    backups_dir: &Path,
    backup_ref: Option<&str>,
    tuning: &mut PhysicsTuning,
    mut on_tuning_change: impl FnMut(&str),
) -> Result<PathBuf, AutotuneError> {
    let (payload, path) = load_tuning_backup(backups_dir, backup_ref)?;
    *tuning = payload.tuning.clamped();
    for (field, _, _) in NUMERIC_FIELDS {
        on_tuning_change(field);
    }
    for field in crate::tuning::FLAG_FIELDS {
        on_tuning_change(field);
    }
    tracing::info!(backup = %path.display(), "rolled back tuning");
    Ok(path)
}
