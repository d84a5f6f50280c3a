use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{AutotuneError, RouteContext, load_route_context};
use crate::replays::compare::{METRIC_PREFS, MetricDirection, metric_at_path};

/// Allowed jump-success regression before the guardrail trips.
const JUMP_SUCCESS_EPSILON: f64 = 0.03;
/// Allowed ground-flicker growth (per minute).
const FLICKER_ALLOWANCE: f64 = 2.0;
/// Allowed landing-speed-loss growth (units/s).
const LANDING_LOSS_ALLOWANCE: f64 = 0.15;
/// Allowed relative camera-jerk growth.
const JERK_GROWTH_FRAC: f64 = 0.15;

#[derive(Debug, Clone)]
pub struct GuardrailCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct AutotuneEvaluation {
    pub route_tag: String,
    pub passed: bool,
    pub score: f64,
    pub improved_count: u32,
    pub regressed_count: u32,
    pub equal_count: u32,
    pub comparison_path: PathBuf,
    pub history_path: Option<PathBuf>,
    pub checks: Vec<GuardrailCheck>,
}

fn check(
    name: &'static str,
    passed: bool,
    latest: f64,
    reference: f64,
) -> GuardrailCheck {
    GuardrailCheck {
        name,
        passed,
        detail: format!("latest {latest:.4} vs reference {reference:.4}"),
    }
}

fn run_checks(latest: &Value, reference: &Value) -> Vec<GuardrailCheck> {
    let l = |key: &str| metric_at_path(latest, key);
    let r = |key: &str| metric_at_path(reference, key);

    let jump_l = l("metrics.jump_takeoff.success_rate");
    let jump_r = r("metrics.jump_takeoff.success_rate");
    let flick_l = l("metrics.ground_flicker_per_min");
    let flick_r = r("metrics.ground_flicker_per_min");
    let loss_l = l("metrics.landing_speed_loss_avg");
    let loss_r = r("metrics.landing_speed_loss_avg");
    let lin_l = l("metrics.camera_lin_jerk_avg");
    let lin_r = r("metrics.camera_lin_jerk_avg");
    let ang_l = l("metrics.camera_ang_jerk_avg");
    let ang_r = r("metrics.camera_ang_jerk_avg");

    vec![
        check(
            "jump_success_not_regressed",
            jump_l >= jump_r - JUMP_SUCCESS_EPSILON,
            jump_l,
            jump_r,
        ),
        check(
            "ground_flicker_controlled",
            flick_l <= flick_r + FLICKER_ALLOWANCE,
            flick_l,
            flick_r,
        ),
        check(
            "landing_loss_not_regressed",
            loss_l <= loss_r + LANDING_LOSS_ALLOWANCE,
            loss_l,
            loss_r,
        ),
        check(
            "camera_lin_jerk_not_regressed",
            lin_l <= lin_r * (1.0 + JERK_GROWTH_FRAC) + 1.0,
            lin_l,
            lin_r,
        ),
        check(
            "camera_ang_jerk_not_regressed",
            ang_l <= ang_r * (1.0 + JERK_GROWTH_FRAC) + 1.0,
            ang_l,
            ang_r,
        ),
    ]
}

/// Signed, direction-aware score: positive when the latest run wins on
/// balance, normalized per metric so no single unit dominates.
fn score(latest: &Value, reference: &Value) -> f64 {
    let mut total = 0.0;
    let mut samples = 0u32;
    for (key, pref) in METRIC_PREFS {
        let lv = metric_at_path(latest, key);
        let rv = metric_at_path(reference, key);
        let scale = rv.abs().max(1e-6);
        let mut delta = (lv - rv) / scale;
        if matches!(pref, MetricDirection::Lower) {
            delta = -delta;
        }
        total += delta.clamp(-1.0, 1.0);
        samples += 1;
    }
    if samples == 0 { 0.0 } else { total / samples as f64 }
}

/// Evaluates the route's latest run against its reference: fixed check set
/// plus a weighted score, derived from the same comparison the suggester
/// uses.
pub fn evaluate_route_guardrails(
    out_dir: &Path,
    route_tag: &str,
    now_unix: f64,
) -> Result<AutotuneEvaluation, AutotuneError> {
    let context: RouteContext = load_route_context(out_dir, route_tag, now_unix)?;
    let comparison_path = context
        .comparison_path
        .clone()
        .ok_or_else(|| AutotuneError::ReferenceMissing {
            route_tag: context.route_tag.clone(),
        })?;

    let comparison: Value =
        serde_json::from_str(&std::fs::read_to_string(&comparison_path)?)?;
    let latest_path = comparison
        .get("latest_summary")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| AutotuneError::ReferenceMissing {
            route_tag: context.route_tag.clone(),
        })?;
    let reference_path = comparison
        .get("reference_summary")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| AutotuneError::ReferenceMissing {
            route_tag: context.route_tag.clone(),
        })?;
    let latest: Value = serde_json::from_str(&std::fs::read_to_string(&latest_path)?)?;
    let reference: Value = serde_json::from_str(&std::fs::read_to_string(&reference_path)?)?;

    let checks = run_checks(&latest, &reference);
    let passed = checks.iter().all(|c| c.passed);
    let improved = comparison
        .pointer("/result/improved_count")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let regressed = comparison
        .pointer("/result/regressed_count")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let equal = comparison
        .pointer("/result/equal_count")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;

    Ok(AutotuneEvaluation {
        route_tag: context.route_tag,
        passed,
        score: score(&latest, &reference),
        improved_count: improved,
        regressed_count: regressed,
        equal_count: equal,
        comparison_path,
        history_path: context.history_path,
        checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary(jump: f64, speed: f64, loss: f64, flick: f64, lin: f64, ang: f64) -> Value {
        json!({
            "metrics": {
                "jump_takeoff": {"success_rate": jump},
                "horizontal_speed_avg": speed,
                "landing_speed_loss_avg": loss,
                "ground_flicker_per_min": flick,
                "camera_lin_jerk_avg": lin,
                "camera_ang_jerk_avg": ang,
            }
        })
    }

    #[test]
    fn all_checks_pass_when_latest_improves_everywhere() {
        let latest = summary(0.88, 145.0, 0.62, 9.0, 85.0, 520.0);
        let reference = summary(0.82, 132.0, 0.84, 11.0, 93.0, 590.0);
        let checks = run_checks(&latest, &reference);
        assert_eq!(checks.len(), 5);
        assert!(checks.iter().all(|c| c.passed));
        assert!(score(&latest, &reference) > 0.0);
    }

    #[test]
    fn jump_success_regression_fails_its_check() {
        let latest = summary(0.60, 140.0, 0.6, 9.0, 85.0, 520.0);
        let reference = summary(0.85, 132.0, 0.6, 9.0, 85.0, 520.0);
        let checks = run_checks(&latest, &reference);
        let jump = checks
            .iter()
            .find(|c| c.name == "jump_success_not_regressed")
            .unwrap();
        assert!(!jump.passed);
    }
}
