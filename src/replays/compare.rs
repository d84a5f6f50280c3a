use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use super::ReplayError;

/// Metric key paths and their preferred direction. Order is the frozen
/// report order.
pub const METRIC_PREFS: &[(&str, MetricDirection)] = &[
    ("metrics.jump_takeoff.success_rate", MetricDirection::Higher),
    ("metrics.horizontal_speed_avg", MetricDirection::Higher),
    ("metrics.landing_speed_loss_avg", MetricDirection::Lower),
    ("metrics.ground_flicker_per_min", MetricDirection::Lower),
    ("metrics.camera_lin_jerk_avg", MetricDirection::Lower),
    ("metrics.camera_ang_jerk_avg", MetricDirection::Lower),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricDirection {
    Higher,
    Lower,
}

impl MetricDirection {
    fn as_str(self) -> &'static str {
        match self {
            MetricDirection::Higher => "higher_is_better",
            MetricDirection::Lower => "lower_is_better",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonCounts {
    pub improved: u32,
    pub regressed: u32,
    pub equal: u32,
}

/// Numeric lookup by dotted key path; absent paths read as 0.
pub fn metric_at_path(payload: &Value, key_path: &str) -> f64 {
    let mut cur = payload;
    for part in key_path.split('.') {
        match cur.get(part) {
            Some(next) => cur = next,
            None => return 0.0,
        }
    }
    cur.as_f64().unwrap_or(0.0)
}

/// Per-metric comparison rows plus aggregate counts.
pub fn metric_rows(latest: &Value, reference: &Value) -> (Value, ComparisonCounts) {
    let mut rows = serde_json::Map::new();
    let mut counts = ComparisonCounts {
        improved: 0,
        regressed: 0,
        equal: 0,
    };
    for (key, pref) in METRIC_PREFS {
        let lv = metric_at_path(latest, key);
        let rv = metric_at_path(reference, key);
        let delta = lv - rv;
        let better = if delta.abs() < 1e-9 {
            counts.equal += 1;
            "equal"
        } else {
            let latest_better = match pref {
                MetricDirection::Higher => lv > rv,
                MetricDirection::Lower => lv < rv,
            };
            if latest_better {
                counts.improved += 1;
                "latest"
            } else {
                counts.regressed += 1;
                "reference"
            }
        };
        rows.insert(
            (*key).to_owned(),
            json!({
                "latest": lv,
                "reference": rv,
                "delta": delta,
                "preferred_direction": pref.as_str(),
                "better": better,
            }),
        );
    }
    (Value::Object(rows), counts)
}

/// Numeric tuning fields that differ between the two summaries.
fn numeric_tuning_delta(latest: &Value, reference: &Value) -> Value {
    let mut out = serde_json::Map::new();
    let (Some(lk), Some(rk)) = (
        latest.pointer("/demo/tuning").and_then(Value::as_object),
        reference.pointer("/demo/tuning").and_then(Value::as_object),
    ) else {
        return Value::Object(out);
    };
    let mut keys: Vec<&String> = lk.keys().chain(rk.keys()).collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        let (Some(lv), Some(rv)) = (
            lk.get(key).and_then(Value::as_f64),
            rk.get(key).and_then(Value::as_f64),
        ) else {
            continue;
        };
        if (lv - rv).abs() > 1e-9 {
            out.insert(
                key.clone(),
                json!({"latest": lv, "reference": rv, "delta": lv - rv}),
            );
        }
    }
    Value::Object(out)
}

/// Compares two exported summaries and writes the comparison JSON.
pub fn compare_exported_summaries(
    latest_summary: &Path,
    reference_summary: &Path,
    out_path: &Path,
    route_tag: Option<&str>,
    now_unix: f64,
) -> Result<(PathBuf, ComparisonCounts), ReplayError> {
    let latest: Value = serde_json::from_str(&fs::read_to_string(latest_summary)?)?;
    let reference: Value = serde_json::from_str(&fs::read_to_string(reference_summary)?)?;
    let (rows, counts) = metric_rows(&latest, &reference);

    let payload = json!({
        "format_version": 1,
        "created_at_unix": now_unix,
        "route_tag": route_tag,
        "latest_summary": latest_summary.display().to_string(),
        "reference_summary": reference_summary.display().to_string(),
        "latest_demo": latest.get("demo"),
        "reference_demo": reference.get("demo"),
        "metrics": rows,
        "tuning_delta": numeric_tuning_delta(&latest, &reference),
        "result": {
            "improved_count": counts.improved,
            "regressed_count": counts.regressed,
            "equal_count": counts.equal,
        },
    });
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(out_path, format!("{}\n", serde_json::to_string_pretty(&payload)?))?;
    Ok((out_path.to_path_buf(), counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(speed: f64, loss: f64) -> Value {
        json!({
            "demo": {"tuning": {"max_ground_speed": speed}},
            "metrics": {
                "jump_takeoff": {"success_rate": 0.9},
                "horizontal_speed_avg": speed,
                "landing_speed_loss_avg": loss,
                "ground_flicker_per_min": 10.0,
                "camera_lin_jerk_avg": 80.0,
                "camera_ang_jerk_avg": 500.0,
            },
        })
    }

    #[test]
    fn directions_decide_who_is_better() {
        let latest = summary(7.0, 0.5);
        let reference = summary(6.0, 0.8);
        let (rows, counts) = metric_rows(&latest, &reference);
        assert_eq!(rows["metrics.horizontal_speed_avg"]["better"], "latest");
        assert_eq!(rows["metrics.landing_speed_loss_avg"]["better"], "latest");
        assert_eq!(counts.improved, 2);
        assert_eq!(counts.regressed, 0);
        assert_eq!(counts.equal, 4);
    }

    #[test]
    fn tuning_delta_lists_only_changed_fields() {
        let latest = summary(7.0, 0.5);
        let reference = summary(6.0, 0.5);
        let delta = numeric_tuning_delta(&latest, &reference);
        assert!((delta["max_ground_speed"]["delta"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(delta.as_object().unwrap().len(), 1);
    }

    #[test]
    fn comparison_file_carries_counts() {
        let dir = tempfile::tempdir().unwrap();
        let latest_path = dir.path().join("latest.summary.json");
        let reference_path = dir.path().join("ref.summary.json");
        std::fs::write(&latest_path, summary(7.0, 0.5).to_string()).unwrap();
        std::fs::write(&reference_path, summary(6.0, 0.8).to_string()).unwrap();
        let out = dir.path().join("cmp.json");
        let (path, counts) =
            compare_exported_summaries(&latest_path, &reference_path, &out, Some("A"), 50.0)
                .unwrap();
        assert_eq!(path, out);
        assert_eq!(counts.improved, 2);
        let loaded: Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(loaded["route_tag"], "A");
        assert_eq!(loaded["result"]["improved_count"], 2);
    }
}
