//! Route autotune pipeline: context loading, suggest, backup-then-apply,
//! guardrails, rollback.

use std::path::Path;

use ivan_locomotion::autotune::{
    AutotuneError, autotune_apply, autotune_rollback, autotune_suggest, evaluate_route_guardrails,
    load_route_context,
};
use ivan_locomotion::tuning::PhysicsTuning;
use ivan_locomotion::tuning::backups::list_tuning_backups;
use serde_json::json;

fn write_summary(dir: &Path, name: &str, route_tag: &str, exported_at: f64, speed_avg: f64) {
    let payload = json!({
        "format_version": 1,
        "demo": {"tuning": {"max_ground_speed": 6.0}},
        "export_metadata": {"route_tag": route_tag, "exported_at_unix": exported_at},
        "metrics": {
            "jump_takeoff": {"success_rate": 0.85, "attempts": 10},
            "horizontal_speed_avg": speed_avg,
            "landing_speed_loss_avg": 0.7,
            "ground_flicker_per_min": 10.0,
            "camera_lin_jerk_avg": 90.0,
            "camera_ang_jerk_avg": 550.0,
        },
    });
    std::fs::write(
        dir.join(format!("{name}.summary.json")),
        format!("{}\n", serde_json::to_string_pretty(&payload).unwrap()),
    )
    .unwrap();
}

#[test]
fn route_context_prefers_latest_summary_and_normalizes_tag() {
    let dir = tempfile::tempdir().unwrap();
    write_summary(dir.path(), "a_old", "A", 1.0, 6.5);
    write_summary(dir.path(), "a_new", "A", 2.0, 6.8);
    write_summary(dir.path(), "b_only", "B", 3.0, 5.0);

    let context = load_route_context(dir.path(), "a", 100.0).unwrap();
    assert_eq!(context.route_tag, "A");
    let latest = context.latest_summary_path.unwrap();
    assert!(latest.to_string_lossy().contains("a_new"));
    assert!(context.comparison_path.is_some());
    assert!(context.history_path.is_none());
}

#[test]
fn missing_route_is_an_error_and_bad_tag_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    match load_route_context(dir.path(), "A", 100.0) {
        Err(AutotuneError::RouteContextMissing { route_tag }) => assert_eq!(route_tag, "A"),
        other => panic!("expected RouteContextMissing, got {other:?}"),
    }
    match load_route_context(dir.path(), "zz", 100.0) {
        Err(AutotuneError::InvalidRouteTag(tag)) => assert_eq!(tag, "zz"),
        other => panic!("expected InvalidRouteTag, got {other:?}"),
    }
}

#[test]
fn single_summary_context_notes_missing_reference() {
    let dir = tempfile::tempdir().unwrap();
    write_summary(dir.path(), "only", "C", 5.0, 6.0);
    let context = load_route_context(dir.path(), "C", 100.0).unwrap();
    assert!(context.note.contains("using latest route summary only"));
    assert!(context.comparison_path.is_none());
}

#[test]
fn history_ranks_latest_run_against_priors() {
    let dir = tempfile::tempdir().unwrap();
    for (i, speed) in [7.0, 6.8, 6.5].iter().enumerate() {
        write_summary(dir.path(), &format!("run{i}"), "A", i as f64, *speed);
    }
    write_summary(dir.path(), "run_latest", "A", 10.0, 6.0);

    let context = load_route_context(dir.path(), "A", 100.0).unwrap();
    let history = context.history_payload.expect("history with 4 summaries");
    let rank = history
        .pointer("/metrics/metrics/horizontal_speed_avg/rank")
        .and_then(|v| v.as_u64())
        .unwrap();
    let prior_count = history
        .pointer("/metrics/metrics/horizontal_speed_avg/prior_count")
        .and_then(|v| v.as_u64())
        .unwrap();
    assert_eq!(rank, 4);
    assert_eq!(prior_count, 3);
    assert!(context.history_path.unwrap().exists());
}

#[test]
fn apply_too_slow_backs_up_then_adjusts_within_five_percent() {
    let dir = tempfile::tempdir().unwrap();
    let exports = dir.path().join("exports");
    let backups = dir.path().join("backups");
    std::fs::create_dir_all(&exports).unwrap();
    for (i, speed) in [7.0, 6.8, 6.5].iter().enumerate() {
        write_summary(&exports, &format!("run{i}"), "A", i as f64, *speed);
    }
    write_summary(&exports, "run_latest", "A", 10.0, 6.0);

    let mut tuning = PhysicsTuning {
        max_ground_speed: 6.0,
        ..Default::default()
    };
    let mut change_events: Vec<(String, usize)> = Vec::new();
    let backups_for_closure = backups.clone();
    let (context, adjustments, backup) = autotune_apply(
        &exports,
        &backups,
        "A",
        "too slow",
        &mut tuning,
        1_000.0,
        |field| {
            // The backup must exist before the first field write lands.
            let on_disk = list_tuning_backups(&backups_for_closure).len();
            change_events.push((field.to_owned(), on_disk));
        },
    )
    .unwrap();

    assert_eq!(context.route_tag, "A");
    let backup = backup.expect("backup written");
    assert!(backup.exists());

    let speed_adj = adjustments
        .iter()
        .find(|a| a.field == "max_ground_speed")
        .expect("speed adjustment");
    assert!(speed_adj.after > speed_adj.before);
    assert!(speed_adj.after <= speed_adj.before * 1.05 + 1e-9);
    assert!(speed_adj.reason.contains("metric: speed rank below prior median"));
    assert_eq!(tuning.max_ground_speed, speed_adj.after);

    let speed_changes: Vec<_> = change_events
        .iter()
        .filter(|(field, _)| field == "max_ground_speed")
        .collect();
    assert_eq!(speed_changes.len(), 1);
    assert!(change_events.iter().all(|(_, backups_seen)| *backups_seen == 1));
}

#[test]
fn guardrail_eval_passes_when_latest_improves() {
    let dir = tempfile::tempdir().unwrap();
    let reference = json!({
        "format_version": 1,
        "export_metadata": {"route_tag": "A", "exported_at_unix": 1.0},
        "metrics": {
            "jump_takeoff": {"success_rate": 0.82},
            "horizontal_speed_avg": 132.0,
            "landing_speed_loss_avg": 0.84,
            "ground_flicker_per_min": 11.0,
            "camera_lin_jerk_avg": 93.0,
            "camera_ang_jerk_avg": 590.0,
        },
    });
    let latest = json!({
        "format_version": 1,
        "export_metadata": {"route_tag": "A", "exported_at_unix": 2.0},
        "metrics": {
            "jump_takeoff": {"success_rate": 0.88},
            "horizontal_speed_avg": 145.0,
            "landing_speed_loss_avg": 0.62,
            "ground_flicker_per_min": 9.0,
            "camera_lin_jerk_avg": 85.0,
            "camera_ang_jerk_avg": 520.0,
        },
    });
    std::fs::write(
        dir.path().join("ref.summary.json"),
        serde_json::to_string_pretty(&reference).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("new.summary.json"),
        serde_json::to_string_pretty(&latest).unwrap(),
    )
    .unwrap();

    let result = evaluate_route_guardrails(dir.path(), "A", 50.0).unwrap();
    assert_eq!(result.route_tag, "A");
    assert!(result.passed);
    assert!(result.score > 0.0);
    assert_eq!(result.checks.len(), 5);
    assert!(result.checks.iter().all(|c| c.passed));
    assert_eq!(result.improved_count, 6);
    assert!(result.comparison_path.exists());
}

#[test]
fn rollback_restores_latest_backup_and_refires_all_fields() {
    let dir = tempfile::tempdir().unwrap();
    let exports = dir.path().join("exports");
    let backups = dir.path().join("backups");
    std::fs::create_dir_all(&exports).unwrap();
    write_summary(&exports, "a1", "A", 1.0, 6.0);
    write_summary(&exports, "a2", "A", 2.0, 6.2);

    let mut tuning = PhysicsTuning {
        max_ground_speed: 6.0,
        ..Default::default()
    };
    let (_, adjustments, backup) = autotune_apply(
        &exports,
        &backups,
        "A",
        "too slow",
        &mut tuning,
        2_000.0,
        |_| {},
    )
    .unwrap();
    assert!(!adjustments.is_empty());
    assert!(backup.is_some());
    assert!(tuning.max_ground_speed > 6.0);

    let mut touched = Vec::new();
    let restored = autotune_rollback(&backups, None, &mut tuning, |field| {
        touched.push(field.to_owned());
    })
    .unwrap();
    assert!(restored.exists());
    assert_eq!(tuning.max_ground_speed, 6.0);
    assert!(touched.contains(&"max_ground_speed".to_owned()));
    assert!(touched.contains(&"surf_enabled".to_owned()));
}

#[test]
fn suggest_alone_never_mutates_tuning() {
    let dir = tempfile::tempdir().unwrap();
    write_summary(dir.path(), "a1", "A", 1.0, 6.0);
    let tuning = PhysicsTuning::default();
    let before = tuning.clone();
    let (_, adjustments) = autotune_suggest(dir.path(), "A", "too slow", &tuning, 10.0).unwrap();
    assert!(!adjustments.is_empty());
    assert_eq!(tuning, before);
}
