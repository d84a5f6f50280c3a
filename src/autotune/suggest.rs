use serde_json::Value;

use crate::replays::compare::metric_at_path;
use crate::tuning::{PhysicsTuning, TuningValue, field_limits};

/// One suggested invariant change. `before`/`after` are always in-range;
/// out-of-range suggestions are clamped and the clamp noted in `reason`.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningAdjustment {
    pub field: String,
    pub before: f64,
    pub after: f64,
    pub reason: String,
}

#[derive(Clone, Copy)]
enum Nudge {
    Scale(f64),
    Add(f64),
}

struct PhraseRule {
    phrases: &'static [&'static str],
    nudges: &'static [(&'static str, Nudge, &'static str)],
}

/// Phrase taxonomy. Order matters two ways: earlier rules consume their
/// matched phrases (so "stops too slowly" never doubles as "too slow"),
/// and the first nudge to touch a field decides its value.
const RULES: &[PhraseRule] = &[
    PhraseRule {
        phrases: &["stops too slowly", "slippery", "like ice"],
        nudges: &[("ground_stop_t90", Nudge::Scale(0.90), "intent: tighten ground stop")],
    },
    PhraseRule {
        phrases: &["too slow", "feels slow", "need more speed", "want more speed", "not fast enough"],
        nudges: &[
            ("max_ground_speed", Nudge::Scale(1.05), "intent: raise top speed"),
            ("air_speed_mult", Nudge::Scale(1.04), "intent: raise air speed ceiling"),
        ],
    },
    PhraseRule {
        phrases: &["too fast"],
        nudges: &[("max_ground_speed", Nudge::Scale(0.95), "intent: lower top speed")],
    },
    PhraseRule {
        phrases: &["wallrun too aggressive", "triggers too easily", "wallrun too easy", "wallrun too sticky"],
        nudges: &[
            ("wallrun_min_entry_speed_mult", Nudge::Scale(1.10), "intent: raise wallrun entry speed"),
            ("wallrun_min_approach_dot", Nudge::Add(0.03), "intent: require firmer wall approach"),
            ("wallrun_min_parallel_dot", Nudge::Add(0.05), "intent: require firmer wall alignment"),
        ],
    },
    PhraseRule {
        phrases: &["curved wallrun"],
        nudges: &[
            ("wallrun_sink_t90", Nudge::Scale(1.15), "intent: hold curved wallruns longer"),
            ("wallrun_min_approach_dot", Nudge::Add(-0.02), "intent: accept shallow curved approach"),
            ("wallrun_min_parallel_dot", Nudge::Add(-0.05), "intent: accept curved wall alignment"),
        ],
    },
    PhraseRule {
        phrases: &[
            "wallrun doesnt work",
            "wallrun does not work",
            "wallrun not working",
            "not engaging",
            "fall off the wall",
            "fall of the wall",
        ],
        nudges: &[
            ("wallrun_sink_t90", Nudge::Scale(1.15), "intent: hold wallruns longer"),
            ("wallrun_min_entry_speed_mult", Nudge::Scale(0.90), "intent: ease wallrun entry"),
        ],
    },
    PhraseRule {
        phrases: &["bhop timing", "timing too strict", "jump buffer too strict", "keep missing jumps"],
        nudges: &[
            ("grace_period", Nudge::Scale(1.10), "intent: widen jump leniency"),
            ("grace_distance", Nudge::Scale(1.10), "intent: widen jump leniency"),
        ],
    },
    PhraseRule {
        phrases: &["slide too short", "slide stops too fast", "slide dies"],
        nudges: &[("slide_stop_t90", Nudge::Scale(1.12), "intent: carry slides longer")],
    },
    PhraseRule {
        phrases: &["slide too long"],
        nudges: &[("slide_stop_t90", Nudge::Scale(0.90), "intent: shorten slides")],
    },
    PhraseRule {
        phrases: &["sluggish", "slow to accelerate"],
        nudges: &[("run_t90", Nudge::Scale(0.92), "intent: sharpen run response")],
    },
    PhraseRule {
        phrases: &["too floaty", "floaty"],
        nudges: &[("jump_apex_time", Nudge::Scale(0.95), "intent: tighten jump arc")],
    },
    PhraseRule {
        phrases: &["jump too short", "jumps feel short", "jump too low"],
        nudges: &[("jump_height", Nudge::Scale(1.05), "intent: raise jump height")],
    },
];

/// Latest-run jump success below this rate reads as a leniency problem.
const LOW_JUMP_SUCCESS: f64 = 0.50;
/// Flicker above this per-minute rate reads as a ground-glue problem.
const HIGH_FLICKER_PER_MIN: f64 = 30.0;

fn normalize_feedback(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.to_lowercase().chars() {
        match ch {
            '\'' | '’' => {}
            c if c.is_alphanumeric() => out.push(c),
            _ => out.push(' '),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Accumulator<'t> {
    tuning: &'t PhysicsTuning,
    adjustments: Vec<TuningAdjustment>,
}

impl<'t> Accumulator<'t> {
    fn new(tuning: &'t PhysicsTuning) -> Self {
        Self {
            tuning,
            adjustments: Vec::new(),
        }
    }

    fn push(&mut self, field: &str, nudge: Nudge, why: &str) {
        // Invariants only: unknown or non-numeric fields are never touched.
        let Some((lo, hi)) = field_limits(field) else {
            return;
        };
        let Some(TuningValue::Number(before)) = self.tuning.get(field) else {
            return;
        };

        let raw_after = match nudge {
            Nudge::Scale(s) => before * s,
            Nudge::Add(a) => before + a,
        };
        let after = raw_after.clamp(lo, hi);
        let direction = after - before;

        if let Some(existing) = self.adjustments.iter_mut().find(|a| a.field == field) {
            // Same-direction evidence merges into the reason; conflicting
            // evidence never overrides the first suggestion.
            if direction * (existing.after - existing.before) > 0.0
                && !existing.reason.contains(why)
            {
                existing.reason.push_str("; ");
                existing.reason.push_str(why);
            }
            return;
        }

        if direction.abs() <= 1e-12 {
            return;
        }
        let mut reason = why.to_owned();
        if (raw_after - after).abs() > 1e-12 {
            reason.push_str(" (clamped to range)");
        }
        self.adjustments.push(TuningAdjustment {
            field: field.to_owned(),
            before,
            after,
            reason,
        });
    }
}

fn history_rank(history: Option<&Value>, metric: &str) -> Option<(u64, u64)> {
    let payload = history?;
    let entry = payload.pointer(&format!("/metrics/metrics/{metric}"))?;
    let rank = entry.get("rank")?.as_u64()?;
    let prior_count = entry.get("prior_count")?.as_u64()?;
    Some((rank, prior_count))
}

/// Pure suggestion step: feedback phrases plus telemetry evidence, mapped
/// through the taxonomy table onto invariant-only adjustments.
pub fn suggest_invariant_adjustments(
    feedback_text: &str,
    tuning: &PhysicsTuning,
    latest_summary: Option<&Value>,
    history_payload: Option<&Value>,
) -> Vec<TuningAdjustment> {
    let mut text = normalize_feedback(feedback_text);
    let mut acc = Accumulator::new(tuning);

    for rule in RULES {
        let mut matched = false;
        for phrase in rule.phrases {
            if text.contains(phrase) {
                matched = true;
                text = text.replace(phrase, " ");
            }
        }
        if matched {
            for (field, nudge, why) in rule.nudges {
                acc.push(field, *nudge, why);
            }
        }
    }

    // Metric evidence, independent of phrasing.
    if let Some((rank, prior_count)) = history_rank(history_payload, "horizontal_speed_avg") {
        if prior_count >= 2 && rank * 2 > prior_count {
            acc.push(
                "max_ground_speed",
                Nudge::Scale(1.05),
                "metric: speed rank below prior median",
            );
        }
    }
    if let Some(summary) = latest_summary {
        let success_rate = metric_at_path(summary, "metrics.jump_takeoff.success_rate");
        let attempts = metric_at_path(summary, "metrics.jump_takeoff.attempts");
        if attempts >= 4.0 && success_rate < LOW_JUMP_SUCCESS {
            acc.push(
                "grace_period",
                Nudge::Scale(1.10),
                "metric: jump takeoff success low",
            );
        }
        let flicker = metric_at_path(summary, "metrics.ground_flicker_per_min");
        if flicker > HIGH_FLICKER_PER_MIN {
            acc.push(
                "ground_snap_dist",
                Nudge::Scale(1.08),
                "metric: ground flicker high",
            );
        }
    }

    acc.adjustments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn by_field(adjustments: &[TuningAdjustment]) -> std::collections::BTreeMap<String, TuningAdjustment> {
        adjustments
            .iter()
            .map(|a| (a.field.clone(), a.clone()))
            .collect()
    }

    #[test]
    fn too_slow_with_poor_speed_rank_raises_speed_and_merges_reasons() {
        let tuning = PhysicsTuning {
            max_ground_speed: 6.0,
            ..Default::default()
        };
        let history = json!({
            "metrics": {"metrics": {"horizontal_speed_avg": {"rank": 4, "prior_count": 7}}}
        });
        let adjustments =
            suggest_invariant_adjustments("too slow", &tuning, None, Some(&history));
        let map = by_field(&adjustments);

        let speed = &map["max_ground_speed"];
        assert!(speed.after > speed.before);
        assert!(speed.after <= speed.before * 1.05 + 1e-9);
        assert!(speed.reason.contains("intent: raise top speed"));
        assert!(speed.reason.contains("metric: speed rank below prior median"));
        assert!(map.contains_key("air_speed_mult"));
    }

    #[test]
    fn wallrun_aggressive_raises_all_three_entry_thresholds() {
        let tuning = PhysicsTuning {
            wallrun_min_entry_speed_mult: 0.45,
            wallrun_min_approach_dot: 0.08,
            wallrun_min_parallel_dot: 0.30,
            ..Default::default()
        };
        let adjustments = suggest_invariant_adjustments(
            "wallrun too aggressive and triggers too easily",
            &tuning,
            None,
            None,
        );
        let map = by_field(&adjustments);
        for field in [
            "wallrun_min_entry_speed_mult",
            "wallrun_min_approach_dot",
            "wallrun_min_parallel_dot",
        ] {
            assert!(map[field].after > map[field].before, "{field}");
        }
    }

    #[test]
    fn wallrun_not_working_eases_entry_and_extends_sink() {
        let tuning = PhysicsTuning::default();
        for feedback in ["wallrun doesnt work really", "wallrun is not engaging, i fall of the wall"] {
            let adjustments = suggest_invariant_adjustments(feedback, &tuning, None, None);
            let map = by_field(&adjustments);
            assert!(map["wallrun_sink_t90"].after > map["wallrun_sink_t90"].before);
            assert!(
                map["wallrun_min_entry_speed_mult"].after
                    < map["wallrun_min_entry_speed_mult"].before
            );
        }
    }

    #[test]
    fn curved_wallrun_lowers_alignment_gates() {
        let tuning = PhysicsTuning {
            wallrun_sink_t90: 0.22,
            wallrun_min_entry_speed_mult: 0.45,
            wallrun_min_approach_dot: 0.08,
            wallrun_min_parallel_dot: 0.30,
            ..Default::default()
        };
        let adjustments =
            suggest_invariant_adjustments("curved wallrun doesnt work", &tuning, None, None);
        let map = by_field(&adjustments);
        assert!(map["wallrun_sink_t90"].after > map["wallrun_sink_t90"].before);
        assert!(map["wallrun_min_approach_dot"].after < map["wallrun_min_approach_dot"].before);
        assert!(map["wallrun_min_parallel_dot"].after < map["wallrun_min_parallel_dot"].before);
    }

    #[test]
    fn stops_too_slowly_is_not_mistaken_for_too_slow() {
        let tuning = PhysicsTuning::default();
        let adjustments =
            suggest_invariant_adjustments("it stops too slowly on landings", &tuning, None, None);
        let map = by_field(&adjustments);
        assert!(map.contains_key("ground_stop_t90"));
        assert!(!map.contains_key("max_ground_speed"));
    }

    #[test]
    fn every_adjustment_targets_a_known_invariant_and_stays_in_range() {
        let tuning = PhysicsTuning::default();
        let history = json!({
            "metrics": {"metrics": {"horizontal_speed_avg": {"rank": 5, "prior_count": 6}}}
        });
        let summary = json!({
            "metrics": {
                "jump_takeoff": {"success_rate": 0.2, "attempts": 9},
                "ground_flicker_per_min": 80.0,
            }
        });
        let adjustments = suggest_invariant_adjustments(
            "too slow, wallrun doesnt work, slide too short, too floaty",
            &tuning,
            Some(&summary),
            Some(&history),
        );
        assert!(!adjustments.is_empty());
        for adj in &adjustments {
            let (lo, hi) = field_limits(&adj.field).expect("invariant field");
            assert!(adj.after >= lo && adj.after <= hi, "{}", adj.field);
            assert!(adj.after != adj.before);
        }
    }

    #[test]
    fn no_signal_means_no_adjustments() {
        let tuning = PhysicsTuning::default();
        assert!(suggest_invariant_adjustments("feels great", &tuning, None, None).is_empty());
    }
}
