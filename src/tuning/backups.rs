//! Timestamped snapshots of the authored tuning, used as the safety net
//! around every autotune apply.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::PhysicsTuning;

const BACKUP_PREFIX: &str = "tuning_backup_";
const BACKUP_EXT: &str = ".json";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("no tuning backup matches '{reference}'")]
    NotFound { reference: String },
    #[error("no tuning backups exist in {0}")]
    Empty(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Backup payload: authored invariants only, never derived values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningBackup {
    pub format_version: u32,
    pub label: String,
    pub reason: String,
    pub created_at_unix: f64,
    pub tuning: PhysicsTuning,
}

#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub label: String,
    pub created_at_unix: f64,
}

fn sanitize_label(label: &str) -> String {
    let mut out = String::new();
    for ch in label.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch.is_whitespace() || ch == '.' {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() { "manual".into() } else { trimmed }
}

/// Writes a timestamped backup file and returns its path. The file name
/// encodes both the stamp and the label; same-second collisions get a
/// numeric suffix.
pub fn create_tuning_backup(
    tuning: &PhysicsTuning,
    label: &str,
    reason: &str,
    dir: &Path,
    now_unix: f64,
) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(dir)?;
    let stamp = chrono::DateTime::from_timestamp(now_unix as i64, 0)
        .unwrap_or_default()
        .format("%Y%m%d_%H%M%S");
    let label = sanitize_label(label);
    let mut path = dir.join(format!("{BACKUP_PREFIX}{stamp}_{label}{BACKUP_EXT}"));
    let mut counter = 2;
    while path.exists() {
        path = dir.join(format!("{BACKUP_PREFIX}{stamp}_{label}-{counter}{BACKUP_EXT}"));
        counter += 1;
    }

    let payload = TuningBackup {
        format_version: 1,
        label,
        reason: reason.to_owned(),
        created_at_unix: now_unix,
        tuning: tuning.clone(),
    };
    let mut text = serde_json::to_string_pretty(&payload)?;
    text.push('\n');
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, &path)?;
    tracing::info!(path = %path.display(), reason, "created tuning backup");
    Ok(path)
}

/// All backups in the directory, newest first by recorded creation time.
pub fn list_tuning_backups(dir: &Path) -> Vec<BackupEntry> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(BACKUP_PREFIX) || !name.ends_with(BACKUP_EXT) {
            continue;
        }
        let Ok(text) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(payload) = serde_json::from_str::<TuningBackup>(&text) else {
            continue;
        };
        out.push(BackupEntry {
            path,
            label: payload.label,
            created_at_unix: payload.created_at_unix,
        });
    }
    out.sort_by(|a, b| {
        b.created_at_unix
            .total_cmp(&a.created_at_unix)
            .then_with(|| b.path.cmp(&a.path))
    });
    out
}

/// Loads a backup by reference: exact file name, name fragment, or label.
/// An empty reference resolves to the newest backup.
pub fn load_tuning_backup(dir: &Path, backup_ref: Option<&str>) -> Result<(TuningBackup, PathBuf), BackupError> {
    let backups = list_tuning_backups(dir);
    let reference = backup_ref.map(str::trim).filter(|s| !s.is_empty());
    let entry = match reference {
        None => backups.first().ok_or_else(|| BackupError::Empty(dir.to_path_buf()))?,
        Some(needle) => backups
            .iter()
            .find(|b| {
                b.path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n == needle || n.contains(needle))
                    || b.label == needle
            })
            .ok_or_else(|| BackupError::NotFound {
                reference: needle.to_owned(),
            })?,
    };
    let payload: TuningBackup = serde_json::from_str(&fs::read_to_string(&entry.path)?)?;
    Ok((payload, entry.path.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::TuningValue;

    #[test]
    fn backup_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut tuning = PhysicsTuning::default();
        tuning.set("max_ground_speed", TuningValue::Number(7.4));
        let path =
            create_tuning_backup(&tuning, "route-A", "pre-autotune-apply", dir.path(), 1e9).unwrap();
        assert!(path.exists());

        let (payload, loaded_path) = load_tuning_backup(dir.path(), None).unwrap();
        assert_eq!(loaded_path, path);
        assert_eq!(payload.tuning.max_ground_speed, 7.4);
        assert_eq!(payload.reason, "pre-autotune-apply");
    }

    #[test]
    fn listing_is_newest_first_and_restore_by_ref_works() {
        let dir = tempfile::tempdir().unwrap();
        let tuning = PhysicsTuning::default();
        create_tuning_backup(&tuning, "first", "t", dir.path(), 1_000.0).unwrap();
        create_tuning_backup(&tuning, "second", "t", dir.path(), 2_000.0).unwrap();

        let listed = list_tuning_backups(dir.path());
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].label, "second");

        let (by_label, _) = load_tuning_backup(dir.path(), Some("first")).unwrap();
        assert_eq!(by_label.label, "first");

        match load_tuning_backup(dir.path(), Some("missing")) {
            Err(BackupError::NotFound { reference }) => assert_eq!(reference, "missing"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn same_second_backups_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let tuning = PhysicsTuning::default();
        let a = create_tuning_backup(&tuning, "dup", "t", dir.path(), 5_000.0).unwrap();
        let b = create_tuning_backup(&tuning, "dup", "t", dir.path(), 5_000.0).unwrap();
        assert_ne!(a, b);
    }
}
