//! Per-scene cleanup
//!
//! Runs after every scene regardless of outcome: relocate the log files the
//! external stages left in the working directory into a per-scene
//! subdirectory of the log dir, and prune dated subdirectories that have
//! outlived the retention window. Everything here is best-effort — cleanup
//! problems are logged, never propagated.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, warn};

/// Move `*.log` files from `working_dir` into `<log_root>/<scene_subdir>/`.
pub fn relocate_logs(working_dir: &Path, log_root: &Path, scene_subdir: &str) {
    let destination = log_root.join(scene_subdir);
    if let Err(e) = std::fs::create_dir_all(&destination) {
        warn!("Can't create log directory {:?}: {}", destination, e);
        return;
    }

    let entries = match std::fs::read_dir(working_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Can't list working dir {:?}: {}", working_dir, e);
            return;
        }
    };

    let mut moved = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_log = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext == "log");
        if !path.is_file() || !is_log {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        let dst = destination.join(name);
        if let Err(e) = move_file(&path, &dst) {
            error!("Moving log file {:?} to {:?} failed: {}", path, dst, e);
        } else {
            moved += 1;
        }
    }
    if moved > 0 {
        info!("{} log files saved in to {:?}", moved, destination);
    }
}

/// Rename, or copy-and-remove when the destination is on another
/// filesystem.
fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    std::fs::copy(src, dst)?;
    std::fs::remove_file(src)
}

/// Remove direct subdirectories of `root` older than `older_than_days`.
pub fn prune_old_dirs(root: &Path, older_than_days: u64) {
    let cutoff = SystemTime::now() - Duration::from_secs(older_than_days * 24 * 60 * 60);
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Nothing to prune under {:?}: {}", root, e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let old_enough = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(|mtime| mtime < cutoff)
            .unwrap_or(false);
        if !old_enough {
            continue;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => info!("Pruned stale directory {:?}", path),
            Err(e) => error!("Failed to prune {:?}: {}", path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocate_logs_moves_only_logs() {
        let work = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("decommutation.log"), "ok\n").unwrap();
        std::fs::write(work.path().join("hrpt_noaa19.l1b"), "data").unwrap();

        relocate_logs(work.path(), logs.path(), "noaa19_20210119");

        let dest = logs.path().join("noaa19_20210119");
        assert!(dest.join("decommutation.log").is_file());
        assert!(!work.path().join("decommutation.log").exists());
        // Data files stay put.
        assert!(work.path().join("hrpt_noaa19.l1b").is_file());
    }

    #[test]
    fn test_prune_old_dirs() {
        let root = tempfile::tempdir().unwrap();
        let stale = root.path().join("2020-12-01");
        let fresh = root.path().join("2021-01-19");
        std::fs::create_dir(&stale).unwrap();
        std::fs::create_dir(&fresh).unwrap();

        let past = SystemTime::now() - Duration::from_secs(90 * 24 * 60 * 60);
        std::fs::File::open(&stale).unwrap().set_modified(past).unwrap();

        prune_old_dirs(root.path(), 30);

        assert!(!stale.exists());
        assert!(fresh.exists());
    }
}
