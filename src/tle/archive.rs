//! Best-effort TLE archiving
//!
//! Every file actually ingested is copied into a date-derived subdirectory
//! of the archive root (`<root>/<YYYY-MM-DD>/`). Failures here degrade the
//! archive only — they are logged and never fail the scene.

use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::interval::extract_timestamp;

pub(super) fn archive_files(archive_root: &Path, files: &[PathBuf]) {
    for file in files {
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // Only the most specific timestamp pattern is consulted, so a file
        // is archived once, under one date.
        let Some(timestamp) = extract_timestamp(name) else {
            debug!("No timestamp in {:?} - not archiving", file);
            continue;
        };

        let archive_dir = archive_root.join(timestamp.format("%Y-%m-%d").to_string());
        if let Err(e) = std::fs::create_dir_all(&archive_dir) {
            error!("Failed to make archive dir {:?}: {}", archive_dir, e);
            continue;
        }

        match std::fs::copy(file, archive_dir.join(name)) {
            Ok(_) => debug!("Copied {:?} to {:?}", file, archive_dir),
            Err(e) => error!(
                "Failed to copy TLE file {:?} to archive {:?}: {}",
                file, archive_dir, e
            ),
        }
    }
}
