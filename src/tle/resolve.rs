//! TLE candidate selection
//!
//! Two strategies, mirroring how the data arrives:
//!
//! - **Index-mtime** (direct broadcast): every `tle*txt` file newer than the
//!   satellite index's last update is a candidate, oldest first. On the very
//!   first run there is no index yet, so every file in the directory
//!   qualifies.
//! - **Closest match** (reprocessing): compose the expected filename from
//!   the scene start time; when it is missing, fall back to the file whose
//!   filename timestamp is temporally closest, within a day-based tolerance.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::TleError;
use crate::config::TleConfig;
use crate::interval::{closest_match, timed_files};

/// Candidate files plus the directory they were found in. Ingestion needs
/// the directory to pass month-subdirectory files by their relative name.
#[derive(Debug, Clone)]
pub(super) struct Candidates {
    pub files: Vec<PathBuf>,
    pub search_dir: PathBuf,
}

/// Per-satellite index file path, by convention `tle_<satellite>.index`.
pub fn index_path(tle_dir: &Path, satellite: &str) -> PathBuf {
    tle_dir.join(format!("tle_{}.index", satellite))
}

/// Index-mtime strategy: all `tle*txt` files modified after the index,
/// sorted by creation time. Without an index, every file is a candidate.
pub(super) fn search_newer_than_index(
    tle_dir: &Path,
    index: &Path,
) -> Result<Candidates, TleError> {
    let files = if index.exists() {
        let index_mtime = file_time(index);
        let mut files: Vec<PathBuf> = list_files(tle_dir)?
            .into_iter()
            .filter(|path| is_tle_txt(path))
            .filter(|path| file_time(path) > index_mtime)
            .collect();
        sort_by_creation(&mut files);
        if files.is_empty() {
            warn!(
                "No newer tle files than last update of the index file {:?}. \
                 If the index is more than a few days old you should check.",
                index
            );
        } else {
            debug!("Will use tle files {:?}", files);
        }
        files
    } else {
        warn!(
            "Index file does not exist. If this is the first run of the ingestion \
             tool it is ok, otherwise it is a bit suspicious."
        );
        let mut files = list_files(tle_dir)?;
        sort_by_creation(&mut files);
        files
    };

    Ok(Candidates {
        files,
        search_dir: tle_dir.to_path_buf(),
    })
}

/// Closest-match strategy. The exact expected filename short-circuits with
/// distance zero; otherwise every timestamped file in the search directory
/// competes under the tolerance. A `YYYY_MM` subdirectory, when enabled and
/// present, is searched before the TLE directory itself.
pub(super) fn search_closest(
    config: &TleConfig,
    timestamp: DateTime<Utc>,
    tolerance_days: i64,
) -> Candidates {
    let infile = timestamp.format(&config.infile_template).to_string();
    debug!("Expected tle file name: {}", infile);
    let tolerance = Duration::days(tolerance_days);

    let mut search_dirs = Vec::new();
    if config.search_month_subdir {
        search_dirs.push(config.dir.join(timestamp.format("%Y_%m").to_string()));
    }
    search_dirs.push(config.dir.clone());

    for search_dir in search_dirs {
        if !search_dir.exists() {
            debug!("tle search dir {:?} does not exist", search_dir);
            continue;
        }

        let exact = search_dir.join(&infile);
        if exact.is_file() {
            debug!("Found exact tle file {:?}", exact);
            return Candidates {
                files: vec![exact],
                search_dir,
            };
        }

        warn!(
            "Could not find tle file {} in {:?}. Try find closest ...",
            infile, search_dir
        );
        let listing = match list_files(&search_dir) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };
        let candidates = timed_files(&listing);
        if let Some(path) = closest_match(timestamp, &candidates, tolerance) {
            debug!("Closest tle file: {:?}", path);
            return Candidates {
                files: vec![path],
                search_dir,
            };
        }
        warn!(
            "Could not find tle file close enough to timestamp {} with limit {} days. \
             Update your TLE files or adjust the limit (not recommended!).",
            timestamp, tolerance_days
        );
    }

    Candidates {
        files: Vec::new(),
        search_dir: config.dir.clone(),
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, TleError> {
    let entries = std::fs::read_dir(dir).map_err(|source| TleError::ListDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn is_tle_txt(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with("tle") && name.ends_with("txt"))
}

fn file_time(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Creation time where the filesystem records it, modification time
/// otherwise.
fn creation_time(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn sort_by_creation(files: &mut [PathBuf]) {
    files.sort_by_key(|path| creation_time(path));
}
