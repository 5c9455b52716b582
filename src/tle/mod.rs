//! TLE resolution subsystem
//!
//! Given a satellite and a scene start time, locate the right orbital
//! element file (exact index-based selection or temporal closest match),
//! feed it to the external ingestion tool, clean the resulting index, and
//! archive the file that was used.
//!
//! The per-request flow is: search exact → (miss) search closest →
//! (no candidate, downloads enabled) download → ingest → archive. Ingestion
//! failures are non-fatal per file; archive and index-cleaning failures are
//! logged and never fail the scene. Running the same resolution twice must
//! not corrupt the index — the sort/dedup step keeps exactly one occurrence
//! per element block.

mod archive;
mod download;
mod ingest;
mod resolve;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::config::TleConfig;
use crate::process::ProcessRunner;

pub use ingest::sort_index;
pub use resolve::index_path;

#[derive(Error, Debug)]
pub enum TleError {
    #[error("failed to create TLE directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to list TLE directory {path:?}: {source}")]
    ListDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolve and ingest the orbital elements for one scene.
///
/// Returns `Ok(true)` when at least one TLE file was ingested into the
/// satellite's index, `Ok(false)` when no candidate qualified. Errors are
/// reserved for infrastructure failures (the TLE directory itself being
/// unusable); the scheduler treats both `Ok(false)` and `Err` as a
/// degraded, non-fatal condition.
pub async fn resolve_and_ingest(
    config: &TleConfig,
    runner: &ProcessRunner,
    satellite: &str,
    timestamp: DateTime<Utc>,
) -> Result<bool, TleError> {
    if !config.dir.exists() {
        warn!("Dir {:?} does not exist. Create", config.dir);
        std::fs::create_dir_all(&config.dir).map_err(|source| TleError::CreateDir {
            path: config.dir.clone(),
            source,
        })?;
    }

    let index = resolve::index_path(&config.dir, satellite);

    let mut candidates = match config.match_tolerance_days {
        None => resolve::search_newer_than_index(&config.dir, &index)?,
        Some(days) => resolve::search_closest(config, timestamp, days),
    };

    if candidates.files.is_empty() && config.download {
        warn!("Found no tle files. Try to download ...");
        candidates.files = download::download_tles(config, timestamp).await;
        candidates.search_dir = config.dir.clone();
    }

    if candidates.files.is_empty() {
        warn!(
            "No TLE candidate found for {} at {} - index left untouched",
            satellite, timestamp
        );
        return Ok(false);
    }

    let report = ingest::ingest_files(runner, config, satellite, &index, &candidates).await;

    if let Some(archive_dir) = &config.archive_dir {
        archive::archive_files(archive_dir, &report.archivable);
    }

    Ok(report.ingested > 0)
}
