//! TLE ingestion and index cleaning
//!
//! Each candidate file is handed to the external ingestion tool, which
//! appends one line per element set to the satellite's index file. Several
//! source files often carry identical element sets, so every successful
//! ingestion is followed by an index clean: sort on the leading key
//! columns, keep the most recent occurrence of each key, drop malformed
//! (`NaN`) lines, and atomically replace the index.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use super::resolve::Candidates;
use crate::config::TleConfig;
use crate::process::{CommandSpec, ProcessRunner};

/// Number of leading whitespace-separated fields forming the dedup key.
/// Matches the historical `sort -u +0b -3b` invocation on the index.
const KEY_FIELDS: usize = 3;

/// Marker for malformed element lines that must never stay in the index.
const MALFORMED_MARKER: &str = "NaN";

#[derive(Debug, Default)]
pub(super) struct IngestReport {
    /// Files the ingestion tool accepted.
    pub ingested: usize,
    /// Files eligible for archiving (ingested and index cleaned).
    pub archivable: Vec<PathBuf>,
}

/// Run the ingestion tool once per candidate file.
///
/// The tool's stdin protocol is four lines: TLE directory, filename
/// (relative to that directory), satellite and index path. A failed
/// ingestion is logged and the loop continues — one bad file must not block
/// the others.
pub(super) async fn ingest_files(
    runner: &ProcessRunner,
    config: &TleConfig,
    satellite: &str,
    index: &Path,
    candidates: &Candidates,
) -> IngestReport {
    let mut report = IngestReport::default();

    for file in &candidates.files {
        // Files picked out of the month subdirectory are addressed
        // relative to the TLE dir, e.g. "2021_01/tle_20210119.txt".
        let tle_filename = file
            .strip_prefix(&config.dir)
            .ok()
            .map(|rel| rel.to_string_lossy().into_owned())
            .or_else(|| {
                file.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        let stdin = format!(
            "{}\n{}\n{}\n{}\n",
            config.dir.display(),
            tle_filename,
            satellite,
            index.display()
        );
        debug!("stdin arguments to ingestion command: {:?}", stdin);

        let outcome = runner
            .run(
                CommandSpec::shell(config.ingest_command.clone())
                    .with_stdin(stdin)
                    .with_cwd(&config.dir),
            )
            .await;

        if !outcome.ok() {
            warn!(
                "Ingestion command {:?} failed for {:?} (exit code {})",
                config.ingest_command, file, outcome.exit_code
            );
            debug!("stdout: {}", outcome.stdout);
            debug!("stderr: {}", outcome.stderr);
            continue;
        }

        if !index.exists() {
            error!(
                "Index file {:?} does not exist after ingestion. Something is wrong.",
                index
            );
            continue;
        }

        report.ingested += 1;

        match sort_index(index) {
            Ok(()) => report.archivable.push(file.clone()),
            Err(e) => error!("Failed to sort/dedup index file {:?}: {}", index, e),
        }
    }

    report
}

/// Sort and deduplicate a TLE index file in place.
///
/// Lines are keyed on their first [`KEY_FIELDS`] whitespace-separated
/// fields; for duplicate keys the last occurrence wins (the most recent
/// ingestion). Lines containing [`MALFORMED_MARKER`] are dropped. The
/// cleaned index replaces the original atomically via a temp file in the
/// same directory, so a crash never leaves a half-written index.
pub fn sort_index(index: &Path) -> std::io::Result<()> {
    let contents = std::fs::read_to_string(index)?;

    let mut by_key: BTreeMap<String, String> = BTreeMap::new();
    for line in contents.lines() {
        if line.trim().is_empty() || line.contains(MALFORMED_MARKER) {
            continue;
        }
        let key: String = line
            .split_whitespace()
            .take(KEY_FIELDS)
            .collect::<Vec<_>>()
            .join(" ");
        by_key.insert(key, line.to_string());
    }

    let dir = index.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    for line in by_key.values() {
        writeln!(tmp, "{}", line)?;
    }
    tmp.persist(index).map_err(|e| e.error)?;
    Ok(())
}
