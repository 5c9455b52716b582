//! Runner configuration
//!
//! All operational tunables come from a single TOML file: supported
//! satellites, sensor gating, scene thresholds, the TLE working and archive
//! directories, download sources, and the external processing stages. Every
//! field has a default so a minimal config (or none, for tests) still
//! yields a runnable daemon.
//!
//! ## Loading order
//!
//! 1. Path given on the command line
//! 2. `PASSDECK_CONFIG` environment variable
//! 3. Built-in defaults (logged as a warning — fine for smoke tests only)

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Reception station identifier, used in log context only.
    pub station: String,
    /// NOAA platform names accepted for processing.
    pub supported_noaa: Vec<String>,
    /// Metop platform names accepted for processing.
    pub supported_metop: Vec<String>,
    /// Sensors this installation can process; a scene is skipped unless it
    /// carries at least one of these.
    pub sensors: Vec<String>,
    /// Minimum pass length in minutes; shorter passes are skipped.
    pub passlength_threshold_min: i64,
    /// How long an accepted scene blocks near-duplicate reruns, in minutes.
    pub locktime_before_rerun_min: u64,
    /// Parent directory for per-scene working directories.
    pub work_dir: PathBuf,
    /// Where per-scene log files are relocated after processing.
    pub log_dir: Option<PathBuf>,
    /// Prune dated log/archive subdirectories older than this many days.
    pub log_retention_days: Option<u64>,
    /// Default wall-clock bound for external commands, in seconds.
    pub command_timeout_secs: u64,
    pub tle: TleConfig,
    /// External processing stages run in order after TLE resolution.
    pub stages: Vec<StageConfig>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            station: "unknown".to_string(),
            supported_noaa: vec![
                "noaa15".to_string(),
                "noaa18".to_string(),
                "noaa19".to_string(),
            ],
            supported_metop: vec![
                "metop-a".to_string(),
                "metop-b".to_string(),
                "metop-c".to_string(),
            ],
            sensors: vec![
                "avhrr/3".to_string(),
                "amsu-a".to_string(),
                "mhs".to_string(),
                "hirs/4".to_string(),
            ],
            passlength_threshold_min: 5,
            locktime_before_rerun_min: 10,
            work_dir: std::env::temp_dir(),
            log_dir: None,
            log_retention_days: None,
            command_timeout_secs: 24 * 60 * 60,
            tle: TleConfig::default(),
            stages: Vec::new(),
        }
    }
}

/// TLE resolution configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TleConfig {
    /// TLE working directory holding raw element files and per-satellite
    /// index files.
    pub dir: PathBuf,
    /// chrono format template composing the expected TLE filename from the
    /// scene start time.
    pub infile_template: String,
    /// When set, use the closest-match search with this day tolerance
    /// instead of the index-mtime strategy.
    pub match_tolerance_days: Option<i64>,
    /// Look in a `YYYY_MM` subdirectory before the TLE dir itself.
    pub search_month_subdir: bool,
    /// Attempt a download when no local candidate qualifies.
    pub download: bool,
    pub download_sources: Vec<TleDownloadSource>,
    /// Archive root for ingested TLE files; archiving is skipped when unset.
    pub archive_dir: Option<PathBuf>,
    /// External ingestion command; receives dir, filename, satellite and
    /// index path on stdin, one per line.
    pub ingest_command: String,
}

impl Default for TleConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("tle_db"),
            infile_template: "tle_%Y%m%d_%H%M.txt".to_string(),
            match_tolerance_days: None,
            search_month_subdir: true,
            download: false,
            download_sources: Vec::new(),
            archive_dir: None,
            ingest_command: "tleing.exe".to_string(),
        }
    }
}

/// One TLE download source.
#[derive(Debug, Clone, Deserialize)]
pub struct TleDownloadSource {
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub passwd: Option<String>,
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
}

fn default_download_timeout() -> u64 {
    60
}

/// One external processing stage.
///
/// The command template may reference `{level0}`, `{workdir}`,
/// `{satellite}`, `{start_time}` and `{orbit}`; substitution happens per
/// scene. A fatal stage aborts the scene on failure; a non-fatal one only
/// degrades it.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub fatal: bool,
    /// Per-stage timeout override in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl RunnerConfig {
    /// Load from an explicit path, the `PASSDECK_CONFIG` env var, or fall
    /// back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("PASSDECK_CONFIG").ok().map(PathBuf::from));
        match path {
            Some(path) => Self::load(&path),
            None => {
                warn!("No configuration file given - using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.supported_noaa.is_empty() && self.supported_metop.is_empty() {
            bail!("No supported satellites configured - every scene would be skipped");
        }
        if self.passlength_threshold_min < 0 {
            bail!(
                "passlength_threshold_min must not be negative (got {})",
                self.passlength_threshold_min
            );
        }
        if self.locktime_before_rerun_min == 0 {
            bail!("locktime_before_rerun_min must be at least 1 minute");
        }
        if self.tle.infile_template.is_empty() {
            bail!("tle.infile_template must not be empty");
        }
        if let Some(days) = self.tle.match_tolerance_days {
            if days <= 0 {
                bail!("tle.match_tolerance_days must be positive (got {})", days);
            }
        }
        if self.tle.download && self.tle.download_sources.is_empty() {
            warn!("tle.download enabled but no download sources configured");
        }
        for stage in &self.stages {
            if stage.command.trim().is_empty() {
                bail!("Stage {:?} has an empty command", stage.name);
            }
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.command_timeout_secs)
    }

    pub fn lock_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.locktime_before_rerun_min * 60)
    }
}
