//! Scene scheduling controller
//!
//! Drives the life of every inbound notification: validate it into a scene,
//! reject near-duplicates against the job registry, prepare orbital
//! elements, run the configured external stages in an isolated working
//! directory, then register the scene and clean up. Notifications are
//! handled strictly one at a time — overpasses arrive minutes apart and the
//! external stages are not reentrant.

mod source;

pub use source::{ChannelSource, NotificationSource, StdinSource};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cleanup;
use crate::config::RunnerConfig;
use crate::interval::overlap_fraction;
use crate::process::{CommandSpec, ProcessRunner};
use crate::registry::{JobRegistry, SceneLock};
use crate::tle;
use crate::types::{
    Platform, SceneIdentity, SceneNotification, SceneOutcome, DEFAULT_PASS_MINUTES,
};

/// Fractional overlap above which two notifications are treated as the same
/// overpass rather than a suspicious partial collision.
const SAME_SCENE_OVERLAP: f64 = 0.85;

/// Counters for one scheduler run, reported at shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerStats {
    pub received: u64,
    pub skipped: u64,
    pub duplicates: u64,
    pub processed: u64,
    pub failed: u64,
}

pub struct SceneScheduler {
    config: Arc<RunnerConfig>,
    registry: JobRegistry,
    runner: ProcessRunner,
}

impl SceneScheduler {
    pub fn new(config: Arc<RunnerConfig>) -> Self {
        let registry = JobRegistry::new(config.lock_duration());
        let runner = ProcessRunner::new(config.command_timeout());
        Self {
            config,
            registry,
            runner,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Consume notifications until the source closes or shutdown is
    /// requested.
    pub async fn run(
        &self,
        source: &mut dyn NotificationSource,
        shutdown: CancellationToken,
    ) -> SchedulerStats {
        info!(
            "Scene scheduler up for station {} (source: {})",
            self.config.station,
            source.source_name()
        );

        let mut stats = SchedulerStats::default();
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                next = source.next_notification() => next,
            };
            let msg = match next {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    info!("Notification source {} closed", source.source_name());
                    break;
                }
                Err(e) => {
                    error!("Notification source failed: {}", e);
                    break;
                }
            };

            stats.received += 1;
            match self.handle_notification(&msg).await {
                SceneOutcome::Skipped => stats.skipped += 1,
                SceneOutcome::Duplicate => stats.duplicates += 1,
                SceneOutcome::Processed => stats.processed += 1,
                SceneOutcome::Failed => stats.failed += 1,
            }
        }

        info!(
            "Scheduler stopping: {} received / {} processed / {} duplicates / {} skipped / {} failed",
            stats.received, stats.processed, stats.duplicates, stats.skipped, stats.failed
        );
        stats
    }

    /// Take one notification through the full scene lifecycle.
    pub async fn handle_notification(&self, msg: &SceneNotification) -> SceneOutcome {
        let Some(identity) = self.validate(msg) else {
            return SceneOutcome::Skipped;
        };
        let scene_id = identity.scene_id();
        info!(
            "Accepted scene {} ({} - {})",
            scene_id, identity.start, identity.end
        );

        let lock = SceneLock::new(identity.start, identity.end, identity.area.clone());
        if let Some(existing) = self
            .registry
            .find_overlap(&identity.platform_name, &lock)
            .await
        {
            let fraction = overlap_fraction(
                (identity.start, identity.end),
                (existing.start, existing.end),
            );
            if fraction >= SAME_SCENE_OVERLAP {
                info!(
                    "Scene {} is the same overpass as one launched previously ({:.0}% overlap). Skip it.",
                    scene_id,
                    fraction * 100.0
                );
            } else {
                warn!(
                    "Scene {} only partially overlaps a registered scene ({:.0}%). Check the pass timings. Skip it.",
                    scene_id,
                    fraction * 100.0
                );
            }
            return SceneOutcome::Duplicate;
        }

        let workdir = match tempfile::Builder::new()
            .prefix(&format!("{}_", scene_id))
            .tempdir_in(&self.config.work_dir)
        {
            Ok(dir) => dir,
            Err(e) => {
                error!(
                    "Failed to create working directory under {:?}: {}",
                    self.config.work_dir, e
                );
                return SceneOutcome::Failed;
            }
        };
        debug!("Working dir for scene {}: {:?}", scene_id, workdir.path());

        let outcome = match self.process_scene(msg, &identity, workdir.path()).await {
            Ok(()) => {
                self.registry.register(&identity.platform_name, lock).await;
                info!(
                    "Scene {} done, locked against reruns for {} min",
                    scene_id, self.config.locktime_before_rerun_min
                );
                SceneOutcome::Processed
            }
            Err(e) => {
                // Not registered - a corrected retry of the same pass can
                // still go through.
                error!("Processing of scene {} failed: {:#}", scene_id, e);
                SceneOutcome::Failed
            }
        };

        self.relocate_and_prune(&identity, workdir.path());
        // Dropping the TempDir removes whatever scratch files remain.
        outcome
    }

    /// Turn a notification into a scene identity, or explain why not.
    fn validate(&self, msg: &SceneNotification) -> Option<SceneIdentity> {
        if !msg.has_files() {
            info!(
                "Notification for {} carries no files. Skip it.",
                msg.platform_name
            );
            return None;
        }

        let Some(platform) = Platform::resolve(&msg.platform_name, &self.config) else {
            info!("Platform {} not supported. Skip it.", msg.platform_name);
            return None;
        };

        let start = msg.start_time.and_utc();
        let end = match msg.end_time {
            Some(end) => end.and_utc(),
            None => {
                warn!(
                    "No end_time in notification. Assuming a {} minute pass.",
                    DEFAULT_PASS_MINUTES
                );
                start + chrono::Duration::minutes(DEFAULT_PASS_MINUTES)
            }
        };
        if end <= start {
            warn!(
                "Scene for {} ends before it starts ({} - {}). Skip it.",
                msg.platform_name, start, end
            );
            return None;
        }

        let identity = SceneIdentity {
            platform_name: msg.platform_name.clone(),
            platform,
            start,
            end,
            area: msg.collection_area_id.clone(),
            orbit_number: msg.orbit_number,
        };

        if identity.pass_length() < chrono::Duration::minutes(self.config.passlength_threshold_min)
        {
            info!(
                "Pass for {} too short: {} s is below the {} min threshold. Skip it.",
                identity.platform_name,
                identity.pass_length().num_seconds(),
                self.config.passlength_threshold_min
            );
            return None;
        }

        let sensors = msg.sensors();
        if !sensors.iter().any(|s| self.config.sensors.contains(s)) {
            info!(
                "No processable sensor among {:?} for {}. Skip it.",
                sensors, identity.platform_name
            );
            return None;
        }

        Some(identity)
    }

    /// TLE preparation plus the configured external stages.
    async fn process_scene(
        &self,
        msg: &SceneNotification,
        identity: &SceneIdentity,
        workdir: &Path,
    ) -> anyhow::Result<()> {
        match tle::resolve_and_ingest(
            &self.config.tle,
            &self.runner,
            &identity.platform_name,
            identity.start,
        )
        .await
        {
            Ok(true) => debug!("TLEs ingested for {}", identity.platform_name),
            Ok(false) => warn!(
                "No TLEs ingested for {}. Continuing with the existing index.",
                identity.platform_name
            ),
            Err(e) => warn!(
                "TLE preparation failed: {}. The processing might still work, so continue.",
                e
            ),
        }

        let level0 = primary_uri(msg);
        for stage in &self.config.stages {
            let command = compose_command(&stage.command, identity, workdir, &level0);
            info!("Running stage {}: {}", stage.name, command);

            let timeout = stage
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| self.config.command_timeout());
            let spec = CommandSpec::shell(command)
                .with_cwd(workdir)
                .with_timeout(timeout)
                .with_stdout_logfile(workdir.join(format!("{}.log", stage.name)))
                .with_stderr_logfile(workdir.join(format!("{}_err.log", stage.name)));

            let outcome = self.runner.run(spec).await;
            if outcome.ok() {
                debug!("Stage {} done", stage.name);
                continue;
            }
            if stage.fatal {
                anyhow::bail!(
                    "fatal stage {} failed (exit code {})",
                    stage.name,
                    outcome.exit_code
                );
            }
            warn!(
                "Non-fatal stage {} failed (exit code {}). Continuing.",
                stage.name, outcome.exit_code
            );
        }
        Ok(())
    }

    /// Post-scene housekeeping, unconditional and best-effort.
    fn relocate_and_prune(&self, identity: &SceneIdentity, workdir: &Path) {
        if let Some(log_root) = &self.config.log_dir {
            cleanup::relocate_logs(workdir, log_root, &identity.scene_id());
            if let Some(days) = self.config.log_retention_days {
                cleanup::prune_old_dirs(log_root, days);
            }
        }
        if let (Some(archive), Some(days)) =
            (&self.config.tle.archive_dir, self.config.log_retention_days)
        {
            cleanup::prune_old_dirs(archive, days);
        }
    }
}

/// The level-0 input referenced by the notification: the single `uri`, or
/// the first dataset entry for collection messages.
fn primary_uri(msg: &SceneNotification) -> String {
    let uri = msg
        .uri
        .clone()
        .or_else(|| {
            msg.dataset
                .as_ref()
                .and_then(|d| d.first())
                .map(|entry| entry.uri.clone())
        })
        .unwrap_or_default();
    uri.strip_prefix("file://").map(str::to_string).unwrap_or(uri)
}

/// Fill the per-scene placeholders of a stage command template.
fn compose_command(
    template: &str,
    identity: &SceneIdentity,
    workdir: &Path,
    level0: &str,
) -> String {
    template
        .replace("{level0}", level0)
        .replace("{workdir}", &workdir.to_string_lossy())
        .replace("{satellite}", &identity.platform_name)
        .replace(
            "{start_time}",
            &identity.start.format("%Y%m%d%H%M%S").to_string(),
        )
        .replace(
            "{orbit}",
            &identity
                .orbit_number
                .map(|o| o.to_string())
                .unwrap_or_default(),
        )
}
