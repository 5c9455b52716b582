//! Scene deduplication / job registry
//!
//! Records the scenes recently accepted for processing, per platform, so a
//! burst of near-duplicate notifications for the same overpass (direct
//! broadcast vs. regional relay) collapses into one processing run. Each
//! accepted scene schedules one expiry task that removes its exact entry
//! after the configured lock duration; until then any overlapping
//! notification for the same platform and collection area is rejected.
//!
//! The registry only answers the uniqueness question and does the
//! insert/expiry bookkeeping — whether and when to register is the
//! scheduler's decision.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::interval::overlapping;

/// One registered scene: the interval it covers and the collection area it
/// was received for (`None` when area scoping is not in use).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneLock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub area: Option<String>,
}

impl SceneLock {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, area: Option<String>) -> Self {
        Self { start, end, area }
    }
}

/// Registry of recently accepted scenes, keyed by platform name.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    entries: Arc<Mutex<HashMap<String, Vec<SceneLock>>>>,
    lock_duration: Duration,
}

impl JobRegistry {
    pub fn new(lock_duration: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            lock_duration,
        }
    }

    /// First registered scene overlapping the candidate.
    ///
    /// Only registered entries with the same collection area are considered
    /// (exact match, `None` against `None` included); overlap against those
    /// uses the interval rule from [`crate::interval::overlapping`].
    pub async fn find_overlap(&self, platform: &str, candidate: &SceneLock) -> Option<SceneLock> {
        let entries = self.entries.lock().await;
        let scoped: Vec<&SceneLock> = entries
            .get(platform)?
            .iter()
            .filter(|lock| lock.area == candidate.area)
            .collect();
        let times: Vec<_> = scoped.iter().map(|lock| (lock.start, lock.end)).collect();
        let (start, end) = overlapping((candidate.start, candidate.end), &times)?;
        scoped
            .into_iter()
            .find(|lock| lock.start == start && lock.end == end)
            .cloned()
    }

    /// Is this scene new, or does it overlap a recently accepted one?
    pub async fn is_unique(&self, platform: &str, candidate: &SceneLock) -> bool {
        if let Some(existing) = self.find_overlap(platform, candidate).await {
            info!(
                "Processing of scene {} {} {} with overlapping time has been launched previously. Skip it!",
                platform, existing.start, existing.end
            );
            return false;
        }
        debug!("No overlap with any recently processed scenes");
        true
    }

    /// Record an accepted scene and schedule its expiry.
    ///
    /// The spawned task removes this exact entry after the lock duration; it
    /// runs concurrently with the event loop and other expiry tasks.
    pub async fn register(&self, platform: &str, lock: SceneLock) {
        {
            let mut entries = self.entries.lock().await;
            entries
                .entry(platform.to_string())
                .or_default()
                .push(lock.clone());
            debug!("Job register after insert: {:?}", *entries);
        }

        let registry = self.clone();
        let platform = platform.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(registry.lock_duration).await;
            registry.expire(&platform, &lock).await;
        });
    }

    /// Remove a registered scene by exact value.
    ///
    /// A missing entry is only worth a warning — it may already have been
    /// removed by a concurrent expiry.
    pub async fn expire(&self, platform: &str, lock: &SceneLock) {
        let mut entries = self.entries.lock().await;
        let removed = match entries.get_mut(platform) {
            Some(locks) => {
                let before = locks.len();
                locks.retain(|l| l != lock);
                locks.len() < before
            }
            None => false,
        };
        if removed {
            debug!(
                "Release job-key {} {} {} from job registry",
                platform, lock.start, lock.end
            );
        } else {
            warn!(
                "Nothing to release - register didn't contain any entry matching: {}",
                platform
            );
        }
    }

    /// Number of live entries for a platform (test and status use).
    pub async fn entry_count(&self, platform: &str) -> usize {
        let entries = self.entries.lock().await;
        entries.get(platform).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 19, h, mi, 0).unwrap()
    }

    fn lock(start_min: u32, end_min: u32, area: Option<&str>) -> SceneLock {
        SceneLock::new(
            utc(14, start_min),
            utc(14, end_min),
            area.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn test_empty_registry_is_unique() {
        let registry = JobRegistry::new(Duration::from_secs(600));
        assert!(registry.is_unique("noaa19", &lock(0, 15, None)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_rejected_until_lock_expires() {
        let registry = JobRegistry::new(Duration::from_secs(600));
        let scene = lock(0, 15, None);

        registry.register("noaa19", scene.clone()).await;
        // Let the expiry task start its timer before the clock moves.
        tokio::task::yield_now().await;
        assert!(!registry.is_unique("noaa19", &scene).await);

        // Still inside the lock window.
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(!registry.is_unique("noaa19", &scene).await);

        // Past the lock duration the expiry task has removed the entry.
        tokio::time::advance(Duration::from_secs(301)).await;
        tokio::task::yield_now().await;
        assert!(registry.is_unique("noaa19", &scene).await);
        assert_eq!(registry.entry_count("noaa19").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_scene_rejected() {
        let registry = JobRegistry::new(Duration::from_secs(600));
        registry.register("noaa19", lock(0, 15, None)).await;

        // Shifted by a few minutes, still the same overpass.
        assert!(!registry.is_unique("noaa19", &lock(5, 20, None)).await);
        // A different platform is unaffected.
        assert!(registry.is_unique("metop-b", &lock(5, 20, None)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_area_scoping_keeps_scenes_distinct() {
        let registry = JobRegistry::new(Duration::from_secs(600));
        registry.register("noaa19", lock(0, 15, Some("euron1"))).await;

        // Same platform and times but another collection area: unique.
        assert!(
            registry
                .is_unique("noaa19", &lock(0, 15, Some("germ")))
                .await
        );
        assert!(
            !registry
                .is_unique("noaa19", &lock(0, 15, Some("euron1")))
                .await
        );
    }

    #[tokio::test]
    async fn test_expire_missing_entry_is_harmless() {
        let registry = JobRegistry::new(Duration::from_secs(600));
        // Logs a warning, does not panic or error.
        registry.expire("noaa19", &lock(0, 15, None)).await;
        assert_eq!(registry.entry_count("noaa19").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_expiries() {
        let registry = JobRegistry::new(Duration::from_secs(600));
        let first = lock(0, 15, None);
        registry.register("noaa19", first.clone()).await;
        // Let the expiry task start its timer before the clock moves.
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(400)).await;
        let second = lock(30, 45, None);
        registry.register("noaa19", second.clone()).await;
        tokio::task::yield_now().await;
        assert_eq!(registry.entry_count("noaa19").await, 2);

        // First lock expires, second survives its own full window.
        tokio::time::advance(Duration::from_secs(201)).await;
        tokio::task::yield_now().await;
        assert_eq!(registry.entry_count("noaa19").await, 1);
        assert!(registry.is_unique("noaa19", &first).await);
        assert!(!registry.is_unique("noaa19", &second).await);
    }
}
