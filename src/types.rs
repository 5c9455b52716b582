//! Domain types for scene scheduling
//!
//! The inbound notification is an opaque key-value record published by the
//! reception station; [`SceneNotification`] is the typed view of the fields
//! the scheduler needs. [`SceneIdentity`] is what a notification becomes
//! once validated — immutable for the lifetime of one processing attempt.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::config::RunnerConfig;

/// Closed set of supported satellite families.
///
/// Resolved once per notification from the configured platform lists;
/// downstream stages match exhaustively instead of re-testing name
/// substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Noaa,
    Metop,
}

impl Platform {
    /// Resolve a platform name against the configured satellite lists.
    pub fn resolve(platform_name: &str, config: &RunnerConfig) -> Option<Self> {
        if config
            .supported_noaa
            .iter()
            .any(|name| name == platform_name)
        {
            Some(Platform::Noaa)
        } else if config
            .supported_metop
            .iter()
            .any(|name| name == platform_name)
        {
            Some(Platform::Metop)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Noaa => write!(f, "noaa"),
            Platform::Metop => write!(f, "metop"),
        }
    }
}

/// `sensor` arrives as either a single name or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SensorField {
    One(String),
    Many(Vec<String>),
}

impl SensorField {
    pub fn names(&self) -> Vec<String> {
        match self {
            SensorField::One(name) => vec![name.clone()],
            SensorField::Many(names) => names.clone(),
        }
    }
}

/// One file reference inside a `dataset` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetEntry {
    pub uri: String,
    #[serde(default)]
    pub sensor: Option<String>,
}

/// Typed view of an inbound scene notification.
///
/// Timestamps on the wire are naive ISO strings (`2021-01-19T14:08:26`)
/// and are interpreted as UTC.
#[derive(Debug, Clone, Deserialize)]
pub struct SceneNotification {
    pub platform_name: String,
    pub start_time: NaiveDateTime,
    #[serde(default)]
    pub end_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub orbit_number: Option<u32>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub dataset: Option<Vec<DatasetEntry>>,
    #[serde(default)]
    pub sensor: Option<SensorField>,
    #[serde(default)]
    pub collection_area_id: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

impl SceneNotification {
    /// Does the notification reference any input file at all?
    pub fn has_files(&self) -> bool {
        self.uri.is_some() || self.dataset.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// All sensor names carried by the message, from both the top-level
    /// `sensor` field and per-file dataset entries.
    pub fn sensors(&self) -> Vec<String> {
        let mut sensors = self
            .sensor
            .as_ref()
            .map(SensorField::names)
            .unwrap_or_default();
        if let Some(dataset) = &self.dataset {
            for entry in dataset {
                if let Some(sensor) = &entry.sensor {
                    if !sensors.iter().any(|s| s == sensor) {
                        sensors.push(sensor.clone());
                    }
                }
            }
        }
        sensors
    }
}

/// When a notification carries no end time, assume a full overpass of
/// 14 minutes from the start.
pub const DEFAULT_PASS_MINUTES: i64 = 14;

/// The identity of one scene, derived from a validated notification.
#[derive(Debug, Clone)]
pub struct SceneIdentity {
    pub platform_name: String,
    pub platform: Platform,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub area: Option<String>,
    pub orbit_number: Option<u32>,
}

impl SceneIdentity {
    /// Stable string id used for working-directory and log-directory names:
    /// `<platform>_<start>_<end>` with compact timestamps.
    pub fn scene_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.platform_name,
            self.start.format("%Y%m%d%H%M%S"),
            self.end.format("%Y%m%d%H%M%S")
        )
    }

    pub fn pass_length(&self) -> Duration {
        self.end - self.start
    }
}

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneOutcome {
    /// Not applicable: wrong satellite, too short, malformed. No state changed.
    Skipped,
    /// Overlaps a recently processed scene. No state changed.
    Duplicate,
    /// Fully processed and registered against reruns.
    Processed,
    /// Accepted but failed mid-pipeline; NOT registered, so a retry can work.
    Failed,
}
