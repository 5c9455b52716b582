//! Passdeck: satellite overpass scene scheduling
//!
//! Ground-station daemon that turns reception notifications into processed
//! scenes.
//!
//! ## Architecture
//!
//! - **Scheduler**: validates notifications, rejects near-duplicate passes,
//!   drives the external processing stages one scene at a time
//! - **Job Registry**: self-expiring locks against reprocessing the same
//!   overpass
//! - **TLE Subsystem**: locate, ingest and archive orbital element files
//! - **Process Runner**: bounded execution of the external pipeline tools

pub mod cleanup;
pub mod config;
pub mod interval;
pub mod process;
pub mod registry;
pub mod scheduler;
pub mod tle;
pub mod types;

// Re-export configuration
pub use config::{RunnerConfig, StageConfig, TleConfig};

// Re-export commonly used types
pub use types::{Platform, SceneIdentity, SceneNotification, SceneOutcome};

// Re-export the scheduling entry points
pub use scheduler::{ChannelSource, NotificationSource, SceneScheduler, StdinSource};

// Re-export the process runner
pub use process::{CommandSpec, ProcessRunner, RunOutcome};

pub use registry::{JobRegistry, SceneLock};
