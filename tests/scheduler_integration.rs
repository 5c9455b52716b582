//! End-to-end scheduler tests
//!
//! Drive real notifications through the full scene lifecycle with stub
//! external commands: TLE closest-match selection, ingestion into the
//! satellite index, archiving, stage execution, log relocation and the
//! duplicate lock.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use passdeck::config::{RunnerConfig, StageConfig};
use passdeck::scheduler::ChannelSource;
use passdeck::{SceneNotification, SceneOutcome, SceneScheduler};

/// Appends "<satellite> <filename>" to the index path it is handed on
/// stdin, imitating the real ingestion tool's four-line protocol.
const STUB_INGEST: &str = r#"sh -c 'read d; read f; read s; read i; echo "$s $f" >> "$i"'"#;

fn reprocessing_config(root: &Path) -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.station = "test".to_string();
    config.work_dir = root.join("work");
    config.log_dir = Some(root.join("logs"));
    config.tle.dir = root.join("tle_db");
    config.tle.infile_template = "weather%Y%m%d%H%M.tle".to_string();
    config.tle.match_tolerance_days = Some(3);
    config.tle.archive_dir = Some(root.join("tle_archive"));
    config.tle.ingest_command = STUB_INGEST.to_string();
    config.stages = vec![StageConfig {
        name: "decommutation".to_string(),
        command: "echo decommutated {level0} for {satellite}".to_string(),
        fatal: true,
        timeout_secs: None,
    }];
    config.validate().expect("test config must validate");
    config
}

fn seed_tle_files(config: &RunnerConfig) {
    let tle_dir = &config.tle.dir;
    std::fs::create_dir_all(tle_dir).unwrap();
    std::fs::create_dir_all(&config.work_dir).unwrap();
    std::fs::write(tle_dir.join("weather202101180325.tle"), "1 A\n2 A\n").unwrap();
    std::fs::write(tle_dir.join("weather202101190616.tle"), "1 B\n2 B\n").unwrap();
}

fn noaa19_pass() -> SceneNotification {
    serde_json::from_str(
        r#"{"platform_name": "noaa19",
            "start_time": "2021-01-19T14:08:26",
            "end_time": "2021-01-19T14:22:26",
            "orbit_number": 61006,
            "uri": "file:///data/hrpt_noaa19_20210119_1408.l0",
            "sensor": ["avhrr/3", "mhs"]}"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_full_scene_lifecycle() {
    let root = tempfile::tempdir().unwrap();
    let config = reprocessing_config(root.path());
    seed_tle_files(&config);
    let scheduler = SceneScheduler::new(Arc::new(config.clone()));

    let outcome = scheduler.handle_notification(&noaa19_pass()).await;
    assert_eq!(outcome, SceneOutcome::Processed);

    // The exact file for 14:08 does not exist; the temporally closest one
    // (the 06:16 file of the same day) was ingested into the index.
    let index = config.tle.dir.join("tle_noaa19.index");
    let contents = std::fs::read_to_string(&index).unwrap();
    assert_eq!(contents.trim(), "noaa19 weather202101190616.tle");

    // The ingested file was archived under its own date.
    let archived = root
        .path()
        .join("tle_archive")
        .join("2021-01-19")
        .join("weather202101190616.tle");
    assert!(archived.is_file());

    // The stage's captured output was relocated to the per-scene log dir.
    let stage_log = root
        .path()
        .join("logs")
        .join("noaa19_20210119140826_20210119142226")
        .join("decommutation.log");
    let logged = std::fs::read_to_string(&stage_log).unwrap();
    assert_eq!(
        logged.trim(),
        "decommutated /data/hrpt_noaa19_20210119_1408.l0 for noaa19"
    );

    // The per-scene working directory was removed afterwards.
    assert_eq!(std::fs::read_dir(&config.work_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_relayed_copy_is_rejected_before_any_processing() {
    let root = tempfile::tempdir().unwrap();
    let config = reprocessing_config(root.path());
    seed_tle_files(&config);
    let scheduler = SceneScheduler::new(Arc::new(config.clone()));

    assert_eq!(
        scheduler.handle_notification(&noaa19_pass()).await,
        SceneOutcome::Processed
    );

    let index = config.tle.dir.join("tle_noaa19.index");
    let after_first = std::fs::read_to_string(&index).unwrap();

    // The same overpass via the regional relay, shifted by half a minute.
    let mut relay = noaa19_pass();
    relay.start_time = "2021-01-19T14:08:55".parse().unwrap();
    relay.end_time = Some("2021-01-19T14:21:55".parse().unwrap());
    assert_eq!(
        scheduler.handle_notification(&relay).await,
        SceneOutcome::Duplicate
    );

    // Rejected before TLE resolution: the index is untouched.
    assert_eq!(std::fs::read_to_string(&index).unwrap(), after_first);
}

#[tokio::test]
async fn test_repeated_ingestion_keeps_index_clean() {
    let root = tempfile::tempdir().unwrap();
    let config = reprocessing_config(root.path());
    seed_tle_files(&config);
    let scheduler = SceneScheduler::new(Arc::new(config.clone()));

    assert_eq!(
        scheduler.handle_notification(&noaa19_pass()).await,
        SceneOutcome::Processed
    );

    // A different pass later the same day resolves to the same TLE file;
    // the sort/dedup pass keeps exactly one index line per element key.
    let mut evening = noaa19_pass();
    evening.start_time = "2021-01-19T19:45:00".parse().unwrap();
    evening.end_time = Some("2021-01-19T19:58:00".parse().unwrap());
    assert_eq!(
        scheduler.handle_notification(&evening).await,
        SceneOutcome::Processed
    );

    let index = config.tle.dir.join("tle_noaa19.index");
    let contents = std::fs::read_to_string(&index).unwrap();
    assert_eq!(contents.lines().count(), 1);
}

#[tokio::test]
async fn test_event_loop_over_channel_source() {
    let root = tempfile::tempdir().unwrap();
    let config = reprocessing_config(root.path());
    seed_tle_files(&config);
    let scheduler = SceneScheduler::new(Arc::new(config));

    let (tx, rx) = mpsc::channel(8);
    tx.send(noaa19_pass()).await.unwrap();
    tx.send(noaa19_pass()).await.unwrap();
    let mut unsupported = noaa19_pass();
    unsupported.platform_name = "sentinel-1".to_string();
    tx.send(unsupported).await.unwrap();
    drop(tx);

    let mut source = ChannelSource::new(rx);
    let stats = scheduler.run(&mut source, CancellationToken::new()).await;

    assert_eq!(stats.received, 3);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_shutdown_stops_the_loop() {
    let root = tempfile::tempdir().unwrap();
    let config = reprocessing_config(root.path());
    let scheduler = SceneScheduler::new(Arc::new(config));

    // No messages and the sender stays alive: only cancellation can end
    // the loop.
    let (tx, rx) = mpsc::channel::<SceneNotification>(1);
    let mut source = ChannelSource::new(rx);

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let stats = scheduler.run(&mut source, shutdown).await;
    drop(tx);

    assert_eq!(stats.received, 0);
}
