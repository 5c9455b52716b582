//! TLE download fallback
//!
//! Used only when no local candidate qualifies and downloads are enabled.
//! Supports plain HTTP(S) sources and the space-track provider, whose API
//! needs a login POST followed by a cookie-bearing catalogue query. Whatever
//! text is fetched gets appended to the expected local filename so the
//! normal ingestion path picks it up.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::config::{TleConfig, TleDownloadSource};

/// NORAD catalogue numbers for the polar orbiters this runner handles.
const NORAD_CATALOGUE: &str =
    "25338,26536,27453,28654,33591,37849,29499,38771,27431,32958,37214,25994,27424";

/// Fetch TLE text from the configured sources into the expected local file.
///
/// Every source is tried; failures are logged and skipped. Returns the list
/// of files written (at most one path, possibly appended to repeatedly).
pub(super) async fn download_tles(config: &TleConfig, timestamp: DateTime<Utc>) -> Vec<PathBuf> {
    let infile = config
        .dir
        .join(timestamp.format(&config.infile_template).to_string());

    let mut written = Vec::new();
    for source in &config.download_sources {
        for url in source.url.split_whitespace() {
            debug!("Will try to download TLE from {}", url);
            let fetched = if url.contains("space-track") {
                fetch_space_track(source, url).await
            } else {
                fetch_plain(source, url).await
            };
            match fetched {
                Ok(text) if !text.is_empty() => {
                    if let Err(e) = append_to_file(&infile, &text) {
                        error!("Failed writing downloaded TLE to {:?}: {}", infile, e);
                        continue;
                    }
                    if !written.contains(&infile) {
                        written.push(infile.clone());
                    }
                }
                Ok(_) => warn!("Empty TLE response from {}", url),
                Err(e) => error!("TLE download from {} failed: {}", url, e),
            }
        }
    }
    written
}

async fn fetch_plain(source: &TleDownloadSource, url: &str) -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(source.timeout_secs))
        .build()?;
    client.get(url).send().await?.error_for_status()?.text().await
}

/// The space-track flow: login with identity/password, then query the
/// latest elements for the catalogue with the session cookie.
async fn fetch_space_track(
    source: &TleDownloadSource,
    url: &str,
) -> Result<String, reqwest::Error> {
    let user = credential(&source.user, "PASSDECK_TLE_USER");
    let passwd = credential(&source.passwd, "PASSDECK_TLE_PASSWD");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(source.timeout_secs))
        .cookie_store(true)
        .build()?;

    client
        .post(format!("{}/ajaxauth/login", url))
        .form(&[("identity", user.as_str()), ("password", passwd.as_str())])
        .send()
        .await?
        .error_for_status()?;
    debug!("space-track login ok");

    let query = format!(
        "{}/basicspacedata/query/class/tle_latest/ORDINAL/1/NORAD_CAT_ID/{}/orderby/TLE_LINE1",
        url, NORAD_CATALOGUE
    );
    client
        .get(query)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

fn credential(configured: &Option<String>, env_key: &str) -> String {
    configured
        .clone()
        .or_else(|| std::env::var(env_key).ok())
        .unwrap_or_else(|| {
            warn!("No credential configured and {} not set", env_key);
            String::new()
        })
}

fn append_to_file(path: &PathBuf, text: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(text.as_bytes())
}
