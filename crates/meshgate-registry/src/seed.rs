//! Precompiled and override seed sources
//!
//! Both are JSON documents of the same shape:
//!
//! ```json
//! {
//!     "version": 1,
//!     "package_version": "0.1.0",
//!     "download_timestamp": 1718000000.0,
//!     "reported_timestamp": 1717990000.0,
//!     "min_package_version": "0.1.0",
//!     "url": "https://...",
//!     "tuples": [["!a1b2c3d4", "N0CALL-1", null, 1717980000.0]]
//! }
//! ```
//!
//! The precompiled list is a community seed cached in the data directory and
//! refreshed from `url` once it is more than a day old. Refresh failures of
//! any kind keep the cached copy. Overrides are read once and dated far in
//! the future so they win every merge.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::event::{now_seconds, Registration, Source};

/// Copy of the seed list shipped with this crate
pub const BUNDLED_PRECOMPILED: &str = include_str!("../res/precompiled_registrations.json");

/// Age after which the cached seed list is refreshed
pub const REFRESH_AFTER_SECS: f64 = 24.0 * 3600.0;

/// How far in the future override events are dated
pub const OVERRIDE_HORIZON_SECS: f64 = 1000.0 * 365.0 * 24.0 * 3600.0;

/// One `[device_id, call_sign, icon, timestamp]` tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedTuple(
    pub Option<String>,
    pub Option<String>,
    pub Option<serde_json::Value>,
    pub f64,
);

impl SeedTuple {
    fn into_registration(self, timestamp: f64, source: Source) -> Registration {
        let icon = self.2.and_then(|v| v.as_str().map(str::to_string));
        Registration::new(self.0, self.1, icon, timestamp, source)
    }
}

/// A seed list document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFile {
    /// Document format version
    #[serde(default)]
    pub version: u32,
    /// Version of the software that produced the document
    #[serde(default)]
    pub package_version: String,
    /// When this copy was downloaded
    #[serde(default)]
    pub download_timestamp: f64,
    /// When the publisher generated the list
    #[serde(default)]
    pub reported_timestamp: f64,
    /// Oldest client version allowed to use the list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_package_version: Option<String>,
    /// Where fresh copies are fetched from
    #[serde(default)]
    pub url: String,
    /// Registration tuples
    #[serde(default)]
    pub tuples: Vec<SeedTuple>,
}

impl SeedFile {
    /// Decode the seed list shipped with this crate
    pub fn bundled() -> Result<Self> {
        Ok(serde_json::from_str(BUNDLED_PRECOMPILED)?)
    }

    /// True when `version` is new enough for this document
    pub fn accepts(&self, version: &str) -> bool {
        let Some(min) = self.min_package_version.as_deref() else {
            return true;
        };
        match (semver::Version::parse(min), semver::Version::parse(version)) {
            (Ok(min), Ok(current)) => current >= min,
            _ => {
                warn!(min_package_version = %min, "Unparseable version in seed list");
                false
            }
        }
    }

    /// Tuples as Precompiled events, with timestamps clamped to `now`
    pub fn precompiled_events(&self, now: f64) -> Vec<Registration> {
        self.tuples
            .iter()
            .cloned()
            .map(|t| {
                let ts = t.3.min(now);
                t.into_registration(ts, Source::Precompiled)
            })
            .collect()
    }

    /// Tuples as Override events dated far in the future
    pub fn override_events(&self, now: f64) -> Vec<Registration> {
        let future = now + OVERRIDE_HORIZON_SECS;
        self.tuples
            .iter()
            .cloned()
            .map(|t| t.into_registration(future, Source::Override))
            .collect()
    }
}

/// Options controlling the precompiled refresh
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Fetch a fresh seed list when the cached one is stale
    pub refresh_precompiled: bool,
    /// Fetch from here instead of the URL recorded in the cached copy
    pub precompiled_url: Option<String>,
    /// HTTP timeout for the refresh
    pub fetch_timeout: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            refresh_precompiled: true,
            precompiled_url: None,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl RegistryOptions {
    /// Options that never touch the network
    pub fn offline() -> Self {
        Self {
            refresh_precompiled: false,
            ..Default::default()
        }
    }
}

async fn read_seed(path: &Path) -> Result<SeedFile> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

async fn write_seed(path: &Path, seed: &SeedFile) -> Result<()> {
    let text = serde_json::to_string_pretty(seed)?;
    tokio::fs::write(path, text).await?;
    Ok(())
}

fn fetch_blocking(url: &str, timeout: Duration) -> Result<SeedFile> {
    let response = ureq::get(url).timeout(timeout).call()?;
    response
        .into_json::<SeedFile>()
        .map_err(|e| RegistryError::Seed(e.to_string()))
}

async fn fetch(url: String, timeout: Duration) -> Result<SeedFile> {
    tokio::task::spawn_blocking(move || fetch_blocking(&url, timeout))
        .await
        .map_err(|e| RegistryError::Seed(e.to_string()))?
}

/// Load the cached precompiled list, refreshing it when stale
///
/// Never fails: an unreadable cache yields an empty list and a failed
/// refresh keeps whatever was cached.
pub async fn load_precompiled(path: &Path, options: &RegistryOptions) -> SeedFile {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Installing bundled precompiled registrations");
        if let Err(e) = tokio::fs::write(path, BUNDLED_PRECOMPILED).await {
            warn!(error = %e, "Failed to install bundled precompiled registrations");
        }
    }

    let mut seed = match read_seed(path).await {
        Ok(seed) => seed,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Ignoring unreadable precompiled registrations");
            SeedFile::bundled().unwrap_or_else(|_| empty_seed())
        }
    };

    let now = now_seconds();
    if options.refresh_precompiled && now - seed.download_timestamp > REFRESH_AFTER_SECS {
        let url = options
            .precompiled_url
            .clone()
            .unwrap_or_else(|| seed.url.clone());

        match refresh(&url, options.fetch_timeout, now).await {
            Ok(fresh) => {
                info!(entries = fresh.tuples.len(), "Refreshed precompiled registrations");
                if let Err(e) = write_seed(path, &fresh).await {
                    warn!(error = %e, "Failed to cache precompiled registrations");
                }
                seed = fresh;
            }
            Err(e) => warn!(error = %e, %url, "Keeping cached precompiled registrations"),
        }
    }

    seed
}

async fn refresh(url: &str, timeout: Duration, now: f64) -> Result<SeedFile> {
    if url.is_empty() {
        return Err(RegistryError::Seed("no seed list URL".to_string()));
    }
    debug!(%url, "Downloading precompiled registrations");

    let mut fresh = fetch(url.to_string(), timeout).await?;
    if !fresh.accepts(env!("CARGO_PKG_VERSION")) {
        return Err(RegistryError::Seed(format!(
            "seed list requires version {}",
            fresh.min_package_version.as_deref().unwrap_or_default()
        )));
    }

    fresh.download_timestamp = now;
    fresh.reported_timestamp = fresh.reported_timestamp.min(now);
    if fresh.url.is_empty() {
        fresh.url = url.to_string();
    }
    Ok(fresh)
}

/// Load the override list, or an empty one when absent or unreadable
pub async fn load_overrides(path: &Path) -> SeedFile {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return empty_seed();
    }
    match read_seed(path).await {
        Ok(seed) => {
            info!(entries = seed.tuples.len(), "Loaded registration overrides");
            seed
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Ignoring unreadable registration overrides");
            empty_seed()
        }
    }
}

fn empty_seed() -> SeedFile {
    SeedFile {
        version: 1,
        package_version: env!("CARGO_PKG_VERSION").to_string(),
        download_timestamp: 0.0,
        reported_timestamp: 0.0,
        min_package_version: None,
        url: String::new(),
        tuples: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_with(tuples: Vec<SeedTuple>) -> SeedFile {
        SeedFile {
            tuples,
            ..empty_seed()
        }
    }

    #[test]
    fn test_bundled_seed_decodes() {
        let seed = SeedFile::bundled().unwrap();
        assert!(seed.url.starts_with("https://"));
        assert!(!seed.tuples.is_empty());
        assert!(seed.accepts(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_tuple_decoding() {
        let seed: SeedFile = serde_json::from_str(
            r#"{"url": "", "tuples": [["!a1b2c3d4", "N0CALL-1", null, 10], [null, "N0CALL-2", "MV", 11.5]]}"#,
        )
        .unwrap();
        assert_eq!(seed.tuples.len(), 2);

        let events = seed.precompiled_events(100.0);
        assert_eq!(events[0].device_id.as_deref(), Some("!a1b2c3d4"));
        assert_eq!(events[0].timestamp, 10.0);
        assert_eq!(events[1].icon.as_deref(), Some("MV"));
        assert!(events[1].is_tombstone());
    }

    #[test]
    fn test_precompiled_timestamps_clamped() {
        let seed = seed_with(vec![SeedTuple(
            Some("!a1b2c3d4".into()),
            Some("N0CALL-1".into()),
            None,
            5_000.0,
        )]);
        let events = seed.precompiled_events(1_000.0);
        assert_eq!(events[0].timestamp, 1_000.0);
        assert_eq!(events[0].source, Source::Precompiled);
    }

    #[test]
    fn test_overrides_dated_in_future() {
        let seed = seed_with(vec![SeedTuple(
            Some("!a1b2c3d4".into()),
            Some("N0CALL-1".into()),
            None,
            5.0,
        )]);
        let events = seed.override_events(1_000.0);
        assert!(events[0].timestamp > 1_000.0 + 900.0 * 365.0 * 24.0 * 3600.0);
        assert_eq!(events[0].source, Source::Override);
    }

    #[test]
    fn test_min_package_version() {
        let mut seed = empty_seed();
        assert!(seed.accepts("0.1.0"));

        seed.min_package_version = Some("0.2.0".to_string());
        assert!(!seed.accepts("0.1.9"));
        assert!(seed.accepts("0.2.0"));
        assert!(seed.accepts("1.0.0"));

        seed.min_package_version = Some("not a version".to_string());
        assert!(!seed.accepts("1.0.0"));
    }

    #[tokio::test]
    async fn test_missing_cache_installs_bundled_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("precompiled_registrations.json");

        let seed = load_precompiled(&path, &RegistryOptions::offline()).await;
        assert!(path.exists());
        assert_eq!(seed, SeedFile::bundled().unwrap());
    }

    #[tokio::test]
    async fn test_malformed_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("precompiled_registrations.json");
        std::fs::write(&path, "{ not json").unwrap();

        let seed = load_precompiled(&path, &RegistryOptions::offline()).await;
        assert_eq!(seed, SeedFile::bundled().unwrap());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("precompiled_registrations.json");
        let cached = seed_with(vec![SeedTuple(
            Some("!a1b2c3d4".into()),
            Some("N0CALL-1".into()),
            None,
            5.0,
        )]);
        write_seed(&path, &cached).await.unwrap();

        let options = RegistryOptions {
            refresh_precompiled: true,
            precompiled_url: Some("http://127.0.0.1:9/seed.json".to_string()),
            fetch_timeout: Duration::from_secs(2),
        };
        let seed = load_precompiled(&path, &options).await;
        assert_eq!(seed, cached);
    }

    #[tokio::test]
    async fn test_overrides_absent_or_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registration_overrides.json");
        assert!(load_overrides(&path).await.tuples.is_empty());

        std::fs::write(&path, "[]").unwrap();
        assert!(load_overrides(&path).await.tuples.is_empty());
    }
}
