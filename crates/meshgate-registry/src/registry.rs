//! The merged registration registry
//!
//! [`Registry`] gathers the four event sources, rebuilds the merged view by
//! full replay, and persists new Local/Beaconed events. Every write rebuilds
//! before returning so callers see their own updates.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::event::{now_seconds, Entry, MergedView, Registration, Source};
use crate::seed::{load_overrides, load_precompiled, RegistryOptions, SeedFile, SeedTuple};
use crate::store::RegistrationStore;

/// Registration database file name
pub const DATABASE_FILE: &str = "registrations.db";

/// Cached community seed list file name
pub const PRECOMPILED_FILE: &str = "precompiled_registrations.json";

/// Operator override file name
pub const OVERRIDES_FILE: &str = "registration_overrides.json";

/// Device id → call sign registry
pub struct Registry {
    data_dir: PathBuf,
    store: RegistrationStore,
    precompiled: SeedFile,
    precompiled_events: Vec<Registration>,
    overrides: Vec<Registration>,
    merged: MergedView,
    last_timestamp: f64,
}

impl Registry {
    /// Open the registry in `data_dir` with default options
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(data_dir, RegistryOptions::default()).await
    }

    /// Open the registry in `data_dir`
    ///
    /// Creates the directory and database when missing. Seed list problems
    /// are logged and never fail the open.
    pub async fn open_with(data_dir: impl AsRef<Path>, options: RegistryOptions) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;

        let store = RegistrationStore::open(&data_dir.join(DATABASE_FILE)).await?;
        let precompiled = load_precompiled(&data_dir.join(PRECOMPILED_FILE), &options).await;

        // Seed timestamps are clamped to the load time, once, so later local
        // and beaconed events always replay after them.
        let loaded_at = now_seconds();
        let precompiled_events = precompiled.precompiled_events(loaded_at);
        let overrides = load_overrides(&data_dir.join(OVERRIDES_FILE))
            .await
            .override_events(loaded_at);

        let mut registry = Self {
            data_dir,
            store,
            precompiled,
            precompiled_events,
            overrides,
            merged: MergedView::default(),
            last_timestamp: loaded_at,
        };
        registry.rebuild().await?;

        info!(
            data_dir = %registry.data_dir.display(),
            registrations = registry.len(),
            precompiled = registry.precompiled.tuples.len(),
            overrides = registry.overrides.len(),
            "Registry ready"
        );
        Ok(registry)
    }

    /// Directory holding the database and seed files
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Replay every known event into a fresh merged view
    pub async fn rebuild(&mut self) -> Result<()> {
        let mut events = self.precompiled_events.clone();
        events.extend(self.overrides.iter().cloned());
        events.extend(self.store.load_all().await?);

        self.merged = MergedView::replay(events);
        debug!(registrations = self.merged.len(), "Rebuilt registry");
        Ok(())
    }

    /// Record a registration and rebuild
    ///
    /// A `None` identity makes the event a tombstone for the other one.
    /// `is_local` selects the Local source, otherwise Beaconed.
    pub async fn add_registration(
        &mut self,
        device_id: Option<&str>,
        call_sign: Option<&str>,
        icon: Option<&str>,
        is_local: bool,
    ) -> Result<()> {
        if device_id.is_none() && call_sign.is_none() {
            return Err(RegistryError::InvalidArgument(
                "a registration needs a device id or a call sign".to_string(),
            ));
        }

        let source = if is_local {
            Source::Local
        } else {
            Source::Beaconed
        };
        let event = Registration::new(
            device_id.map(str::to_string),
            call_sign.map(|c| c.trim().to_uppercase()),
            icon.map(str::to_string),
            self.next_timestamp(),
            source,
        );

        debug!(
            device_id = ?event.device_id,
            call_sign = ?event.call_sign,
            ?source,
            "Adding registration"
        );
        self.store.insert(&event).await?;
        self.rebuild().await
    }

    // Strictly increasing so back-to-back writes replay in call order
    fn next_timestamp(&mut self) -> f64 {
        let now = now_seconds().max(self.last_timestamp + 1e-6);
        self.last_timestamp = now;
        now
    }

    /// Call sign bound to a device
    pub fn lookup(&self, device_id: &str) -> Option<&str> {
        self.merged.get(device_id).map(|e| e.call_sign.as_str())
    }

    /// Full binding for a device
    pub fn entry(&self, device_id: &str) -> Option<&Entry> {
        self.merged.get(device_id)
    }

    /// Device bound to a call sign (case-insensitive)
    pub fn lookup_by_call_sign(&self, call_sign: &str) -> Option<&str> {
        self.merged.device_for(call_sign)
    }

    /// True when the device has a binding
    pub fn contains(&self, device_id: &str) -> bool {
        self.merged.get(device_id).is_some()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.merged.len()
    }

    /// True when nothing is bound
    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// All bindings in device id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.merged.iter()
    }

    /// Export the merged view as a seed list document
    pub fn snapshot(&self) -> SeedFile {
        let now = now_seconds();
        SeedFile {
            version: 1,
            package_version: env!("CARGO_PKG_VERSION").to_string(),
            download_timestamp: now,
            reported_timestamp: now,
            min_package_version: None,
            url: self.precompiled.url.clone(),
            tuples: self
                .merged
                .iter()
                .map(|(device_id, entry)| {
                    SeedTuple(
                        Some(device_id.to_string()),
                        Some(entry.call_sign.clone()),
                        entry.icon.clone().map(serde_json::Value::String),
                        entry.timestamp.min(now),
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PRECOMPILED_FILE), r#"{"url": "", "tuples": []}"#).unwrap();
        let registry = Registry::open_with(dir.path(), RegistryOptions::offline())
            .await
            .unwrap();
        (dir, registry)
    }

    #[tokio::test]
    async fn test_register_and_reregister() {
        let (_dir, mut registry) = fresh().await;

        registry
            .add_registration(Some("!AAAAAAAA"), Some("N0CALL-1"), None, true)
            .await
            .unwrap();
        assert_eq!(registry.lookup("!AAAAAAAA"), Some("N0CALL-1"));

        registry
            .add_registration(Some("!AAAAAAAA"), Some("N0CALL-2"), None, true)
            .await
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("!AAAAAAAA"), Some("N0CALL-2"));
        assert_eq!(registry.lookup_by_call_sign("N0CALL-1"), None);
    }

    #[tokio::test]
    async fn test_unregister_with_tombstones() {
        let (_dir, mut registry) = fresh().await;

        registry
            .add_registration(Some("!AAAAAAAA"), Some("N0CALL-1"), None, true)
            .await
            .unwrap();
        registry
            .add_registration(Some("!AAAAAAAA"), None, None, true)
            .await
            .unwrap();
        registry
            .add_registration(None, Some("N0CALL-1"), None, true)
            .await
            .unwrap();

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_both_identities_missing_is_rejected() {
        let (_dir, mut registry) = fresh().await;
        registry
            .add_registration(Some("!AAAAAAAA"), Some("N0CALL-1"), None, true)
            .await
            .unwrap();

        let err = registry
            .add_registration(None, None, Some("MV"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("!AAAAAAAA"), Some("N0CALL-1"));
    }

    #[tokio::test]
    async fn test_call_sign_moves_between_devices() {
        let (_dir, mut registry) = fresh().await;
        registry
            .add_registration(Some("!aaaaaaaa"), Some("N0CALL-1"), None, true)
            .await
            .unwrap();
        registry
            .add_registration(Some("!bbbbbbbb"), Some("n0call-1"), Some("MV"), false)
            .await
            .unwrap();

        assert!(!registry.contains("!aaaaaaaa"));
        let entry = registry.entry("!bbbbbbbb").unwrap();
        assert_eq!(entry.call_sign, "N0CALL-1");
        assert_eq!(entry.icon.as_deref(), Some("MV"));
        assert_eq!(entry.source, Source::Beaconed);
    }

    #[tokio::test]
    async fn test_snapshot_round_trips_through_seed_shape() {
        let (_dir, mut registry) = fresh().await;
        registry
            .add_registration(Some("!aaaaaaaa"), Some("N0CALL-1"), Some("HS"), true)
            .await
            .unwrap();

        let snapshot = registry.snapshot();
        let events = snapshot.precompiled_events(now_seconds());
        let view = MergedView::replay(events);
        assert_eq!(view.get("!aaaaaaaa").unwrap().call_sign, "N0CALL-1");
        assert_eq!(view.get("!aaaaaaaa").unwrap().icon.as_deref(), Some("HS"));
    }
}
