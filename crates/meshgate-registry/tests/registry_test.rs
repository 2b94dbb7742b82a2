//! Registry behaviour across sources and restarts

use meshgate_registry::{Registry, RegistryOptions, Source, OVERRIDES_FILE, PRECOMPILED_FILE};

fn write_json(path: &std::path::Path, body: &str) {
    std::fs::write(path, body).unwrap();
}

fn without_seed(dir: &std::path::Path) {
    write_json(&dir.join(PRECOMPILED_FILE), r#"{"url": "", "tuples": []}"#);
}

#[tokio::test]
async fn test_overrides_beat_later_local_registrations() {
    let dir = tempfile::tempdir().unwrap();
    write_json(
        &dir.path().join(OVERRIDES_FILE),
        r#"{"tuples": [["!aaaaaaaa", "N0CALL-1", null, 0]]}"#,
    );

    let mut registry = Registry::open_with(dir.path(), RegistryOptions::offline())
        .await
        .unwrap();
    assert_eq!(registry.lookup("!aaaaaaaa"), Some("N0CALL-1"));
    assert_eq!(registry.entry("!aaaaaaaa").unwrap().source, Source::Override);

    // A newer local claim on the same call sign still loses
    registry
        .add_registration(Some("!bbbbbbbb"), Some("N0CALL-1"), None, true)
        .await
        .unwrap();
    assert_eq!(registry.lookup_by_call_sign("N0CALL-1"), Some("!aaaaaaaa"));
    assert!(!registry.contains("!bbbbbbbb"));

    // As does a newer claim on the same device
    registry
        .add_registration(Some("!aaaaaaaa"), Some("N0CALL-7"), None, false)
        .await
        .unwrap();
    assert_eq!(registry.lookup("!aaaaaaaa"), Some("N0CALL-1"));
}

#[tokio::test]
async fn test_local_registrations_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    without_seed(dir.path());

    {
        let mut registry = Registry::open_with(dir.path(), RegistryOptions::offline())
            .await
            .unwrap();
        registry
            .add_registration(Some("!aaaaaaaa"), Some("N0CALL-1"), Some("MV"), true)
            .await
            .unwrap();
        registry
            .add_registration(Some("!bbbbbbbb"), Some("N0CALL-2"), None, false)
            .await
            .unwrap();
    }

    let registry = Registry::open_with(dir.path(), RegistryOptions::offline())
        .await
        .unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.entry("!aaaaaaaa").unwrap().icon.as_deref(), Some("MV"));
    assert_eq!(registry.lookup("!bbbbbbbb"), Some("N0CALL-2"));
}

#[tokio::test]
async fn test_precompiled_entries_yield_to_newer_events() {
    let dir = tempfile::tempdir().unwrap();
    let now = chrono::Utc::now().timestamp();
    write_json(
        &dir.path().join(PRECOMPILED_FILE),
        &format!(
            r#"{{"download_timestamp": {now}, "url": "", "tuples": [
                ["!aaaaaaaa", "N0CALL-1", null, 100],
                ["!cccccccc", "N0CALL-3", "HS", 200]
            ]}}"#
        ),
    );

    let mut registry = Registry::open_with(dir.path(), RegistryOptions::default())
        .await
        .unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.entry("!cccccccc").unwrap().source, Source::Precompiled);

    registry
        .add_registration(Some("!aaaaaaaa"), None, None, false)
        .await
        .unwrap();
    assert!(!registry.contains("!aaaaaaaa"));
    assert!(registry.contains("!cccccccc"));
}

#[tokio::test]
async fn test_bundled_seed_on_first_start() {
    let dir = tempfile::tempdir().unwrap();

    let registry = Registry::open_with(dir.path(), RegistryOptions::offline())
        .await
        .unwrap();
    assert!(dir.path().join(PRECOMPILED_FILE).is_file());

    let entry = registry.entry("!433d2b90").unwrap();
    assert_eq!(entry.call_sign, "N0CALL-12");
    assert_eq!(entry.icon.as_deref(), Some("MV"));
    assert_eq!(entry.source, Source::Precompiled);

    // tombstoned device, call sign later moved to another one
    assert!(!registry.contains("!7c52e9d1"));
    assert_eq!(registry.lookup_by_call_sign("N0CALL-15"), Some("!5f18b6e2"));
}

#[tokio::test]
async fn test_future_dated_seed_entry_yields_to_local() {
    let dir = tempfile::tempdir().unwrap();
    let ahead = chrono::Utc::now().timestamp() + 3600;
    write_json(
        &dir.path().join(PRECOMPILED_FILE),
        &format!(r#"{{"url": "", "tuples": [["!aaaaaaaa", "W1AW-1", null, {ahead}]]}}"#),
    );

    let mut registry = Registry::open_with(dir.path(), RegistryOptions::offline())
        .await
        .unwrap();
    assert_eq!(registry.lookup("!aaaaaaaa"), Some("W1AW-1"));

    registry
        .add_registration(Some("!aaaaaaaa"), Some("N0CALL-2"), None, true)
        .await
        .unwrap();
    assert_eq!(registry.lookup("!aaaaaaaa"), Some("N0CALL-2"));
    assert!(registry.lookup_by_call_sign("W1AW-1").is_none());

    // and after a rebuild
    registry.rebuild().await.unwrap();
    assert_eq!(registry.lookup("!aaaaaaaa"), Some("N0CALL-2"));
}
