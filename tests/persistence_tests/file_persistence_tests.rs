//! Tests for FileSnapshotPersistence
//!
//! These tests verify:
//! - Save/load round trip through a fresh instance
//! - Missing, empty, and corrupted files on load
//! - Validation before any filesystem work
//! - Parent directory creation and temp-file cleanup
//! - Readers never observing a partial file during concurrent saves

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use durakv::persistence::SNAPSHOT_FORMAT_VERSION;
use durakv::{FileSnapshotPersistence, KvError, Snapshot, SnapshotPersistence, StoreStats};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("snapshot.json");
    (temp_dir, path)
}

fn snapshot_of(pairs: &[(&str, &str)]) -> Snapshot {
    let data: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Snapshot {
        stats: StoreStats {
            total_keys: data.len() as u64,
            ..Default::default()
        },
        data,
        version: SNAPSHOT_FORMAT_VERSION.to_string(),
        timestamp: 1_700_000_000,
    }
}

fn temp_files_in(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.contains(".tmp."))
        .collect()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_save_then_load_in_fresh_instance() {
    let (_temp, path) = setup_temp_path();
    let snapshot = snapshot_of(&[("a", "1"), ("b", "2")]);

    FileSnapshotPersistence::new(&path).save(&snapshot).unwrap();
    let loaded = FileSnapshotPersistence::new(&path).load().unwrap();

    assert_eq!(loaded.data, snapshot.data);
    assert_eq!(loaded.version, snapshot.version);
    assert_eq!(loaded.timestamp, snapshot.timestamp);
    assert_eq!(loaded.stats, snapshot.stats);
}

#[test]
fn test_empty_snapshot_round_trip() {
    let (_temp, path) = setup_temp_path();
    let persistence = FileSnapshotPersistence::new(&path);

    persistence.save(&snapshot_of(&[])).unwrap();
    let loaded = persistence.load().unwrap();

    assert!(loaded.is_empty());
}

#[test]
fn test_save_overwrites_previous_snapshot() {
    let (_temp, path) = setup_temp_path();
    let persistence = FileSnapshotPersistence::new(&path);

    persistence.save(&snapshot_of(&[("a", "1")])).unwrap();
    persistence.save(&snapshot_of(&[("b", "2")])).unwrap();

    let loaded = persistence.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.data.get("b").map(String::as_str), Some("2"));
}

#[test]
fn test_file_is_json_document_with_expected_fields() {
    let (_temp, path) = setup_temp_path();

    FileSnapshotPersistence::new(&path)
        .save(&snapshot_of(&[("k", "v")]))
        .unwrap();

    let doc: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(doc["data"]["k"], "v");
    assert_eq!(doc["version"], "1.0");
    assert_eq!(doc["timestamp"], 1_700_000_000i64);
    assert_eq!(doc["stats"]["total_keys"], 1);
}

#[test]
fn test_unicode_and_special_characters_survive() {
    let (_temp, path) = setup_temp_path();
    let persistence = FileSnapshotPersistence::new(&path);
    let snapshot = snapshot_of(&[("ключ", "значение"), ("quote\"d", "line\nbreak")]);

    persistence.save(&snapshot).unwrap();

    assert_eq!(persistence.load().unwrap().data, snapshot.data);
}

// =============================================================================
// Load Error Tests
// =============================================================================

#[test]
fn test_load_missing_file_is_no_snapshot() {
    let (_temp, path) = setup_temp_path();

    let err = FileSnapshotPersistence::new(&path).load().unwrap_err();

    assert!(err.is_no_snapshot());
}

#[test]
fn test_load_empty_file_is_corrupted() {
    let (_temp, path) = setup_temp_path();
    fs::write(&path, b"").unwrap();

    let err = FileSnapshotPersistence::new(&path).load().unwrap_err();

    assert!(err.is_corrupted_snapshot());
}

#[test]
fn test_load_garbage_is_corrupted() {
    let (_temp, path) = setup_temp_path();
    fs::write(&path, b"{ not json").unwrap();

    let err = FileSnapshotPersistence::new(&path).load().unwrap_err();

    assert!(err.is_corrupted_snapshot());
}

#[test]
fn test_load_missing_data_field_is_corrupted() {
    let (_temp, path) = setup_temp_path();
    fs::write(
        &path,
        br#"{"stats":{"total_keys":0,"total_requests":0,"get_requests":0,"set_requests":0,"delete_requests":0},"version":"1.0","timestamp":5}"#,
    )
    .unwrap();

    let err = FileSnapshotPersistence::new(&path).load().unwrap_err();

    assert!(err.is_corrupted_snapshot());
}

#[test]
fn test_load_without_stats_zeroes_counters() {
    let (_temp, path) = setup_temp_path();
    fs::write(&path, br#"{"data":{"a":"1"},"version":"1.0","timestamp":5}"#).unwrap();

    let loaded = FileSnapshotPersistence::new(&path).load().unwrap();

    assert_eq!(loaded.data.get("a").map(String::as_str), Some("1"));
    assert_eq!(loaded.stats, StoreStats::default());
}

#[test]
fn test_load_with_partial_stats_zeroes_missing_counters() {
    let (_temp, path) = setup_temp_path();
    fs::write(
        &path,
        br#"{"data":{"a":"1"},"stats":{"total_keys":1},"version":"1.0","timestamp":5}"#,
    )
    .unwrap();

    let loaded = FileSnapshotPersistence::new(&path).load().unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.stats.total_keys, 1);
    assert_eq!(loaded.stats.total_requests, 0);
    assert_eq!(loaded.stats.set_requests, 0);
}

#[test]
fn test_load_invalid_metadata_is_corrupted() {
    let (_temp, path) = setup_temp_path();
    fs::write(
        &path,
        br#"{"data":{},"stats":{"total_keys":0,"total_requests":0,"get_requests":0,"set_requests":0,"delete_requests":0},"version":"","timestamp":5}"#,
    )
    .unwrap();

    let err = FileSnapshotPersistence::new(&path).load().unwrap_err();

    assert!(err.is_corrupted_snapshot());
}

// =============================================================================
// Save Validation Tests
// =============================================================================

#[test]
fn test_save_rejects_invalid_snapshot_without_touching_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("snapshot.json");
    let persistence = FileSnapshotPersistence::new(&path);

    let mut bad = snapshot_of(&[("a", "1")]);
    bad.timestamp = 0;
    let err = persistence.save(&bad).unwrap_err();
    assert!(matches!(err.root_cause(), KvError::InvalidSnapshot(_)));

    let mut bad = snapshot_of(&[("a", "1")]);
    bad.version.clear();
    assert!(persistence.save(&bad).is_err());

    assert!(!path.parent().unwrap().exists());
}

// =============================================================================
// Filesystem Behaviour Tests
// =============================================================================

#[test]
fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("a").join("b").join("snapshot.json");

    FileSnapshotPersistence::new(&path)
        .save(&snapshot_of(&[("k", "v")]))
        .unwrap();

    assert!(path.exists());
}

#[test]
fn test_no_temp_files_left_after_save() {
    let (temp, path) = setup_temp_path();
    let persistence = FileSnapshotPersistence::new(&path);

    for i in 0..5 {
        persistence
            .save(&snapshot_of(&[("k", &i.to_string())]))
            .unwrap();
    }

    assert!(temp_files_in(temp.path()).is_empty());
}

#[test]
fn test_temp_name_collision_fails_and_keeps_foreign_file() {
    let (temp, path) = setup_temp_path();
    let blocker = first_temp_path_for_seed(&path, 7);
    fs::write(&blocker, b"foreign").unwrap();

    let persistence = FileSnapshotPersistence::with_rng(&path, StdRng::seed_from_u64(7));
    let result = persistence.save(&snapshot_of(&[("k", "v")]));

    assert!(result.is_err());
    assert_eq!(fs::read(&blocker).unwrap(), b"foreign");
    assert!(!path.exists());
    assert_eq!(temp_files_in(temp.path()).len(), 1);

    // The next draw from the same source is a different name
    persistence.save(&snapshot_of(&[("k", "v")])).unwrap();
    assert!(path.exists());
}

/// The first temp path a StdRng seeded with `seed` yields for `path`
fn first_temp_path_for_seed(path: &Path, seed: u64) -> PathBuf {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bytes = [0u8; 8];
    rng.fill_bytes(&mut bytes);
    let suffix: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".tmp.{}", suffix));
    PathBuf::from(name)
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_saves_and_loads_never_see_partial_file() {
    let (temp, path) = setup_temp_path();
    let persistence = Arc::new(FileSnapshotPersistence::new(&path));

    // Large enough that a torn write would be observable
    let big: Vec<(String, String)> = (0..500)
        .map(|i| (format!("key{:04}", i), "x".repeat(64)))
        .collect();
    let pairs: Vec<(&str, &str)> = big.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    persistence.save(&snapshot_of(&pairs)).unwrap();

    let mut handles = vec![];
    for w in 0..4 {
        let persistence = Arc::clone(&persistence);
        let big = big.clone();
        handles.push(thread::spawn(move || {
            for i in 0..20 {
                let marker = format!("w{}-{}", w, i);
                let mut pairs: Vec<(&str, &str)> =
                    big.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                pairs.push(("marker", marker.as_str()));
                persistence.save(&snapshot_of(&pairs)).unwrap();
            }
        }));
    }
    for _ in 0..4 {
        let persistence = Arc::clone(&persistence);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                let loaded = persistence.load().unwrap();
                assert!(loaded.len() >= 500);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(temp_files_in(temp.path()).is_empty());
}

#[test]
fn test_separate_instances_on_same_path() {
    let (_temp, path) = setup_temp_path();
    let a = Arc::new(FileSnapshotPersistence::new(&path));
    let b = Arc::new(FileSnapshotPersistence::new(&path));

    let handles: Vec<_> = [a, b]
        .into_iter()
        .enumerate()
        .map(|(n, p)| {
            thread::spawn(move || {
                for i in 0..20 {
                    let v = format!("{}-{}", n, i);
                    p.save(&snapshot_of(&[("k", v.as_str())])).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let loaded = FileSnapshotPersistence::new(&path).load().unwrap();
    assert_eq!(loaded.len(), 1);
}
