//! Tests for the key-value engines
//!
//! These tests verify:
//! - Basic get/put/delete on both engines
//! - Atomic batches
//! - Ordered cursor scans
//! - LogEngine durability, torn-tail recovery and compaction

use std::fs::{self, OpenOptions};
use std::io::Write;

use accountkv::config::{Config, WalSyncStrategy};
use accountkv::engine::{KvEngine, LogEngine, MemoryEngine};
use accountkv::wal::{Operation, WalRecovery};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .build()
}

fn setup_temp_engine() -> (TempDir, LogEngine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
    (temp_dir, engine)
}

fn keys<E: KvEngine>(engine: &E) -> Vec<Vec<u8>> {
    engine.scan().map(|entry| entry.unwrap().0).collect()
}

/// Exercise the shared contract against any engine
fn check_basic_contract<E: KvEngine>(engine: &E) {
    assert_eq!(engine.get(b"missing").unwrap(), None);

    engine.put(b"key", b"value1").unwrap();
    engine.put(b"key", b"value2").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value2".to_vec()));

    engine.delete(b"key").unwrap();
    assert_eq!(engine.get(b"key").unwrap(), None);

    // Deleting a missing key is not an error
    engine.delete(b"never-there").unwrap();
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_memory_engine_contract() {
    check_basic_contract(&MemoryEngine::new());
}

#[test]
fn test_log_engine_contract() {
    let (_temp, engine) = setup_temp_engine();
    check_basic_contract(&engine);
}

#[test]
fn test_log_engine_creates_directory_and_log() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("nested").join("db");

    let engine = LogEngine::open(&Config::builder().data_dir(&data_dir).build()).unwrap();

    assert!(data_dir.exists());
    assert_eq!(engine.wal_path(), data_dir.join("accounts.wal"));
    assert!(engine.wal_path().exists());
    assert!(engine.is_empty());
}

#[test]
fn test_batch_applies_all_operations() {
    let engine = MemoryEngine::new();
    engine.put(b"old", b"record").unwrap();

    engine
        .write_batch(vec![
            Operation::Put {
                key: b"new".to_vec(),
                value: b"record".to_vec(),
            },
            Operation::Delete {
                key: b"old".to_vec(),
            },
        ])
        .unwrap();

    assert_eq!(keys(&engine), vec![b"new".to_vec()]);
}

#[test]
fn test_empty_batch_writes_nothing() {
    let (_temp, engine) = setup_temp_engine();

    engine.write_batch(Vec::new()).unwrap();

    assert_eq!(engine.last_lsn(), 0);
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_is_byte_ordered() {
    let engine = MemoryEngine::new();
    for key in ["b", "a", "c", "ab", "B"] {
        engine.put(key.as_bytes(), b"v").unwrap();
    }

    let scanned: Vec<String> = keys(&engine)
        .into_iter()
        .map(|k| String::from_utf8(k).unwrap())
        .collect();

    assert_eq!(scanned, vec!["B", "a", "ab", "b", "c"]);
}

#[test]
fn test_scan_tolerates_deletes_mid_iteration() {
    let engine = MemoryEngine::new();
    for key in ["a", "b", "c", "d"] {
        engine.put(key.as_bytes(), b"v").unwrap();
    }

    let mut scan = engine.scan();
    assert_eq!(scan.next().unwrap().unwrap().0, b"a".to_vec());

    engine.delete(b"a").unwrap();
    engine.delete(b"c").unwrap();

    let rest: Vec<Vec<u8>> = scan.map(|e| e.unwrap().0).collect();
    assert_eq!(rest, vec![b"b".to_vec(), b"d".to_vec()]);
}

// =============================================================================
// Durability Tests
// =============================================================================

#[test]
fn test_log_engine_recovers_after_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
        for i in 0..50 {
            engine
                .put(format!("key{:02}", i).as_bytes(), format!("value{}", i).as_bytes())
                .unwrap();
        }
        for i in 0..10 {
            engine.delete(format!("key{:02}", i).as_bytes()).unwrap();
        }
        engine.close().unwrap();
    }

    let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
    assert_eq!(engine.len(), 40);
    assert_eq!(engine.get(b"key05").unwrap(), None);
    assert_eq!(engine.get(b"key42").unwrap(), Some(b"value42".to_vec()));
    assert_eq!(engine.last_lsn(), 60);

    // LSNs keep counting after a reopen
    engine.put(b"after", b"reopen").unwrap();
    assert_eq!(engine.last_lsn(), 61);
}

#[test]
fn test_log_engine_truncates_torn_tail() {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = {
        let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        let path = engine.wal_path().to_path_buf();
        engine.close().unwrap();
        path
    };
    let clean_len = fs::metadata(&wal_path).unwrap().len();

    // Simulate a crash halfway through appending a frame
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0x03, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
    drop(file);

    let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), clean_len);

    // New writes land after the intact prefix and survive another reopen
    engine.put(b"c", b"3").unwrap();
    engine.close().unwrap();
    let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
    assert_eq!(engine.len(), 3);
}

#[test]
fn test_torn_rename_batch_is_all_or_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = {
        let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
        engine.put(b"old", b"record").unwrap();
        engine
            .write_batch(vec![
                Operation::Put {
                    key: b"new".to_vec(),
                    value: b"record".to_vec(),
                },
                Operation::Delete {
                    key: b"old".to_vec(),
                },
            ])
            .unwrap();
        let path = engine.wal_path().to_path_buf();
        engine.close().unwrap();
        path
    };

    // Cut into the last frame (the rename batch)
    let len = fs::metadata(&wal_path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&wal_path)
        .unwrap()
        .set_len(len - 3)
        .unwrap();

    let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
    assert_eq!(engine.get(b"old").unwrap(), Some(b"record".to_vec()));
    assert_eq!(engine.get(b"new").unwrap(), None);
}

#[test]
fn test_every_n_entries_strategy_still_recovers_after_close() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 16 })
        .build();

    {
        let engine = LogEngine::open(&config).unwrap();
        for i in 0..5 {
            engine.put(format!("k{}", i).as_bytes(), b"v").unwrap();
        }
        engine.close().unwrap();
    }

    assert_eq!(LogEngine::open(&config).unwrap().len(), 5);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compact_preserves_contents_and_shrinks_log() {
    let (temp_dir, engine) = setup_temp_engine();
    for i in 0..200 {
        engine.put(b"hot", format!("v{}", i).as_bytes()).unwrap();
    }
    engine.put(b"cold", b"x").unwrap();
    let before = fs::metadata(engine.wal_path()).unwrap().len();

    engine.compact().unwrap();

    let after = fs::metadata(engine.wal_path()).unwrap().len();
    assert!(after < before);
    assert_eq!(engine.get(b"hot").unwrap(), Some(b"v199".to_vec()));

    // Writes after compaction go to the new log
    engine.put(b"later", b"y").unwrap();
    engine.close().unwrap();

    let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
    assert_eq!(engine.len(), 3);
    assert_eq!(engine.get(b"later").unwrap(), Some(b"y".to_vec()));
    assert!(!temp_dir.path().join("accounts.wal.compact").exists());
}

#[test]
fn test_compact_empty_engine() {
    let (temp_dir, engine) = setup_temp_engine();
    engine.put(b"gone", b"soon").unwrap();
    engine.delete(b"gone").unwrap();

    engine.compact().unwrap();
    engine.close().unwrap();

    assert!(LogEngine::open(&config_for(&temp_dir)).unwrap().is_empty());
}

#[test]
fn test_open_compacts_mostly_dead_log() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .compaction_min_entries(10)
        .build();

    {
        let engine = LogEngine::open(&config).unwrap();
        for i in 0..50 {
            engine.put(b"only", format!("v{}", i).as_bytes()).unwrap();
        }
        engine.close().unwrap();
    }

    let engine = LogEngine::open(&config).unwrap();
    let stats = WalRecovery::verify(engine.wal_path()).unwrap();

    assert_eq!(stats.entries_recovered, 1);
    assert_eq!(engine.get(b"only").unwrap(), Some(b"v49".to_vec()));
}

#[test]
fn test_stale_compaction_file_is_discarded() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();
        engine.put(b"real", b"data").unwrap();
        engine.close().unwrap();
    }
    let stale = temp_dir.path().join("accounts.wal.compact");
    fs::write(&stale, b"half-written junk").unwrap();

    let engine = LogEngine::open(&config_for(&temp_dir)).unwrap();

    assert!(!stale.exists());
    assert_eq!(engine.get(b"real").unwrap(), Some(b"data".to_vec()));
}

#[test]
fn test_compaction_splits_large_contents_across_frames() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 512 })
        .build();
    let value = vec![0x5Au8; 64 * 1024];
    let record_count = 1100;

    {
        let engine = LogEngine::open(&config).unwrap();
        for i in 0..record_count {
            engine.put(format!("user{:05}", i).as_bytes(), &value).unwrap();
        }
        // Mostly dead frames, so the next open compacts
        for i in 0..2000 {
            let key = format!("tmp{:05}", i);
            engine.put(key.as_bytes(), b"x").unwrap();
            engine.delete(key.as_bytes()).unwrap();
        }
        engine.close().unwrap();
    }

    // More than one maximum-size frame of live data
    let engine = LogEngine::open(&config).unwrap();
    let stats = WalRecovery::verify(engine.wal_path()).unwrap();
    assert!(stats.entries_recovered >= 2);
    assert!(stats.entries_recovered < 10);
    assert_eq!(engine.len(), record_count);

    engine.compact().unwrap();
    engine.close().unwrap();

    let engine = LogEngine::open(&config).unwrap();
    assert_eq!(engine.len(), record_count);
    assert_eq!(engine.get(b"user00000").unwrap(), Some(value.clone()));
    assert_eq!(engine.get(b"user01099").unwrap(), Some(value));
}
