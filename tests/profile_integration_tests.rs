//! Integration tests for ProfileManager over the file-backed store
//!
//! These tests verify:
//! - First-run seeding and corruption healing
//! - Default-merge precedence for partial documents
//! - Crash atomicity of the swap-then-rename write
//! - Change events and the uninitialized guard
//! - Lenient numbers, shadowed unknown keys and the recovery warning

use camino::{Utf8Path, Utf8PathBuf};
use monitor_profile::{
    FileStateStore, LoadOutcome, ProfileChange, ProfileError, ProfileManager, RankState,
    RecoveryReason, State, StateStore,
};
use proptest::prelude::*;
use std::fs;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::time::{Duration, timeout};

fn create_test_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, dir)
}

fn read_state(path: &Utf8Path) -> State {
    let text = fs::read_to_string(path).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_missing_file_seeds_defaults() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    let manager = ProfileManager::new(FileStateStore::new(&path));

    let outcome = manager.load().await;

    assert_eq!(
        outcome,
        LoadOutcome::Recovered {
            reason: RecoveryReason::Missing,
            healed: true
        }
    );
    assert_eq!(*manager.snapshot().unwrap(), State::default());
    assert_eq!(read_state(&path), State::default());
    assert!(!dir.join("profile.json.swap").exists());
}

#[tokio::test]
async fn test_corrupt_file_is_overwritten_with_defaults() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    fs::write(&path, "{ \"statInkApiKey\": \"abc\", \"monitorInt").unwrap();

    let manager = ProfileManager::new(FileStateStore::new(&path));
    let outcome = manager.load().await;

    assert_eq!(
        outcome,
        LoadOutcome::Recovered {
            reason: RecoveryReason::Corrupt,
            healed: true
        }
    );
    assert_eq!(*manager.snapshot().unwrap(), State::default());
    assert_eq!(read_state(&path), State::default());
}

#[tokio::test]
async fn test_corrupt_file_backup_when_enabled() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    fs::write(&path, [0xde, 0xad, 0xbe, 0xef]).unwrap();

    let store = FileStateStore::new(&path).with_corrupt_backup(true);
    let manager = ProfileManager::new(store);
    manager.load().await;

    let backups: Vec<_> = fs::read_dir(&dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("profile.json.corrupt.")
        })
        .collect();

    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read(backups[0].path()).unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(read_state(&path), State::default());
}

#[tokio::test]
async fn test_partial_document_merges_with_defaults() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    fs::write(&path, r#"{ "monitorInterval": 1000 }"#).unwrap();

    let manager = ProfileManager::new(FileStateStore::new(&path));
    let outcome = manager.load().await;

    assert_eq!(outcome, LoadOutcome::Loaded);
    let state = manager.snapshot().unwrap();
    assert_eq!(state.monitor_interval, 1000);
    assert_eq!(state.cache_dir, "./cache");
    assert_eq!(state.file_export_path, "./export");
    assert_eq!(state.f_gen, "https://api.imink.app/f");
    assert!(state.login_state.is_none());

    // Loading alone does not rewrite the file
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        r#"{ "monitorInterval": 1000 }"#
    );
}

#[tokio::test]
async fn test_persist_then_reload_in_new_manager() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");

    let manager = ProfileManager::new(FileStateStore::new(&path));
    manager.load().await;
    manager
        .update(|state| {
            state.user_lang = Some("ja-JP".to_string());
            state.rank_state = Some(RankState {
                game_id: "b0c1".to_string(),
                timestamp: Some(1_700_000_000),
                rank: "S+12".to_string(),
                rank_point: -40,
            });
        })
        .await
        .unwrap();

    let reloaded = ProfileManager::new(FileStateStore::new(&path));
    assert_eq!(reloaded.load().await, LoadOutcome::Loaded);
    assert_eq!(*reloaded.snapshot().unwrap(), *manager.snapshot().unwrap());
}

#[tokio::test]
async fn test_unknown_fields_survive_rewrite() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    fs::write(&path, r#"{ "cacheDir": "/c", "exporterV2": [1, 2, 3] }"#).unwrap();

    let manager = ProfileManager::new(FileStateStore::new(&path));
    manager.load().await;
    manager.update(|state| state.monitor_interval = 800).await.unwrap();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["exporterV2"], serde_json::json!([1, 2, 3]));
    assert_eq!(raw["cacheDir"], "/c");
    assert_eq!(raw["monitorInterval"], 800);
}

#[tokio::test]
async fn test_crash_before_rename_keeps_previous_document() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    let store = FileStateStore::new(&path);

    let mut before = State::default();
    before.cache_dir = "/before".to_string();
    store.write(&before).await.unwrap();

    let mut after = State::default();
    after.cache_dir = "/after".to_string();
    store.stage(&after).await.unwrap();

    // The process "dies" here; a fresh store sees only the old document
    let restarted = FileStateStore::new(&path);
    assert_eq!(State::from(restarted.read().await.unwrap()), before);
    assert!(store.swap_path().exists());

    store.commit().await.unwrap();
    assert_eq!(State::from(restarted.read().await.unwrap()), after);
    assert!(!store.swap_path().exists());
}

#[tokio::test]
async fn test_crash_before_first_rename_leaves_no_document() {
    let (_temp_dir, dir) = create_test_dir();
    let store = FileStateStore::new(dir.join("profile.json"));

    store.stage(&State::default()).await.unwrap();

    let err = store.read().await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_partial_swap_file_is_never_observed() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    let store = FileStateStore::new(&path);
    store.write(&State::default()).await.unwrap();

    // Truncated write into the swap file
    fs::write(store.swap_path(), "{ \"cacheDir\": \"/half").unwrap();

    let manager = ProfileManager::new(FileStateStore::new(&path));
    assert_eq!(manager.load().await, LoadOutcome::Loaded);
    assert_eq!(*manager.snapshot().unwrap(), State::default());
}

#[tokio::test]
async fn test_snapshot_before_load_leaves_disk_untouched() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    let manager = ProfileManager::new(FileStateStore::new(&path));

    assert!(matches!(
        manager.snapshot(),
        Err(ProfileError::NotInitialized)
    ));
    assert!(!path.exists());
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_persist_failure_surfaces_to_caller() {
    let (_temp_dir, dir) = create_test_dir();
    // A directory where the profile file should be makes the rename fail
    let path = dir.join("profile.json");
    fs::create_dir_all(path.join("occupied")).unwrap();

    let manager = ProfileManager::new(FileStateStore::new(&path));
    let mut state = State::default();
    state.monitor_interval = 5;

    let result = manager.persist(state).await;

    assert!(matches!(result, Err(ProfileError::Store(_))));
    assert_eq!(manager.snapshot().unwrap().monitor_interval, 5);
}

#[tokio::test]
async fn test_recovery_events() {
    let (_temp_dir, dir) = create_test_dir();
    let manager = ProfileManager::new(FileStateStore::new(dir.join("profile.yaml")));
    let mut rx = manager.subscribe();

    manager.load().await;

    let first = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");
    let second = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");

    assert_eq!(first, ProfileChange::Persisted);
    assert_eq!(
        second,
        ProfileChange::Recovered {
            reason: RecoveryReason::Missing
        }
    );
}

#[tokio::test]
async fn test_concurrent_readers_share_snapshot() {
    let (_temp_dir, dir) = create_test_dir();
    let manager = ProfileManager::new(FileStateStore::new(dir.join("profile.json")));
    manager.load().await;

    let mut handles = vec![];
    for _ in 0..8 {
        let reader = manager.clone();
        handles.push(tokio::spawn(async move {
            reader.read(|state| state.monitor_interval).unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 500);
    }
}

#[tokio::test]
async fn test_float_interval_keeps_secrets() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    fs::write(&path, r#"{"statInkApiKey":"k","monitorInterval":1000.0}"#).unwrap();

    let manager = ProfileManager::new(FileStateStore::new(&path));

    assert_eq!(manager.load().await, LoadOutcome::Loaded);
    let state = manager.snapshot().unwrap();
    assert_eq!(state.monitor_interval, 1000);
    assert_eq!(state.stat_ink_api_key.as_deref(), Some("k"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        r#"{"statInkApiKey":"k","monitorInterval":1000.0}"#
    );
}

#[tokio::test]
async fn test_extra_key_shadowing_field_does_not_corrupt_file() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    let manager = ProfileManager::new(FileStateStore::new(&path));
    manager.load().await;

    let mut state = State::default();
    state.stat_ink_api_key = Some("secret".to_string());
    state
        .extra
        .insert("monitorInterval".to_string(), serde_json::json!(7));
    manager.persist(state).await.unwrap();

    let store = FileStateStore::new(&path);
    let stored = store.read().await.unwrap();
    assert_eq!(stored.monitor_interval, Some(500));
    assert_eq!(stored.stat_ink_api_key.as_deref(), Some("secret"));

    let reloaded = ProfileManager::new(FileStateStore::new(&path));
    assert_eq!(reloaded.load().await, LoadOutcome::Loaded);
    assert_eq!(
        reloaded.snapshot().unwrap().stat_ink_api_key.as_deref(),
        Some("secret")
    );
}

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_recovery_logs_warning() {
    let (_temp_dir, dir) = create_test_dir();
    let manager = ProfileManager::new(FileStateStore::new(dir.join("profile.json")));

    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let outcome = tracing::subscriber::with_default(subscriber, || {
        tokio_test::block_on(manager.load())
    });

    assert!(matches!(outcome, LoadOutcome::Recovered { .. }));
    let output = log.contents();
    assert!(output.contains("WARN"), "log was: {}", output);
    assert!(output.contains("Failed to read profile"), "log was: {}", output);
}

#[test]
fn test_successful_load_logs_no_warning() {
    let (_temp_dir, dir) = create_test_dir();
    let path = dir.join("profile.json");
    fs::write(&path, r#"{ "userLang": "en-US" }"#).unwrap();
    let manager = ProfileManager::new(FileStateStore::new(&path));

    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let outcome = tracing::subscriber::with_default(subscriber, || {
        tokio_test::block_on(manager.load())
    });

    assert_eq!(outcome, LoadOutcome::Loaded);
    assert!(!log.contents().contains("WARN"));
}

prop_compose! {
    fn arb_text()(text in "[a-zA-Z0-9 ./:_-]{0,24}") -> String {
        text
    }
}

prop_compose! {
    fn arb_state()(
        session_token in proptest::option::of(arb_text()),
        rank in proptest::option::of((arb_text(), proptest::option::of(any::<i64>()), arb_text(), any::<i64>())),
        user_lang in proptest::option::of(arb_text()),
        stat_ink_api_key in proptest::option::of(arb_text()),
        cache_dir in arb_text(),
        monitor_interval in any::<u64>(),
    ) -> State {
        let mut state = State::default();
        state.login_state = session_token.map(|token| monitor_profile::LoginState {
            session_token: Some(token),
            ..Default::default()
        });
        state.rank_state = rank.map(|(game_id, timestamp, rank, rank_point)| RankState {
            game_id,
            timestamp,
            rank,
            rank_point,
        });
        state.user_lang = user_lang;
        state.stat_ink_api_key = stat_ink_api_key;
        state.cache_dir = cache_dir;
        state.monitor_interval = monitor_interval;
        state
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_write_then_read_yields_merged_document(state in arb_state()) {
        let (_temp_dir, dir) = create_test_dir();
        let store = FileStateStore::new(dir.join("profile.json"));

        let read_back = tokio_test::block_on(async {
            store.write(&state).await.unwrap();
            store.read().await.unwrap()
        });

        prop_assert_eq!(State::default().merged_with(read_back), state);
    }
}
