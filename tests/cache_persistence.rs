//! Replay cache snapshots on disk.

use std::fs;

use slirc_bridge::cache::{load_snapshot, restore_on_startup, save_snapshot, CacheSnapshot};
use slirc_bridge::config::{BridgeConfig, ServerProfile};
use slirc_bridge::session::{Action, BridgeSession};
use slirc_bridge::{BridgeEvent, DiagnosticKind, MessageCache, PersistError, Roster};
use tempfile::TempDir;

fn filled_cache() -> (MessageCache, Roster) {
    let mut roster = Roster::new();
    roster.on_join("#rust", "me", "me");
    let mut cache = MessageCache::new(4, 5);
    cache.add_message(":alice!a@h PRIVMSG #rust :one", &roster, "me");
    cache.add_message(":alice!a@h PRIVMSG #rust :two", &roster, "me");
    cache.add_message(":irc.example.net NOTICE * :hello", &roster, "me");
    (cache, roster)
}

#[test]
fn test_save_then_load_restores_history() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let (cache, roster) = filled_cache();

    save_snapshot(&path, &cache.to_snapshot(1_000)).unwrap();
    let snapshot = load_snapshot(&path, 1_010, 300).unwrap();
    assert_eq!(snapshot.line_count(), 3);

    let mut restored = MessageCache::new(4, 5);
    restored.restore(snapshot);
    assert_eq!(restored.all_messages(&roster), cache.all_messages(&roster));
}

#[test]
fn test_snapshot_is_single_use() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let (cache, _) = filled_cache();
    save_snapshot(&path, &cache.to_snapshot(1_000)).unwrap();

    load_snapshot(&path, 1_000, 300).unwrap();
    assert!(matches!(
        load_snapshot(&path, 1_000, 300),
        Err(PersistError::AlreadyUsed)
    ));

    let spent: CacheSnapshot = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert!(spent.has_been_used);
    assert_eq!(spent.line_count(), 0);
}

#[test]
fn test_expired_snapshot_is_refused_and_spent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let (cache, _) = filled_cache();
    save_snapshot(&path, &cache.to_snapshot(1_000)).unwrap();

    match load_snapshot(&path, 2_000, 300) {
        Err(PersistError::Expired { age, limit }) => {
            assert_eq!(age, 1_000);
            assert_eq!(limit, 300);
        }
        other => panic!("expected Expired, got {:?}", other),
    }
    assert!(matches!(
        load_snapshot(&path, 1_000, 300),
        Err(PersistError::AlreadyUsed)
    ));
}

#[test]
fn test_malformed_and_inconsistent_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");

    fs::write(&path, b"{not json").unwrap();
    assert!(matches!(
        load_snapshot(&path, 0, 300),
        Err(PersistError::Json(_))
    ));

    fs::write(
        &path,
        br##"{"timestamp":10,"cursors":{"#a":5},"buffers":{"#a":["x",null]}}"##,
    )
    .unwrap();
    assert!(matches!(
        load_snapshot(&path, 10, 300),
        Err(PersistError::Inconsistent(_))
    ));

    fs::write(&path, br#"{"timestamp":500}"#).unwrap();
    assert!(matches!(
        load_snapshot(&path, 10, 300),
        Err(PersistError::Inconsistent(_))
    ));
}

#[test]
fn test_restore_on_startup_reports_reason() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.json");
    assert!(matches!(restore_on_startup(&missing, 300), Ok(None)));

    let path = dir.path().join("cache.json");
    fs::write(&path, b"garbage").unwrap();
    assert!(matches!(
        restore_on_startup(&path, 300),
        Err(PersistError::Json(_))
    ));

    let (cache, _) = filled_cache();
    let now = chrono::Utc::now().timestamp();
    save_snapshot(&path, &cache.to_snapshot(now)).unwrap();
    let snapshot = restore_on_startup(&path, 300).unwrap().unwrap();
    assert_eq!(snapshot.line_count(), 3);
    assert!(matches!(
        restore_on_startup(&path, 300),
        Err(PersistError::AlreadyUsed)
    ));
}

#[test]
fn test_failed_restore_is_reported_to_consumers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let (cache, _) = filled_cache();
    save_snapshot(&path, &cache.to_snapshot(0)).unwrap();

    let profile = ServerProfile::new("irc.example.net", 6667, "me");
    let mut session = BridgeSession::new(BridgeConfig::with_server(profile));
    let actions = session.apply_restore(restore_on_startup(&path, 300));
    assert!(matches!(
        actions.as_slice(),
        [Action::Notify(BridgeEvent::Diagnostic { kind: DiagnosticKind::Persist, text })]
            if text.contains("expired")
    ));
    assert_eq!(session.cache_info().used_lines, 0);

    save_snapshot(&path, &cache.to_snapshot(chrono::Utc::now().timestamp())).unwrap();
    let actions = session.apply_restore(restore_on_startup(&path, 300));
    assert!(actions.is_empty());
    assert_eq!(session.cache_info().used_lines, 3);
}

#[test]
fn test_restore_skips_invalid_keys() {
    let mut snapshot = CacheSnapshot::new(0);
    snapshot
        .buffers
        .insert("bogus".into(), vec![Some("line".into())]);
    snapshot
        .buffers
        .insert("#ok".into(), vec![Some(":a!b@c PRIVMSG #ok :hi".into())]);

    let mut cache = MessageCache::new(4, 5);
    cache.restore(snapshot);
    assert!(cache.buffer("bogus").is_none());
    assert_eq!(cache.buffer("#ok").unwrap().used(), 1);
}
