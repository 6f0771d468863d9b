use std::sync::Arc;

use fx_common::markets::forex::DEFAULT_WATCHLIST_PAIRS;
use fx_common::watchlist::{FileKeyValueStore, MemoryKeyValueStore, DEFAULT_STORAGE_KEY};
use fx_common::{WatchlistEntry, WatchlistError, WatchlistSettings, WatchlistStore};
use project_tests::{pair, FailingKeyValueStore};
use serde_json::{json, Value};

fn pair_strings(entries: &[WatchlistEntry]) -> Vec<String> {
    entries.iter().map(|e| e.pair_string.clone()).collect()
}

fn stored_json(raw: Option<String>) -> Value {
    serde_json::from_str(&raw.expect("nothing persisted")).unwrap()
}

#[tokio::test]
async fn legacy_entry_is_migrated_and_written_back() {
    let storage = Arc::new(MemoryKeyValueStore::with_value(
        DEFAULT_STORAGE_KEY,
        r#"[{"id":"a","pairString":"EUR/USD","isActive":false}]"#,
    ));
    let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());

    let entries = store.load().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "a");
    assert_eq!(entries[0].pair, pair("EUR/USD"));
    assert!(!entries[0].is_active);

    assert_eq!(
        stored_json(storage.peek(DEFAULT_STORAGE_KEY)),
        json!([{"id":"a","pair":{"base":"EUR","quote":"USD"},"pairString":"EUR/USD","isActive":false}])
    );
}

#[tokio::test]
async fn loading_migrated_data_twice_changes_nothing() {
    let storage = Arc::new(MemoryKeyValueStore::with_value(
        DEFAULT_STORAGE_KEY,
        r#"[{"id":"a","pairString":"EUR/USD"},{"id":"b","pair":{"base":"USD","quote":"JPY"},"pairString":"USD/JPY","isActive":true}]"#,
    ));
    let first = WatchlistStore::new(storage.clone(), WatchlistSettings::default()).load().await;
    let written = storage.peek(DEFAULT_STORAGE_KEY);

    let second = WatchlistStore::new(storage.clone(), WatchlistSettings::default()).load().await;
    assert_eq!(first, second);
    assert_eq!(storage.peek(DEFAULT_STORAGE_KEY), written);
    assert!(first[0].is_active, "legacy entry without isActive defaults to active");
}

#[tokio::test]
async fn malformed_data_is_replaced_by_defaults() {
    for raw in ["not json", r#"{"id":"a"}"#, r#"[{"id":"a","pairString":"EURUSD"}]"#, r#"[{"id":"","pairString":"EUR/USD"}]"#] {
        let storage = Arc::new(MemoryKeyValueStore::with_value(DEFAULT_STORAGE_KEY, raw));
        let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());

        let entries = store.load().await;
        assert_eq!(pair_strings(&entries), DEFAULT_WATCHLIST_PAIRS.to_vec(), "input {raw}");
        assert!(entries.iter().all(|e| e.is_active));

        let persisted = stored_json(storage.peek(DEFAULT_STORAGE_KEY));
        assert_eq!(persisted.as_array().map(Vec::len), Some(DEFAULT_WATCHLIST_PAIRS.len()));
    }
}

#[tokio::test]
async fn read_failure_uses_defaults_without_overwriting() {
    let storage = FailingKeyValueStore::new();
    storage.set_fail_reads(true);
    let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());

    let entries = store.load().await;
    assert_eq!(pair_strings(&entries), DEFAULT_WATCHLIST_PAIRS.to_vec());
    assert!(storage.peek(DEFAULT_STORAGE_KEY).is_none());
}

#[tokio::test]
async fn add_multiple_skips_pairs_already_present() {
    let settings = WatchlistSettings {
        default_pairs: vec![pair("USD/JPY")],
        ..WatchlistSettings::default()
    };
    let storage = Arc::new(MemoryKeyValueStore::new());
    let store = WatchlistStore::new(storage.clone(), settings);
    store.load().await;

    let added = store.add_multiple_pairs(["USD/JPY", "GBP/USD"]).await.unwrap();
    assert_eq!(pair_strings(&added), vec!["GBP/USD"]);
    assert_eq!(pair_strings(&store.entries().await), vec!["USD/JPY", "GBP/USD"]);

    let persisted = stored_json(storage.peek(DEFAULT_STORAGE_KEY));
    assert_eq!(persisted[1]["pairString"], "GBP/USD");
    assert_eq!(persisted[1]["isActive"], true);
}

#[tokio::test]
async fn add_multiple_with_only_duplicates_is_a_no_op() {
    let storage = FailingKeyValueStore::new();
    let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());
    store.load().await;

    // No write is attempted, so a broken store does not matter.
    storage.set_fail_writes(true);
    let added = store.add_multiple_pairs(["USD/JPY", "EUR/USD", "USD/JPY"]).await.unwrap();
    assert!(added.is_empty());
    assert_eq!(store.entries().await.len(), DEFAULT_WATCHLIST_PAIRS.len());
}

#[tokio::test]
async fn add_multiple_repeating_a_new_pair_adds_it_once() {
    let storage = Arc::new(MemoryKeyValueStore::new());
    let store = WatchlistStore::new(storage, WatchlistSettings::default());
    store.load().await;

    let added = store.add_multiple_pairs(vec!["USD/CHF".to_string(), "USD/CHF".to_string()]).await.unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(store.entries().await.len(), DEFAULT_WATCHLIST_PAIRS.len() + 1);
}

#[tokio::test]
async fn add_multiple_rejects_empty_and_unsupported_input() {
    let store = WatchlistStore::new(Arc::new(MemoryKeyValueStore::new()), WatchlistSettings::default());
    let before = store.load().await;

    let empty: [&str; 0] = [];
    assert!(matches!(store.add_multiple_pairs(empty).await, Err(WatchlistError::EmptyPairs)));

    match store.add_multiple_pairs(["USD/CHF", "XXX/YYY", "nonsense"]).await {
        Err(e @ WatchlistError::InvalidPair { .. }) => {
            assert_eq!(e.to_string(), "Invalid currency pairs: XXX/YYY, nonsense");
        }
        other => panic!("expected InvalidPair, got {:?}", other),
    }
    assert_eq!(store.entries().await, before);
}

#[tokio::test]
async fn add_pair_rejects_unsupported_pair_and_leaves_list_alone() {
    let storage = Arc::new(MemoryKeyValueStore::new());
    let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());
    let before = store.load().await;
    let persisted_before = storage.peek(DEFAULT_STORAGE_KEY);

    assert!(matches!(
        store.add_pair("XXX/YYY").await,
        Err(WatchlistError::InvalidPair { pairs }) if pairs == vec!["XXX/YYY".to_string()]
    ));
    assert_eq!(store.entries().await, before);
    assert_eq!(storage.peek(DEFAULT_STORAGE_KEY), persisted_before);
}

#[tokio::test]
async fn reorder_requires_every_id_exactly_once() {
    let storage = Arc::new(MemoryKeyValueStore::new());
    let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());
    let entries = store.load().await;
    let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();

    let mut missing = ids.clone();
    missing.pop();
    let mut repeated = ids.clone();
    repeated[1] = ids[0].clone();
    let mut unknown = ids.clone();
    unknown[2] = "not-an-id".to_string();

    for bad in [missing, repeated, unknown] {
        assert!(matches!(store.reorder_pairs(bad.as_slice()).await, Err(WatchlistError::InvalidReorder)));
        assert_eq!(store.entries().await, entries);
    }

    let reversed: Vec<String> = ids.iter().rev().cloned().collect();
    store.reorder_pairs(reversed.as_slice()).await.unwrap();
    let now: Vec<String> = store.entries().await.into_iter().map(|e| e.id).collect();
    assert_eq!(now, reversed);

    let reloaded = WatchlistStore::new(storage, WatchlistSettings::default()).load().await;
    let persisted: Vec<String> = reloaded.into_iter().map(|e| e.id).collect();
    assert_eq!(persisted, reversed);
}

#[tokio::test]
async fn failed_write_keeps_previous_state() {
    let storage = FailingKeyValueStore::new();
    let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());
    let before = store.load().await;
    let persisted_before = storage.peek(DEFAULT_STORAGE_KEY);
    storage.set_fail_writes(true);

    assert!(matches!(store.add_pair("USD/CHF").await, Err(WatchlistError::Storage(_))));
    assert!(matches!(store.add_multiple_pairs(["EUR/JPY"]).await, Err(WatchlistError::Storage(_))));
    assert!(matches!(store.remove_pair(&before[0].id).await, Err(WatchlistError::Storage(_))));
    assert!(matches!(store.toggle_pair_active(&before[0].id).await, Err(WatchlistError::Storage(_))));
    let reversed: Vec<String> = before.iter().rev().map(|e| e.id.clone()).collect();
    assert!(matches!(store.reorder_pairs(reversed.as_slice()).await, Err(WatchlistError::Storage(_))));

    assert_eq!(store.entries().await, before);
    assert_eq!(storage.peek(DEFAULT_STORAGE_KEY), persisted_before);

    storage.set_fail_writes(false);
    store.add_pair("USD/CHF").await.unwrap();
    assert_eq!(store.entries().await.len(), before.len() + 1);
}

#[tokio::test]
async fn toggled_and_removed_entries_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let open = || WatchlistStore::new(Arc::new(FileKeyValueStore::new(dir.path())), WatchlistSettings::default());

    let store = open();
    let entries = store.load().await;
    assert!(dir.path().join(format!("{}.json", DEFAULT_STORAGE_KEY)).exists());

    assert_eq!(store.toggle_pair_active(&entries[0].id).await.unwrap(), Some(false));
    assert!(store.remove_pair(&entries[1].id).await.unwrap());
    let added = store.add_pair("GBP/JPY").await.unwrap();

    let reopened = open();
    let reloaded = reopened.load().await;
    assert_eq!(reloaded, store.entries().await);
    assert!(!reloaded[0].is_active);
    assert!(reloaded.iter().all(|e| e.id != entries[1].id));
    assert_eq!(reloaded.last(), Some(&added));

    let active: Vec<String> = reopened.active_pairs().await.iter().map(|p| p.to_string()).collect();
    assert_eq!(active, vec!["GBP/USD", "AUD/USD", "USD/CAD", "GBP/JPY"]);
}

#[tokio::test]
async fn available_list_shrinks_as_pairs_are_added() {
    let store = WatchlistStore::new(Arc::new(MemoryKeyValueStore::new()), WatchlistSettings::default());
    store.load().await;

    let before: Vec<String> = store.get_available_to_add().await.iter().map(|p| p.to_string()).collect();
    assert_eq!(before, vec!["USD/CHF", "USD/CNY", "EUR/JPY", "GBP/JPY"]);

    store.add_multiple_pairs(["USD/CNY", "GBP/JPY"]).await.unwrap();
    let after: Vec<String> = store.get_available_to_add().await.iter().map(|p| p.to_string()).collect();
    assert_eq!(after, vec!["USD/CHF", "EUR/JPY"]);
}

#[tokio::test]
async fn duplicate_entries_on_storage_are_dropped() {
    let storage = Arc::new(MemoryKeyValueStore::with_value(
        DEFAULT_STORAGE_KEY,
        r#"[{"id":"a","pairString":"EUR/USD"},{"id":"b","pairString":"EUR/USD"},{"id":"a","pairString":"USD/JPY"}]"#,
    ));
    let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());

    let entries = store.load().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "a");
    assert_eq!(stored_json(storage.peek(DEFAULT_STORAGE_KEY)).as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn empty_stored_list_is_reseeded_with_defaults() {
    let storage = Arc::new(MemoryKeyValueStore::with_value(DEFAULT_STORAGE_KEY, "[]"));
    let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());

    let entries = store.load().await;
    assert_eq!(pair_strings(&entries), DEFAULT_WATCHLIST_PAIRS.to_vec());
    let persisted = stored_json(storage.peek(DEFAULT_STORAGE_KEY));
    assert_eq!(persisted.as_array().map(Vec::len), Some(DEFAULT_WATCHLIST_PAIRS.len()));
}

#[tokio::test]
async fn removing_every_pair_then_restarting_brings_defaults_back() {
    let storage = Arc::new(MemoryKeyValueStore::new());
    let store = WatchlistStore::new(storage.clone(), WatchlistSettings::default());
    for entry in store.load().await {
        assert!(store.remove_pair(&entry.id).await.unwrap());
    }
    assert!(store.entries().await.is_empty());
    assert_eq!(stored_json(storage.peek(DEFAULT_STORAGE_KEY)), json!([]));

    let reloaded = WatchlistStore::new(storage, WatchlistSettings::default()).load().await;
    assert_eq!(pair_strings(&reloaded), DEFAULT_WATCHLIST_PAIRS.to_vec());
}
