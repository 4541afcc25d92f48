//! End-to-end connector behaviour against an in-process pool.
//!
//! The test pool's behaviour is chosen per database with an extra `mode`
//! key: `ok` (default), `fail` or `panic`.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use async_trait::async_trait;
use repopool_core::error::BoxError;
use repopool_core::{
    ConfigProvider, Connector, DatabaseConfig, ErrorKind, Event, EventKind, FaultCategory,
    LoadOptions, PoolOpener, RepoPoolError, Result, StaticProvider,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ok,
    Fail,
    Panic,
}

#[derive(Debug)]
struct MockPool {
    id: usize,
    host: String,
    mode: Mode,
}

#[async_trait]
impl repopool_core::ConnectionPool for MockPool {
    type Client = String;

    async fn acquire(&self) -> std::result::Result<String, BoxError> {
        match self.mode {
            Mode::Ok => Ok(format!("client@{}#{}", self.host, self.id)),
            Mode::Fail => Err("connection refused".into()),
            Mode::Panic => panic!("driver exploded"),
        }
    }
}

#[derive(Default)]
struct MockOpener {
    opened: AtomicUsize,
}

impl PoolOpener for MockOpener {
    type Pool = MockPool;

    fn open(&self, _name: &str, config: &DatabaseConfig) -> Result<MockPool> {
        let mode = match config.options.get("mode").and_then(Value::as_str) {
            Some("fail") => Mode::Fail,
            Some("panic") => Mode::Panic,
            _ => Mode::Ok,
        };
        Ok(MockPool {
            id: self.opened.fetch_add(1, Ordering::SeqCst),
            host: config.host.clone(),
            mode,
        })
    }
}

fn provider(name: &str, value: Value) -> Arc<dyn ConfigProvider> {
    Arc::new(StaticProvider::new(name, value))
}

fn counting_listener(connector: &Connector<MockOpener>, kind: EventKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    connector.on(kind, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[tokio::test]
async fn test_two_provider_load_maps_repositories_to_one_pool() {
    let connector = Connector::new(MockOpener::default());
    let config_events = counting_listener(&connector, EventKind::Config);
    let done_events = counting_listener(&connector, EventKind::Done);

    let loaded = connector
        .load(vec![
            provider("databases", json!({ "databases": { "a": { "host": "h" } } })),
            provider(
                "repositories",
                json!({ "repositories": { "x": "a", "y": "a" } }),
            ),
        ])
        .unwrap()
        .await
        .unwrap();

    assert_eq!(config_events.load(Ordering::SeqCst), 2);
    assert_eq!(done_events.load(Ordering::SeqCst), 1);
    assert_eq!(
        loaded.repositories(),
        vec![
            ("x".to_string(), "a".to_string()),
            ("y".to_string(), "a".to_string())
        ]
    );

    let x = connector.get_pool("x").unwrap();
    let y = connector.get_pool("y").unwrap();
    assert!(Arc::ptr_eq(&x, &y));
}

#[tokio::test]
async fn test_done_event_carries_merged_value_over_base() {
    let connector = Connector::new(MockOpener::default());
    let merged = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&merged);
    connector.on(EventKind::Done, move |event| {
        if let Event::Done(value) = event {
            *slot.lock().unwrap() = Some(value.clone());
        }
    });

    let completed = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&completed);
    let options = LoadOptions::new()
        .base(json!({ "databases": { "a": { "host": "base", "port": 1 } } }))
        .on_complete(move |result| {
            assert!(result.is_ok());
            calls.fetch_add(1, Ordering::SeqCst);
        });

    connector
        .load_with(
            vec![provider(
                "override",
                json!({
                    "databases": { "a": { "host": "override" } },
                    "repositories": { "x": "a" }
                }),
            )],
            options,
        )
        .unwrap()
        .await
        .unwrap();

    assert_eq!(completed.load(Ordering::SeqCst), 1);
    let merged = merged.lock().unwrap().clone().unwrap();
    assert_eq!(merged["databases"]["a"]["host"], json!("override"));
    assert_eq!(merged["databases"]["a"]["port"], json!(1));
}

#[test]
fn test_load_without_providers_is_usage_fault() {
    let connector = Connector::new(MockOpener::default());
    let error = connector.load(Vec::new()).err().unwrap();
    assert!(error.is_usage_fault());
}

#[tokio::test]
async fn test_load_with_invalid_config_rejects_and_leaves_registry_empty() {
    let connector = Connector::new(MockOpener::default());
    let done_events = counting_listener(&connector, EventKind::Done);

    let error = connector
        .load(vec![provider(
            "bad",
            json!({
                "databases": { "a": { "host": "h" } },
                "repositories": { "x": "nowhere" }
            }),
        )])
        .unwrap()
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Configuration);
    assert_eq!(error.offending_key(), Some("repositories.x"));
    assert_eq!(done_events.load(Ordering::SeqCst), 0);
    assert!(!connector.is_configured());
}

struct FailingProvider;

#[async_trait]
impl ConfigProvider for FailingProvider {
    fn name(&self) -> String {
        "failing".to_string()
    }

    async fn load(&self) -> Result<Value> {
        Err(RepoPoolError::source_failed(
            self.name(),
            "backend unavailable",
            "timed out",
        ))
    }
}

#[tokio::test]
async fn test_provider_failure_rejects_load_without_mutation() {
    let connector = Connector::new(MockOpener::default());
    let config_events = counting_listener(&connector, EventKind::Config);
    let done_events = counting_listener(&connector, EventKind::Done);

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let options = LoadOptions::new().on_complete(move |result| {
        assert_eq!(result.as_ref().err().map(RepoPoolError::kind), Some(ErrorKind::Source));
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let error = connector
        .load_with(
            vec![
                provider("good", json!({ "databases": { "a": { "host": "h" } } })),
                Arc::new(FailingProvider) as Arc<dyn ConfigProvider>,
            ],
            options,
        )
        .unwrap()
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Source);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(config_events.load(Ordering::SeqCst), 1);
    assert_eq!(done_events.load(Ordering::SeqCst), 0);
    assert!(!connector.is_configured());
}

#[test]
fn test_add_with_empty_host_rejects_everything() {
    let connector = Connector::new(MockOpener::default());

    let error = connector
        .add([json!({
            "databases": { "a": { "host": "" }, "b": { "host": "fine" } },
            "repositories": { "x": "b" }
        })])
        .err()
        .unwrap();

    assert!(error.is_configuration_fault());
    assert_eq!(error.offending_key(), Some("databases.a.host"));
    assert!(connector.databases().is_empty());
    assert!(connector.repositories().is_empty());
}

#[test]
fn test_add_non_mapping_is_usage_fault() {
    let connector = Connector::new(MockOpener::default());
    let error = connector.add([json!("databases")]).err().unwrap();
    assert!(error.is_usage_fault());
}

#[tokio::test]
async fn test_connect_unmapped_fails_synchronously() {
    let connector = Connector::new(MockOpener::default());
    connector
        .add([json!({
            "databases": { "a": { "host": "h" } },
            "repositories": { "x": "a" }
        })])
        .unwrap();

    // An earlier successful connect does not change how unmapped names fail.
    connector.connect("x").unwrap().await.unwrap().release();

    let error = connector.connect("nope").err().unwrap();
    assert_eq!(error.kind(), ErrorKind::MissingRepository);
    assert!(error.to_string().contains("nope"));

    let error = connector.connect("").err().unwrap();
    assert!(error.is_usage_fault());

    // Lookup is case-sensitive.
    let error = connector.connect("X").err().unwrap();
    assert_eq!(error.kind(), ErrorKind::MissingRepository);
}

#[tokio::test]
async fn test_connect_leases_client_from_mapped_pool() {
    let connector = Connector::new(MockOpener::default());
    connector
        .add([json!({
            "databases": { "a": { "host": "h" } },
            "repositories": { "x": "a" }
        })])
        .unwrap();

    let lease = connector.connect("x").unwrap().await.unwrap();
    assert_eq!(lease.repository(), "x");
    assert_eq!(lease.client(), "client@h#0");
    lease.release();
}

#[tokio::test]
async fn test_failing_acquire_reaches_callback_once() {
    let connector = Connector::new(MockOpener::default());
    connector
        .add([json!({
            "databases": { "a": { "host": "h", "mode": "fail" } },
            "repositories": { "x": "a" }
        })])
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let error = connector
        .connect_with("x", move |result| {
            assert!(result.is_err());
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap()
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(error.kind(), ErrorKind::Acquire);
    assert!(matches!(error, RepoPoolError::Acquire { ref repository, .. } if repository == "x"));
}

#[tokio::test]
async fn test_panicking_pool_emits_error_event_and_skips_callback() {
    let connector = Connector::new(MockOpener::default());
    connector
        .add([json!({
            "databases": { "a": { "host": "h", "mode": "panic" } },
            "repositories": { "x": "a" }
        })])
        .unwrap();

    let faults = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&faults);
    connector
        .on_named("error", move |event| {
            if let Event::Error(error) = event {
                sink.lock().unwrap().push(error.kind());
            }
        })
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let pending = connector
        .connect_with("x", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let error = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::DriverFault);
    assert_eq!(error.category(), FaultCategory::Runtime);
    assert!(error.to_string().contains("driver exploded"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(*faults.lock().unwrap(), vec![ErrorKind::DriverFault]);

    // The connector stays usable after a driver fault.
    assert!(connector.get_pool("x").is_ok());
}

#[tokio::test]
async fn test_readding_database_reopens_and_rebinds() {
    let connector = Connector::new(MockOpener::default());
    connector
        .add([json!({
            "databases": { "a": { "host": "old" } },
            "repositories": { "x": "a" }
        })])
        .unwrap();
    let before = connector.get_pool("x").unwrap();

    connector
        .add([json!({
            "databases": { "a": { "host": "new" } },
            "repositories": {}
        })])
        .unwrap();
    let after = connector.get_pool("x").unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.host, "new");
    assert_eq!(connector.databases()[0].1.host, "new");

    let lease = connector.connect("x").unwrap().await.unwrap();
    assert_eq!(lease.client(), "client@new#1");
}

#[test]
fn test_array_fragments_are_flattened() {
    let connector = Connector::new(MockOpener::default());
    connector
        .add([json!([
            { "databases": { "a": { "host": "h" } } },
            { "repositories": { "x": "a" } }
        ])])
        .unwrap();

    assert_eq!(
        connector.repositories(),
        vec![("x".to_string(), "a".to_string())]
    );
}

#[test]
fn test_on_named_rejects_unknown_event() {
    let connector = Connector::new(MockOpener::default());
    assert!(connector.on_named("", |_| {}).err().unwrap().is_usage_fault());
    assert!(
        connector
            .on_named("finished", |_| {})
            .err()
            .unwrap()
            .is_usage_fault()
    );
}

#[test]
fn test_clones_share_registry() {
    let connector = Connector::new(MockOpener::default());
    let clone = connector.clone();

    connector
        .add([json!({
            "databases": { "a": { "host": "h" } },
            "repositories": { "x": "a" }
        })])
        .unwrap();

    assert!(clone.is_configured());
    assert!(clone.get_pool("x").is_ok());
}
