//! Integration tests for the offline-first sync subsystem.
//!
//! Everything runs in-process: the memory backend stands in for device
//! storage (SQLite gets its own restart test), and a scripted remote
//! stands in for the REST backend.
//!
//! # Test Organization
//! - `happy_*` - Normal operation: TTL, batches, full sync passes
//! - `failure_*` - Partial failures, offline runs, auth rejection
//! - `restart_*` - Durability across simulated process restarts

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use civic_sync::{
    keys, ChangeOp, Connectivity, KvStore, ListFilters, MemoryBackend, Page, PendingQueue,
    QueuedChange, RemoteError, RemoteViolationService, SetOptions, SqliteBackend,
    StorageBackend, SyncConfig, SyncEngine, SyncStatus, TokenProvider, ViolationRecord,
    ViolationStatus,
};

// =============================================================================
// Collaborator doubles
// =============================================================================

struct Online;

impl Connectivity for Online {
    fn is_connected(&self) -> bool {
        true
    }
    fn is_internet_reachable(&self) -> bool {
        true
    }
}

struct Airplane;

impl Connectivity for Airplane {
    fn is_connected(&self) -> bool {
        false
    }
    fn is_internet_reachable(&self) -> bool {
        false
    }
}

struct StaticToken(Option<&'static str>);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.map(String::from)
    }
}

/// Scripted stand-in for the REST backend.
///
/// - Rejects create payloads whose description is in `fail_descriptions`
/// - Rejects everything when the token provider has no token
/// - Optionally sleeps per call, to widen the window for concurrency tests
#[derive(Default)]
struct FakeServer {
    fail_descriptions: HashSet<String>,
    tokens: Option<Arc<dyn TokenProvider>>,
    call_delay: Option<Duration>,
    next_id: AtomicUsize,
    calls: AtomicUsize,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeServer {
    fn failing(descriptions: &[&str]) -> Self {
        Self {
            fail_descriptions: descriptions.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn begin_call(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref tokens) = self.tokens {
            if tokens.bearer_token().is_none() {
                return Err(RemoteError::Unauthorized);
            }
        }
        Ok(())
    }

    fn assign_record(&self, payload: &Value) -> ViolationRecord {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        ViolationRecord {
            id: Some(format!("srv-{}", id)),
            local_id: None,
            category: payload["category"].as_str().unwrap_or("other").to_string(),
            description: payload["description"].as_str().unwrap_or_default().to_string(),
            latitude: payload["latitude"].as_f64().unwrap_or(0.0),
            longitude: payload["longitude"].as_f64().unwrap_or(0.0),
            photos: vec![],
            status: ViolationStatus::Submitted,
            reported_at: 1_700_000_000_000,
        }
    }
}

#[async_trait]
impl RemoteViolationService for FakeServer {
    async fn list(&self, _: &ListFilters) -> Result<Page<ViolationRecord>, RemoteError> {
        self.begin_call().await?;
        let items: Vec<ViolationRecord> = self
            .created
            .lock()
            .iter()
            .enumerate()
            .map(|(i, description)| ViolationRecord {
                id: Some(format!("srv-{}", i + 1)),
                local_id: None,
                category: "other".into(),
                description: description.clone(),
                latitude: 0.0,
                longitude: 0.0,
                photos: vec![],
                status: ViolationStatus::Submitted,
                reported_at: 1_700_000_000_000,
            })
            .collect();
        let total = items.len() as u64;
        Ok(Page { items, total, page: 1, per_page: 50 })
    }

    async fn get_one(&self, id: &str) -> Result<ViolationRecord, RemoteError> {
        self.begin_call().await?;
        Err(RemoteError::Server { status: 404, message: format!("{} not found", id) })
    }

    async fn create(&self, payload: &Value) -> Result<ViolationRecord, RemoteError> {
        self.begin_call().await?;
        let description = payload["description"].as_str().unwrap_or_default();
        if self.fail_descriptions.contains(description) {
            return Err(RemoteError::Server {
                status: 503,
                message: "service temporarily unavailable".into(),
            });
        }
        self.created.lock().push(description.to_string());
        Ok(self.assign_record(payload))
    }

    async fn update(&self, id: &str, payload: &Value) -> Result<ViolationRecord, RemoteError> {
        self.begin_call().await?;
        let mut record = self.assign_record(payload);
        record.id = Some(id.to_string());
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.begin_call().await?;
        self.deleted.lock().push(id.to_string());
        Ok(())
    }
}

// =============================================================================
// Harness helpers
// =============================================================================

fn fast_config() -> SyncConfig {
    SyncConfig {
        remote_retry_attempts: 1,
        remote_retry_initial_ms: 1,
        remote_retry_max_ms: 5,
        ..Default::default()
    }
}

async fn build_engine(
    server: Arc<FakeServer>,
    connectivity: Arc<dyn Connectivity>,
) -> (Arc<KvStore>, Arc<PendingQueue>, SyncEngine) {
    let store = Arc::new(KvStore::new(Arc::new(MemoryBackend::new())));
    let queue = Arc::new(PendingQueue::load(store.clone()).await.unwrap());
    let engine = SyncEngine::new(
        fast_config(),
        store.clone(),
        queue.clone(),
        server,
        connectivity,
    );
    (store, queue, engine)
}

fn report_change(description: &str) -> QueuedChange {
    QueuedChange::create(json!({
        "category": "parking",
        "description": description,
        "latitude": 52.52,
        "longitude": 13.405,
    }))
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[tokio::test]
async fn happy_ttl_entry_expires_and_disappears() {
    let backend = Arc::new(MemoryBackend::new());
    let store = KvStore::new(backend.clone());

    store.set("k", "v", &SetOptions::ttl(50)).await.unwrap();
    let value: Option<String> = store.get("k").await.unwrap();
    assert_eq!(value.as_deref(), Some("v"));

    tokio::time::sleep(Duration::from_millis(80)).await;

    let value: Option<String> = store.get("k").await.unwrap();
    assert!(value.is_none());
    // The entry is gone from durable storage too, not just unreadable
    assert!(backend.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn happy_multi_set_then_multi_get() {
    let store = KvStore::new(Arc::new(MemoryBackend::new()));

    let outcomes = store
        .multi_set(&[("a", json!(1)), ("b", json!(2))], &SetOptions::plain())
        .await;
    assert!(outcomes.iter().all(|(_, r)| r.is_ok()));

    let results: Vec<(String, Result<Option<Value>, _>)> =
        store.multi_get(&["a", "b", "c"]).await;

    let values: Vec<Option<Value>> =
        results.into_iter().map(|(_, r)| r.unwrap()).collect();
    assert_eq!(values, vec![Some(json!(1)), Some(json!(2)), None]);
}

#[tokio::test]
async fn happy_full_sync_pass_confirms_all_changes() {
    let server = Arc::new(FakeServer::default());
    let (_store, queue, engine) = build_engine(server.clone(), Arc::new(Online)).await;

    for description in ["bike lane", "hydrant", "crosswalk"] {
        queue.enqueue(report_change(description)).await.unwrap();
    }
    assert_eq!(engine.pending_count(), 3);

    let report = engine.sync_once().await.unwrap();

    assert_eq!(report.status, SyncStatus::Idle);
    assert_eq!(report.succeeded.len(), 3);
    assert!(report.is_clean());
    assert_eq!(report.progress, 100);
    assert_eq!(engine.pending_count(), 0);
    assert_eq!(server.created.lock().len(), 3);
    assert!(engine.last_sync_at().await.unwrap().is_some());
}

#[tokio::test]
async fn happy_refresh_then_sync_updates_cached_records() {
    let server = Arc::new(FakeServer::default());
    let (_store, queue, engine) = build_engine(server.clone(), Arc::new(Online)).await;

    // Populate the canonical cache from the server
    server.created.lock().push("existing".to_string());
    let fetched = engine.refresh_violations(&ListFilters::default()).await.unwrap();
    assert_eq!(fetched.len(), 1);

    // Delete it through the queue; the cache follows the confirmation
    queue.enqueue(QueuedChange::delete("srv-1")).await.unwrap();
    let report = engine.sync_once().await.unwrap();
    assert!(report.is_clean());

    assert_eq!(server.deleted.lock().as_slice(), ["srv-1"]);
    let cached = engine.violations().list().await.unwrap().unwrap();
    assert!(cached.is_empty());
}

#[tokio::test]
async fn happy_full_wiring_from_config() {
    // The intended process-start wiring: one config drives the cache
    // bound, the janitor cadence and the engine's remote behavior
    let config = SyncConfig::default();
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(KvStore::with_capacity(backend, config.read_cache_capacity));
    let queue = Arc::new(PendingQueue::load(store.clone()).await.unwrap());
    let janitor = civic_sync::cleanup::Janitor::new(
        store.clone(),
        Duration::from_secs(config.cleanup_interval_secs),
    );
    let engine = SyncEngine::new(
        config.clone(),
        store.clone(),
        queue.clone(),
        Arc::new(FakeServer::default()),
        Arc::new(Online),
    );

    store
        .set(keys::AUTH_TOKEN, "bearer-xyz", &SetOptions::ttl(config.auth_token_ttl_ms))
        .await
        .unwrap();
    queue.enqueue(report_change("wired up")).await.unwrap();

    assert_eq!(janitor.run_once().await.unwrap(), 0);
    let report = engine.sync_once().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(engine.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn happy_update_flows_through_queue() {
    let server = Arc::new(FakeServer::default());
    let (_store, queue, engine) = build_engine(server.clone(), Arc::new(Online)).await;

    let change = QueuedChange::update("srv-42", json!({"description": "worse than reported"}));
    queue.enqueue(change).await.unwrap();

    let report = engine.sync_once().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(engine.pending_count(), 0);
}

// =============================================================================
// Failure Scenario Tests
// =============================================================================

#[tokio::test]
async fn failure_partial_sync_keeps_failed_item_queued() {
    let server = Arc::new(FakeServer::failing(&["c2"]));
    let (store, queue, engine) = build_engine(server, Arc::new(Online)).await;

    let c1 = report_change("c1");
    let c2 = report_change("c2");
    let c3 = report_change("c3");
    let (id1, id2, id3) = (c1.local_id.clone(), c2.local_id.clone(), c3.local_id.clone());

    queue.enqueue(c1).await.unwrap();
    queue.enqueue(c2).await.unwrap();
    queue.enqueue(c3).await.unwrap();

    let report = engine.sync_once().await.unwrap();

    // The run completed: status idle, with the failure on the report
    assert_eq!(report.status, SyncStatus::Idle);
    assert_eq!(report.succeeded, vec![id1, id3]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, id2);
    assert!(report.failed[0].1.contains("503"));

    let remaining = queue.peek_all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].local_id, id2);
    assert_eq!(remaining[0].attempts, 1);

    // A later run with a healthy server drains the leftover
    let healthy = Arc::new(FakeServer::default());
    let engine2 = SyncEngine::new(
        fast_config(),
        store.clone(),
        queue.clone(),
        healthy,
        Arc::new(Online),
    );
    let report = engine2.sync_once().await.unwrap();
    assert_eq!(report.succeeded, vec![id2]);
    assert_eq!(queue.count(), 0);
}

#[tokio::test]
async fn failure_offline_trigger_leaves_queue_untouched() {
    let server = Arc::new(FakeServer::default());
    let (_store, queue, engine) = build_engine(server.clone(), Arc::new(Airplane)).await;

    queue.enqueue(report_change("offline report")).await.unwrap();

    let report = engine.sync_once().await.unwrap();

    assert_eq!(report.status, SyncStatus::Offline);
    assert_eq!(engine.status(), SyncStatus::Offline);
    assert_eq!(queue.count(), 1);
    // Not a single network call was attempted
    assert_eq!(server.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failure_missing_token_aborts_run_with_error_status() {
    let server = Arc::new(FakeServer {
        tokens: Some(Arc::new(StaticToken(None))),
        ..Default::default()
    });
    let (_store, queue, engine) = build_engine(server.clone(), Arc::new(Online)).await;

    queue.enqueue(report_change("first")).await.unwrap();
    queue.enqueue(report_change("second")).await.unwrap();

    let report = engine.sync_once().await.unwrap();

    assert_eq!(report.status, SyncStatus::Error);
    // Auth failure is run-level: the second item was never dispatched
    assert_eq!(server.calls.load(Ordering::SeqCst), 1);
    assert_eq!(queue.count(), 2);
}

#[tokio::test]
async fn failure_valid_token_unblocks_run() {
    let server = Arc::new(FakeServer {
        tokens: Some(Arc::new(StaticToken(Some("bearer-abc")))),
        ..Default::default()
    });
    let (store, queue, engine) = build_engine(server, Arc::new(Online)).await;

    // The token itself lives in the store under the auth namespace
    store
        .set(keys::AUTH_TOKEN, "bearer-abc", &SetOptions::ttl(30 * 24 * 60 * 60 * 1000))
        .await
        .unwrap();

    queue.enqueue(report_change("with token")).await.unwrap();
    let report = engine.sync_once().await.unwrap();
    assert_eq!(report.status, SyncStatus::Idle);
    assert!(report.is_clean());

    let token: Option<String> = store.get(keys::AUTH_TOKEN).await.unwrap();
    assert_eq!(token.as_deref(), Some("bearer-abc"));
}

#[tokio::test]
async fn failure_second_trigger_is_coalesced_while_running() {
    let server = Arc::new(FakeServer {
        call_delay: Some(Duration::from_millis(100)),
        ..Default::default()
    });
    let store = Arc::new(KvStore::new(Arc::new(MemoryBackend::new())));
    let queue = Arc::new(PendingQueue::load(store.clone()).await.unwrap());
    let engine = Arc::new(SyncEngine::new(
        fast_config(),
        store,
        queue.clone(),
        server,
        Arc::new(Online),
    ));

    queue.enqueue(report_change("slow one")).await.unwrap();

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync_once().await })
    };

    // Give the first trigger time to take the run guard
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = engine.sync_once().await;
    assert!(matches!(second, Err(civic_sync::SyncError::AlreadyRunning)));

    let report = running.await.unwrap().unwrap();
    assert!(report.is_clean());
    assert_eq!(queue.count(), 0);
}

#[tokio::test]
async fn failure_cancellation_honored_at_item_boundary() {
    let server = Arc::new(FakeServer {
        call_delay: Some(Duration::from_millis(80)),
        ..Default::default()
    });
    let store = Arc::new(KvStore::new(Arc::new(MemoryBackend::new())));
    let queue = Arc::new(PendingQueue::load(store.clone()).await.unwrap());
    let engine = Arc::new(SyncEngine::new(
        fast_config(),
        store,
        queue.clone(),
        server.clone(),
        Arc::new(Online),
    ));

    queue.enqueue(report_change("first")).await.unwrap();
    queue.enqueue(report_change("second")).await.unwrap();

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync_once().await })
    };

    // Cancel while the first item's request is in flight
    tokio::time::sleep(Duration::from_millis(30)).await;
    engine.request_cancel();

    let report = running.await.unwrap().unwrap();

    // The in-flight item completed; the one behind it was never started
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(server.calls.load(Ordering::SeqCst), 1);
    assert_eq!(queue.count(), 1);
    assert_eq!(engine.status(), SyncStatus::Idle);
}

// =============================================================================
// Restart / Durability Tests
// =============================================================================

#[tokio::test]
async fn restart_queue_survives_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("civic.db");

    let pending_id = {
        let backend = Arc::new(SqliteBackend::new(&path).await.unwrap());
        let store = Arc::new(KvStore::new(backend));
        let queue = PendingQueue::load(store).await.unwrap();

        let change = report_change("written before the crash");
        let local_id = change.local_id.clone();
        queue.enqueue(change).await.unwrap();
        local_id
    };

    // Fresh process: new backend, store, queue and engine over the same file
    let backend = Arc::new(SqliteBackend::new(&path).await.unwrap());
    let store = Arc::new(KvStore::new(backend));
    let queue = Arc::new(PendingQueue::load(store.clone()).await.unwrap());
    assert_eq!(queue.count(), 1);

    let server = Arc::new(FakeServer::default());
    let engine = SyncEngine::new(
        fast_config(),
        store,
        queue.clone(),
        server,
        Arc::new(Online),
    );

    let report = engine.sync_once().await.unwrap();
    assert_eq!(report.succeeded, vec![pending_id]);
    assert_eq!(queue.count(), 0);
}

#[tokio::test]
async fn restart_last_sync_timestamp_survives() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("civic.db");

    {
        let backend = Arc::new(SqliteBackend::new(&path).await.unwrap());
        let store = Arc::new(KvStore::new(backend));
        let queue = Arc::new(PendingQueue::load(store.clone()).await.unwrap());
        let engine = SyncEngine::new(
            fast_config(),
            store,
            queue,
            Arc::new(FakeServer::default()),
            Arc::new(Online),
        );
        let report = engine.sync_once().await.unwrap();
        assert!(report.last_sync_at.is_some());
    }

    let backend = Arc::new(SqliteBackend::new(&path).await.unwrap());
    let store = Arc::new(KvStore::new(backend));
    let stamp: Option<i64> = store.get(keys::SYNC_LAST_RUN).await.unwrap();
    assert!(stamp.is_some());
}

#[tokio::test]
async fn restart_fifo_order_survives_failed_runs() {
    let (_store, queue, engine) = {
        let server = Arc::new(FakeServer::failing(&["a", "b", "c"]));
        build_engine(server, Arc::new(Online)).await
    };

    let changes: Vec<QueuedChange> =
        ["a", "b", "c"].iter().map(|d| report_change(d)).collect();
    let ids: Vec<String> = changes.iter().map(|c| c.local_id.clone()).collect();
    for change in changes {
        queue.enqueue(change).await.unwrap();
    }

    // Two failed passes must not reorder anything
    let _ = engine.sync_once().await.unwrap();
    let _ = engine.sync_once().await.unwrap();

    let after: Vec<String> = queue
        .peek_all()
        .await
        .unwrap()
        .iter()
        .map(|c| c.local_id.clone())
        .collect();
    assert_eq!(after, ids);

    let attempts: Vec<u32> = queue
        .peek_all()
        .await
        .unwrap()
        .iter()
        .map(|c| c.attempts)
        .collect();
    assert_eq!(attempts, vec![2, 2, 2]);
}

#[tokio::test]
async fn restart_dependent_changes_stay_ordered() {
    // A create followed by a delete of the same remote record: the
    // create must confirm first so the delete targets a real id
    let server = Arc::new(FakeServer::default());
    let (_store, queue, engine) = build_engine(server.clone(), Arc::new(Online)).await;

    queue.enqueue(report_change("to be removed")).await.unwrap();
    queue.enqueue(QueuedChange::delete("srv-1")).await.unwrap();

    let report = engine.sync_once().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.succeeded.len(), 2);

    // Create was dispatched before delete
    assert_eq!(server.created.lock().len(), 1);
    assert_eq!(server.deleted.lock().as_slice(), ["srv-1"]);
}

#[tokio::test]
async fn queue_change_kinds_roundtrip_through_storage() {
    let store = Arc::new(KvStore::new(Arc::new(MemoryBackend::new())));
    let queue = PendingQueue::load(store.clone()).await.unwrap();

    queue.enqueue(QueuedChange::create(json!({"n": 1}))).await.unwrap();
    queue
        .enqueue(QueuedChange::update("srv-1", json!({"n": 2})))
        .await
        .unwrap();
    queue.enqueue(QueuedChange::delete("srv-2")).await.unwrap();

    let all = queue.peek_all().await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].operation, ChangeOp::Create);
    assert_eq!(all[1].operation, ChangeOp::Update);
    assert_eq!(all[1].target_id.as_deref(), Some("srv-1"));
    assert_eq!(all[2].operation, ChangeOp::Delete);
    assert_eq!(all[2].target_id.as_deref(), Some("srv-2"));
}
