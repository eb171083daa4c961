//! Integration tests for the backfill orchestrator over a real (in-memory
//! SQLite) database and the in-process queue.
//!
//! These cover the end-to-end cold start — listing, queueing, per-package
//! sync into the index — plus crash recovery and the state machine
//! against the database-backed store.

#![cfg(feature = "migrate")]

mod support;

use std::sync::Arc;
use std::time::Duration;

use packmule::connect_and_migrate;
use packmule::entity::prelude::BackfillStatus;
use packmule::http::HttpMethod;
use packmule::index::MemoryIndex;
use packmule::queries;
use packmule::registry::RegistryClient;
use packmule::retry::RetryConfig;
use packmule::SearchIndex;
use packmule::sync::{
    BackfillError, BackfillOrchestrator, DbStateStore, JobKind, JobQueue, MemoryQueue,
    PipelineHandler, SyncHandler, TickOutcome,
};

use support::{REGISTRY_URL, StubTransport, push_leaf};

struct Harness {
    transport: StubTransport,
    queue: Arc<MemoryQueue>,
    orchestrator: Arc<BackfillOrchestrator<DbStateStore>>,
    index: MemoryIndex,
    handler: PipelineHandler<DbStateStore>,
    db: sea_orm::DatabaseConnection,
}

async fn harness(page_size: usize, batch_size: u64) -> Harness {
    let db = connect_and_migrate("sqlite::memory:")
        .await
        .expect("in-memory database should migrate");

    let transport = StubTransport::new();
    let client = Arc::new(RegistryClient::new(
        Arc::new(transport.clone()),
        REGISTRY_URL,
    ));
    let queue = Arc::new(MemoryQueue::new());

    let orchestrator = Arc::new(
        BackfillOrchestrator::new(
            DbStateStore::new(db.clone()),
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::clone(&client),
        )
        .with_page_size(page_size)
        .with_batch_size(batch_size)
        .with_tick_interval(Duration::from_millis(10)),
    );

    let index = MemoryIndex::new();
    let sync = SyncHandler::new(client, Arc::new(index.clone()))
        .with_retry(RetryConfig::new(Duration::ZERO, Duration::ZERO, 0));
    let handler = PipelineHandler::new(sync).with_backfill(Arc::clone(&orchestrator));

    Harness {
        transport,
        queue,
        orchestrator,
        index,
        handler,
        db,
    }
}

fn push_listing_page(transport: &StubTransport, url: String, rows: &[&str], total: u64) {
    transport.push_json(
        HttpMethod::Get,
        url,
        &serde_json::json!({
            "total_rows": total,
            "rows": rows.iter().map(|id| serde_json::json!({ "id": id })).collect::<Vec<_>>()
        }),
    );
}

#[tokio::test]
async fn cold_start_backfill_syncs_the_whole_registry_into_the_index() {
    let harness = harness(3, 2).await;

    push_listing_page(
        &harness.transport,
        format!("{REGISTRY_URL}/_all_docs?limit=3"),
        &["alpha", "beta", "gamma"],
        5,
    );
    push_listing_page(
        &harness.transport,
        format!("{REGISTRY_URL}/_all_docs?limit=3&startkey=%22gamma%22"),
        &["gamma", "delta", "epsilon"],
        5,
    );
    push_listing_page(
        &harness.transport,
        format!("{REGISTRY_URL}/_all_docs?limit=3&startkey=%22epsilon%22"),
        &["epsilon"],
        5,
    );
    for name in ["alpha", "beta", "gamma", "delta", "epsilon"] {
        push_leaf(&harness.transport, name, "1.0.0", 100);
    }

    harness.orchestrator.start().await.expect("start");
    let processed = harness.queue.run_until_idle(&harness.handler).await;

    // One tick plus five package syncs.
    assert_eq!(processed, 6);

    let state = harness.orchestrator.status().await.unwrap();
    assert_eq!(state.status, BackfillStatus::Completed);
    assert_eq!(state.offset, 5);
    assert_eq!(state.total, 5);

    assert_eq!(harness.index.len().await, 5);
    let doc = harness
        .index
        .get("delta")
        .await
        .unwrap()
        .expect("delta indexed");
    assert_eq!(doc.latest_version, "1.0.0");
}

#[tokio::test]
async fn crashed_backfill_resumes_from_the_stored_offset() {
    let harness = harness(3, 2).await;

    // Simulate the state a crash left behind: a listed universe of five
    // packages, two already enqueued, status still running, and no
    // pending tick (the queue died with the process).
    let universe: Vec<String> = ["alpha", "beta", "gamma", "delta", "epsilon"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    queries::backfill::append_packages(&harness.db, 0, &universe)
        .await
        .unwrap();
    let mut state = queries::backfill::load_or_init(&harness.db).await.unwrap();
    state.status = BackfillStatus::Running;
    state.total = 5;
    state.offset = 2;
    state.started_at = Some(chrono::Utc::now());
    assert!(
        queries::backfill::compare_and_swap(&harness.db, state.version, &state)
            .await
            .unwrap()
    );

    for name in ["gamma", "delta", "epsilon"] {
        push_leaf(&harness.transport, name, "1.0.0", 100);
    }

    // Startup recovery schedules the missing tick; draining the queue
    // finishes the remaining three packages without re-listing.
    assert!(harness.orchestrator.recover_on_startup().await.unwrap());
    harness.queue.run_until_idle(&harness.handler).await;

    let state = harness.orchestrator.status().await.unwrap();
    assert_eq!(state.status, BackfillStatus::Completed);
    assert_eq!(state.offset, 5);
    assert_eq!(harness.index.len().await, 3);
}

#[tokio::test]
async fn state_machine_transitions_against_the_database_store() {
    let harness = harness(3, 2).await;

    // idle → running
    harness.orchestrator.start().await.expect("start");
    assert!(matches!(
        harness.orchestrator.start().await,
        Err(BackfillError::AlreadyRunning)
    ));

    // running → paused → running
    harness.orchestrator.pause().await.expect("pause");
    assert_eq!(
        harness.orchestrator.status().await.unwrap().status,
        BackfillStatus::Paused
    );
    harness.orchestrator.resume().await.expect("resume");
    assert_eq!(
        harness.orchestrator.status().await.unwrap().status,
        BackfillStatus::Running
    );

    // reset → idle with cleared counters and no pending ticks
    harness.orchestrator.reset().await.expect("reset");
    let state = harness.orchestrator.status().await.unwrap();
    assert_eq!(state.status, BackfillStatus::Idle);
    assert_eq!(state.offset, 0);
    assert_eq!(state.total, 0);
    assert_eq!(
        harness
            .queue
            .pending_count(JobKind::BackfillTick)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn drain_ticks_preserve_listing_order_and_eventually_complete() {
    let harness = harness(3, 2).await;

    let universe: Vec<String> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    queries::backfill::append_packages(&harness.db, 0, &universe)
        .await
        .unwrap();
    let mut state = queries::backfill::load_or_init(&harness.db).await.unwrap();
    state.status = BackfillStatus::Running;
    state.total = 5;
    state.started_at = Some(chrono::Utc::now());
    assert!(
        queries::backfill::compare_and_swap(&harness.db, state.version, &state)
            .await
            .unwrap()
    );

    // Tick 1: a, b. Tick 2: c, d. Tick 3: e + completion.
    assert_eq!(
        harness.orchestrator.tick().await.unwrap(),
        TickOutcome::Advanced {
            offset: 2,
            total: 5
        }
    );
    assert_eq!(
        harness.orchestrator.tick().await.unwrap(),
        TickOutcome::Advanced {
            offset: 4,
            total: 5
        }
    );
    assert_eq!(
        harness.orchestrator.tick().await.unwrap(),
        TickOutcome::Completed { total: 5 }
    );

    // Completed: further ticks are no-ops.
    assert_eq!(harness.orchestrator.tick().await.unwrap(), TickOutcome::Noop);

    assert_eq!(
        harness
            .queue
            .pending_count(JobKind::PackageSync)
            .await
            .unwrap(),
        5
    );
}

#[tokio::test]
async fn listing_failure_is_retained_until_reset() {
    let harness = harness(3, 2).await;
    harness.transport.push_status(
        HttpMethod::Get,
        format!("{REGISTRY_URL}/_all_docs?limit=3"),
        500,
    );

    harness.orchestrator.start().await.expect("start");
    let err = harness.orchestrator.tick().await.expect_err("listing dies");
    assert!(matches!(err, BackfillError::Listing(_)));

    let state = harness.orchestrator.status().await.unwrap();
    assert_eq!(state.status, BackfillStatus::Error);
    let message = state.error_message.clone().expect("message retained");
    assert!(!message.is_empty());

    // Status reporting keeps the error until an operator reset.
    let state = harness.orchestrator.status().await.unwrap();
    assert_eq!(state.status, BackfillStatus::Error);

    harness.orchestrator.reset().await.expect("reset");
    let state = harness.orchestrator.status().await.unwrap();
    assert_eq!(state.status, BackfillStatus::Idle);
    assert!(state.error_message.is_none());
}
