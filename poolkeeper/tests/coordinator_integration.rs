//! Integration tests for the resource-pool coordinator.
//!
//! These drive real coordinator tasks over the in-process channel transport:
//! - Grant, queue and release ordering
//! - Live resizing with and without outstanding grants
//! - Rollback when a requester is unreachable
//! - Lease timeouts
//!
//! Run with: `cargo test --test coordinator_integration`

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use poolkeeper::pool::{
    ChannelTransport, Mailbox, PoolEvent, PoolHandle, PoolKey, PoolOptions,
    RecordingTelemetrySink, ReleaseReason, ResourcePoolCoordinator, ResourceResponse,
};

// ============================================================================
// Test Helpers
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Pool {
    handle: PoolHandle,
    transport: ChannelTransport,
    telemetry: Arc<RecordingTelemetrySink>,
    shutdown: CancellationToken,
}

impl Pool {
    fn start(options: PoolOptions) -> Self {
        let transport = ChannelTransport::new();
        let telemetry = Arc::new(RecordingTelemetrySink::new());
        let (coordinator, handle) = ResourcePoolCoordinator::new(
            PoolKey::new("it", "gpu"),
            &options,
            Arc::new(transport.clone()),
            telemetry.clone(),
        )
        .unwrap();

        let shutdown = CancellationToken::new();
        tokio::spawn(coordinator.run(shutdown.clone()));

        Self {
            handle,
            transport,
            telemetry,
            shutdown,
        }
    }

    /// Registers a mailbox and sends the request.
    async fn request(&self, requester_id: &str, priority: i32) -> Mailbox {
        let mailbox = self.transport.register(self.handle.key(), requester_id);
        self.handle
            .request_resource(requester_id, priority)
            .await
            .unwrap();
        mailbox
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn expect_response(mailbox: &mut Mailbox) -> ResourceResponse {
    tokio::time::timeout(RECV_TIMEOUT, mailbox.recv())
        .await
        .expect("timed out waiting for a response")
        .expect("mailbox closed")
}

async fn expect_grant(mailbox: &mut Mailbox) -> usize {
    match expect_response(mailbox).await {
        ResourceResponse::Acquired { record, .. } => record.index,
        other => panic!("expected a grant, got {:?}", other),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_release_passes_slot_to_next_waiter() {
    let pool = Pool::start(PoolOptions::with_size(1));
    let mut r1 = pool.request("r1", 0).await;
    let mut r2 = pool.request("r2", 0).await;
    let mut r3 = pool.request("r3", 0).await;

    assert_eq!(expect_grant(&mut r1).await, 0);
    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.waiting_count, 2);
    assert_eq!(status.available_count, 0);

    pool.handle.release_for("r1").await.unwrap();
    assert_eq!(expect_grant(&mut r2).await, 0);

    let allocation = pool.handle.allocation().await.unwrap();
    assert_eq!(allocation.waiting_ids(), vec!["r3"]);
    assert_eq!(allocation.slot_of("r2").map(|s| s.index), Some(0));
    assert!(r3.try_recv().is_none());
}

#[tokio::test]
async fn test_grow_grants_every_waiter() {
    let pool = Pool::start(PoolOptions::with_size(1));
    let mut r1 = pool.request("r1", 0).await;
    let mut r2 = pool.request("r2", 0).await;
    let mut r3 = pool.request("r3", 0).await;
    expect_grant(&mut r1).await;

    pool.handle.resize(3).await.unwrap();

    let mut granted = HashSet::new();
    granted.insert(expect_grant(&mut r2).await);
    granted.insert(expect_grant(&mut r3).await);
    assert_eq!(granted, HashSet::from([1, 2]));

    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.total_resources, 3);
    assert_eq!(status.allocated_count, 3);
    assert_eq!(status.waiting_count, 0);
}

#[tokio::test]
async fn test_shrink_with_grant_defers_truncation() {
    let pool = Pool::start(PoolOptions::with_size(3));
    let mut r1 = pool.request("r1", 0).await;
    expect_grant(&mut r1).await;

    pool.handle.resize(1).await.unwrap();
    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.available_count, 0);
    assert_eq!(status.total_resources, 3);

    let allocation = pool.handle.allocation().await.unwrap();
    assert_eq!(allocation.slots.iter().filter(|s| s.retired).count(), 2);

    pool.handle.release_for("r1").await.unwrap();
    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.total_resources, 1);
    assert_eq!(status.available_count, 1);
    assert_eq!(status.allocated_count, 0);
}

#[tokio::test]
async fn test_expand_then_shrink_restores_counts() {
    let pool = Pool::start(PoolOptions::with_size(2));
    pool.handle.resize(6).await.unwrap();
    assert_eq!(pool.handle.status().await.unwrap().available_count, 6);

    pool.handle.resize(2).await.unwrap();
    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.available_count, 2);
    assert_eq!(status.total_resources, 2);
}

#[tokio::test]
async fn test_waiters_are_admitted_fifo_regardless_of_priority() {
    let pool = Pool::start(PoolOptions::with_size(1));
    let mut holder = pool.request("holder", 0).await;
    expect_grant(&mut holder).await;

    let ids = ["w1", "w2", "w3", "w4"];
    let priorities = [1, 50, -3, 99];
    let mut mailboxes = Vec::new();
    for (id, priority) in ids.iter().zip(priorities) {
        mailboxes.push(pool.request(id, priority).await);
    }

    let mut current = "holder";
    for (id, mailbox) in ids.iter().zip(mailboxes.iter_mut()) {
        pool.handle.release_for(current).await.unwrap();
        expect_grant(mailbox).await;
        current = *id;
    }
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn test_unreachable_requester_is_rolled_back() {
    let pool = Pool::start(PoolOptions::with_size(1));
    drop(pool.transport.register(pool.handle.key(), "gone"));
    pool.handle.request_resource("gone", 0).await.unwrap();

    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.available_count, 1);
    assert_eq!(status.allocated_count, 0);
    assert_eq!(pool.telemetry.count("grant_rolled_back"), 1);

    let mut next = pool.request("next", 0).await;
    assert_eq!(expect_grant(&mut next).await, 0);
}

#[tokio::test]
async fn test_cancel_after_grant_is_a_no_op() {
    let pool = Pool::start(PoolOptions::with_size(1));
    let mut r1 = pool.request("r1", 0).await;
    expect_grant(&mut r1).await;

    pool.handle.cancel_request("r1").await.unwrap();
    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.allocated_count, 1);
    assert!(r1.try_recv().is_none());
}

#[tokio::test]
async fn test_cancel_while_waiting() {
    let pool = Pool::start(PoolOptions::with_size(1));
    let mut r1 = pool.request("r1", 0).await;
    let mut r2 = pool.request("r2", 0).await;
    expect_grant(&mut r1).await;

    pool.handle.cancel_request("r2").await.unwrap();
    assert_eq!(expect_response(&mut r2).await, ResourceResponse::Cancelled);
    assert_eq!(pool.handle.status().await.unwrap().waiting_count, 0);
}

#[tokio::test]
async fn test_resize_to_zero_keeps_pool() {
    let pool = Pool::start(PoolOptions::with_size(2));
    pool.handle.resize(0).await.unwrap();

    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.total_resources, 2);
    assert_eq!(pool.telemetry.count("resize_rejected"), 1);
}

// ============================================================================
// Lease Timeouts
// ============================================================================

#[tokio::test]
async fn test_expired_lease_is_reclaimed_for_waiter() {
    let options = PoolOptions::with_size(1).lease_timeout(Some(Duration::from_millis(50)));
    let pool = Pool::start(options);
    let mut r1 = pool.request("r1", 0).await;
    let mut r2 = pool.request("r2", 0).await;

    expect_grant(&mut r1).await;
    // r1 never releases.
    assert_eq!(expect_grant(&mut r2).await, 0);
    assert!(pool.telemetry.events().iter().any(|e| matches!(
        e,
        PoolEvent::ResourceReleased {
            reason: ReleaseReason::TimedOut,
            ..
        }
    )));
}

#[tokio::test]
async fn test_release_before_timeout_prevents_expiry() {
    let options = PoolOptions::with_size(1).lease_timeout(Some(Duration::from_millis(200)));
    let pool = Pool::start(options);
    let mut r1 = pool.request("r1", 0).await;
    expect_grant(&mut r1).await;
    pool.handle.release_for("r1").await.unwrap();
    drop(r1);
    tokio::time::sleep(Duration::from_millis(120)).await;

    // Re-acquire under the same id; the first lease's timer must not end it.
    let mut again = pool.request("r1", 0).await;
    expect_grant(&mut again).await;
    tokio::time::sleep(Duration::from_millis(120)).await;

    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.allocated_count, 1);
    assert_eq!(pool.telemetry.count("resource_released"), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requesters_never_share_a_slot() {
    let pool = Arc::new(Pool::start(PoolOptions::with_size(3)));
    let held: Arc<Mutex<HashSet<usize>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = Vec::new();
    for i in 0..24 {
        let pool = Arc::clone(&pool);
        let held = Arc::clone(&held);
        tasks.push(tokio::spawn(async move {
            let id = format!("worker-{}", i);
            let mut mailbox = pool.request(&id, 0).await;
            let index = expect_grant(&mut mailbox).await;

            assert!(held.lock().unwrap().insert(index), "slot {} granted twice", index);
            tokio::time::sleep(Duration::from_millis(2)).await;
            held.lock().unwrap().remove(&index);

            pool.handle.release_for(&id).await.unwrap();
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let status = pool.handle.status().await.unwrap();
    assert_eq!(status.available_count, 3);
    assert_eq!(status.allocated_count, 0);
    assert_eq!(status.waiting_count, 0);
    assert_eq!(pool.telemetry.count("resource_granted"), 24);
}
