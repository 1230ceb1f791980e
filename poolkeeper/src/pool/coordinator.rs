//! The resource-pool coordinator.
//!
//! One [`ResourcePoolCoordinator`] owns one pool. It runs a single event loop
//! over three sources and handles one event to completion before looking at
//! the next, so [`ResourcePoolState`] needs no locking:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  ResourcePoolCoordinator                      │
//! │                                                               │
//! │  shutdown ───────────────┐                                    │
//! │                          ▼                                    │
//! │  lease events ──► ┌─────────────┐      ┌──────────────────┐   │
//! │  (timeouts)       │ select loop │ ───► │ResourcePoolState │   │
//! │  PoolMessage ───► └──────┬──────┘      └──────────────────┘   │
//! │                          │                                    │
//! │                          ▼                                    │
//! │               Transport::deliver ──► requester mailbox        │
//! │               LeaseWatcher::spawn ──► lease events            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lease events are polled before the inbox so an expired lease frees its
//! slot before newer requests are considered.
//!
//! # Example
//!
//! ```ignore
//! let transport = ChannelTransport::new();
//! let (coordinator, handle) = ResourcePoolCoordinator::new(
//!     PoolKey::new("default", "gpu"),
//!     &PoolOptions::with_size(2),
//!     Arc::new(transport.clone()),
//!     Arc::new(TracingTelemetrySink),
//! )?;
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(coordinator.run(shutdown.clone()));
//!
//! let mut mailbox = transport.register(handle.key(), "worker-1");
//! handle.request_resource("worker-1", 0).await?;
//! let response = mailbox.recv().await;
//! ```

use super::error::PoolError;
use super::handle::PoolHandle;
use super::initializer::PoolInitializer;
use super::key::{release_channel_name, PoolKey};
use super::message::{PendingRequest, PoolMessage, ReleaseReason, ResourceResponse};
use super::options::PoolOptions;
use super::state::ResourcePoolState;
use super::telemetry::{PoolEvent, PoolTelemetrySink};
use super::transport::Transport;
use super::watcher::{LeaseEvent, LeaseWatcher};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// A grant the coordinator is tracking for release or expiry.
#[derive(Debug)]
struct ActiveLease {
    lease_id: u64,
    index: usize,
    requester_id: String,
    granted_at: Instant,
    /// Present only when the pool has a lease timeout.
    watcher: Option<CancellationToken>,
}

/// What happened when the coordinator tried to grant a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GrantOutcome {
    Granted,
    /// A slot was allocated but the requester was unreachable.
    RolledBack,
    NoCapacity,
}

enum Step {
    Shutdown,
    Lease(LeaseEvent),
    Message(PoolMessage),
    InboxClosed,
}

/// Single-writer owner of one pool.
pub struct ResourcePoolCoordinator {
    key: PoolKey,
    state: ResourcePoolState,
    initializer: Box<dyn PoolInitializer>,
    lease_timeout: Option<Duration>,
    transport: Arc<dyn Transport>,
    telemetry: Arc<dyn PoolTelemetrySink>,
    inbox: mpsc::Receiver<PoolMessage>,
    lease_tx: mpsc::UnboundedSender<LeaseEvent>,
    lease_rx: mpsc::UnboundedReceiver<LeaseEvent>,
    /// Keyed by release channel name.
    leases: HashMap<String, ActiveLease>,
    next_lease_id: u64,
    /// Parent of every watcher token.
    watchers: CancellationToken,
}

impl ResourcePoolCoordinator {
    /// Creates a coordinator and the handle that feeds its inbox.
    ///
    /// The coordinator does nothing until [`run`](Self::run) is awaited.
    pub fn new(
        key: PoolKey,
        options: &PoolOptions,
        transport: Arc<dyn Transport>,
        telemetry: Arc<dyn PoolTelemetrySink>,
    ) -> Result<(Self, PoolHandle), PoolError> {
        if options.size == 0 {
            return Err(PoolError::InvalidPoolSize { size: 0 });
        }

        let initializer = options.initializer.build();
        let slots = initializer.initialize(&key, options.size);
        let (tx, inbox) = mpsc::channel(options.channel_capacity.max(1));
        let (lease_tx, lease_rx) = mpsc::unbounded_channel();

        telemetry.emit(PoolEvent::PoolStarted {
            pool: key.clone(),
            size: options.size,
            initializer: initializer.name(),
        });

        let coordinator = Self {
            key: key.clone(),
            state: ResourcePoolState::new(slots),
            initializer,
            lease_timeout: options.lease_timeout,
            transport,
            telemetry,
            inbox,
            lease_tx,
            lease_rx,
            leases: HashMap::new(),
            next_lease_id: 0,
            watchers: CancellationToken::new(),
        };

        Ok((coordinator, PoolHandle::new(key, tx)))
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn state(&self) -> &ResourcePoolState {
        &self.state
    }

    /// Runs the event loop until `shutdown` fires or every handle is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(pool = %self.key, "Pool coordinator starting");

        loop {
            let step = tokio::select! {
                biased;

                _ = shutdown.cancelled() => Step::Shutdown,

                Some(event) = self.lease_rx.recv() => Step::Lease(event),

                message = self.inbox.recv() => match message {
                    Some(message) => Step::Message(message),
                    None => Step::InboxClosed,
                },
            };

            match step {
                Step::Shutdown => {
                    info!(pool = %self.key, "Pool coordinator shutting down");
                    break;
                }
                Step::InboxClosed => {
                    debug!(pool = %self.key, "All pool handles dropped");
                    break;
                }
                Step::Lease(event) => self.handle_lease_event(event),
                Step::Message(message) => self.handle_message(message),
            }
        }

        self.watchers.cancel();
        self.emit(PoolEvent::PoolStopped {
            pool: self.key.clone(),
        });
        info!(
            pool = %self.key,
            allocated = self.state.allocated_count(),
            waiting = self.state.waiting_count(),
            "Pool coordinator stopped"
        );
    }

    /// Applies one inbound message.
    pub fn handle_message(&mut self, message: PoolMessage) {
        trace!(pool = %self.key, kind = message.kind(), "Handling message");

        match message {
            PoolMessage::RequestResource {
                requester_id,
                priority,
            } => self.acquire(requester_id, priority),
            PoolMessage::ReleaseResource { channel, lease_id } => {
                self.signal_release(&channel, lease_id)
            }
            PoolMessage::UpdateResourcePool { new_size } => self.resize(new_size),
            PoolMessage::CancelRequest { requester_id } => self.cancel_wait(&requester_id),
            PoolMessage::GetStatus { reply } => {
                let _ = reply.send(self.state.status(self.key.resource_id()));
            }
            PoolMessage::GetAllocation { reply } => {
                let _ = reply.send(self.state.allocation(self.key.resource_id()));
            }
        }
    }

    // =========================================================================
    // Acquire
    // =========================================================================

    fn acquire(&mut self, requester_id: String, priority: i32) {
        if self.state.grant_of(&requester_id).is_some() || self.state.is_waiting(&requester_id) {
            warn!(
                pool = %self.key,
                requester = %requester_id,
                "Requester already holds or awaits a slot, ignoring request"
            );
            self.emit(PoolEvent::DuplicateRequest {
                pool: self.key.clone(),
                requester_id,
            });
            return;
        }

        let request = PendingRequest::new(requester_id, priority);

        // Never overtake requests that are already waiting.
        if self.state.waiting_count() == 0 && self.try_grant(&request) != GrantOutcome::NoCapacity {
            return;
        }

        let position = self.state.enqueue(request.clone());
        self.emit(PoolEvent::RequestQueued {
            pool: self.key.clone(),
            requester_id: request.requester_id,
            priority: request.priority,
            position,
        });
    }

    /// Allocates a slot for `request` and delivers the grant.
    ///
    /// An undeliverable grant is rolled back before returning.
    fn try_grant(&mut self, request: &PendingRequest) -> GrantOutcome {
        let Some(record) = self.state.allocate(&request.requester_id) else {
            return GrantOutcome::NoCapacity;
        };

        let index = record.index;
        let resource_id = record.id.clone();
        let channel = release_channel_name(&request.requester_id);
        let lease_id = self.next_lease_id;
        self.next_lease_id += 1;
        let response = ResourceResponse::Acquired {
            release_channel: channel.clone(),
            lease_id,
            record,
        };

        if let Err(e) = self
            .transport
            .deliver(&self.key, &request.requester_id, response)
        {
            self.state.rollback(index, &request.requester_id);
            debug!(pool = %self.key, error = %e, index, "Grant undeliverable");
            self.emit(PoolEvent::GrantRolledBack {
                pool: self.key.clone(),
                requester_id: request.requester_id.clone(),
                index,
            });
            return GrantOutcome::RolledBack;
        }

        self.start_lease(channel, lease_id, index, &request.requester_id);
        self.emit(PoolEvent::ResourceGranted {
            pool: self.key.clone(),
            requester_id: request.requester_id.clone(),
            resource_id,
            index,
            lease_timeout: self.lease_timeout,
        });
        GrantOutcome::Granted
    }

    fn start_lease(&mut self, channel: String, lease_id: u64, index: usize, requester_id: &str) {
        let watcher = self.lease_timeout.map(|timeout| {
            let token = self.watchers.child_token();
            LeaseWatcher::new(
                channel.clone(),
                lease_id,
                timeout,
                token.clone(),
                self.lease_tx.clone(),
            )
            .spawn();
            token
        });

        self.leases.insert(
            channel,
            ActiveLease {
                lease_id,
                index,
                requester_id: requester_id.to_string(),
                granted_at: Instant::now(),
                watcher,
            },
        );
    }

    /// Grants the head of the waiting list if a slot is free.
    ///
    /// Returns true if a waiter was consumed, granted or rolled back.
    fn process_next_request(&mut self) -> bool {
        if self.state.available_count() == 0 {
            return false;
        }
        let Some(request) = self.state.pop_waiting() else {
            return false;
        };

        match self.try_grant(&request) {
            GrantOutcome::Granted | GrantOutcome::RolledBack => true,
            GrantOutcome::NoCapacity => {
                self.state.requeue_front(request);
                false
            }
        }
    }

    fn drain_waiting_list(&mut self) {
        while self.process_next_request() {}
    }

    // =========================================================================
    // Release
    // =========================================================================

    fn signal_release(&mut self, channel: &str, lease_id: Option<u64>) {
        let Some(current) = self.leases.get(channel) else {
            debug!(pool = %self.key, channel, "Release for unknown lease ignored");
            return;
        };
        if lease_id.is_some_and(|id| id != current.lease_id) {
            debug!(
                pool = %self.key,
                channel,
                lease_id,
                current = current.lease_id,
                "Stale release ignored"
            );
            return;
        }
        let Some(lease) = self.leases.remove(channel) else {
            return;
        };
        if let Some(watcher) = &lease.watcher {
            watcher.cancel();
        }
        self.handle_release(lease, ReleaseReason::Released);
    }

    fn handle_lease_event(&mut self, event: LeaseEvent) {
        let current = matches!(
            self.leases.get(&event.channel),
            Some(lease) if lease.lease_id == event.lease_id
        );
        if !current {
            debug!(
                pool = %self.key,
                channel = %event.channel,
                lease_id = event.lease_id,
                "Stale lease timeout ignored"
            );
            return;
        }
        if let Some(lease) = self.leases.remove(&event.channel) {
            self.handle_release(lease, ReleaseReason::TimedOut);
        }
    }

    /// Frees a grant's slot and admits waiters. Shared by release and timeout.
    fn handle_release(&mut self, lease: ActiveLease, reason: ReleaseReason) {
        let Some(status) = self.state.free(lease.index, &lease.requester_id) else {
            debug!(
                pool = %self.key,
                requester = %lease.requester_id,
                index = lease.index,
                "Grant no longer exists"
            );
            return;
        };

        trace!(pool = %self.key, index = lease.index, status = %status, "Slot freed");
        self.emit(PoolEvent::ResourceReleased {
            pool: self.key.clone(),
            requester_id: lease.requester_id,
            index: lease.index,
            reason,
            held_for: lease.granted_at.elapsed(),
        });

        self.drain_waiting_list();
    }

    // =========================================================================
    // Resize and Cancel
    // =========================================================================

    fn resize(&mut self, new_size: usize) {
        if new_size == 0 {
            warn!(pool = %self.key, "Pool size must be positive, ignoring resize to 0");
            self.emit(PoolEvent::ResizeRejected {
                pool: self.key.clone(),
                requested: new_size,
            });
            return;
        }

        let outcome = self
            .state
            .resize(&self.key, self.initializer.as_ref(), new_size);
        debug!(
            pool = %self.key,
            added = outcome.added,
            removed = outcome.removed,
            retired = self.state.retired_count(),
            "Resize applied"
        );
        self.emit(PoolEvent::PoolResized {
            pool: self.key.clone(),
            previous_size: outcome.previous_size,
            new_size: outcome.new_size,
            available_count: self.state.available_count(),
        });

        self.drain_waiting_list();
    }

    fn cancel_wait(&mut self, requester_id: &str) {
        if self.state.remove_waiting(requester_id).is_none() {
            trace!(pool = %self.key, requester = requester_id, "Cancel for non-waiting requester");
            return;
        }

        if let Err(e) = self
            .transport
            .deliver(&self.key, requester_id, ResourceResponse::Cancelled)
        {
            debug!(pool = %self.key, error = %e, "Cancellation undeliverable");
        }
        self.emit(PoolEvent::WaitCancelled {
            pool: self.key.clone(),
            requester_id: requester_id.to_string(),
        });
    }

    fn emit(&self, event: PoolEvent) {
        self.telemetry.emit(event);
    }
}

impl std::fmt::Debug for ResourcePoolCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePoolCoordinator")
            .field("key", &self.key)
            .field("initializer", &self.initializer.name())
            .field("lease_timeout", &self.lease_timeout)
            .field("leases", &self.leases.len())
            .finish()
    }
}
