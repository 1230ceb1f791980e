//! Delivery of coordinator responses to requesters.
//!
//! The coordinator only ever talks back to a requester through a
//! [`Transport`]. A failed delivery tells the coordinator the requester is
//! gone, which is what drives grant rollback.
//!
//! Responses are addressed by pool and requester id together, so one
//! requester can wait on several pools at once without their answers
//! crossing.

use super::error::TransportError;
use super::key::PoolKey;
use super::message::ResourceResponse;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Delivers responses addressed by pool and requester id.
pub trait Transport: Send + Sync + 'static {
    fn deliver(
        &self,
        pool: &PoolKey,
        requester_id: &str,
        response: ResourceResponse,
    ) -> Result<(), TransportError>;
}

type RouteKey = (PoolKey, String);
type Route = (u64, mpsc::UnboundedSender<ResourceResponse>);

/// In-process transport backed by per-requester mailboxes.
///
/// Cloning shares the same routing table.
#[derive(Clone, Default)]
pub struct ChannelTransport {
    routes: Arc<DashMap<RouteKey, Route>>,
    generation: Arc<AtomicU64>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mailbox for `requester_id` on `pool`, replacing any
    /// previous one for the same pair.
    ///
    /// Deliveries fail once the returned mailbox is dropped.
    pub fn register(&self, pool: &PoolKey, requester_id: impl Into<String>) -> Mailbox {
        let route_key = (pool.clone(), requester_id.into());
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(route_key.clone(), (generation, tx));
        trace!(pool = %pool, requester = %route_key.1, generation, "Mailbox registered");

        Mailbox {
            route_key,
            generation,
            rx,
            routes: Arc::clone(&self.routes),
        }
    }

    /// Returns true if a live mailbox exists for `requester_id` on `pool`.
    pub fn is_registered(&self, pool: &PoolKey, requester_id: &str) -> bool {
        self.routes
            .get(&(pool.clone(), requester_id.to_string()))
            .map(|route| !route.1.is_closed())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Transport for ChannelTransport {
    fn deliver(
        &self,
        pool: &PoolKey,
        requester_id: &str,
        response: ResourceResponse,
    ) -> Result<(), TransportError> {
        let unreachable = || TransportError::Unreachable {
            pool: pool.coordinator_id(),
            requester_id: requester_id.to_string(),
        };

        let route = self
            .routes
            .get(&(pool.clone(), requester_id.to_string()))
            .ok_or_else(unreachable)?;
        route.1.send(response).map_err(|_| unreachable())
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// Receiving end of one requester's responses from one pool.
///
/// Dropping the mailbox unregisters it, unless a newer mailbox has since
/// been registered for the same pool and requester.
#[derive(Debug)]
pub struct Mailbox {
    route_key: RouteKey,
    generation: u64,
    rx: mpsc::UnboundedReceiver<ResourceResponse>,
    routes: Arc<DashMap<RouteKey, Route>>,
}

impl Mailbox {
    pub fn pool(&self) -> &PoolKey {
        &self.route_key.0
    }

    pub fn requester_id(&self) -> &str {
        &self.route_key.1
    }

    /// Waits for the next response. Returns `None` if the route was replaced.
    pub async fn recv(&mut self) -> Option<ResourceResponse> {
        self.rx.recv().await
    }

    /// Returns a response that has already arrived, if any.
    pub fn try_recv(&mut self) -> Option<ResourceResponse> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        self.routes
            .remove_if(&self.route_key, |_, route| route.0 == self.generation);
    }
}
