//! Telemetry for pool observability.
//!
//! Coordinators emit [`PoolEvent`]s to an injected [`PoolTelemetrySink`]
//! and leave presentation to the sink. The coordinator never blocks on a
//! sink, so implementations should be cheap and non-blocking.
//!
//! # Example
//!
//! ```ignore
//! use poolkeeper::pool::{PoolEvent, PoolTelemetrySink};
//!
//! struct CountingSink(std::sync::atomic::AtomicUsize);
//!
//! impl PoolTelemetrySink for CountingSink {
//!     fn emit(&self, _event: PoolEvent) {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!     }
//! }
//! ```

use super::key::PoolKey;
use super::message::ReleaseReason;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Pool Events
// =============================================================================

/// Events emitted by a coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum PoolEvent {
    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// A coordinator was created for a pool key.
    PoolStarted {
        pool: PoolKey,
        size: usize,
        initializer: &'static str,
    },

    /// A coordinator loop exited.
    PoolStopped { pool: PoolKey },

    // -------------------------------------------------------------------------
    // Grants
    // -------------------------------------------------------------------------
    /// A slot was granted and the grant was delivered.
    ResourceGranted {
        pool: PoolKey,
        requester_id: String,
        resource_id: String,
        index: usize,
        lease_timeout: Option<Duration>,
    },

    /// No slot was free; the request joined the waiting list.
    RequestQueued {
        pool: PoolKey,
        requester_id: String,
        priority: i32,
        position: usize,
    },

    /// A grant ended.
    ResourceReleased {
        pool: PoolKey,
        requester_id: String,
        index: usize,
        reason: ReleaseReason,
        held_for: Duration,
    },

    /// A grant could not be delivered and was undone.
    GrantRolledBack {
        pool: PoolKey,
        requester_id: String,
        index: usize,
    },

    /// A queued request was withdrawn.
    WaitCancelled { pool: PoolKey, requester_id: String },

    /// A request from a requester already holding or awaiting a slot.
    DuplicateRequest { pool: PoolKey, requester_id: String },

    // -------------------------------------------------------------------------
    // Resizing
    // -------------------------------------------------------------------------
    /// The pool was resized.
    PoolResized {
        pool: PoolKey,
        previous_size: usize,
        new_size: usize,
        available_count: usize,
    },

    /// A resize request was ignored.
    ResizeRejected { pool: PoolKey, requested: usize },
}

impl PoolEvent {
    /// Returns the pool this event belongs to.
    pub fn pool(&self) -> &PoolKey {
        match self {
            Self::PoolStarted { pool, .. }
            | Self::PoolStopped { pool }
            | Self::ResourceGranted { pool, .. }
            | Self::RequestQueued { pool, .. }
            | Self::ResourceReleased { pool, .. }
            | Self::GrantRolledBack { pool, .. }
            | Self::WaitCancelled { pool, .. }
            | Self::DuplicateRequest { pool, .. }
            | Self::PoolResized { pool, .. }
            | Self::ResizeRejected { pool, .. } => pool,
        }
    }

    /// Returns a short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PoolStarted { .. } => "pool_started",
            Self::PoolStopped { .. } => "pool_stopped",
            Self::ResourceGranted { .. } => "resource_granted",
            Self::RequestQueued { .. } => "request_queued",
            Self::ResourceReleased { .. } => "resource_released",
            Self::GrantRolledBack { .. } => "grant_rolled_back",
            Self::WaitCancelled { .. } => "wait_cancelled",
            Self::DuplicateRequest { .. } => "duplicate_request",
            Self::PoolResized { .. } => "pool_resized",
            Self::ResizeRejected { .. } => "resize_rejected",
        }
    }
}

// =============================================================================
// Sink Trait
// =============================================================================

/// Receiver of pool events.
///
/// Events are emitted from every coordinator task, so implementations must
/// be `Send + Sync`.
pub trait PoolTelemetrySink: Send + Sync {
    fn emit(&self, event: PoolEvent);
}

// =============================================================================
// Built-in Sinks
// =============================================================================

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl PoolTelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: PoolEvent) {}
}

/// Logs events with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

impl PoolTelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: PoolEvent) {
        match &event {
            PoolEvent::PoolStarted {
                pool,
                size,
                initializer,
            } => {
                tracing::info!(
                    pool = %pool,
                    size = size,
                    initializer = initializer,
                    "Pool started"
                );
            }
            PoolEvent::PoolStopped { pool } => {
                tracing::info!(pool = %pool, "Pool stopped");
            }
            PoolEvent::ResourceGranted {
                pool,
                requester_id,
                resource_id,
                index,
                lease_timeout,
            } => {
                tracing::debug!(
                    pool = %pool,
                    requester = %requester_id,
                    resource = %resource_id,
                    index = index,
                    lease_timeout_ms = lease_timeout.map(|t| t.as_millis() as u64),
                    "Resource granted"
                );
            }
            PoolEvent::RequestQueued {
                pool,
                requester_id,
                priority,
                position,
            } => {
                tracing::debug!(
                    pool = %pool,
                    requester = %requester_id,
                    priority = priority,
                    position = position,
                    "Request queued"
                );
            }
            PoolEvent::ResourceReleased {
                pool,
                requester_id,
                index,
                reason,
                held_for,
            } => {
                tracing::debug!(
                    pool = %pool,
                    requester = %requester_id,
                    index = index,
                    reason = %reason,
                    held_ms = held_for.as_millis() as u64,
                    "Resource released"
                );
            }
            PoolEvent::GrantRolledBack {
                pool,
                requester_id,
                index,
            } => {
                tracing::warn!(
                    pool = %pool,
                    requester = %requester_id,
                    index = index,
                    "Grant rolled back, requester unreachable"
                );
            }
            PoolEvent::WaitCancelled { pool, requester_id } => {
                tracing::debug!(pool = %pool, requester = %requester_id, "Wait cancelled");
            }
            PoolEvent::DuplicateRequest { pool, requester_id } => {
                tracing::warn!(
                    pool = %pool,
                    requester = %requester_id,
                    "Duplicate request ignored"
                );
            }
            PoolEvent::PoolResized {
                pool,
                previous_size,
                new_size,
                available_count,
            } => {
                tracing::info!(
                    pool = %pool,
                    from = previous_size,
                    to = new_size,
                    available = available_count,
                    "Pool resized"
                );
            }
            PoolEvent::ResizeRejected { pool, requested } => {
                tracing::warn!(pool = %pool, requested = requested, "Resize rejected");
            }
        }
    }
}

/// Forwards events to several sinks.
pub struct MultiplexTelemetrySink {
    sinks: Vec<Arc<dyn PoolTelemetrySink>>,
}

impl MultiplexTelemetrySink {
    pub fn new(sinks: Vec<Arc<dyn PoolTelemetrySink>>) -> Self {
        Self { sinks }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn PoolTelemetrySink>) {
        self.sinks.push(sink);
    }
}

impl PoolTelemetrySink for MultiplexTelemetrySink {
    fn emit(&self, event: PoolEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

impl std::fmt::Debug for MultiplexTelemetrySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexTelemetrySink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

/// Sink that keeps every event in memory.
///
/// A test aid: it is public so integration tests and downstream crates can
/// assert on pool events. Memory grows with every event, so production
/// pools should use [`TracingTelemetrySink`] or a sink of their own.
#[derive(Debug, Default)]
pub struct RecordingTelemetrySink {
    events: std::sync::Mutex<Vec<PoolEvent>>,
}

impl RecordingTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the events seen so far.
    pub fn events(&self) -> Vec<PoolEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Returns the event type names seen so far, in order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(PoolEvent::event_type).collect()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

impl PoolTelemetrySink for RecordingTelemetrySink {
    fn emit(&self, event: PoolEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn started() -> PoolEvent {
        PoolEvent::PoolStarted {
            pool: PoolKey::new("ns", "gpu"),
            size: 2,
            initializer: "default",
        }
    }

    #[test]
    fn test_null_and_tracing_sinks_accept_events() {
        NullTelemetrySink.emit(started());
        TracingTelemetrySink.emit(started());
        TracingTelemetrySink.emit(PoolEvent::ResourceReleased {
            pool: PoolKey::new("ns", "gpu"),
            requester_id: "r1".to_string(),
            index: 0,
            reason: ReleaseReason::TimedOut,
            held_for: Duration::from_millis(5),
        });
    }

    #[test]
    fn test_multiplex_sink_fans_out() {
        struct CountingSink(AtomicUsize);
        impl PoolTelemetrySink for CountingSink {
            fn emit(&self, _event: PoolEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let a = Arc::new(CountingSink(AtomicUsize::new(0)));
        let b = Arc::new(CountingSink(AtomicUsize::new(0)));
        let mut multiplex = MultiplexTelemetrySink::new(vec![a.clone()]);
        multiplex.add_sink(b.clone());

        multiplex.emit(started());
        multiplex.emit(started());

        assert_eq!(a.0.load(Ordering::SeqCst), 2);
        assert_eq!(b.0.load(Ordering::SeqCst), 2);
        assert!(format!("{:?}", multiplex).contains("sink_count: 2"));
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingTelemetrySink::new();
        sink.emit(started());
        sink.emit(PoolEvent::ResizeRejected {
            pool: PoolKey::new("ns", "gpu"),
            requested: 0,
        });

        assert_eq!(sink.event_types(), vec!["pool_started", "resize_rejected"]);
        assert_eq!(sink.count("resize_rejected"), 1);
        assert_eq!(sink.events()[0].pool().resource_id(), "gpu");
    }
}
