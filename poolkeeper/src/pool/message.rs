//! Coordinator protocol: inbound messages, outbound responses, query results.

use super::record::{Metadata, ResourceRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

/// Messages accepted by a coordinator inbox.
#[derive(Debug)]
pub enum PoolMessage {
    /// Ask for a slot. Answered with [`ResourceResponse`] via the transport.
    RequestResource { requester_id: String, priority: i32 },

    /// Give back a slot, addressed by the release channel from the grant.
    ///
    /// With a `lease_id`, the release only ends that grant; a release left
    /// over from an earlier grant on the same channel is ignored.
    ReleaseResource {
        channel: String,
        lease_id: Option<u64>,
    },

    /// Resize the pool (fire-and-forget).
    UpdateResourcePool { new_size: usize },

    /// Withdraw a queued request (fire-and-forget).
    CancelRequest { requester_id: String },

    /// Summary counters.
    GetStatus { reply: oneshot::Sender<PoolStatus> },

    /// Per-slot and waiting-list detail.
    GetAllocation {
        reply: oneshot::Sender<PoolAllocation>,
    },
}

impl PoolMessage {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestResource { .. } => "request_resource",
            Self::ReleaseResource { .. } => "release_resource",
            Self::UpdateResourcePool { .. } => "update_resource_pool",
            Self::CancelRequest { .. } => "cancel_request",
            Self::GetStatus { .. } => "get_status",
            Self::GetAllocation { .. } => "get_allocation",
        }
    }
}

/// Responses delivered to requesters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceResponse {
    /// A slot was granted. Release it by sending on `release_channel`.
    Acquired {
        release_channel: String,
        lease_id: u64,
        record: ResourceRecord,
    },
    /// The queued request was withdrawn.
    Cancelled,
}

/// Why a grant ended.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// The holder sent a release.
    Released,
    /// The lease timeout elapsed first.
    TimedOut,
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Released => write!(f, "released"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// A request waiting for a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub requester_id: String,
    /// Recorded and reported, but admission is strictly FIFO.
    pub priority: i32,
}

impl PendingRequest {
    pub fn new(requester_id: impl Into<String>, priority: i32) -> Self {
        Self {
            requester_id: requester_id.into(),
            priority,
        }
    }
}

// =============================================================================
// Query Results
// =============================================================================

/// Answer to [`PoolMessage::GetStatus`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub resource_id: String,
    /// Physical slot count, including retired slots awaiting truncation.
    pub total_resources: usize,
    pub available_count: usize,
    pub waiting_count: usize,
    pub allocated_count: usize,
}

/// One slot in a [`PoolAllocation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotDetail {
    pub id: String,
    pub index: usize,
    pub available: bool,
    pub retired: bool,
    pub metadata: Metadata,
    pub assigned_to: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
}

/// One waiting-list entry in a [`PoolAllocation`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingDetail {
    pub requester_id: String,
    pub priority: i32,
    /// Zero-based position in the waiting list.
    pub position: usize,
}

/// Answer to [`PoolMessage::GetAllocation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolAllocation {
    pub resource_id: String,
    pub slots: Vec<SlotDetail>,
    pub waiting: Vec<WaitingDetail>,
}

impl PoolAllocation {
    /// Returns the slot currently assigned to `requester_id`.
    pub fn slot_of(&self, requester_id: &str) -> Option<&SlotDetail> {
        self.slots
            .iter()
            .find(|slot| slot.assigned_to.as_deref() == Some(requester_id))
    }

    /// Returns the waiting-list requester ids in order.
    pub fn waiting_ids(&self) -> Vec<&str> {
        self.waiting
            .iter()
            .map(|w| w.requester_id.as_str())
            .collect()
    }
}
