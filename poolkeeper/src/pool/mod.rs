//! Resource pools.
//!
//! A pool is a fixed-but-resizable set of slots shared by many requesters.
//! Each pool is owned by one [`ResourcePoolCoordinator`] task that grants
//! slots first come, first served, reclaims them on release or lease
//! timeout, and grows or shrinks the slot array on request.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     RequesterClient                          │
//! │  acquire / cancel, returns ResourceLease                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      PoolRegistry                            │
//! │  PoolKey ──► PoolHandle, starts coordinators on demand      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 ResourcePoolCoordinator                      │
//! │  select loop over inbox, lease timeouts and shutdown        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐ ┌──────────────┐ ┌────────────────┐   │
//! │  │ResourcePoolState │ │PoolInitializer│ │ Transport      │   │
//! │  │ slots + counters │ │ default/custom│ │ + Telemetry    │   │
//! │  └──────────────────┘ └──────────────┘ └────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Pool key**: `(namespace, resource_id)`. The coordinator id is
//!   `"resource-pool" + namespace + resource_id`.
//!
//! - **Grant**: a slot held by one requester. It ends when the holder sends
//!   a release on `resource-channel-<requester_id>` or the lease times out;
//!   both take the same path.
//!
//! - **Waiting list**: strict FIFO. Priorities are recorded and reported
//!   but never reorder the list.
//!
//! - **Retired slot**: a slot removed by a shrink while grants were
//!   outstanding. It leaves the array once the last grant ends.
//!
//! # Example
//!
//! ```ignore
//! use poolkeeper::pool::{ChannelTransport, PoolRegistry, RequesterClient, TracingTelemetrySink};
//!
//! let transport = ChannelTransport::new();
//! let registry = Arc::new(PoolRegistry::new(
//!     Arc::new(transport.clone()),
//!     Arc::new(TracingTelemetrySink),
//! ));
//!
//! let client = RequesterClient::new(registry.clone(), transport, "default", "worker-1");
//! let lease = client.acquire("gpu", None, None).await?;
//! lease.release().await?;
//! ```

mod client;
mod coordinator;
mod error;
mod handle;
mod initializer;
mod key;
mod message;
mod options;
mod record;
mod registry;
mod state;
mod telemetry;
mod transport;
mod watcher;

pub use client::{RequesterClient, ResourceLease};
pub use coordinator::ResourcePoolCoordinator;
pub use error::{ClientError, PoolError, TransportError};
pub use handle::PoolHandle;
pub use initializer::{CustomInitializer, DefaultInitializer, InitializerKind, PoolInitializer};
pub use key::{release_channel_name, PoolKey, COORDINATOR_ID_PREFIX, RELEASE_CHANNEL_PREFIX};
pub use message::{
    PendingRequest, PoolAllocation, PoolMessage, PoolStatus, ReleaseReason, ResourceResponse,
    SlotDetail, WaitingDetail,
};
pub use options::{PoolOptions, DEFAULT_CHANNEL_CAPACITY, DEFAULT_POOL_SIZE};
pub use record::{
    Metadata, ResourceRecord, Slot, SlotStatus, META_CREATED_AT, META_CREATED_BY, META_EXPANDED,
    META_EXPANDED_AT, META_POOL_INDEX, META_PURPOSE,
};
pub use registry::PoolRegistry;
pub use state::{ResizeOutcome, ResourcePoolState};
pub use telemetry::{
    MultiplexTelemetrySink, NullTelemetrySink, PoolEvent, PoolTelemetrySink,
    RecordingTelemetrySink, TracingTelemetrySink,
};
pub use transport::{ChannelTransport, Mailbox, Transport};
pub use watcher::{LeaseEvent, LeaseWatcher};
