//! Error types for pools, transports and requester clients.

use thiserror::Error;

/// Errors from creating or talking to a coordinator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Pools must start with at least one slot.
    #[error("invalid pool size {size}: must be at least 1")]
    InvalidPoolSize { size: usize },

    /// The coordinator inbox is closed.
    #[error("coordinator {0} is not running")]
    CoordinatorUnavailable(String),

    /// The coordinator stopped before answering a query.
    #[error("coordinator {0} dropped the query")]
    QueryDropped(String),
}

/// Errors delivering a response to a requester.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("requester {requester_id} of {pool} is unreachable")]
    Unreachable { pool: String, requester_id: String },
}

/// Errors surfaced by [`RequesterClient`](super::RequesterClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The wait was cancelled, locally or by the coordinator.
    #[error("resource request was cancelled")]
    Cancelled,

    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The response mailbox was closed before an answer arrived.
    #[error("response mailbox for {0} closed")]
    MailboxClosed(String),
}
