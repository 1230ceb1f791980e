//! Sender side of a coordinator inbox.

use super::error::PoolError;
use super::key::{release_channel_name, PoolKey};
use super::message::{PoolAllocation, PoolMessage, PoolStatus};
use tokio::sync::{mpsc, oneshot};

/// Cloneable handle for sending messages to one coordinator.
///
/// Every method returns once the inbox accepted the message; none waits
/// for the coordinator to act on it, except the two queries.
#[derive(Clone, Debug)]
pub struct PoolHandle {
    key: PoolKey,
    tx: mpsc::Sender<PoolMessage>,
}

impl PoolHandle {
    pub(crate) fn new(key: PoolKey, tx: mpsc::Sender<PoolMessage>) -> Self {
        Self { key, tx }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Returns true once the coordinator has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Sends a raw message.
    pub async fn send(&self, message: PoolMessage) -> Result<(), PoolError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| PoolError::CoordinatorUnavailable(self.key.coordinator_id()))
    }

    /// Asks for a slot. The answer arrives through the transport.
    pub async fn request_resource(
        &self,
        requester_id: impl Into<String>,
        priority: i32,
    ) -> Result<(), PoolError> {
        self.send(PoolMessage::RequestResource {
            requester_id: requester_id.into(),
            priority,
        })
        .await
    }

    /// Releases whatever grant currently holds the release channel.
    pub async fn release(&self, channel: impl Into<String>) -> Result<(), PoolError> {
        self.send(PoolMessage::ReleaseResource {
            channel: channel.into(),
            lease_id: None,
        })
        .await
    }

    /// Releases one specific grant. Ignored if that grant already ended.
    pub async fn release_lease(
        &self,
        channel: impl Into<String>,
        lease_id: u64,
    ) -> Result<(), PoolError> {
        self.send(PoolMessage::ReleaseResource {
            channel: channel.into(),
            lease_id: Some(lease_id),
        })
        .await
    }

    /// Releases the grant held by `requester_id`.
    pub async fn release_for(&self, requester_id: &str) -> Result<(), PoolError> {
        self.release(release_channel_name(requester_id)).await
    }

    pub async fn resize(&self, new_size: usize) -> Result<(), PoolError> {
        self.send(PoolMessage::UpdateResourcePool { new_size }).await
    }

    /// Withdraws a queued request. No-op if `requester_id` is not waiting.
    pub async fn cancel_request(&self, requester_id: impl Into<String>) -> Result<(), PoolError> {
        self.send(PoolMessage::CancelRequest {
            requester_id: requester_id.into(),
        })
        .await
    }

    pub async fn status(&self) -> Result<PoolStatus, PoolError> {
        let (reply, rx) = oneshot::channel();
        self.send(PoolMessage::GetStatus { reply }).await?;
        rx.await
            .map_err(|_| PoolError::QueryDropped(self.key.coordinator_id()))
    }

    pub async fn allocation(&self) -> Result<PoolAllocation, PoolError> {
        let (reply, rx) = oneshot::channel();
        self.send(PoolMessage::GetAllocation { reply }).await?;
        rx.await
            .map_err(|_| PoolError::QueryDropped(self.key.coordinator_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_reach_inbox() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = PoolHandle::new(PoolKey::new("ns", "gpu"), tx);

        handle.request_resource("r1", 5).await.unwrap();
        handle.release_for("r1").await.unwrap();
        handle.release_lease("resource-channel-r1", 3).await.unwrap();
        handle.resize(4).await.unwrap();
        handle.cancel_request("r2").await.unwrap();

        match rx.recv().await.unwrap() {
            PoolMessage::RequestResource {
                requester_id,
                priority,
            } => {
                assert_eq!(requester_id, "r1");
                assert_eq!(priority, 5);
            }
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv().await.unwrap() {
            PoolMessage::ReleaseResource { channel, lease_id } => {
                assert_eq!(channel, "resource-channel-r1");
                assert_eq!(lease_id, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv().await.unwrap() {
            PoolMessage::ReleaseResource { lease_id, .. } => assert_eq!(lease_id, Some(3)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rx.recv().await.unwrap().kind(), "update_resource_pool");
        assert_eq!(rx.recv().await.unwrap().kind(), "cancel_request");
    }

    #[tokio::test]
    async fn test_closed_inbox_is_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        let handle = PoolHandle::new(PoolKey::new("ns", "gpu"), tx);
        drop(rx);

        assert!(handle.is_closed());
        assert_eq!(
            handle.resize(2).await,
            Err(PoolError::CoordinatorUnavailable(
                "resource-poolnsgpu".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_dropped_query_reports_error() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = PoolHandle::new(PoolKey::new("ns", "gpu"), tx);

        let responder = tokio::spawn(async move {
            // Drop the reply sender without answering.
            let _ = rx.recv().await;
        });

        assert_eq!(
            handle.status().await,
            Err(PoolError::QueryDropped("resource-poolnsgpu".to_string()))
        );
        responder.await.unwrap();
    }
}
