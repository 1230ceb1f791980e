//! Requester-side facade.
//!
//! [`RequesterClient`] hides the message protocol: it registers a mailbox,
//! starts the pool if needed, waits for the grant and hands back a
//! [`ResourceLease`] that knows how to release itself.
//!
//! # Example
//!
//! ```ignore
//! let client = RequesterClient::new(registry, transport, "default", "worker-1");
//! let lease = client.acquire("gpu", Some(Duration::from_secs(300)), None).await?;
//! render(lease.record());
//! lease.release().await?;
//! ```

use super::error::ClientError;
use super::handle::PoolHandle;
use super::key::PoolKey;
use super::message::{PoolMessage, ResourceResponse};
use super::options::PoolOptions;
use super::record::ResourceRecord;
use super::registry::PoolRegistry;
use super::transport::{ChannelTransport, Mailbox};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Acquires slots on behalf of one requester id.
#[derive(Clone, Debug)]
pub struct RequesterClient {
    registry: Arc<PoolRegistry>,
    transport: ChannelTransport,
    namespace: String,
    requester_id: String,
    priority: i32,
    options: PoolOptions,
}

impl RequesterClient {
    /// Creates a client. `transport` must be the one the registry delivers through.
    pub fn new(
        registry: Arc<PoolRegistry>,
        transport: ChannelTransport,
        namespace: impl Into<String>,
        requester_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            transport,
            namespace: namespace.into(),
            requester_id: requester_id.into(),
            priority: 0,
            options: PoolOptions::default(),
        }
    }

    /// Sets the priority sent with every request.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the options used if this client's request starts a pool.
    pub fn with_pool_options(mut self, options: PoolOptions) -> Self {
        self.options = options;
        self
    }

    pub fn requester_id(&self) -> &str {
        &self.requester_id
    }

    /// Acquires a slot from the pool for `resource_id`, starting it if needed.
    ///
    /// `lease_timeout` overrides the client's pool options and, like them,
    /// only applies when this call starts the pool. With a `cancellation`
    /// token the wait can be abandoned; the queued request is withdrawn and
    /// a grant that raced the cancellation is released.
    pub async fn acquire(
        &self,
        resource_id: &str,
        lease_timeout: Option<Duration>,
        cancellation: Option<CancellationToken>,
    ) -> Result<ResourceLease, ClientError> {
        let key = PoolKey::new(self.namespace.clone(), resource_id);
        let options = self
            .options
            .clone()
            .lease_timeout(lease_timeout.or(self.options.lease_timeout));

        let mut mailbox = self.transport.register(&key, self.requester_id.clone());
        let request = PoolMessage::RequestResource {
            requester_id: self.requester_id.clone(),
            priority: self.priority,
        };
        let handle = self
            .registry
            .signal_with_start(&key, &options, request)
            .await?;

        let response = match cancellation {
            None => mailbox.recv().await,
            Some(token) => tokio::select! {
                biased;

                _ = token.cancelled() => {
                    self.abandon(&handle, &mut mailbox).await;
                    return Err(ClientError::Cancelled);
                }

                response = mailbox.recv() => response,
            },
        };

        match response {
            Some(ResourceResponse::Acquired {
                release_channel,
                lease_id,
                record,
            }) => Ok(ResourceLease {
                handle,
                release_channel,
                lease_id,
                record,
            }),
            Some(ResourceResponse::Cancelled) => Err(ClientError::Cancelled),
            None => {
                // Another wait on this pool took over the route; withdraw ours.
                if let Err(e) = handle.cancel_request(self.requester_id.clone()).await {
                    debug!(requester = %self.requester_id, error = %e, "Cancel not delivered");
                }
                Err(ClientError::MailboxClosed(self.requester_id.clone()))
            }
        }
    }

    /// Withdraws a pending request and gives back a grant that raced it.
    async fn abandon(&self, handle: &PoolHandle, mailbox: &mut Mailbox) {
        if let Err(e) = handle.cancel_request(self.requester_id.clone()).await {
            debug!(requester = %self.requester_id, error = %e, "Cancel not delivered");
            return;
        }

        // The coordinator handles messages in order, so once this query is
        // answered any grant made before the cancel is in the mailbox.
        if let Err(e) = handle.status().await {
            debug!(requester = %self.requester_id, error = %e, "Coordinator stopped during cancel");
            return;
        }

        while let Some(response) = mailbox.try_recv() {
            if let ResourceResponse::Acquired {
                release_channel,
                lease_id,
                ..
            } = response
            {
                debug!(requester = %self.requester_id, "Releasing grant that raced cancellation");
                if let Err(e) = handle.release_lease(release_channel, lease_id).await {
                    debug!(requester = %self.requester_id, error = %e, "Release not delivered");
                }
            }
        }
    }
}

/// A granted slot. Dropping it does not release the slot.
#[derive(Debug)]
pub struct ResourceLease {
    handle: PoolHandle,
    release_channel: String,
    lease_id: u64,
    record: ResourceRecord,
}

impl ResourceLease {
    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }

    pub fn release_channel(&self) -> &str {
        &self.release_channel
    }

    pub fn lease_id(&self) -> u64 {
        self.lease_id
    }

    pub fn pool(&self) -> &PoolKey {
        self.handle.key()
    }

    /// Sends the release. Returns once the coordinator inbox accepted it.
    ///
    /// If this grant already timed out, the release is ignored and does not
    /// end a newer grant held under the same requester id.
    pub async fn release(self) -> Result<(), ClientError> {
        self.handle
            .release_lease(self.release_channel, self.lease_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::telemetry::NullTelemetrySink;

    fn setup() -> (Arc<PoolRegistry>, ChannelTransport) {
        let transport = ChannelTransport::new();
        let registry = Arc::new(PoolRegistry::new(
            Arc::new(transport.clone()),
            Arc::new(NullTelemetrySink),
        ));
        (registry, transport)
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let (registry, transport) = setup();
        let client = RequesterClient::new(registry.clone(), transport, "ns", "w1")
            .with_pool_options(PoolOptions::with_size(1));

        let lease = client.acquire("gpu", None, None).await.unwrap();
        assert_eq!(lease.record().id, "gpu-0");
        assert_eq!(lease.release_channel(), "resource-channel-w1");
        assert_eq!(lease.lease_id(), 0);
        assert_eq!(lease.pool(), &PoolKey::new("ns", "gpu"));

        let handle = registry.get(&PoolKey::new("ns", "gpu")).unwrap();
        assert_eq!(handle.status().await.unwrap().allocated_count, 1);

        lease.release().await.unwrap();
        assert_eq!(handle.status().await.unwrap().available_count, 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_error() {
        let (registry, transport) = setup();
        let holder = RequesterClient::new(registry.clone(), transport.clone(), "ns", "w1")
            .with_pool_options(PoolOptions::with_size(1));
        let waiter = RequesterClient::new(registry.clone(), transport, "ns", "w2");

        let _lease = holder.acquire("gpu", None, None).await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = waiter
            .acquire("gpu", None, Some(token))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));

        let handle = registry.get(&PoolKey::new("ns", "gpu")).unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.waiting_count, 0);
        assert_eq!(status.allocated_count, 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_grant_racing_cancellation_is_released() {
        let (registry, transport) = setup();
        let client = RequesterClient::new(registry.clone(), transport, "ns", "w1")
            .with_pool_options(PoolOptions::with_size(1));

        // The pool is free, so the grant lands alongside the cancellation.
        let token = CancellationToken::new();
        token.cancel();
        let err = client.acquire("gpu", None, Some(token)).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));

        let handle = registry.get(&PoolKey::new("ns", "gpu")).unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.allocated_count, 0);
        assert_eq!(status.available_count, 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_replaced_mailbox_withdraws_request() {
        let (registry, transport) = setup();
        let holder = RequesterClient::new(registry.clone(), transport.clone(), "ns", "w1")
            .with_pool_options(PoolOptions::with_size(1));
        let waiter = RequesterClient::new(registry.clone(), transport.clone(), "ns", "w2");
        let _lease = holder.acquire("gpu", None, None).await.unwrap();

        let key = PoolKey::new("ns", "gpu");
        let handle = registry.get(&key).unwrap();
        let wait = tokio::spawn(async move { waiter.acquire("gpu", None, None).await });
        while handle.status().await.unwrap().waiting_count == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let _other = transport.register(&key, "w2");
        let err = wait.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::MailboxClosed(ref id) if id == "w2"));
        assert_eq!(handle.status().await.unwrap().waiting_count, 0);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_failure_propagates() {
        let (registry, transport) = setup();
        let client = RequesterClient::new(registry, transport, "ns", "w1")
            .with_pool_options(PoolOptions::with_size(0));

        let err = client.acquire("gpu", None, None).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Pool(crate::pool::PoolError::InvalidPoolSize { size: 0 })
        ));
    }
}
