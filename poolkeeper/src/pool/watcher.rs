//! Per-grant lease watchers.
//!
//! A watcher races the lease timeout against its cancellation token. The
//! token fires when the holder releases or the coordinator stops; only an
//! elapsed timeout reports back, as a [`LeaseEvent`] on the coordinator's
//! lease channel. Watchers never touch pool state.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A lease timeout that elapsed before the grant was released.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseEvent {
    /// Release channel of the expired lease.
    pub channel: String,
    /// Distinguishes this lease from later grants on the same channel.
    pub lease_id: u64,
}

/// Timer for a single grant.
#[derive(Debug)]
pub struct LeaseWatcher {
    event: LeaseEvent,
    timeout: Duration,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<LeaseEvent>,
}

impl LeaseWatcher {
    pub fn new(
        channel: impl Into<String>,
        lease_id: u64,
        timeout: Duration,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<LeaseEvent>,
    ) -> Self {
        Self {
            event: LeaseEvent {
                channel: channel.into(),
                lease_id,
            },
            timeout,
            cancel,
            events,
        }
    }

    /// Spawns the watcher onto the current runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                trace!(channel = %self.event.channel, "Lease watcher cancelled");
            }

            _ = tokio::time::sleep(self.timeout) => {
                trace!(
                    channel = %self.event.channel,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Lease timed out"
                );
                // The coordinator may already be gone.
                let _ = self.events.send(self.event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_posts_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        LeaseWatcher::new("resource-channel-r1", 7, Duration::from_millis(10), CancellationToken::new(), tx)
            .spawn()
            .await
            .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            LeaseEvent {
                channel: "resource-channel-r1".to_string(),
                lease_id: 7
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_suppresses_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = LeaseWatcher::new("c", 1, Duration::from_secs(60), cancel.clone(), tx).spawn();

        cancel.cancel();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
