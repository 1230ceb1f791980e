//! Coordinators addressed by pool key.
//!
//! The registry starts a coordinator the first time a key is signalled with
//! [`PoolRegistry::signal_with_start`] and hands out the same handle from
//! then on. Two callers racing to start the same key get one coordinator.

use super::coordinator::ResourcePoolCoordinator;
use super::error::PoolError;
use super::handle::PoolHandle;
use super::key::PoolKey;
use super::message::PoolMessage;
use super::options::PoolOptions;
use super::telemetry::PoolTelemetrySink;
use super::transport::Transport;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct RunningPool {
    handle: PoolHandle,
    task: JoinHandle<()>,
}

/// Registry of running coordinators sharing one transport and telemetry sink.
pub struct PoolRegistry {
    pools: DashMap<PoolKey, RunningPool>,
    transport: Arc<dyn Transport>,
    telemetry: Arc<dyn PoolTelemetrySink>,
    shutdown: CancellationToken,
}

impl PoolRegistry {
    pub fn new(transport: Arc<dyn Transport>, telemetry: Arc<dyn PoolTelemetrySink>) -> Self {
        Self {
            pools: DashMap::new(),
            transport,
            telemetry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the handle of a running coordinator.
    pub fn get(&self, key: &PoolKey) -> Option<PoolHandle> {
        self.pools
            .get(key)
            .filter(|pool| !pool.handle.is_closed())
            .map(|pool| pool.handle.clone())
    }

    /// Returns the coordinator for `key`, starting it with `options` if needed.
    ///
    /// `options` only matter when this call starts the coordinator. A
    /// coordinator that has stopped is replaced by a fresh one.
    pub fn get_or_start(&self, key: &PoolKey, options: &PoolOptions) -> Result<PoolHandle, PoolError> {
        if self.shutdown.is_cancelled() {
            return Err(PoolError::CoordinatorUnavailable(key.coordinator_id()));
        }

        match self.pools.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().handle.is_closed() {
                    return Ok(entry.get().handle.clone());
                }
                debug!(pool = %key, "Replacing stopped coordinator");
                let pool = self.start(key, options)?;
                let handle = pool.handle.clone();
                entry.insert(pool);
                Ok(handle)
            }
            Entry::Vacant(entry) => {
                let pool = self.start(key, options)?;
                let handle = pool.handle.clone();
                entry.insert(pool);
                Ok(handle)
            }
        }
    }

    /// Delivers `message` to the coordinator for `key`, starting it first if needed.
    ///
    /// Start failures are returned before anything is sent.
    pub async fn signal_with_start(
        &self,
        key: &PoolKey,
        options: &PoolOptions,
        message: PoolMessage,
    ) -> Result<PoolHandle, PoolError> {
        let handle = self.get_or_start(key, options)?;
        handle.send(message).await?;
        Ok(handle)
    }

    fn start(&self, key: &PoolKey, options: &PoolOptions) -> Result<RunningPool, PoolError> {
        let (coordinator, handle) = ResourcePoolCoordinator::new(
            key.clone(),
            options,
            Arc::clone(&self.transport),
            Arc::clone(&self.telemetry),
        )?;
        let task = tokio::spawn(coordinator.run(self.shutdown.child_token()));
        info!(pool = %key, size = options.size, "Started pool coordinator");
        Ok(RunningPool { handle, task })
    }

    pub fn keys(&self) -> Vec<PoolKey> {
        self.pools.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Stops every coordinator and waits for their loops to exit.
    ///
    /// Later starts fail with [`PoolError::CoordinatorUnavailable`].
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        for key in self.keys() {
            if let Some((_, pool)) = self.pools.remove(&key) {
                let _ = pool.task.await;
            }
        }
        info!("All pool coordinators stopped");
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.pools.len())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}
