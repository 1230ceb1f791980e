//! poolkeeper - leased resource pools with FIFO admission and live resizing
//!
//! A pool is a resizable set of slots (GPUs, licences, build agents, ...)
//! shared by many requesters. Each pool runs as a single coordinator task
//! that serializes every grant, release, cancellation and resize, so pool
//! state is never locked.
//!
//! # High-Level API
//!
//! ```ignore
//! use poolkeeper::config::ConfigFile;
//! use poolkeeper::pool::{ChannelTransport, PoolOptions, PoolRegistry, RequesterClient, TracingTelemetrySink};
//!
//! let config = ConfigFile::load()?;
//! let _guard = poolkeeper::logging::init_logging(&config.logging.file)?;
//!
//! let transport = ChannelTransport::new();
//! let registry = Arc::new(PoolRegistry::new(
//!     Arc::new(transport.clone()),
//!     Arc::new(TracingTelemetrySink),
//! ));
//!
//! let client = RequesterClient::new(registry, transport, &config.pool.namespace, "worker-1")
//!     .with_pool_options(PoolOptions::from(&config));
//! let lease = client.acquire(&config.pool.resource_id, None, None).await?;
//! lease.release().await?;
//! ```

pub mod config;
pub mod logging;
pub mod pool;

/// Version of the poolkeeper library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
