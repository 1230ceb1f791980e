//! Pool creation options.

use super::initializer::InitializerKind;
use super::record::{Metadata, META_CREATED_BY, META_PURPOSE};
use crate::config::{ConfigFile, InitializerType};
use std::time::Duration;

pub use crate::config::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_POOL_SIZE};

/// Settings fixed when a coordinator is created.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolOptions {
    /// Initial slot count. Must be at least 1.
    pub size: usize,

    /// Grants are reclaimed automatically after this long. `None` never expires.
    pub lease_timeout: Option<Duration>,

    pub initializer: InitializerKind,

    /// Coordinator inbox capacity.
    pub channel_capacity: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            lease_timeout: None,
            initializer: InitializerKind::Default,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl PoolOptions {
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn lease_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lease_timeout = timeout;
        self
    }

    pub fn initializer(mut self, initializer: InitializerKind) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

impl From<&ConfigFile> for PoolOptions {
    fn from(config: &ConfigFile) -> Self {
        let initializer = match config.pool.initializer {
            InitializerType::Default => InitializerKind::Default,
            InitializerType::Custom => {
                let mut metadata = Metadata::new();
                if let Some(purpose) = &config.pool.purpose {
                    metadata.insert(META_PURPOSE.to_string(), purpose.clone().into());
                }
                if let Some(created_by) = &config.pool.created_by {
                    metadata.insert(META_CREATED_BY.to_string(), created_by.clone().into());
                }
                InitializerKind::Custom {
                    prefix: config.pool.prefix.clone(),
                    metadata,
                }
            }
        };

        Self {
            size: config.pool.size,
            lease_timeout: config.lease.timeout,
            initializer,
            channel_capacity: config.coordinator.channel_capacity,
        }
    }
}
