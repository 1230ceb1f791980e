//! Default values and the `ConfigFile::default()` implementation.

use super::settings::*;

/// Default pool namespace.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default resource id.
pub const DEFAULT_RESOURCE_ID: &str = "resource";

/// Default number of slots in a new pool.
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Default record id prefix for the custom initializer.
pub const DEFAULT_PREFIX: &str = "pool";

/// Default coordinator inbox capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Default log file name, inside the config directory.
pub const DEFAULT_LOG_FILE: &str = "poolkeeper.log";

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            pool: PoolSettings {
                namespace: DEFAULT_NAMESPACE.to_string(),
                resource_id: DEFAULT_RESOURCE_ID.to_string(),
                size: DEFAULT_POOL_SIZE,
                initializer: InitializerType::Default,
                prefix: DEFAULT_PREFIX.to_string(),
                purpose: None,
                created_by: None,
            },
            lease: LeaseSettings { timeout: None },
            coordinator: CoordinatorSettings {
                channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            },
            logging: LoggingSettings {
                file: super::file::config_directory().join(DEFAULT_LOG_FILE),
            },
        }
    }
}
