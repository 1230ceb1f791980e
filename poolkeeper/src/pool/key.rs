//! Pool addressing.
//!
//! A coordinator is identified by the `(namespace, resource_id)` pair. The
//! derived string forms are what requesters see on the wire.

use std::fmt;

/// Prefix of every coordinator id.
pub const COORDINATOR_ID_PREFIX: &str = "resource-pool";

/// Prefix of every per-requester release channel name.
pub const RELEASE_CHANNEL_PREFIX: &str = "resource-channel-";

/// Identity of one coordinator instance.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PoolKey {
    namespace: String,
    resource_id: String,
}

impl PoolKey {
    /// Creates a key from a namespace and a resource id.
    pub fn new(namespace: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            resource_id: resource_id.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Returns the coordinator id: `"resource-pool" + namespace + resource_id`.
    ///
    /// The parts are concatenated without a separator.
    pub fn coordinator_id(&self) -> String {
        format!(
            "{}{}{}",
            COORDINATOR_ID_PREFIX, self.namespace, self.resource_id
        )
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.coordinator_id())
    }
}

/// Returns the release channel name for a requester.
pub fn release_channel_name(requester_id: &str) -> String {
    format!("{}{}", RELEASE_CHANNEL_PREFIX, requester_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_id_concatenates_parts() {
        let key = PoolKey::new("default", "gpu");
        assert_eq!(key.coordinator_id(), "resource-pooldefaultgpu");
        assert_eq!(key.to_string(), "resource-pooldefaultgpu");
    }

    #[test]
    fn test_release_channel_name() {
        assert_eq!(
            release_channel_name("worker-7"),
            "resource-channel-worker-7"
        );
    }

    #[test]
    fn test_keys_compare_by_both_parts() {
        assert_eq!(PoolKey::new("a", "b"), PoolKey::new("a", "b"));
        assert_ne!(PoolKey::new("a", "b"), PoolKey::new("a", "c"));
        assert_ne!(PoolKey::new("x", "b"), PoolKey::new("a", "b"));
    }
}
