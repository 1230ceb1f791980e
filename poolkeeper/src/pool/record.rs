//! Resource records and the slots that hold them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque key/value bag attached to a record at creation or expansion time.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata key holding the record's slot index.
pub const META_POOL_INDEX: &str = "pool_index";

/// Metadata key marking records created by an expansion.
pub const META_EXPANDED: &str = "expanded";

/// Metadata key holding the expansion timestamp.
pub const META_EXPANDED_AT: &str = "expanded_at";

/// Metadata key holding the creation timestamp.
pub const META_CREATED_AT: &str = "created_at";

/// Metadata key naming who created the record.
pub const META_CREATED_BY: &str = "created_by";

/// Metadata key describing what the record is for.
pub const META_PURPOSE: &str = "purpose";

/// One allocatable unit of a pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Unique among live slots of the pool.
    pub id: String,
    /// Position in the slot array. Never changes while the record lives.
    pub index: usize,
    pub metadata: Metadata,
    /// Set while the record is granted.
    pub acquired_at: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    /// Creates an unacquired record tagged with its pool index.
    pub fn new(id: impl Into<String>, index: usize) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(META_POOL_INDEX.to_string(), index.into());
        Self {
            id: id.into(),
            index,
            metadata,
            acquired_at: None,
        }
    }

    /// Merges `overlay` into the record's metadata, overwriting on conflict.
    pub fn with_metadata(mut self, overlay: &Metadata) -> Self {
        for (key, value) in overlay {
            self.metadata.insert(key.clone(), value.clone());
        }
        self
    }

    /// Returns true if the record was created by an expansion.
    pub fn is_expanded(&self) -> bool {
        self.metadata
            .get(META_EXPANDED)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// Availability of a slot.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// Free to be granted.
    Available,
    /// Held by exactly one requester.
    Allocated,
    /// Taken out of service by a shrink; truncated once no grants remain.
    Retired,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Allocated => write!(f, "allocated"),
            Self::Retired => write!(f, "retired"),
        }
    }
}

/// A position in the pool's slot array.
#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub record: ResourceRecord,
    pub status: SlotStatus,
}

impl Slot {
    /// Wraps a freshly created record as an available slot.
    pub fn available(record: ResourceRecord) -> Self {
        Self {
            record,
            status: SlotStatus::Available,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == SlotStatus::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_carries_pool_index() {
        let record = ResourceRecord::new("gpu-3", 3);
        assert_eq!(record.index, 3);
        assert_eq!(record.metadata.get(META_POOL_INDEX), Some(&json!(3)));
        assert!(record.acquired_at.is_none());
        assert!(!record.is_expanded());
    }

    #[test]
    fn test_metadata_overlay_overwrites() {
        let mut overlay = Metadata::new();
        overlay.insert("purpose".to_string(), json!("render"));
        overlay.insert(META_POOL_INDEX.to_string(), json!("ignored"));

        let record = ResourceRecord::new("gpu-0", 0).with_metadata(&overlay);
        assert_eq!(record.metadata.get("purpose"), Some(&json!("render")));
        assert_eq!(record.metadata.get(META_POOL_INDEX), Some(&json!("ignored")));
    }

    #[test]
    fn test_expanded_flag_must_be_boolean() {
        let mut record = ResourceRecord::new("gpu-0", 0);
        record
            .metadata
            .insert(META_EXPANDED.to_string(), json!("yes"));
        assert!(!record.is_expanded());

        record.metadata.insert(META_EXPANDED.to_string(), json!(true));
        assert!(record.is_expanded());
    }

    #[test]
    fn test_slot_status_serializes_snake_case() {
        let encoded = serde_json::to_string(&SlotStatus::Retired).unwrap();
        assert_eq!(encoded, "\"retired\"");
        assert_eq!(SlotStatus::Allocated.to_string(), "allocated");
    }
}
