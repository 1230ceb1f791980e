//! Pool initialization strategies.
//!
//! A [`PoolInitializer`] creates the initial slot array and grows or shrinks
//! it on demand. The strategy is chosen once, when the pool is created, via
//! [`InitializerKind`], and is fixed for the pool's lifetime.
//!
//! # Shrinking
//!
//! Shrinking never moves records between slots. With no active grants the
//! slot array is truncated from the tail. While grants are outstanding, only
//! slot statuses change (`Available` becomes `Retired`); the retired slots
//! are truncated later, once the pool is quiescent.
//!
//! - [`DefaultInitializer`] retires available slots tail-first.
//! - [`CustomInitializer`] retires records flagged `expanded` first, so
//!   elastic capacity is shed before the baseline.

use super::key::PoolKey;
use super::record::{
    Metadata, ResourceRecord, Slot, SlotStatus, META_CREATED_AT, META_EXPANDED, META_EXPANDED_AT,
};
use chrono::Utc;

/// Strategy that creates, grows and shrinks a pool's slot array.
pub trait PoolInitializer: Send + Sync + 'static {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Creates `size` available slots for a new pool.
    fn initialize(&self, key: &PoolKey, size: usize) -> Vec<Slot>;

    /// Appends `count` new available slots.
    fn expand(&self, key: &PoolKey, slots: &mut Vec<Slot>, count: usize);

    /// Takes up to `count` available slots out of service.
    ///
    /// Returns the number of slots that were `Available` and no longer are,
    /// whether they were truncated or retired.
    fn shrink(&self, slots: &mut Vec<Slot>, count: usize, has_active_grants: bool) -> usize;
}

/// Selects the initializer for a pool.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum InitializerKind {
    /// Bare records tagged only with their pool index.
    #[default]
    Default,
    /// Prefixed ids with a metadata overlay.
    Custom { prefix: String, metadata: Metadata },
}

impl InitializerKind {
    /// Builds the strategy object for this kind.
    pub fn build(&self) -> Box<dyn PoolInitializer> {
        match self {
            Self::Default => Box::new(DefaultInitializer),
            Self::Custom { prefix, metadata } => {
                Box::new(CustomInitializer::new(prefix.clone(), metadata.clone()))
            }
        }
    }
}

// =============================================================================
// Default Strategy
// =============================================================================

/// Fixed-count pool with no metadata beyond the pool index.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultInitializer;

impl DefaultInitializer {
    fn record(key: &PoolKey, index: usize) -> ResourceRecord {
        ResourceRecord::new(format!("{}-{}", key.resource_id(), index), index)
    }
}

impl PoolInitializer for DefaultInitializer {
    fn name(&self) -> &'static str {
        "default"
    }

    fn initialize(&self, key: &PoolKey, size: usize) -> Vec<Slot> {
        (0..size)
            .map(|index| Slot::available(Self::record(key, index)))
            .collect()
    }

    fn expand(&self, key: &PoolKey, slots: &mut Vec<Slot>, count: usize) {
        let start = slots.len();
        slots.extend((start..start + count).map(|index| Slot::available(Self::record(key, index))));
    }

    fn shrink(&self, slots: &mut Vec<Slot>, count: usize, has_active_grants: bool) -> usize {
        if !has_active_grants {
            return truncate_tail(slots, count);
        }
        retire_tail_first(slots, count, |_| true)
    }
}

// =============================================================================
// Custom Strategy
// =============================================================================

/// Prefixed ids, merged metadata, and expanded-first shrinking.
#[derive(Clone, Debug)]
pub struct CustomInitializer {
    prefix: String,
    metadata: Metadata,
}

impl CustomInitializer {
    /// Creates a strategy producing ids of the form `prefix:resourceId-index`.
    pub fn new(prefix: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            prefix: prefix.into(),
            metadata,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn record(&self, key: &PoolKey, index: usize) -> ResourceRecord {
        let id = format!("{}:{}-{}", self.prefix, key.resource_id(), index);
        let mut record = ResourceRecord::new(id, index).with_metadata(&self.metadata);
        record
            .metadata
            .insert(META_CREATED_AT.to_string(), Utc::now().to_rfc3339().into());
        record
    }
}

impl PoolInitializer for CustomInitializer {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn initialize(&self, key: &PoolKey, size: usize) -> Vec<Slot> {
        (0..size)
            .map(|index| Slot::available(self.record(key, index)))
            .collect()
    }

    fn expand(&self, key: &PoolKey, slots: &mut Vec<Slot>, count: usize) {
        let start = slots.len();
        let expanded_at = Utc::now().to_rfc3339();
        for index in start..start + count {
            let mut record = self.record(key, index);
            record
                .metadata
                .insert(META_EXPANDED.to_string(), true.into());
            record
                .metadata
                .insert(META_EXPANDED_AT.to_string(), expanded_at.clone().into());
            slots.push(Slot::available(record));
        }
    }

    fn shrink(&self, slots: &mut Vec<Slot>, count: usize, has_active_grants: bool) -> usize {
        if !has_active_grants {
            // Expansions append, so the tail holds the elastic capacity.
            return truncate_tail(slots, count);
        }
        let retired = retire_tail_first(slots, count, ResourceRecord::is_expanded);
        retired + retire_tail_first(slots, count - retired, |_| true)
    }
}

// =============================================================================
// Shrink Helpers
// =============================================================================

/// Drops up to `count` slots from the tail and returns how many were available.
fn truncate_tail(slots: &mut Vec<Slot>, count: usize) -> usize {
    let new_len = slots.len().saturating_sub(count);
    let removed = slots[new_len..].iter().filter(|s| s.is_available()).count();
    slots.truncate(new_len);
    removed
}

/// Retires up to `count` available slots matching `predicate`, highest index first.
fn retire_tail_first<P>(slots: &mut [Slot], count: usize, predicate: P) -> usize
where
    P: Fn(&ResourceRecord) -> bool,
{
    let mut retired = 0;
    for slot in slots.iter_mut().rev() {
        if retired == count {
            break;
        }
        if slot.is_available() && predicate(&slot.record) {
            slot.status = SlotStatus::Retired;
            retired += 1;
        }
    }
    retired
}
