//! Coordinator state: slots, counters, waiting list and grants.
//!
//! [`ResourcePoolState`] is owned by exactly one coordinator task and is
//! never shared, so it carries no synchronization of its own.
//!
//! # Accounting
//!
//! `available_count` is a running counter kept equal to the number of
//! `Available` slots, so capacity checks are O(1). Every reachable state
//! satisfies:
//!
//! ```text
//! available_count + |active_grants| + retired == |slots|
//! ```
//!
//! Retired slots exist only while grants are outstanding. When the last
//! grant ends, the array is truncated back to `target_size` and every
//! remaining slot becomes available.

use super::initializer::PoolInitializer;
use super::key::PoolKey;
use super::message::{
    PendingRequest, PoolAllocation, PoolStatus, SlotDetail, WaitingDetail,
};
use super::record::{ResourceRecord, Slot, SlotStatus};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Result of a resize applied to the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeOutcome {
    /// Slots in service before the resize.
    pub previous_size: usize,
    pub new_size: usize,
    /// Slots that became available (reactivated or appended).
    pub added: usize,
    /// Available slots taken out of service.
    pub removed: usize,
}

/// The coordinator's mutable state.
#[derive(Debug)]
pub struct ResourcePoolState {
    slots: Vec<Slot>,
    available_count: usize,
    waiting_list: VecDeque<PendingRequest>,
    active_grants: HashMap<String, usize>,
    target_size: usize,
}

impl ResourcePoolState {
    /// Creates state over freshly initialized slots.
    pub fn new(slots: Vec<Slot>) -> Self {
        let available_count = slots.iter().filter(|s| s.is_available()).count();
        let target_size = slots.len();
        Self {
            slots,
            available_count,
            waiting_list: VecDeque::new(),
            active_grants: HashMap::new(),
            target_size,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Physical slot count, including retired slots.
    pub fn total_resources(&self) -> usize {
        self.slots.len()
    }

    pub fn available_count(&self) -> usize {
        self.available_count
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting_list.len()
    }

    pub fn allocated_count(&self) -> usize {
        self.active_grants.len()
    }

    pub fn retired_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::Retired)
            .count()
    }

    /// Slots that are not retired.
    pub fn in_service(&self) -> usize {
        self.slots.len() - self.retired_count()
    }

    /// The size most recently requested for this pool.
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Returns the slot index held by `requester_id`.
    pub fn grant_of(&self, requester_id: &str) -> Option<usize> {
        self.active_grants.get(requester_id).copied()
    }

    pub fn is_waiting(&self, requester_id: &str) -> bool {
        self.waiting_list
            .iter()
            .any(|r| r.requester_id == requester_id)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Grants the lowest-index available slot to `requester_id`.
    ///
    /// Returns a copy of the granted record, or `None` when nothing is free.
    pub fn allocate(&mut self, requester_id: &str) -> Option<ResourceRecord> {
        if self.available_count == 0 {
            return None;
        }

        let Some(index) = self.slots.iter().position(Slot::is_available) else {
            warn!(
                available_count = self.available_count,
                "Available count disagrees with slot array, resetting to 0"
            );
            self.available_count = 0;
            return None;
        };

        let slot = &mut self.slots[index];
        slot.status = SlotStatus::Allocated;
        slot.record.acquired_at = Some(Utc::now());
        self.available_count -= 1;
        self.active_grants.insert(requester_id.to_string(), index);

        Some(slot.record.clone())
    }

    /// Undoes an [`allocate`](Self::allocate) whose grant could not be delivered.
    pub fn rollback(&mut self, index: usize, requester_id: &str) {
        if self.active_grants.get(requester_id) != Some(&index) {
            return;
        }
        self.active_grants.remove(requester_id);
        if let Some(slot) = self.slots.get_mut(index) {
            slot.status = SlotStatus::Available;
            slot.record.acquired_at = None;
            self.available_count += 1;
        }
    }

    /// Ends the grant of slot `index` held by `requester_id`.
    ///
    /// The slot becomes available again, or retired if the pool is still
    /// above its target size. Returns `None` if no such grant exists.
    pub fn free(&mut self, index: usize, requester_id: &str) -> Option<SlotStatus> {
        if self.active_grants.get(requester_id) != Some(&index) {
            return None;
        }
        self.active_grants.remove(requester_id);

        let over_target = self.in_service() > self.target_size;
        let slot = self.slots.get_mut(index)?;
        slot.record.acquired_at = None;
        if over_target {
            slot.status = SlotStatus::Retired;
        } else {
            slot.status = SlotStatus::Available;
            self.available_count += 1;
        }
        let status = slot.status;

        if self.active_grants.is_empty() {
            self.compact();
        }
        Some(self.slots.get(index).map_or(status, |s| s.status))
    }

    /// Truncates the array back to `target_size` once no grants remain.
    fn compact(&mut self) {
        if self.slots.len() <= self.target_size && self.retired_count() == 0 {
            return;
        }
        let before = self.slots.len();
        self.slots.truncate(self.target_size);
        for slot in &mut self.slots {
            slot.status = SlotStatus::Available;
        }
        self.available_count = self.slots.len();
        debug!(
            from = before,
            to = self.slots.len(),
            "Truncated retired slots"
        );
    }

    // =========================================================================
    // Waiting List
    // =========================================================================

    pub fn enqueue(&mut self, request: PendingRequest) -> usize {
        self.waiting_list.push_back(request);
        self.waiting_list.len() - 1
    }

    pub fn pop_waiting(&mut self) -> Option<PendingRequest> {
        self.waiting_list.pop_front()
    }

    /// Puts a popped request back at the head of the list.
    pub fn requeue_front(&mut self, request: PendingRequest) {
        self.waiting_list.push_front(request);
    }

    /// Removes `requester_id` from the waiting list.
    pub fn remove_waiting(&mut self, requester_id: &str) -> Option<PendingRequest> {
        let position = self
            .waiting_list
            .iter()
            .position(|r| r.requester_id == requester_id)?;
        self.waiting_list.remove(position)
    }

    // =========================================================================
    // Resizing
    // =========================================================================

    /// Grows or shrinks the pool to `new_size` slots in service.
    ///
    /// `new_size` must be positive; the coordinator rejects zero before
    /// calling this.
    pub fn resize(
        &mut self,
        key: &PoolKey,
        initializer: &dyn PoolInitializer,
        new_size: usize,
    ) -> ResizeOutcome {
        let previous_size = self.in_service();
        self.target_size = new_size;

        let mut outcome = ResizeOutcome {
            previous_size,
            new_size,
            added: 0,
            removed: 0,
        };

        if new_size >= previous_size {
            outcome.added = self.expand(key, initializer, new_size - previous_size);
        } else {
            outcome.removed = self.shrink(initializer, previous_size - new_size);
        }
        outcome
    }

    fn expand(&mut self, key: &PoolKey, initializer: &dyn PoolInitializer, count: usize) -> usize {
        let mut reactivated = 0;
        for slot in &mut self.slots {
            if reactivated == count {
                break;
            }
            if slot.status == SlotStatus::Retired {
                slot.status = SlotStatus::Available;
                reactivated += 1;
            }
        }

        let appended = count - reactivated;
        if appended > 0 {
            let before = self.slots.len();
            initializer.expand(key, &mut self.slots, appended);
            let created = self.slots.len() - before;
            if created != appended {
                warn!(
                    requested = appended,
                    created,
                    initializer = initializer.name(),
                    "Initializer created an unexpected number of slots"
                );
            }
            self.available_count += reactivated + created;
            return reactivated + created;
        }

        self.available_count += reactivated;
        reactivated
    }

    fn shrink(&mut self, initializer: &dyn PoolInitializer, count: usize) -> usize {
        let has_grants = !self.active_grants.is_empty();
        let removed = initializer.shrink(&mut self.slots, count, has_grants);

        if removed > self.available_count {
            warn!(
                removed,
                available_count = self.available_count,
                "Shrink removed more slots than were available, clamping to 0"
            );
            self.available_count = 0;
        } else {
            self.available_count -= removed;
        }
        removed
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn status(&self, resource_id: &str) -> PoolStatus {
        PoolStatus {
            resource_id: resource_id.to_string(),
            total_resources: self.slots.len(),
            available_count: self.available_count,
            waiting_count: self.waiting_list.len(),
            allocated_count: self.active_grants.len(),
        }
    }

    pub fn allocation(&self, resource_id: &str) -> PoolAllocation {
        let holders: HashMap<usize, &str> = self
            .active_grants
            .iter()
            .map(|(requester, index)| (*index, requester.as_str()))
            .collect();

        let slots = self
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| SlotDetail {
                id: slot.record.id.clone(),
                index: slot.record.index,
                available: slot.is_available(),
                retired: slot.status == SlotStatus::Retired,
                metadata: slot.record.metadata.clone(),
                assigned_to: holders.get(&index).map(|r| r.to_string()),
                acquired_at: slot.record.acquired_at,
            })
            .collect();

        let waiting = self
            .waiting_list
            .iter()
            .enumerate()
            .map(|(position, request)| WaitingDetail {
                requester_id: request.requester_id.clone(),
                priority: request.priority,
                position,
            })
            .collect();

        PoolAllocation {
            resource_id: resource_id.to_string(),
            slots,
            waiting,
        }
    }

    /// Verifies the accounting invariants, describing the first violation.
    ///
    /// A test aid for checking state after a sequence of operations. It
    /// scans every slot and grant, so the coordinator never calls it on the
    /// hot path.
    pub fn check_invariants(&self) -> Result<(), String> {
        let available = self.slots.iter().filter(|s| s.is_available()).count();
        if available != self.available_count {
            return Err(format!(
                "available_count {} but {} slots are available",
                self.available_count, available
            ));
        }

        let retired = self.retired_count();
        if self.available_count + self.active_grants.len() + retired != self.slots.len() {
            return Err(format!(
                "{} available + {} granted + {} retired != {} slots",
                self.available_count,
                self.active_grants.len(),
                retired,
                self.slots.len()
            ));
        }

        let mut seen = HashSet::new();
        for (requester, index) in &self.active_grants {
            if !seen.insert(*index) {
                return Err(format!("slot {} granted twice", index));
            }
            match self.slots.get(*index) {
                Some(slot) if slot.status == SlotStatus::Allocated => {}
                _ => {
                    return Err(format!(
                        "{} holds slot {} which is not allocated",
                        requester, index
                    ))
                }
            }
        }

        let mut requesters: HashSet<&str> = self.active_grants.keys().map(String::as_str).collect();
        for request in &self.waiting_list {
            if !requesters.insert(request.requester_id.as_str()) {
                return Err(format!("{} appears more than once", request.requester_id));
            }
        }

        if retired > 0 && self.active_grants.is_empty() {
            return Err(format!("{} retired slots with no active grants", retired));
        }

        for (position, slot) in self.slots.iter().enumerate() {
            if slot.record.index != position {
                return Err(format!(
                    "record {} has index {} at position {}",
                    slot.record.id, slot.record.index, position
                ));
            }
        }

        Ok(())
    }
}
