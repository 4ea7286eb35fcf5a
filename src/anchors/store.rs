//! Confirmed 3D anchor points.

use glam::Vec3;

use crate::error::{PipelineError, Result};

/// Number of anchor slots on the tracked object.
pub const ANCHOR_COUNT: usize = 7;

/// Holds the anchors confirmed so far in this session.
///
/// Slots fill strictly in index order and never change once set; only
/// [`AnchorStore::reset`] clears them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorStore {
    slots: [Option<Vec3>; ANCHOR_COUNT],
}

impl AnchorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `point` to the next unset slot and return that slot.
    pub fn confirm_next_anchor(&mut self, point: Vec3) -> Result<usize> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(PipelineError::CapacityExceeded {
                capacity: ANCHOR_COUNT,
            })?;

        self.slots[slot] = Some(point);
        Ok(slot)
    }

    /// Clear every slot.
    pub fn reset(&mut self) {
        self.slots = [None; ANCHOR_COUNT];
    }

    pub fn is_slot_set(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    pub fn anchor(&self, slot: usize) -> Result<Vec3> {
        match self.slots.get(slot) {
            Some(Some(point)) => Ok(*point),
            Some(None) => Err(PipelineError::SlotNotSet(slot)),
            None => Err(PipelineError::SlotOutOfRange(slot)),
        }
    }

    pub fn confirmed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.confirmed_count() == ANCHOR_COUNT
    }

    /// Build a store from an explicit occupancy pattern (bit `i` set = slot `i` set).
    #[cfg(test)]
    pub(crate) fn from_mask(mask: u8, point: Vec3) -> Self {
        let mut store = Self::new();
        for (slot, value) in store.slots.iter_mut().enumerate() {
            if mask & (1 << slot) != 0 {
                *value = Some(point);
            }
        }
        store
    }
}
