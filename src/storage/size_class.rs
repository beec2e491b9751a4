//! Size class bookkeeping for the slab allocator

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// Slots of one fixed size living in one slab file
///
/// Free slots sit in a min-heap so the lowest offset is reused first.
#[derive(Debug)]
pub struct SizeClass {
    /// Size of slots in this class (bytes)
    pub slot_size: usize,
    pub index: u16,
    free_slots: BinaryHeap<Reverse<u64>>,
    /// First offset past the last slot ever handed out
    next_offset: u64,
}

impl SizeClass {
    pub fn new(index: u16, slot_size: usize) -> Self {
        Self {
            slot_size,
            index,
            free_slots: BinaryHeap::new(),
            next_offset: 0,
        }
    }

    /// Rebuild state for an existing slab file.
    ///
    /// Every slot below the file end that no live key points at becomes free.
    pub fn restore(&mut self, file_len: u64, live_offsets: &BTreeSet<u64>) {
        let slot = self.slot_size as u64;
        let highest_live = live_offsets.iter().next_back().map(|o| o + slot).unwrap_or(0);
        let end = file_len.div_ceil(slot) * slot;
        self.next_offset = end.max(highest_live);

        self.free_slots.clear();
        let mut offset = 0;
        while offset < self.next_offset {
            if !live_offsets.contains(&offset) {
                self.free_slots.push(Reverse(offset));
            }
            offset += slot;
        }
    }

    /// Returns the offset of the allocated slot
    pub fn allocate(&mut self) -> u64 {
        if let Some(Reverse(offset)) = self.free_slots.pop() {
            return offset;
        }

        let offset = self.next_offset;
        self.next_offset += self.slot_size as u64;
        offset
    }

    pub fn free(&mut self, offset: u64) {
        self.free_slots.push(Reverse(offset));
    }

    pub fn free_count(&self) -> usize {
        self.free_slots.len()
    }

    /// Total slots carved out of the file (including free ones)
    pub fn total_slots(&self) -> u64 {
        self.next_offset / self.slot_size as u64
    }

    pub fn can_fit(&self, size: usize) -> bool {
        size <= self.slot_size
    }
}

/// Size classes growing by ~20% from `min_size` up to `max_size`
pub fn calculate_size_classes(min_size: usize, max_size: usize) -> Vec<usize> {
    let mut classes = Vec::new();
    let mut current = min_size.max(8);

    while current <= max_size {
        classes.push(current);
        current = (current as f64 * 1.2).ceil() as usize;
    }

    classes
}
