//! Slot addressing for the slab allocator

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of one record: size class file plus byte offset inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId {
    /// Size class index (0 = smallest)
    pub size_class: u16,
    /// Slot offset within the size class file
    pub offset: u64,
}

impl SlotId {
    pub fn new(size_class: u16, offset: u64) -> Self {
        Self { size_class, offset }
    }

    /// Index of the slab file holding this slot
    pub fn file_index(&self) -> usize {
        self.size_class as usize
    }
}

/// Slots holding one record, in order. Records larger than the biggest size
/// class are split across several slots of that class.
pub type SlotChain = Vec<SlotId>;

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot(class={}, offset={})", self.size_class, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_id_creation() {
        let id = SlotId::new(5, 1024);
        assert_eq!(id.size_class, 5);
        assert_eq!(id.offset, 1024);
        assert_eq!(id.file_index(), 5);
        assert_eq!(id.to_string(), "Slot(class=5, offset=1024)");
    }
}
