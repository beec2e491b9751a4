//! On-disk page store
//!
//! # Architecture
//!
//! ```text
//! SlabStore
//!   ├─→ SlabAllocator
//!   │     ├─→ SizeClass(64B)   → Free: [3, 7, 12]
//!   │     ├─→ SizeClass(77B)   → Free: [1, 4]
//!   │     └─→ SizeClass(...)   → Free: []
//!   ├─→ MetadataStore (append-only batches, ordered index)
//!   │     ├─→ key1 → [SlotId(class=3, offset=128)]
//!   │     └─→ key2 → [SlotId(class=N, ..), SlotId(class=N, ..)]  (chained)
//!   ├─→ SlabCache (LRU)
//!   └─→ Compression (none | zstd)
//! ```

pub mod allocator;
pub mod cache;
pub mod compression;
pub mod metadata;
pub mod size_class;
pub mod slot;
pub mod store;

pub use allocator::SlabAllocator;
pub use cache::{CacheStats, SlabCache};
pub use compression::CompressionAlgorithm;
pub use metadata::{MetadataStore, WriteMode};
pub use slot::{SlotChain, SlotId};
pub use store::{SlabStore, StorageStats, StoreOptions};
