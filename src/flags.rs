//! Open modes and store flags

use std::fmt;
use std::ops::{BitAnd, BitOr};

/// How a store is opened
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenMode(u32);

impl OpenMode {
    /// Read-only access
    pub const READER: OpenMode = OpenMode(0);
    /// Read/write access to an existing store
    pub const WRITER: OpenMode = OpenMode(0x1);
    /// Create the store if missing
    pub const CREATE: OpenMode = OpenMode(0x2);
    /// Discard existing contents
    pub const TRUNCATE: OpenMode = OpenMode(0x4);

    pub const WRCREAT: OpenMode = OpenMode(0x1 | 0x2);
    pub const NEWDB: OpenMode = OpenMode(0x1 | 0x2 | 0x4);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: OpenMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITER)
    }
}

impl BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, rhs: Self) -> Self {
        OpenMode(self.0 | rhs.0)
    }
}

impl fmt::Debug for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![if self.is_writable() { "WRITER" } else { "READER" }];
        if self.contains(Self::CREATE) {
            parts.push("CREATE");
        }
        if self.contains(Self::TRUNCATE) {
            parts.push("TRUNCATE");
        }
        write!(f, "OpenMode({})", parts.join("|"))
    }
}

/// Modifiers for `Ldbm::store`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StoreFlags(u32);

impl StoreFlags {
    /// Fail if the key is already present
    pub const INSERT: StoreFlags = StoreFlags(0);
    /// Overwrite an existing key
    pub const REPLACE: StoreFlags = StoreFlags(0x1);
    /// Flush to durable storage after the write
    pub const SYNC: StoreFlags = StoreFlags(0x8000_0000);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: StoreFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn replace(self) -> bool {
        self.contains(Self::REPLACE)
    }

    pub const fn sync(self) -> bool {
        self.contains(Self::SYNC)
    }

    /// Flags with SYNC masked off, as handed to the native put
    pub const fn without_sync(self) -> StoreFlags {
        StoreFlags(self.0 & !Self::SYNC.0)
    }
}

impl BitOr for StoreFlags {
    type Output = StoreFlags;

    fn bitor(self, rhs: Self) -> Self {
        StoreFlags(self.0 | rhs.0)
    }
}

impl BitAnd for StoreFlags {
    type Output = StoreFlags;

    fn bitand(self, rhs: Self) -> Self {
        StoreFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for StoreFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.replace() { "REPLACE" } else { "INSERT" };
        if self.sync() {
            write!(f, "StoreFlags({}|SYNC)", op)
        } else {
            write!(f, "StoreFlags({})", op)
        }
    }
}
