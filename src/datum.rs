//! Byte buffer exchanged with the store
//!
//! A `Datum` is always owned. Anything the facade hands back is a private
//! copy; nothing aliases backend memory.

use std::fmt;
use std::ops::Deref;

/// Owned, length-delimited byte sequence used for keys and values.
///
/// An empty datum doubles as the "no result" marker: misses, backend
/// failures and the end of an iteration all come back as `Datum::empty()`.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Datum(Vec<u8>);

impl Datum {
    /// The empty datum (size 0, no allocation)
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Copy borrowed backend memory into a caller-owned datum
    pub fn dup(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Deref for Datum {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Datum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Datum {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Datum {
    fn from(bytes: &[u8]) -> Self {
        Self::dup(bytes)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl PartialEq<[u8]> for Datum {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == other
    }
}

impl PartialEq<&[u8]> for Datum {
    fn eq(&self, other: &&[u8]) -> bool {
        self.0 == *other
    }
}

impl<const N: usize> PartialEq<&[u8; N]> for Datum {
    fn eq(&self, other: &&[u8; N]) -> bool {
        self.0 == other[..]
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Datum({:?})", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_datum() {
        let d = Datum::empty();
        assert!(d.is_empty());
        assert_eq!(d.len(), 0);
        assert_eq!(d, Datum::default());
    }

    #[test]
    fn test_dup_is_independent_copy() {
        let mut source = b"value".to_vec();
        let d = Datum::dup(&source);
        source[0] = b'X';
        assert_eq!(d, b"value");
        assert_eq!(d.into_vec(), b"value".to_vec());
    }
}
