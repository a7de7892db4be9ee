//! State fingerprints.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Canonical linearization of a state: the ordered words emitted by the
/// [`Linearizer`](crate::Linearizer).
///
/// Equality is word-by-word. Two states linearized against the same class
/// table give equal fingerprints exactly when they are isomorphic, since
/// whole-state class ids come from the table and not from traversal order.
/// Clones share the word buffer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Arc<[i32]>);

impl Fingerprint {
    pub fn new(words: Vec<i32>) -> Self {
        Fingerprint(words.into())
    }

    #[inline]
    pub fn words(&self) -> &[i32] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 64-bit hash of the words, used as the key in hash-only matching.
    pub fn digest(&self) -> Digest {
        let mut hasher = ahash::AHasher::default();
        self.0.hash(&mut hasher);
        Digest(hasher.finish())
    }
}

impl From<Vec<i32>> for Fingerprint {
    fn from(words: Vec<i32>) -> Self {
        Fingerprint::new(words)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({} words, {})", self.len(), self.digest())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, w) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", w)?;
        }
        f.write_str(")")
    }
}

/// A 64-bit digest of a fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(u64);

impl Digest {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_u64(v: u64) -> Self {
        Digest(v)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({:016x})", self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
