//! Identifier and change-set types shared across the coordinator
//!
//! - WritePointer: transaction identity and cell version timestamp
//! - TransactionKind: SHORT (auto-expiring) or LONG
//! - ChangeSet: the row keys a transaction wrote, used for conflict detection

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Monotonic 64-bit identifier handed out by the pointer allocator.
///
/// Serves both as a transaction's identity and as the version stamped on
/// every cell it writes. Commit pointers used as ledger keys come from the
/// same sequence.
pub type WritePointer = u64;

/// How a transaction is treated by reclamation and abort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Expected to finish quickly; invalidated automatically after its timeout
    Short,
    /// Runs indefinitely; never auto-expired, invalidated when aborted
    Long,
}

impl TransactionKind {
    /// True for [`TransactionKind::Short`]
    #[inline]
    pub fn is_short(&self) -> bool {
        matches!(self, TransactionKind::Short)
    }

    /// True for [`TransactionKind::Long`]
    #[inline]
    pub fn is_long(&self) -> bool {
        matches!(self, TransactionKind::Long)
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Short => write!(f, "short"),
            TransactionKind::Long => write!(f, "long"),
        }
    }
}

/// Set of row keys written by one transaction
///
/// Keys are opaque bytes; the coordinator never interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    keys: FxHashSet<Vec<u8>>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row key. Returns false if it was already present.
    pub fn insert(&mut self, key: impl Into<Vec<u8>>) -> bool {
        self.keys.insert(key.into())
    }

    /// Whether `key` is in the set
    pub fn contains(&self, key: &[u8]) -> bool {
        self.keys.contains(key)
    }

    /// Number of row keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if no keys were written
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate over the row keys in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.keys.iter().map(Vec::as_slice)
    }

    /// First key found in both sets, probing the smaller one
    pub fn first_overlap<'a>(&'a self, other: &'a ChangeSet) -> Option<&'a [u8]> {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().find(|key| large.contains(key))
    }

    /// Whether the two sets share at least one key
    pub fn intersects(&self, other: &ChangeSet) -> bool {
        self.first_overlap(other).is_some()
    }
}

impl<K: Into<Vec<u8>>> FromIterator<K> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = ChangeSet::new();
        set.extend(iter);
        set
    }
}

impl<K: Into<Vec<u8>>> Extend<K> for ChangeSet {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        self.keys.extend(iter.into_iter().map(Into::into));
    }
}
