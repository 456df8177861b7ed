//! In-progress registry
//!
//! Maps the write pointer of every started-but-unfinished transaction to its
//! [`InProgressEntry`]. Ordered by pointer, so the key list handed to new
//! snapshots comes out sorted.

use std::collections::BTreeMap;
use txcoord_core::{InProgressEntry, Timestamp, WritePointer};

/// Transactions that have started and not yet committed, aborted or expired
#[derive(Debug, Clone, Default)]
pub struct InProgressRegistry {
    entries: BTreeMap<WritePointer, InProgressEntry>,
}

impl InProgressRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries
    pub fn from_entries(entries: BTreeMap<WritePointer, InProgressEntry>) -> Self {
        Self { entries }
    }

    /// Register a started transaction
    pub fn insert(&mut self, pointer: WritePointer, entry: InProgressEntry) {
        self.entries.insert(pointer, entry);
    }

    /// Remove a finished transaction, returning its entry if it was present
    pub fn remove(&mut self, pointer: WritePointer) -> Option<InProgressEntry> {
        self.entries.remove(&pointer)
    }

    /// Whether `pointer` is in progress
    pub fn contains(&self, pointer: WritePointer) -> bool {
        self.entries.contains_key(&pointer)
    }

    /// Number of in-progress transactions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is in progress
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All in-progress pointers, ascending
    pub fn pointers(&self) -> Vec<WritePointer> {
        self.entries.keys().copied().collect()
    }

    /// SHORT transactions whose deadline has passed at `now`, ascending
    pub fn expired(&self, now: Timestamp) -> Vec<WritePointer> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(pointer, _)| *pointer)
            .collect()
    }

    /// Smallest read pointer among in-progress SHORT transactions.
    ///
    /// `None` when no SHORT transaction is in progress, meaning the ledger
    /// may be pruned without limit.
    pub fn min_short_read_pointer(&self) -> Option<WritePointer> {
        self.entries
            .values()
            .filter(|entry| entry.kind.is_short())
            .map(|entry| entry.read_pointer)
            .min()
    }

    /// Copy of the underlying map
    pub fn to_map(&self) -> BTreeMap<WritePointer, InProgressEntry> {
        self.entries.clone()
    }
}
