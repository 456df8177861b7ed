//! Committed change-set ledger
//!
//! Maps each commit pointer to the row keys written under it and the
//! transaction that wrote them. A change set enters the ledger when its
//! owner passes `can_commit` and is moved to a fresh commit pointer when the
//! owner commits, so every transaction that started before the commit sees
//! it above its read pointer.
//!
//! ## Pruning
//!
//! ```text
//! floor = min(read_pointer of in-progress SHORT transactions)   (∞ if none)
//! drop every entry with commit pointer <= floor
//!   unless its owner has not committed yet
//! ```

use std::collections::BTreeMap;
use txcoord_core::{ChangeSet, RegisteredChanges, WritePointer};

/// Change sets of committed transactions that may still cause conflicts
#[derive(Debug, Clone, Default)]
pub struct CommittedLedger {
    entries: BTreeMap<WritePointer, RegisteredChanges>,
}

impl CommittedLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries
    pub fn from_entries(entries: BTreeMap<WritePointer, RegisteredChanges>) -> Self {
        Self { entries }
    }

    /// Record the change set `owner` registered under `commit_pointer`
    pub fn register(
        &mut self,
        commit_pointer: WritePointer,
        owner: WritePointer,
        changes: ChangeSet,
    ) {
        self.entries.insert(
            commit_pointer,
            RegisteredChanges {
                write_pointer: owner,
                changes,
            },
        );
    }

    /// Whether `owner` has a change set in the ledger
    pub fn has_owner(&self, owner: WritePointer) -> bool {
        self.entries.values().any(|e| e.write_pointer == owner)
    }

    /// Move every change set of `owner` under `commit_pointer`, merging them.
    /// Returns the number of entries moved.
    pub fn reassign(&mut self, owner: WritePointer, commit_pointer: WritePointer) -> usize {
        let moved: Vec<WritePointer> = self
            .entries
            .iter()
            .filter(|(_, e)| e.write_pointer == owner)
            .map(|(pointer, _)| *pointer)
            .collect();
        if moved.is_empty() {
            return 0;
        }
        let mut merged = ChangeSet::new();
        for pointer in &moved {
            if let Some(entry) = self.entries.remove(pointer) {
                merged.extend(entry.changes.iter());
            }
        }
        self.register(commit_pointer, owner, merged);
        moved.len()
    }

    /// All entries, ascending by commit pointer
    pub fn iter(&self) -> impl Iterator<Item = (WritePointer, &RegisteredChanges)> {
        self.entries.iter().map(|(pointer, entry)| (*pointer, entry))
    }

    /// Drop entries at or below `floor`; `None` drops everything. Entries
    /// whose owner satisfies `pending` are kept.
    /// Returns the number of entries removed.
    pub fn prune(
        &mut self,
        floor: Option<WritePointer>,
        pending: impl Fn(WritePointer) -> bool,
    ) -> usize {
        let before = self.entries.len();
        self.entries.retain(|pointer, entry| {
            floor.is_some_and(|f| *pointer > f) || pending(entry.write_pointer)
        });
        before - self.entries.len()
    }

    /// Number of retained change sets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is retained
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the underlying map
    pub fn to_map(&self) -> BTreeMap<WritePointer, RegisteredChanges> {
        self.entries.clone()
    }
}
