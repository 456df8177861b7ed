//! Coordinator state and its transition function
//!
//! [`TransactionState`] owns the allocator and the three collections. The
//! only way to mutate the collections is [`TransactionState::apply`], which
//! is shared by live operations and by recovery replay, so a replayed log
//! always rebuilds exactly the state the live coordinator had.
//!
//! ## Abort outcomes
//!
//! | state of pointer | effect of `Aborted` |
//! |------------------|---------------------|
//! | in progress, SHORT | removed from registry |
//! | in progress, LONG | removed from registry, added to invalid set |
//! | invalid | removed from invalid set |
//! | unknown | no effect |

use crate::allocator::PointerAllocator;
use crate::conflict::{detect_conflict, ConflictResult};
use crate::invalid::InvalidSet;
use crate::ledger::CommittedLedger;
use crate::registry::InProgressRegistry;
use txcoord_core::{
    ChangeSet, CoordinatorSnapshot, Result, StateCounts, Timestamp, Transaction, TransactionKind,
    WritePointer,
};
use txcoord_durability::TransactionEdit;

/// Allocator plus in-progress registry, committed ledger and invalid set
#[derive(Debug, Default)]
pub struct TransactionState {
    allocator: PointerAllocator,
    in_progress: InProgressRegistry,
    committed: CommittedLedger,
    invalid: InvalidSet,
}

impl TransactionState {
    /// Empty state; the first allocated pointer is 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a checkpoint
    pub fn from_snapshot(snapshot: CoordinatorSnapshot) -> Self {
        Self {
            allocator: PointerAllocator::new(snapshot.last_pointer),
            in_progress: InProgressRegistry::from_entries(snapshot.in_progress),
            committed: CommittedLedger::from_entries(snapshot.committed),
            invalid: InvalidSet::from_pointers(snapshot.invalid),
        }
    }

    /// Full copy of the current state
    pub fn to_snapshot(&self, taken_at: Timestamp) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            taken_at,
            last_pointer: self.allocator.current(),
            in_progress: self.in_progress.to_map(),
            committed: self.committed.to_map(),
            invalid: self.invalid.to_set(),
        }
    }

    /// Take the next pointer from the allocator
    pub fn allocate(&self) -> Result<WritePointer> {
        self.allocator.next()
    }

    /// Highest pointer handed out so far
    pub fn last_pointer(&self) -> WritePointer {
        self.allocator.current()
    }

    /// Snapshot for a transaction about to start at `write_pointer`.
    ///
    /// Must be called before the matching `Started` edit is applied so the
    /// transaction does not list itself as in progress.
    pub fn begin(&self, write_pointer: WritePointer, kind: TransactionKind) -> Transaction {
        Transaction::new(
            write_pointer,
            write_pointer.saturating_sub(1),
            self.invalid.to_vec(),
            self.in_progress.pointers(),
            kind,
        )
    }

    /// Run the conflict check for `tx`
    pub fn check_conflicts(&self, tx: &Transaction, changes: &ChangeSet) -> ConflictResult {
        detect_conflict(&self.committed, tx, changes)
    }

    /// Whether `write_pointer` has a change set in the ledger
    pub fn has_registered(&self, write_pointer: WritePointer) -> bool {
        self.committed.has_owner(write_pointer)
    }

    /// Apply one edit. Returns false if the edit did not match the current
    /// state and nothing changed.
    pub fn apply(&mut self, edit: &TransactionEdit) -> bool {
        self.allocator.advance_to(edit.highest_pointer());
        match edit {
            TransactionEdit::Started {
                write_pointer,
                entry,
            } => {
                if self.in_progress.contains(*write_pointer) || self.invalid.contains(*write_pointer)
                {
                    return false;
                }
                self.in_progress.insert(*write_pointer, *entry);
                true
            }
            TransactionEdit::ChangesRegistered {
                write_pointer,
                commit_pointer,
                changes,
            } => {
                self.committed
                    .register(*commit_pointer, *write_pointer, changes.clone());
                true
            }
            TransactionEdit::Committed {
                write_pointer,
                commit_pointer,
            } => {
                if self.in_progress.remove(*write_pointer).is_none() {
                    return false;
                }
                if let Some(commit_pointer) = commit_pointer {
                    self.committed.reassign(*write_pointer, *commit_pointer);
                }
                true
            }
            TransactionEdit::Aborted { write_pointer } => {
                match self.in_progress.remove(*write_pointer) {
                    Some(entry) => {
                        if entry.kind.is_long() {
                            self.invalid.add(*write_pointer);
                        }
                        true
                    }
                    None => self.invalid.remove(*write_pointer),
                }
            }
            TransactionEdit::Invalidated { write_pointer } => {
                match self.in_progress.remove(*write_pointer) {
                    Some(_) => {
                        self.invalid.add(*write_pointer);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Drop ledger entries no in-progress SHORT transaction can conflict with.
    /// Change sets of transactions still in progress are kept.
    /// Returns the number of entries removed.
    pub fn prune(&mut self) -> usize {
        let floor = self.in_progress.min_short_read_pointer();
        let in_progress = &self.in_progress;
        self.committed
            .prune(floor, |owner| in_progress.contains(owner))
    }

    /// SHORT transactions past their deadline at `now`
    pub fn expired(&self, now: Timestamp) -> Vec<WritePointer> {
        self.in_progress.expired(now)
    }

    /// Whether `pointer` is in progress
    pub fn is_in_progress(&self, pointer: WritePointer) -> bool {
        self.in_progress.contains(pointer)
    }

    /// Whether `pointer` is in the invalid set
    pub fn is_invalid(&self, pointer: WritePointer) -> bool {
        self.invalid.contains(pointer)
    }

    /// Collection sizes
    pub fn counts(&self) -> StateCounts {
        StateCounts {
            in_progress: self.in_progress.len(),
            committed: self.committed.len(),
            invalid: self.invalid.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txcoord_core::InProgressEntry;

    fn started(state: &mut TransactionState, kind: TransactionKind) -> Transaction {
        let wp = state.allocate().unwrap();
        let tx = state.begin(wp, kind);
        let expiration = match kind {
            TransactionKind::Short => Timestamp::from_secs(10),
            TransactionKind::Long => Timestamp::MAX,
        };
        assert!(state.apply(&TransactionEdit::Started {
            write_pointer: wp,
            entry: InProgressEntry {
                kind,
                expiration,
                read_pointer: tx.read_pointer(),
            },
        }));
        tx
    }

    fn register(state: &mut TransactionState, tx: &Transaction, keys: &[&[u8]]) -> WritePointer {
        let commit_pointer = state.allocate().unwrap();
        assert!(state.apply(&TransactionEdit::ChangesRegistered {
            write_pointer: tx.write_pointer(),
            commit_pointer,
            changes: keys.iter().copied().collect(),
        }));
        commit_pointer
    }

    #[test]
    fn test_begin_lists_earlier_in_progress() {
        let mut state = TransactionState::new();
        let tx1 = started(&mut state, TransactionKind::Short);
        let tx2 = started(&mut state, TransactionKind::Long);

        assert_eq!(tx1.write_pointer(), 1);
        assert_eq!(tx1.read_pointer(), 0);
        assert!(tx1.in_progress().is_empty());
        assert_eq!(tx2.in_progress(), &[1]);
        assert_eq!(state.counts().in_progress, 2);
    }

    #[test]
    fn test_abort_outcomes() {
        let mut state = TransactionState::new();
        let short = started(&mut state, TransactionKind::Short);
        let long = started(&mut state, TransactionKind::Long);

        assert!(state.apply(&TransactionEdit::Aborted {
            write_pointer: short.write_pointer()
        }));
        assert!(!state.is_invalid(short.write_pointer()));

        assert!(state.apply(&TransactionEdit::Aborted {
            write_pointer: long.write_pointer()
        }));
        assert!(state.is_invalid(long.write_pointer()));

        // aborting an invalid pointer clears it
        assert!(state.apply(&TransactionEdit::Aborted {
            write_pointer: long.write_pointer()
        }));
        assert!(!state.is_invalid(long.write_pointer()));

        assert!(!state.apply(&TransactionEdit::Aborted { write_pointer: 99 }));
        assert_eq!(state.counts(), StateCounts::default());
    }

    #[test]
    fn test_invalidate_requires_in_progress() {
        let mut state = TransactionState::new();
        let tx = started(&mut state, TransactionKind::Short);
        let edit = TransactionEdit::Invalidated {
            write_pointer: tx.write_pointer(),
        };
        assert!(state.apply(&edit));
        assert!(!state.apply(&edit));
        assert_eq!(state.counts().invalid, 1);
        assert_eq!(state.counts().in_progress, 0);
    }

    #[test]
    fn test_prune_keeps_entries_newer_than_oldest_short() {
        let mut state = TransactionState::new();
        let writer = started(&mut state, TransactionKind::Short);
        let reader = started(&mut state, TransactionKind::Short);
        let cp = register(&mut state, &writer, &[b"a"]);
        assert!(state.apply(&TransactionEdit::Committed {
            write_pointer: writer.write_pointer(),
            commit_pointer: None,
        }));

        // reader's read pointer is 1, commit pointer is 3
        assert_eq!(state.prune(), 0);
        let overlapping: ChangeSet = [b"a".as_slice()].into_iter().collect();
        assert!(!state
            .check_conflicts(&reader, &overlapping)
            .is_clear());

        assert!(state.apply(&TransactionEdit::Committed {
            write_pointer: reader.write_pointer(),
            commit_pointer: None,
        }));
        assert_eq!(state.prune(), 1);
        assert!(cp > reader.read_pointer());
        assert_eq!(state.counts().committed, 0);
    }

    #[test]
    fn test_commit_moves_registered_changes() {
        let mut state = TransactionState::new();
        let tx = started(&mut state, TransactionKind::Short);
        let registered_at = register(&mut state, &tx, &[b"a"]);
        let commit_pointer = state.allocate().unwrap();
        let edit = TransactionEdit::Committed {
            write_pointer: tx.write_pointer(),
            commit_pointer: Some(commit_pointer),
        };
        assert!(state.apply(&edit));

        let snapshot = state.to_snapshot(Timestamp::from_secs(1));
        let pointers: Vec<_> = snapshot.committed.keys().copied().collect();
        assert_eq!(pointers, vec![commit_pointer]);
        assert!(registered_at < commit_pointer);

        // a second commit of the same pointer does not match
        assert!(!state.apply(&edit));
    }

    #[test]
    fn test_long_transactions_do_not_hold_back_pruning() {
        let mut state = TransactionState::new();
        let _long = started(&mut state, TransactionKind::Long);
        let writer = started(&mut state, TransactionKind::Short);
        register(&mut state, &writer, &[b"a"]);
        state.apply(&TransactionEdit::Committed {
            write_pointer: writer.write_pointer(),
            commit_pointer: None,
        });
        assert_eq!(state.prune(), 1);
    }

    #[test]
    fn test_snapshot_round_trip_preserves_allocator() {
        let mut state = TransactionState::new();
        let tx = started(&mut state, TransactionKind::Short);
        register(&mut state, &tx, &[b"k"]);

        let snapshot = state.to_snapshot(Timestamp::from_secs(1));
        let restored = TransactionState::from_snapshot(snapshot.clone());
        assert_eq!(restored.to_snapshot(Timestamp::from_secs(1)), snapshot);
        assert_eq!(restored.allocate().unwrap(), 3);
    }

    #[test]
    fn test_apply_advances_allocator() {
        let mut state = TransactionState::new();
        state.apply(&TransactionEdit::Started {
            write_pointer: 41,
            entry: InProgressEntry {
                kind: TransactionKind::Short,
                expiration: Timestamp::from_secs(1),
                read_pointer: 40,
            },
        });
        assert_eq!(state.last_pointer(), 41);
        assert_eq!(state.allocate().unwrap(), 42);
    }
}
