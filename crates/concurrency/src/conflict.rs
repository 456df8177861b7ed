//! Write-write conflict detection
//!
//! A transaction conflicts when a change set it cannot see shares a row key
//! with the change set it wants to commit. It cannot see:
//!
//! - change sets committed after its read pointer
//! - change sets registered by transactions that were in progress when it
//!   started, wherever they sit in the ledger
//!
//! The check is first-committer-wins: whoever registers first keeps its
//! writes, the later one must abort.

use crate::ledger::CommittedLedger;
use txcoord_core::{ChangeSet, Transaction, WritePointer};

/// Result of conflict detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResult {
    /// No conflict detected
    NoConflict,
    /// Write-write conflict detected
    WriteWriteConflict {
        /// Commit pointer of the earliest conflicting entry
        commit_pointer: WritePointer,
        /// A row key both change sets wrote
        key: Vec<u8>,
    },
}

impl ConflictResult {
    /// True if the transaction may commit
    pub fn is_clear(&self) -> bool {
        matches!(self, ConflictResult::NoConflict)
    }
}

/// Check `changes` against every ledger entry invisible to `tx`
///
/// Scans entries in commit order and stops at the first overlap. Entries
/// `tx` registered itself are skipped.
pub fn detect_conflict(
    ledger: &CommittedLedger,
    tx: &Transaction,
    changes: &ChangeSet,
) -> ConflictResult {
    if changes.is_empty() {
        return ConflictResult::NoConflict;
    }
    let relevant = ledger.iter().filter(|(commit_pointer, entry)| {
        entry.write_pointer != tx.write_pointer()
            && (*commit_pointer > tx.read_pointer() || tx.was_in_progress(entry.write_pointer))
    });
    for (commit_pointer, entry) in relevant {
        if let Some(key) = entry.changes.first_overlap(changes) {
            return ConflictResult::WriteWriteConflict {
                commit_pointer,
                key: key.to_vec(),
            };
        }
    }
    ConflictResult::NoConflict
}

#[cfg(test)]
mod tests {
    use super::*;
    use txcoord_core::TransactionKind;

    fn changes(keys: &[&[u8]]) -> ChangeSet {
        keys.iter().copied().collect()
    }

    fn reader(read_pointer: WritePointer, in_progress: Vec<WritePointer>) -> Transaction {
        Transaction::new(
            read_pointer + 1,
            read_pointer,
            Vec::new(),
            in_progress,
            TransactionKind::Short,
        )
    }

    #[test]
    fn test_overlap_after_read_pointer_conflicts() {
        let mut ledger = CommittedLedger::new();
        ledger.register(5, 1, changes(&[b"a", b"b"]));
        ledger.register(8, 2, changes(&[b"c"]));

        let result = detect_conflict(&ledger, &reader(4, vec![]), &changes(&[b"b", b"z"]));
        assert_eq!(
            result,
            ConflictResult::WriteWriteConflict {
                commit_pointer: 5,
                key: b"b".to_vec()
            }
        );
        assert!(!result.is_clear());
    }

    #[test]
    fn test_commits_at_or_before_read_pointer_ignored() {
        let mut ledger = CommittedLedger::new();
        ledger.register(5, 1, changes(&[b"a"]));

        assert!(detect_conflict(&ledger, &reader(5, vec![]), &changes(&[b"a"])).is_clear());
        assert!(detect_conflict(&ledger, &reader(6, vec![]), &changes(&[b"a"])).is_clear());
    }

    #[test]
    fn test_in_progress_owner_conflicts_below_read_pointer() {
        let mut ledger = CommittedLedger::new();
        // owner 1 registered at 2 and had not committed when the reader started
        ledger.register(2, 1, changes(&[b"a"]));

        let result = detect_conflict(&ledger, &reader(2, vec![1]), &changes(&[b"a"]));
        assert_eq!(
            result,
            ConflictResult::WriteWriteConflict {
                commit_pointer: 2,
                key: b"a".to_vec()
            }
        );
    }

    #[test]
    fn test_own_registration_ignored() {
        let mut ledger = CommittedLedger::new();
        let tx = reader(4, vec![]);
        ledger.register(6, tx.write_pointer(), changes(&[b"a"]));
        assert!(detect_conflict(&ledger, &tx, &changes(&[b"a"])).is_clear());
    }

    #[test]
    fn test_disjoint_keys_do_not_conflict() {
        let mut ledger = CommittedLedger::new();
        ledger.register(5, 1, changes(&[b"a"]));
        assert!(detect_conflict(&ledger, &reader(0, vec![]), &changes(&[b"b"])).is_clear());
    }

    #[test]
    fn test_empty_change_set_never_conflicts() {
        let mut ledger = CommittedLedger::new();
        ledger.register(5, 1, changes(&[b"a"]));
        assert!(detect_conflict(&ledger, &reader(0, vec![]), &ChangeSet::new()).is_clear());
    }

    #[test]
    fn test_earliest_conflict_reported() {
        let mut ledger = CommittedLedger::new();
        ledger.register(9, 3, changes(&[b"k"]));
        ledger.register(7, 2, changes(&[b"k"]));
        match detect_conflict(&ledger, &reader(1, vec![]), &changes(&[b"k"])) {
            ConflictResult::WriteWriteConflict { commit_pointer, .. } => {
                assert_eq!(commit_pointer, 7)
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }
}
