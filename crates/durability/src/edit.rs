//! Write-ahead records of coordinator state mutations
//!
//! Every mutating operation is turned into exactly one [`TransactionEdit`]
//! which is persisted before it is applied in memory. Recovery replays the
//! same edits through the same transition function, so the edit set is the
//! complete vocabulary of state changes:
//!
//! | edit | produced by |
//! |------|-------------|
//! | `Started` | start_short / start_long |
//! | `ChangesRegistered` | a successful can_commit |
//! | `Committed` | commit; carries a fresh commit pointer when the transaction registered changes |
//! | `Aborted` | abort |
//! | `Invalidated` | reclamation expiry, explicit invalidate |
//!
//! Ledger pruning is a pure function of the registry and is not logged.

use serde::{Deserialize, Serialize};
use txcoord_core::{ChangeSet, InProgressEntry, WritePointer};

/// One state mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionEdit {
    /// A transaction started and entered the in-progress registry
    Started {
        /// Allocated write pointer
        write_pointer: WritePointer,
        /// Registry entry created for it
        entry: InProgressEntry,
    },
    /// can_commit passed and the change set entered the committed ledger
    ChangesRegistered {
        /// Transaction that passed the conflict check
        write_pointer: WritePointer,
        /// Freshly allocated pointer the change set is keyed under
        commit_pointer: WritePointer,
        /// Row keys written
        changes: ChangeSet,
    },
    /// The transaction left the registry as committed
    Committed {
        /// Committed transaction
        write_pointer: WritePointer,
        /// Pointer its registered change sets move to; `None` if it
        /// registered nothing
        commit_pointer: Option<WritePointer>,
    },
    /// Client abort; outcome depends on the state the pointer was in
    Aborted {
        /// Aborted transaction
        write_pointer: WritePointer,
    },
    /// Moved from the registry to the invalid set
    Invalidated {
        /// Invalidated transaction
        write_pointer: WritePointer,
    },
}

impl TransactionEdit {
    /// Transaction the edit is about
    pub fn write_pointer(&self) -> WritePointer {
        match self {
            TransactionEdit::Started { write_pointer, .. }
            | TransactionEdit::ChangesRegistered { write_pointer, .. }
            | TransactionEdit::Committed { write_pointer, .. }
            | TransactionEdit::Aborted { write_pointer }
            | TransactionEdit::Invalidated { write_pointer } => *write_pointer,
        }
    }

    /// Highest allocator output mentioned by this edit
    pub fn highest_pointer(&self) -> WritePointer {
        match self {
            TransactionEdit::ChangesRegistered {
                write_pointer,
                commit_pointer,
                ..
            } => (*write_pointer).max(*commit_pointer),
            TransactionEdit::Committed {
                write_pointer,
                commit_pointer,
            } => commit_pointer.map_or(*write_pointer, |cp| cp.max(*write_pointer)),
            other => other.write_pointer(),
        }
    }

    /// Short name for log lines
    pub fn name(&self) -> &'static str {
        match self {
            TransactionEdit::Started { .. } => "started",
            TransactionEdit::ChangesRegistered { .. } => "changes_registered",
            TransactionEdit::Committed { .. } => "committed",
            TransactionEdit::Aborted { .. } => "aborted",
            TransactionEdit::Invalidated { .. } => "invalidated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txcoord_core::{Timestamp, TransactionKind};

    #[test]
    fn test_highest_pointer_uses_commit_pointer() {
        let edit = TransactionEdit::ChangesRegistered {
            write_pointer: 4,
            commit_pointer: 9,
            changes: ChangeSet::new(),
        };
        assert_eq!(edit.write_pointer(), 4);
        assert_eq!(edit.highest_pointer(), 9);
        assert_eq!(edit.name(), "changes_registered");

        let commit = TransactionEdit::Committed {
            write_pointer: 4,
            commit_pointer: Some(11),
        };
        assert_eq!(commit.highest_pointer(), 11);
        let bare = TransactionEdit::Committed {
            write_pointer: 4,
            commit_pointer: None,
        };
        assert_eq!(bare.highest_pointer(), 4);
    }

    #[test]
    fn test_edit_msgpack_roundtrip() {
        let edit = TransactionEdit::Started {
            write_pointer: 7,
            entry: InProgressEntry {
                kind: TransactionKind::Short,
                expiration: Timestamp::from_secs(30),
                read_pointer: 6,
            },
        };
        let bytes = rmp_serde::to_vec(&edit).unwrap();
        let back: TransactionEdit = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(edit, back);
        assert_eq!(back.highest_pointer(), 7);
    }
}
