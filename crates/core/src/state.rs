//! Persistable coordinator state
//!
//! [`InProgressEntry`] is the registry value for a started transaction.
//! [`RegisteredChanges`] is a committed ledger value.
//! [`CoordinatorSnapshot`] is a full, consistent copy of the coordinator's
//! state used for checkpoints, recovery and monitoring.

use crate::timestamp::Timestamp;
use crate::types::{ChangeSet, TransactionKind, WritePointer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Registry entry for a transaction that has started but not finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProgressEntry {
    /// SHORT or LONG
    pub kind: TransactionKind,
    /// Absolute deadline; `Timestamp::MAX` for transactions that never expire
    pub expiration: Timestamp,
    /// Snapshot boundary of the transaction. The minimum over SHORT entries
    /// is the pruning floor of the committed ledger.
    pub read_pointer: WritePointer,
}

impl InProgressEntry {
    /// Whether a reclamation tick at `now` should invalidate this entry.
    /// LONG transactions never expire.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.kind.is_short() && now >= self.expiration
    }
}

/// Change set held by the committed ledger, tagged with its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredChanges {
    /// Transaction that registered the change set
    pub write_pointer: WritePointer,
    /// Row keys written
    pub changes: ChangeSet,
}

/// Point-in-time sizes of the three state collections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    /// In-progress registry size
    pub in_progress: usize,
    /// Committed change-set ledger size
    pub committed: usize,
    /// Invalid set size
    pub invalid: usize,
}

impl StateCounts {
    /// Pointers a freshly started transaction would exclude
    pub fn excluded(&self) -> usize {
        self.in_progress + self.invalid
    }
}

/// Everything needed to rebuild the coordinator after a restart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    /// When the snapshot was taken
    pub taken_at: Timestamp,
    /// Highest pointer handed out by the allocator
    pub last_pointer: WritePointer,
    /// In-progress registry
    pub in_progress: BTreeMap<WritePointer, InProgressEntry>,
    /// Committed change-set ledger keyed by commit pointer
    pub committed: BTreeMap<WritePointer, RegisteredChanges>,
    /// Invalid set
    pub invalid: BTreeSet<WritePointer>,
}

impl CoordinatorSnapshot {
    /// Sizes of the three collections
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

    #[test]
    fn test_short_entry_expires_at_deadline() {
        let entry = InProgressEntry {
            kind: TransactionKind::Short,
            expiration: Timestamp::from_secs(10),
            read_pointer: 4,
        };
        assert!(!entry.is_expired(Timestamp::from_secs(9)));
        assert!(entry.is_expired(Timestamp::from_secs(10)));
        assert!(entry.is_expired(Timestamp::from_secs(11)));
    }

    #[test]
    fn test_long_entry_never_expires() {
        let entry = InProgressEntry {
            kind: TransactionKind::Long,
            expiration: Timestamp::from_secs(1),
            read_pointer: 0,
        };
        assert!(!entry.is_expired(Timestamp::MAX));
    }

    #[test]
    fn test_snapshot_counts() {
        let mut snapshot = CoordinatorSnapshot::default();
        snapshot.invalid.insert(3);
        snapshot.committed.insert(
            5,
            RegisteredChanges {
                write_pointer: 4,
                changes: ChangeSet::from_iter([vec![1u8]]),
            },
        );
        let counts = snapshot.counts();
        assert_eq!(counts.in_progress, 0);
        assert_eq!(counts.committed, 1);
        assert_eq!(counts.invalid, 1);
        assert_eq!(counts.excluded(), 1);
    }
}
