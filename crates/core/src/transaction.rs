//! Transaction snapshot value
//!
//! A [`Transaction`] is handed to the client when it starts and never
//! changes afterwards. It carries everything needed to decide which cell
//! versions the client may read, so visibility is evaluated locally with no
//! round trip to the coordinator.
//!
//! A version stamped with write pointer `p` is visible iff:
//!
//! ```text
//! p <= read_pointer  AND  p not in invalid  AND  p not in in_progress
//! ```

use crate::types::{TransactionKind, WritePointer};
use serde::{Deserialize, Serialize};

/// Immutable snapshot describing what one transaction may see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    write_pointer: WritePointer,
    read_pointer: WritePointer,
    /// Invalid set at start time, sorted ascending
    invalid: Vec<WritePointer>,
    /// Write pointers in progress at start time, sorted ascending
    in_progress: Vec<WritePointer>,
    kind: TransactionKind,
}

impl Transaction {
    /// Build a snapshot. `invalid` and `in_progress` may be in any order.
    pub fn new(
        write_pointer: WritePointer,
        read_pointer: WritePointer,
        mut invalid: Vec<WritePointer>,
        mut in_progress: Vec<WritePointer>,
        kind: TransactionKind,
    ) -> Self {
        invalid.sort_unstable();
        invalid.dedup();
        in_progress.sort_unstable();
        in_progress.dedup();
        Self {
            write_pointer,
            read_pointer,
            invalid,
            in_progress,
            kind,
        }
    }

    /// This transaction's identity and the version of every cell it writes
    #[inline]
    pub fn write_pointer(&self) -> WritePointer {
        self.write_pointer
    }

    /// Highest pointer allocated before this transaction started
    #[inline]
    pub fn read_pointer(&self) -> WritePointer {
        self.read_pointer
    }

    /// SHORT or LONG
    #[inline]
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Invalid set copied at start, ascending
    pub fn invalid(&self) -> &[WritePointer] {
        &self.invalid
    }

    /// Transactions that were in progress at start, ascending
    pub fn in_progress(&self) -> &[WritePointer] {
        &self.in_progress
    }

    /// Whether `pointer` was in progress when this transaction started
    pub fn was_in_progress(&self, pointer: WritePointer) -> bool {
        self.in_progress.binary_search(&pointer).is_ok()
    }

    /// Whether versions written at `pointer` must be skipped regardless of
    /// the read pointer
    pub fn excludes(&self, pointer: WritePointer) -> bool {
        self.invalid.binary_search(&pointer).is_ok() || self.was_in_progress(pointer)
    }

    /// Whether a cell version stamped with `pointer` is visible to this
    /// transaction
    pub fn is_visible(&self, pointer: WritePointer) -> bool {
        pointer <= self.read_pointer && !self.excludes(pointer)
    }
}
