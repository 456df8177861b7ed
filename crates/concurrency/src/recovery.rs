//! State recovery from persisted edits
//!
//! ## Procedure
//!
//! 1. Start from the checkpoint if one exists, otherwise from empty state
//! 2. Apply every logged edit through [`TransactionState::apply`]
//! 3. Skip edits that do not match the state they land on
//! 4. Advance the allocator past every pointer any edit mentions
//! 5. Prune the ledger
//!
//! Replays never re-run conflict detection. A `ChangesRegistered` edit is a
//! decision that was already made, so it is applied as is.

use crate::state::TransactionState;
use tracing::warn;
use txcoord_durability::RecoveredState;

/// Outcome of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// A checkpoint was loaded
    pub from_snapshot: bool,
    /// Edits that changed state
    pub edits_applied: usize,
    /// Edits that did not match and were ignored
    pub edits_skipped: usize,
    /// Ledger entries pruned after replay
    pub pruned: usize,
}

/// Rebuild coordinator state from what storage recovered
pub fn replay(recovered: RecoveredState) -> (TransactionState, ReplayStats) {
    let mut stats = ReplayStats {
        from_snapshot: recovered.snapshot.is_some(),
        ..Default::default()
    };
    let mut state = match recovered.snapshot {
        Some(snapshot) => TransactionState::from_snapshot(snapshot),
        None => TransactionState::new(),
    };

    for edit in &recovered.edits {
        if state.apply(edit) {
            stats.edits_applied += 1;
        } else {
            stats.edits_skipped += 1;
            warn!(
                target: "txcoord::durability",
                edit = edit.name(),
                write_pointer = edit.write_pointer(),
                "Skipping edit that does not match recovered state"
            );
        }
    }

    stats.pruned = state.prune();
    (state, stats)
}
