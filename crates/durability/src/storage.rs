//! Persistence collaborator interface
//!
//! The coordinator holds its storage behind the same lock that serializes
//! state mutations, so implementations take `&mut self` and need no internal
//! synchronization of their own beyond being `Send`.

use crate::edit::TransactionEdit;
use txcoord_core::{CoordinatorSnapshot, Result};

/// What recovery found on startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveredState {
    /// Latest checkpoint, if one was ever written
    pub snapshot: Option<CoordinatorSnapshot>,
    /// Edits logged after that checkpoint, in append order
    pub edits: Vec<TransactionEdit>,
}

impl RecoveredState {
    /// Nothing was ever persisted
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none() && self.edits.is_empty()
    }
}

/// Durable log of coordinator state
pub trait TransactionStateStorage: Send {
    /// Persist one edit. When this returns `Ok`, the edit must survive a
    /// restart.
    fn append(&mut self, edit: &TransactionEdit) -> Result<()>;

    /// Persist a full snapshot. Edits appended before this call are covered
    /// by the snapshot and must not be returned by a later `recover`.
    fn write_snapshot(&mut self, snapshot: &CoordinatorSnapshot) -> Result<()>;

    /// Load the latest snapshot and the edits logged after it
    fn recover(&mut self) -> Result<RecoveredState>;

    /// Name used in log lines
    fn name(&self) -> &'static str;
}
