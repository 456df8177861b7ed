//! In-memory state storage
//!
//! Keeps the latest snapshot and the edit log in a shared buffer. Cloning
//! the handle shares the buffer, which lets tests hand one clone to the
//! coordinator and inspect what was logged through another.

use crate::edit::TransactionEdit;
use crate::storage::{RecoveredState, TransactionStateStorage};
use parking_lot::Mutex;
use std::sync::Arc;
use txcoord_core::{CoordinatorSnapshot, Result};

#[derive(Debug, Default)]
struct MemoryInner {
    snapshot: Option<CoordinatorSnapshot>,
    edits: Vec<TransactionEdit>,
    snapshots_written: u64,
}

/// Non-durable storage that survives only as long as some handle is alive
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl InMemoryStateStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Edits logged since the last snapshot
    pub fn edits(&self) -> Vec<TransactionEdit> {
        self.inner.lock().edits.clone()
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> Option<CoordinatorSnapshot> {
        self.inner.lock().snapshot.clone()
    }

    /// Number of snapshots written over the lifetime of this storage
    pub fn snapshots_written(&self) -> u64 {
        self.inner.lock().snapshots_written
    }
}

impl TransactionStateStorage for InMemoryStateStorage {
    fn append(&mut self, edit: &TransactionEdit) -> Result<()> {
        self.inner.lock().edits.push(edit.clone());
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &CoordinatorSnapshot) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.snapshot = Some(snapshot.clone());
        inner.edits.clear();
        inner.snapshots_written += 1;
        Ok(())
    }

    fn recover(&mut self) -> Result<RecoveredState> {
        let inner = self.inner.lock();
        Ok(RecoveredState {
            snapshot: inner.snapshot.clone(),
            edits: inner.edits.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
