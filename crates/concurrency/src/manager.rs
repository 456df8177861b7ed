//! Transaction manager: the coordinator's single point of truth
//!
//! All state lives behind one mutex together with the storage collaborator.
//! Every mutating operation follows the same sequence under that lock:
//!
//! ```text
//! 1. validate against current state
//! 2. allocate pointer(s) if needed
//! 3. storage.append(edit)          (persist first)
//! 4. state.apply(edit)             (then mutate memory)
//! ```
//!
//! If step 3 fails the in-memory state is untouched and the error is
//! returned. A pointer allocated in step 2 is then simply never used, which
//! keeps uniqueness and monotonicity intact.

use crate::conflict::ConflictResult;
use crate::state::TransactionState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use txcoord_core::{
    ChangeSet, Clock, CoordinatorSnapshot, Error, InProgressEntry, Result, StateCounts,
    SystemClock, Timestamp, Transaction, TransactionKind, WritePointer,
};
use txcoord_durability::{InMemoryStateStorage, TransactionEdit, TransactionStateStorage};

/// Default lifetime of a SHORT transaction
pub const DEFAULT_SHORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings applied to newly started transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Lifetime of a SHORT transaction started with [`TransactionManager::start_short`]
    pub short_timeout: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            short_timeout: DEFAULT_SHORT_TIMEOUT,
        }
    }
}

/// What one reclamation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// SHORT transactions moved to the invalid set
    pub expired: usize,
    /// Ledger entries dropped by the pruning pass
    pub pruned: usize,
}

struct ManagerInner {
    state: TransactionState,
    storage: Box<dyn TransactionStateStorage>,
}

impl ManagerInner {
    /// Persist `edit`, then apply it
    fn log_and_apply(&mut self, edit: TransactionEdit) -> Result<()> {
        if let Err(e) = self.storage.append(&edit) {
            tracing::error!(
                target: "txcoord::txn",
                edit = edit.name(),
                write_pointer = edit.write_pointer(),
                storage = self.storage.name(),
                error = %e,
                "Failed to persist state edit"
            );
            return Err(e);
        }
        let applied = self.state.apply(&edit);
        debug_assert!(applied, "validated edit {:?} did not apply", edit);
        Ok(())
    }
}

/// Allocates pointers, tracks in-progress transactions and decides commits
///
/// Thread-safe: share it behind an `Arc`. Every operation takes the internal
/// lock for its whole duration, so concurrent `can_commit` calls with
/// overlapping change sets are serialized and exactly one of them wins.
pub struct TransactionManager {
    inner: Mutex<ManagerInner>,
    clock: Arc<dyn Clock>,
    options: TransactionOptions,
}

impl TransactionManager {
    /// Manager with empty state, no persistence and the system clock
    pub fn in_memory(options: TransactionOptions) -> Self {
        Self::with_state(
            TransactionState::new(),
            Box::new(InMemoryStateStorage::new()),
            Arc::new(SystemClock),
            options,
        )
    }

    /// Recover state from `storage` and build a manager on top of it
    ///
    /// Loads the latest checkpoint, replays the edits logged after it and
    /// prunes the ledger. Empty storage yields empty state.
    pub fn open(
        mut storage: Box<dyn TransactionStateStorage>,
        clock: Arc<dyn Clock>,
        options: TransactionOptions,
    ) -> Result<Self> {
        let recovered = storage.recover()?;
        let (state, stats) = crate::recovery::replay(recovered);
        info!(
            target: "txcoord::txn",
            storage = storage.name(),
            from_snapshot = stats.from_snapshot,
            edits_applied = stats.edits_applied,
            edits_skipped = stats.edits_skipped,
            last_pointer = state.last_pointer(),
            "Recovered transaction state"
        );
        Ok(Self::with_state(state, storage, clock, options))
    }

    fn with_state(
        state: TransactionState,
        storage: Box<dyn TransactionStateStorage>,
        clock: Arc<dyn Clock>,
        options: TransactionOptions,
    ) -> Self {
        Self {
            inner: Mutex::new(ManagerInner { state, storage }),
            clock,
            options,
        }
    }

    /// Settings in effect
    pub fn options(&self) -> TransactionOptions {
        self.options
    }

    /// Clock used for expiration deadlines
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ========================================================================
    // Start
    // ========================================================================

    /// Start a SHORT transaction with the default timeout
    pub fn start_short(&self) -> Result<Transaction> {
        self.start(TransactionKind::Short, Some(self.options.short_timeout))
    }

    /// Start a SHORT transaction that expires after `timeout`
    pub fn start_short_with_timeout(&self, timeout: Duration) -> Result<Transaction> {
        if timeout.is_zero() {
            return Err(Error::InvalidOperation(
                "short transaction timeout must be positive".to_string(),
            ));
        }
        self.start(TransactionKind::Short, Some(timeout))
    }

    /// Start a LONG transaction. LONG transactions never expire.
    pub fn start_long(&self) -> Result<Transaction> {
        self.start(TransactionKind::Long, None)
    }

    fn start(&self, kind: TransactionKind, timeout: Option<Duration>) -> Result<Transaction> {
        let mut inner = self.inner.lock();
        let write_pointer = inner.state.allocate()?;
        let now = self.clock.now();
        let expiration = timeout.map_or(Timestamp::MAX, |t| now.saturating_add(t));
        let tx = inner.state.begin(write_pointer, kind);

        inner.log_and_apply(TransactionEdit::Started {
            write_pointer,
            entry: InProgressEntry {
                kind,
                expiration,
                read_pointer: tx.read_pointer(),
            },
        })?;

        debug!(
            target: "txcoord::txn",
            write_pointer,
            kind = %kind,
            %expiration,
            excluded = tx.invalid().len() + tx.in_progress().len(),
            "Transaction started"
        );
        Ok(tx)
    }

    // ========================================================================
    // Commit protocol
    // ========================================================================

    /// Check `changes` for write-write conflicts and register them
    ///
    /// Returns `Ok(false)` if a change set `tx` cannot see (committed after
    /// `tx` started, or registered by a transaction that was in progress when
    /// `tx` started) wrote one of the same keys; the client must then abort.
    /// On `Ok(true)` the change set is registered under a fresh commit pointer
    /// so that every transaction still in progress will see it in its own
    /// check.
    pub fn can_commit(&self, tx: &Transaction, changes: ChangeSet) -> Result<bool> {
        let mut inner = self.inner.lock();
        let write_pointer = tx.write_pointer();
        if !inner.state.is_in_progress(write_pointer) {
            return Err(Error::TransactionNotInProgress(write_pointer));
        }

        match inner.state.check_conflicts(tx, &changes) {
            ConflictResult::WriteWriteConflict {
                commit_pointer,
                key,
            } => {
                info!(
                    target: "txcoord::txn",
                    write_pointer,
                    conflicting_commit = commit_pointer,
                    key_len = key.len(),
                    "Write-write conflict detected"
                );
                Ok(false)
            }
            ConflictResult::NoConflict if changes.is_empty() => Ok(true),
            ConflictResult::NoConflict => {
                let commit_pointer = inner.state.allocate()?;
                let keys = changes.len();
                inner.log_and_apply(TransactionEdit::ChangesRegistered {
                    write_pointer,
                    commit_pointer,
                    changes,
                })?;
                debug!(
                    target: "txcoord::txn",
                    write_pointer,
                    commit_pointer,
                    keys,
                    "Change set registered"
                );
                Ok(true)
            }
        }
    }

    /// Mark `tx` committed and prune the ledger
    ///
    /// Change sets `tx` registered move to a fresh commit pointer, above the
    /// read pointer of every transaction that started before this commit.
    /// Always returns `Ok(true)` for an in-progress transaction; conflicts
    /// are decided by [`can_commit`](Self::can_commit).
    pub fn commit(&self, tx: &Transaction) -> Result<bool> {
        let mut inner = self.inner.lock();
        let write_pointer = tx.write_pointer();
        if !inner.state.is_in_progress(write_pointer) {
            return Err(Error::TransactionNotInProgress(write_pointer));
        }
        let commit_pointer = if inner.state.has_registered(write_pointer) {
            Some(inner.state.allocate()?)
        } else {
            None
        };
        inner.log_and_apply(TransactionEdit::Committed {
            write_pointer,
            commit_pointer,
        })?;
        let pruned = inner.state.prune();
        debug!(
            target: "txcoord::txn",
            write_pointer,
            ?commit_pointer,
            pruned,
            "Transaction committed"
        );
        Ok(true)
    }

    /// Abort `tx`
    ///
    /// A SHORT transaction is forgotten; its writes must already have been
    /// rolled back by the client. A LONG transaction is moved to the invalid
    /// set so readers skip its data. Aborting a pointer that is already
    /// invalid clears the mark, which the client does once cleanup is done.
    pub fn abort(&self, tx: &Transaction) -> Result<()> {
        self.abort_pointer(tx.write_pointer())
    }

    /// [`abort`](Self::abort) by write pointer
    pub fn abort_pointer(&self, write_pointer: WritePointer) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.state.is_in_progress(write_pointer) && !inner.state.is_invalid(write_pointer) {
            return Err(Error::TransactionNotInProgress(write_pointer));
        }
        inner.log_and_apply(TransactionEdit::Aborted { write_pointer })?;
        debug!(
            target: "txcoord::txn",
            write_pointer,
            invalid = inner.state.is_invalid(write_pointer),
            "Transaction aborted"
        );
        Ok(())
    }

    /// Move an in-progress transaction to the invalid set
    ///
    /// Returns false if `write_pointer` is not in progress.
    pub fn invalidate(&self, write_pointer: WritePointer) -> Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.state.is_in_progress(write_pointer) {
            return Ok(false);
        }
        inner.log_and_apply(TransactionEdit::Invalidated { write_pointer })?;
        info!(target: "txcoord::txn", write_pointer, "Transaction invalidated");
        Ok(true)
    }

    // ========================================================================
    // Reclamation
    // ========================================================================

    /// Expire timed-out SHORT transactions and prune the ledger, using the
    /// manager's clock
    pub fn reclaim(&self) -> Result<ReclaimStats> {
        self.reclaim_at(self.clock.now())
    }

    /// Expire every SHORT transaction whose deadline is at or before `now`
    /// and prune the ledger
    ///
    /// The pruning pass runs against the registry as it was before this
    /// tick's expirations, so expiring a transaction never shrinks the
    /// ledger by itself; the next commit or tick accounts for it.
    pub fn reclaim_at(&self, now: Timestamp) -> Result<ReclaimStats> {
        let mut inner = self.inner.lock();
        let pruned = inner.state.prune();
        let expired = inner.state.expired(now);
        for write_pointer in &expired {
            inner.log_and_apply(TransactionEdit::Invalidated {
                write_pointer: *write_pointer,
            })?;
            warn!(
                target: "txcoord::reclaim",
                write_pointer = *write_pointer,
                "Short transaction timed out, marked invalid"
            );
        }
        let stats = ReclaimStats {
            expired: expired.len(),
            pruned,
        };
        debug!(
            target: "txcoord::reclaim",
            expired = stats.expired,
            pruned = stats.pruned,
            counts = ?inner.state.counts(),
            "Reclamation pass finished"
        );
        Ok(stats)
    }

    /// Prune the ledger without expiring anything
    pub fn prune(&self) -> usize {
        self.inner.lock().state.prune()
    }

    // ========================================================================
    // Durability
    // ========================================================================

    /// Write a full snapshot to storage, compacting the edit log
    pub fn checkpoint(&self) -> Result<StateCounts> {
        let mut inner = self.inner.lock();
        let snapshot = inner.state.to_snapshot(self.clock.now());
        inner.storage.write_snapshot(&snapshot)?;
        let counts = snapshot.counts();
        info!(
            target: "txcoord::txn",
            storage = inner.storage.name(),
            last_pointer = snapshot.last_pointer,
            in_progress = counts.in_progress,
            committed = counts.committed,
            invalid = counts.invalid,
            "Checkpoint written"
        );
        Ok(counts)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Consistent copy of the whole state
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        self.inner.lock().state.to_snapshot(self.clock.now())
    }

    /// Sizes of the three collections, read atomically
    pub fn counts(&self) -> StateCounts {
        self.inner.lock().state.counts()
    }

    /// Number of in-progress transactions
    pub fn in_progress_count(&self) -> usize {
        self.counts().in_progress
    }

    /// Number of change sets retained for conflict detection
    pub fn committed_count(&self) -> usize {
        self.counts().committed
    }

    /// Number of invalid pointers
    pub fn invalid_count(&self) -> usize {
        self.counts().invalid
    }

    /// Pointers a transaction started now would exclude
    pub fn excluded_count(&self) -> usize {
        self.counts().excluded()
    }

    /// Highest pointer allocated so far
    pub fn last_pointer(&self) -> WritePointer {
        self.inner.lock().state.last_pointer()
    }

    /// Whether `write_pointer` is in progress
    pub fn is_in_progress(&self, write_pointer: WritePointer) -> bool {
        self.inner.lock().state.is_in_progress(write_pointer)
    }

    /// Whether `write_pointer` is invalid
    pub fn is_invalid(&self, write_pointer: WritePointer) -> bool {
        self.inner.lock().state.is_invalid(write_pointer)
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("counts", &self.counts())
            .field("options", &self.options)
            .finish()
    }
}
