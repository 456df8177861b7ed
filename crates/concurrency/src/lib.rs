//! Transaction coordination for txcoord
//!
//! This crate implements the coordinator's concurrency control:
//! - PointerAllocator: unique, monotonic write and commit pointers
//! - InProgressRegistry / CommittedLedger / InvalidSet: coordinator state
//! - Conflict detection at commit time (first-committer-wins)
//! - TransactionManager: start, can_commit, commit, abort, reclamation
//! - Recovery by replaying persisted edits
//!
//! Visibility is decided by clients from the [`Transaction`] snapshot they
//! received at start; the manager never sees reads.
//!
//! [`Transaction`]: txcoord_core::Transaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod conflict;
pub mod invalid;
pub mod ledger;
pub mod manager;
pub mod recovery;
pub mod registry;
pub mod state;

pub use allocator::PointerAllocator;
pub use conflict::{detect_conflict, ConflictResult};
pub use invalid::InvalidSet;
pub use ledger::CommittedLedger;
pub use manager::{ReclaimStats, TransactionManager, TransactionOptions, DEFAULT_SHORT_TIMEOUT};
pub use recovery::{replay, ReplayStats};
pub use registry::InProgressRegistry;
pub use state::TransactionState;
