//! txcoord - Centralized transaction coordinator with snapshot isolation
//!
//! txcoord hands out globally ordered write pointers, tracks which
//! transactions are in progress, committed or invalid, and decides whether a
//! transaction may commit by checking its change set against everything
//! committed since it started (first-committer-wins).
//!
//! # Quick Start
//!
//! ```no_run
//! use txcoord::{ChangeSet, CoordinatorConfig, TransactionCoordinator};
//!
//! # fn main() -> txcoord::Result<()> {
//! let coordinator = TransactionCoordinator::open(CoordinatorConfig::default())?;
//! coordinator.start_background()?;
//!
//! let tx = coordinator.start_short()?;
//! // ... write cells stamped with tx.write_pointer(), read only versions
//! // for which tx.is_visible(version) holds ...
//! let changes: ChangeSet = [b"row-1".as_slice()].into_iter().collect();
//! if coordinator.can_commit(&tx, changes)? {
//!     coordinator.commit(&tx)?;
//! } else {
//!     // roll back own writes, then
//!     coordinator.abort(&tx)?;
//! }
//!
//! coordinator.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `txcoord-core`: value types ([`Transaction`], [`ChangeSet`], [`Timestamp`]) and errors
//! - `txcoord-durability`: edit log and snapshots
//! - `txcoord-concurrency`: [`TransactionManager`], the state machine
//! - `txcoord-engine`: [`TransactionCoordinator`], config and background tasks

pub use txcoord_concurrency::{ReclaimStats, TransactionManager, TransactionOptions};
pub use txcoord_core::{
    ChangeSet, Clock, CoordinatorSnapshot, Error, InProgressEntry, ManualClock, Result,
    StateCounts, SystemClock, Timestamp, Transaction, TransactionKind, WritePointer,
};
pub use txcoord_durability::{
    FileStateStorage, InMemoryStateStorage, TransactionEdit, TransactionStateStorage,
};
pub use txcoord_engine::{CoordinatorConfig, PeriodicTask, TransactionCoordinator, TransactionMetrics};
