//! Core types for the transaction coordinator
//!
//! This crate defines the foundational types used throughout the system:
//! - WritePointer: monotonic transaction identity / cell version
//! - TransactionKind: SHORT vs LONG
//! - ChangeSet: row keys written by a transaction
//! - Transaction: immutable snapshot with local visibility checks
//! - InProgressEntry, RegisteredChanges, CoordinatorSnapshot, StateCounts: coordinator state
//! - Timestamp, Clock: deadline arithmetic and time sources
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod state;
pub mod timestamp;
pub mod transaction;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use state::{CoordinatorSnapshot, InProgressEntry, RegisteredChanges, StateCounts};
pub use timestamp::Timestamp;
pub use transaction::Transaction;
pub use types::{ChangeSet, TransactionKind, WritePointer};
