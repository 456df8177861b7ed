//! Durability layer for the transaction coordinator
//!
//! This crate handles everything that touches disk:
//!
//! - TransactionEdit: write-ahead record of every state mutation
//! - TransactionStateStorage: the persistence collaborator interface
//! - InMemoryStateStorage: non-durable implementation for tests and embedding
//! - FileStateStorage: edit log + crash-safe snapshot in a local directory
//! - Binary on-disk formats (length-prefixed, CRC32-checked records)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod edit;
pub mod file;
pub mod memory;
pub mod record;
pub mod storage;

pub use edit::TransactionEdit;
pub use file::FileStateStorage;
pub use memory::InMemoryStateStorage;
pub use storage::{RecoveredState, TransactionStateStorage};
