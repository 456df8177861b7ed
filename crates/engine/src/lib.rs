//! Coordinator service for txcoord
//!
//! This crate wires the lower layers into a running service:
//! - CoordinatorConfig: `txcoord.toml` plus environment overrides
//! - TransactionCoordinator: storage selection, recovery, metrics
//! - PeriodicTask: the reclamation and checkpoint threads
//!
//! The engine is the only component that knows about background threads
//! and configuration files.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod config;
pub mod coordinator;

pub use background::PeriodicTask;
pub use config::{CoordinatorConfig, CONFIG_FILE_NAME};
pub use coordinator::{
    TransactionCoordinator, TransactionMetrics, CHECKPOINT_THREAD_NAME, RECLAIM_THREAD_NAME,
};
