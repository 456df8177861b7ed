//! Transaction coordinator service
//!
//! The TransactionCoordinator wraps TransactionManager and adds:
//! - Storage selection and recovery from [`CoordinatorConfig`]
//! - The reclamation and checkpoint background tasks
//! - Transaction metrics (started, committed, aborted, conflicts, expired)
//! - Orderly shutdown with a final checkpoint

use crate::background::PeriodicTask;
use crate::config::CoordinatorConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use txcoord_concurrency::{ReclaimStats, TransactionManager};
use txcoord_core::{
    ChangeSet, Clock, CoordinatorSnapshot, Result, StateCounts, SystemClock, Timestamp,
    Transaction, WritePointer,
};
use txcoord_durability::{FileStateStorage, InMemoryStateStorage, TransactionStateStorage};

/// Thread name of the reclamation task
pub const RECLAIM_THREAD_NAME: &str = "txcoord-reclaim";
/// Thread name of the checkpoint task
pub const CHECKPOINT_THREAD_NAME: &str = "txcoord-checkpoint";

/// Transaction coordinator
///
/// Share it behind an `Arc`; every method takes `&self`.
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering. They are observational only
/// and do not synchronize anything else.
pub struct TransactionCoordinator {
    manager: Arc<TransactionManager>,
    config: CoordinatorConfig,
    metrics: Arc<MetricCounters>,
    tasks: Mutex<Vec<PeriodicTask>>,
    persistent: bool,
}

#[derive(Debug, Default)]
struct MetricCounters {
    started: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicts: AtomicU64,
    expired: AtomicU64,
    reclaim_runs: AtomicU64,
}

impl TransactionCoordinator {
    /// Build a coordinator from `config`
    ///
    /// `TXCOORD_*` environment variables override the matching fields first.
    /// Uses file-backed storage under `data_dir` when set, recovering any
    /// state found there, and in-memory storage otherwise. Background tasks
    /// are not started; call [`start_background`](Self::start_background).
    pub fn open(config: CoordinatorConfig) -> Result<Self> {
        let mut config = config;
        config.apply_env_overrides()?;
        config.validate()?;
        let storage: Box<dyn TransactionStateStorage> = match &config.data_dir {
            Some(dir) => Box::new(FileStateStorage::open(dir)?),
            None => Box::new(InMemoryStateStorage::new()),
        };
        let persistent = config.data_dir.is_some();
        let mut coordinator = Self::with_storage(config, storage, Arc::new(SystemClock))?;
        coordinator.persistent = persistent;
        Ok(coordinator)
    }

    /// Build a coordinator over explicit storage and clock
    ///
    /// The storage is treated as persistent: checkpoints are written to it.
    pub fn with_storage(
        config: CoordinatorConfig,
        storage: Box<dyn TransactionStateStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let manager = TransactionManager::open(storage, clock, config.transaction_options())?;
        info!(
            target: "txcoord::txn",
            last_pointer = manager.last_pointer(),
            counts = ?manager.counts(),
            reclamation_interval_ms = config.reclamation_interval_ms,
            short_timeout_ms = config.short_timeout_ms,
            "Transaction coordinator opened"
        );
        Ok(Self {
            manager: Arc::new(manager),
            config,
            metrics: Arc::new(MetricCounters::default()),
            tasks: Mutex::new(Vec::new()),
            persistent: true,
        })
    }

    /// Start the reclamation task, and the checkpoint task when state is
    /// persisted. Intervals of 0 leave the respective task off. Calling this
    /// again while tasks are running does nothing.
    pub fn start_background(&self) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return Ok(());
        }

        if let Some(interval) = self.config.reclamation_interval() {
            let manager = Arc::clone(&self.manager);
            let metrics = Arc::clone(&self.metrics);
            tasks.push(PeriodicTask::spawn(RECLAIM_THREAD_NAME, interval, move || {
                let stats = manager.reclaim()?;
                metrics.record_reclaim(stats);
                Ok(())
            })?);
        }

        if let Some(interval) = self.config.checkpoint_interval().filter(|_| self.persistent) {
            let manager = Arc::clone(&self.manager);
            tasks.push(PeriodicTask::spawn(CHECKPOINT_THREAD_NAME, interval, move || {
                manager.checkpoint().map(|_| ())
            })?);
        }

        info!(target: "txcoord::reclaim", tasks = tasks.len(), "Background tasks started");
        Ok(())
    }

    /// Number of background tasks running
    pub fn background_task_count(&self) -> usize {
        self.tasks.lock().iter().filter(|t| t.is_running()).count()
    }

    /// Stop background tasks and write a final checkpoint
    ///
    /// Safe to call more than once. The coordinator stays usable afterwards,
    /// without background reclamation.
    pub fn shutdown(&self) -> Result<()> {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks.iter_mut() {
            task.stop();
        }
        if self.persistent {
            self.manager.checkpoint()?;
        }
        let metrics = self.metrics();
        info!(
            target: "txcoord::txn",
            completed = metrics.total_completed(),
            commit_rate = metrics.commit_rate(),
            conflict_rate = metrics.conflict_rate(),
            expired = metrics.total_expired,
            "Transaction coordinator shut down"
        );
        Ok(())
    }

    // ========================================================================
    // Client operations
    // ========================================================================

    /// Start a SHORT transaction with the configured timeout
    pub fn start_short(&self) -> Result<Transaction> {
        let tx = self.manager.start_short()?;
        self.metrics.started.fetch_add(1, Ordering::Relaxed);
        Ok(tx)
    }

    /// Start a SHORT transaction with an explicit timeout
    pub fn start_short_with_timeout(&self, timeout: Duration) -> Result<Transaction> {
        let tx = self.manager.start_short_with_timeout(timeout)?;
        self.metrics.started.fetch_add(1, Ordering::Relaxed);
        Ok(tx)
    }

    /// Start a LONG transaction
    pub fn start_long(&self) -> Result<Transaction> {
        let tx = self.manager.start_long()?;
        self.metrics.started.fetch_add(1, Ordering::Relaxed);
        Ok(tx)
    }

    /// Conflict-check and register `changes`; false means the client must abort
    pub fn can_commit(&self, tx: &Transaction, changes: ChangeSet) -> Result<bool> {
        let ok = self.manager.can_commit(tx, changes)?;
        if !ok {
            self.metrics.conflicts.fetch_add(1, Ordering::Relaxed);
        }
        Ok(ok)
    }

    /// Finalize `tx`
    pub fn commit(&self, tx: &Transaction) -> Result<bool> {
        let ok = self.manager.commit(tx)?;
        self.metrics.committed.fetch_add(1, Ordering::Relaxed);
        Ok(ok)
    }

    /// Abort `tx`
    pub fn abort(&self, tx: &Transaction) -> Result<()> {
        self.manager.abort(tx)?;
        self.metrics.aborted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Move an in-progress transaction to the invalid set
    pub fn invalidate(&self, write_pointer: WritePointer) -> Result<bool> {
        self.manager.invalidate(write_pointer)
    }

    /// Run one reclamation pass now, using the manager's clock
    pub fn reclaim(&self) -> Result<ReclaimStats> {
        let stats = self.manager.reclaim()?;
        self.metrics.record_reclaim(stats);
        Ok(stats)
    }

    /// Run one reclamation pass as if the time were `now`
    pub fn reclaim_at(&self, now: Timestamp) -> Result<ReclaimStats> {
        let stats = self.manager.reclaim_at(now)?;
        self.metrics.record_reclaim(stats);
        Ok(stats)
    }

    /// Write a checkpoint now
    pub fn checkpoint(&self) -> Result<StateCounts> {
        if !self.persistent {
            warn!(target: "txcoord::durability", "Checkpoint requested without data_dir; state is in memory only");
        }
        self.manager.checkpoint()
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Underlying manager
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Configuration in effect
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        self.manager.snapshot()
    }

    /// Collection sizes
    pub fn counts(&self) -> StateCounts {
        self.manager.counts()
    }

    /// Number of in-progress transactions
    pub fn in_progress_count(&self) -> usize {
        self.manager.in_progress_count()
    }

    /// Number of retained committed change sets
    pub fn committed_count(&self) -> usize {
        self.manager.committed_count()
    }

    /// Number of invalid pointers
    pub fn invalid_count(&self) -> usize {
        self.manager.invalid_count()
    }

    /// Size of the exclusion list a new transaction would get
    pub fn excluded_count(&self) -> usize {
        self.manager.excluded_count()
    }

    /// Highest pointer allocated so far
    pub fn last_pointer(&self) -> WritePointer {
        self.manager.last_pointer()
    }

    /// Get transaction metrics
    pub fn metrics(&self) -> TransactionMetrics {
        let m = &self.metrics;
        TransactionMetrics {
            total_started: m.started.load(Ordering::Relaxed),
            total_committed: m.committed.load(Ordering::Relaxed),
            total_aborted: m.aborted.load(Ordering::Relaxed),
            total_conflicts: m.conflicts.load(Ordering::Relaxed),
            total_expired: m.expired.load(Ordering::Relaxed),
            reclaim_runs: m.reclaim_runs.load(Ordering::Relaxed),
        }
    }
}

impl MetricCounters {
    fn record_reclaim(&self, stats: ReclaimStats) {
        self.reclaim_runs.fetch_add(1, Ordering::Relaxed);
        self.expired
            .fetch_add(stats.expired as u64, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("manager", &self.manager)
            .field("config", &self.config)
            .field("metrics", &self.metrics())
            .finish()
    }
}

/// Transaction metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionMetrics {
    /// Transactions started
    pub total_started: u64,
    /// Transactions committed
    pub total_committed: u64,
    /// Transactions aborted by the client
    pub total_aborted: u64,
    /// can_commit calls that found a conflict
    pub total_conflicts: u64,
    /// SHORT transactions invalidated by reclamation
    pub total_expired: u64,
    /// Reclamation passes run
    pub reclaim_runs: u64,
}

impl TransactionMetrics {
    /// Total transactions that completed (committed + aborted)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// Commit rate (committed / started)
    pub fn commit_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_committed as f64 / self.total_started as f64
        } else {
            0.0
        }
    }

    /// Conflict rate (conflicts / started)
    pub fn conflict_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_conflicts as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use txcoord_core::ManualClock;

    fn changes(keys: &[&[u8]]) -> ChangeSet {
        keys.iter().copied().collect()
    }

    #[test]
    fn test_metrics_track_operations() {
        let coordinator = TransactionCoordinator::open(CoordinatorConfig::for_testing()).unwrap();
        let tx1 = coordinator.start_short().unwrap();
        let tx2 = coordinator.start_short().unwrap();
        assert!(coordinator.can_commit(&tx1, changes(&[b"k"])).unwrap());
        coordinator.commit(&tx1).unwrap();
        assert!(!coordinator.can_commit(&tx2, changes(&[b"k"])).unwrap());
        coordinator.abort(&tx2).unwrap();

        let metrics = coordinator.metrics();
        assert_eq!(metrics.total_started, 2);
        assert_eq!(metrics.total_committed, 1);
        assert_eq!(metrics.total_aborted, 1);
        assert_eq!(metrics.total_conflicts, 1);
        assert_eq!(metrics.total_completed(), 2);
        assert!((metrics.commit_rate() - 0.5).abs() < f64::EPSILON);
        assert!((metrics.conflict_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_operations_not_counted() {
        let coordinator = TransactionCoordinator::open(CoordinatorConfig::for_testing()).unwrap();
        let tx = coordinator.start_short().unwrap();
        coordinator.commit(&tx).unwrap();
        assert!(coordinator.commit(&tx).is_err());
        assert!(coordinator.abort(&tx).is_err());
        assert_eq!(coordinator.metrics().total_committed, 1);
        assert_eq!(coordinator.metrics().total_aborted, 0);
    }

    #[test]
    fn test_reclaim_at_counts_expired() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(100)));
        let coordinator = TransactionCoordinator::with_storage(
            CoordinatorConfig::for_testing(),
            Box::new(InMemoryStateStorage::new()),
            clock,
        )
        .unwrap();
        let tx = coordinator
            .start_short_with_timeout(Duration::from_secs(1))
            .unwrap();
        let stats = coordinator.reclaim_at(Timestamp::from_secs(101)).unwrap();
        assert_eq!(stats.expired, 1);
        assert_eq!(coordinator.metrics().total_expired, 1);
        assert_eq!(coordinator.metrics().reclaim_runs, 1);
        assert!(coordinator.manager().is_invalid(tx.write_pointer()));
    }

    #[test]
    fn test_no_background_tasks_when_disabled() {
        let coordinator = TransactionCoordinator::open(CoordinatorConfig::for_testing()).unwrap();
        coordinator.start_background().unwrap();
        assert_eq!(coordinator.background_task_count(), 0);
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_checkpoint_task_needs_data_dir() {
        let config = CoordinatorConfig {
            reclamation_interval_ms: 1_000,
            checkpoint_interval_ms: 1_000,
            ..CoordinatorConfig::default()
        };
        let coordinator = TransactionCoordinator::open(config).unwrap();
        coordinator.start_background().unwrap();
        assert_eq!(coordinator.background_task_count(), 1);

        // starting twice does not add tasks
        coordinator.start_background().unwrap();
        assert_eq!(coordinator.background_task_count(), 1);
        coordinator.shutdown().unwrap();
        assert_eq!(coordinator.background_task_count(), 0);
    }

    #[test]
    fn test_shutdown_checkpoint_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = CoordinatorConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..CoordinatorConfig::for_testing()
        };

        let long = {
            let coordinator = TransactionCoordinator::open(config.clone()).unwrap();
            coordinator.start_background().unwrap();
            let long = coordinator.start_long().unwrap();
            let short = coordinator.start_short().unwrap();
            coordinator.commit(&short).unwrap();
            coordinator.shutdown().unwrap();
            long
        };

        let coordinator = TransactionCoordinator::open(config).unwrap();
        assert_eq!(coordinator.in_progress_count(), 1);
        assert!(coordinator.manager().is_in_progress(long.write_pointer()));
        assert_eq!(coordinator.last_pointer(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CoordinatorConfig {
            short_timeout_ms: 0,
            ..CoordinatorConfig::for_testing()
        };
        assert!(TransactionCoordinator::open(config).is_err());
    }
}
