//! Periodic background tasks
//!
//! A [`PeriodicTask`] owns one named thread that calls a tick closure on a
//! fixed interval until stopped. The coordinator runs two of them: the
//! reclamation task and the checkpoint task.
//!
//! - The first tick happens one interval after spawn, not immediately
//! - `stop()` wakes the thread at once instead of waiting out the interval
//! - A tick that returns an error or panics is logged and the task keeps
//!   running, unless the error is fatal (`Error::is_fatal`): then the task
//!   stops after that tick

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error};
use txcoord_core::Result;

struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleep until `interval` passes or stop is requested. Returns true if
    /// stopped.
    fn wait(&self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn stop(&self) {
        let mut stopped = self.stopped.lock();
        *stopped = true;
        self.wake.notify_all();
    }
}

/// A background thread running a closure every `interval`
pub struct PeriodicTask {
    name: String,
    signal: Arc<StopSignal>,
    ticks: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a thread named `name` that calls `tick` every `interval`
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to create the thread.
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let name = name.into();
        let signal = Arc::new(StopSignal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let ticks = Arc::new(AtomicU64::new(0));

        let thread_signal = Arc::clone(&signal);
        let thread_ticks = Arc::clone(&ticks);
        let task_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(target: "txcoord::reclaim", task = %task_name, ?interval, "Background task started");
                while !thread_signal.wait(interval) {
                    let fatal = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(&mut tick)) {
                        Ok(Ok(())) => false,
                        Ok(Err(e)) if e.is_fatal() => {
                            error!(target: "txcoord::reclaim", task = %task_name, error = %e, "Background tick failed fatally, stopping");
                            true
                        }
                        Ok(Err(e)) => {
                            error!(target: "txcoord::reclaim", task = %task_name, error = %e, "Background tick failed");
                            false
                        }
                        Err(panic) => {
                            error!(
                                target: "txcoord::reclaim",
                                task = %task_name,
                                "Background tick panicked: {}",
                                panic
                                    .downcast_ref::<&str>()
                                    .copied()
                                    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                                    .unwrap_or("(non-string panic)")
                            );
                            false
                        }
                    };
                    thread_ticks.fetch_add(1, Ordering::Relaxed);
                    if fatal {
                        break;
                    }
                }
                debug!(target: "txcoord::reclaim", task = %task_name, "Background task stopped");
            })?;

        Ok(Self {
            name,
            signal,
            ticks,
            handle: Some(handle),
        })
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of ticks run so far, including failed ones
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Whether the thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to exit. Idempotent.
    ///
    /// A tick already in progress finishes first.
    pub fn stop(&mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(target: "txcoord::reclaim", task = %self.name, "Background thread panicked");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("ticks", &self.ticks())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use txcoord_core::Error;

    #[test]
    fn test_ticks_repeatedly() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let mut task = PeriodicTask::spawn("test-tick", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        task.stop();
        assert!(counter.load(Ordering::Relaxed) >= 2);
        assert_eq!(task.ticks() as usize, counter.load(Ordering::Relaxed));
        assert!(!task.is_running());
    }

    #[test]
    fn test_stop_is_prompt() {
        let mut task =
            PeriodicTask::spawn("test-slow", Duration::from_secs(3600), || Ok(())).unwrap();
        let started = Instant::now();
        task.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(task.ticks(), 0);

        // second stop is a no-op
        task.stop();
    }

    #[test]
    fn test_survives_errors_and_panics() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let mut task = PeriodicTask::spawn("test-faulty", Duration::from_millis(5), move || {
            match c.fetch_add(1, Ordering::Relaxed) {
                0 => panic!("first tick blows up"),
                1 => Err(Error::InvalidOperation("second tick fails".to_string())),
                _ => Ok(()),
            }
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert!(task.is_running());
        task.stop();
        assert!(counter.load(Ordering::Relaxed) >= 3);
    }

    #[test]
    fn test_fatal_error_stops_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let mut task = PeriodicTask::spawn("test-fatal", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::Relaxed);
            Err(Error::PointerExhausted)
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while task.is_running() {
            assert!(Instant::now() < deadline, "task kept running after a fatal error");
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert_eq!(task.ticks(), 1);
        task.stop();
    }

    #[test]
    fn test_drop_stops_thread() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let task = PeriodicTask::spawn("test-drop", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(task.name(), "test-drop");
        drop(task);

        let after_drop = counter.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::Relaxed), after_drop);
    }
}
