//! Keeps cached sudo credentials fresh during long mutating runs.
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context as _, Result};

use crate::exec::Executor;

/// How often `sudo -n -v` is re-run.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Validate sudo credentials up front, prompting once if needed.
///
/// # Errors
///
/// Returns an error if `sudo -v` fails.
pub fn prime(executor: &dyn Executor) -> Result<()> {
    executor
        .run("sudo", &["-v"])
        .context("cannot obtain sudo credentials")?;
    Ok(())
}

#[derive(Debug, Default)]
struct StopFlag {
    stopped: Mutex<bool>,
    cond: Condvar,
}

/// Background thread running `sudo -n -v` every [`REFRESH_INTERVAL`].
#[derive(Debug)]
pub struct CredentialRefresher {
    flag: Arc<StopFlag>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CredentialRefresher {
    /// Start refreshing with the default interval.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(executor: Arc<dyn Executor>) -> Result<Self> {
        Self::with_interval(executor, REFRESH_INTERVAL)
    }

    /// Start refreshing every `interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn with_interval(executor: Arc<dyn Executor>, interval: Duration) -> Result<Self> {
        let flag = Arc::new(StopFlag::default());
        let thread_flag = Arc::clone(&flag);
        let handle = std::thread::Builder::new()
            .name("sudo-refresh".to_string())
            .spawn(move || refresh_loop(&*executor, &thread_flag, interval))
            .context("spawning sudo refresh thread")?;
        Ok(Self {
            flag,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop the thread and wait for it. Safe to call more than once.
    pub fn stop(&self) {
        *self
            .flag
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        self.flag.cond.notify_all();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::warn!("sudo refresh thread panicked");
        }
    }
}

impl Drop for CredentialRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn refresh_loop(executor: &dyn Executor, flag: &StopFlag, interval: Duration) {
    let mut stopped = flag.stopped.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        let (guard, timeout) = flag
            .cond
            .wait_timeout_while(stopped, interval, |s| !*s)
            .unwrap_or_else(PoisonError::into_inner);
        stopped = guard;
        if *stopped || !timeout.timed_out() {
            return;
        }
        match executor.run_unchecked("sudo", &["-n", "-v"]) {
            Ok(result) if result.success => tracing::debug!("sudo credentials refreshed"),
            Ok(result) => tracing::warn!(
                "sudo credential refresh failed: {}",
                result.stderr.trim()
            ),
            Err(e) => tracing::warn!("sudo credential refresh failed: {e:#}"),
        }
    }
}
