//! Cross-process exclusion for mutating runs.
//!
//! The lock is a marker directory: `mkdir` either creates it or fails, which
//! makes creation the exclusion primitive. The holder records its pid in
//! `<marker>/pid` so a later run can tell a live owner from a crashed one.
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::error::LockError;

/// Directory holding the marker on a live system.
pub const DEFAULT_LOCK_DIR: &str = "/run/lock";

/// Marker directory name.
pub const MARKER_NAME: &str = "syscfg.lock";

const PID_FILE: &str = "pid";

/// How long a marker without a readable pid counts as being set up by
/// another run rather than left behind by a crash.
pub const PID_GRACE: Duration = Duration::from_secs(5);

/// Process liveness queries, injectable for tests.
#[cfg_attr(test, mockall::automock)]
pub trait PidProbe: Send + Sync {
    /// Whether a process with `pid` exists.
    fn is_alive(&self, pid: u32) -> bool;

    /// Pid of the calling process.
    fn current(&self) -> u32;
}

/// [`PidProbe`] backed by `kill(pid, 0)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalProbe;

impl PidProbe for SignalProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        // EPERM: the process exists but belongs to someone else.
        matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
    }

    fn current(&self) -> u32 {
        std::process::id()
    }
}

/// Acquires the marker at a fixed location.
pub struct LockManager {
    marker: PathBuf,
    probe: Box<dyn PidProbe>,
    grace: Duration,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("marker", &self.marker)
            .field("probe", &"<dyn PidProbe>")
            .field("grace", &self.grace)
            .finish()
    }
}

impl LockManager {
    /// A manager for `<dir>/syscfg.lock` using real process probing.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self::with_probe(dir, Box::new(SignalProbe))
    }

    /// A manager with an explicit liveness probe.
    #[must_use]
    pub fn with_probe(dir: &Path, probe: Box<dyn PidProbe>) -> Self {
        Self {
            marker: dir.join(MARKER_NAME),
            probe,
            grace: PID_GRACE,
        }
    }

    /// Replace the grace period for markers without a pid.
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// The marker directory path.
    #[must_use]
    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Take the lock.
    ///
    /// A marker left by a dead process is removed and creation is retried
    /// once. A marker without a readable pid is only reclaimed once it is
    /// older than the grace period; until then its creator may still be
    /// writing the pid.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Busy`] if a live process holds the lock,
    /// [`LockError::Pending`] if a fresh marker has no pid yet, and
    /// [`LockError::Io`] if the marker cannot be created or reclaimed.
    pub fn acquire(&self) -> Result<LockHandle, LockError> {
        match self.try_create() {
            Ok(handle) => return Ok(handle),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(self.io_error(e)),
        }

        match self.recorded_pid() {
            Some(pid) if self.probe.is_alive(pid) => return Err(LockError::Busy(pid)),
            None if self.marker_age().is_none_or(|age| age < self.grace) => {
                return Err(LockError::Pending);
            }
            _ => {}
        }

        tracing::warn!("removing stale lock {}", self.marker.display());
        match fs::remove_dir_all(&self.marker) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_error(e)),
        }

        match self.try_create() {
            Ok(handle) => Ok(handle),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(self
                .recorded_pid()
                .map_or(LockError::Pending, LockError::Busy)),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn try_create(&self) -> io::Result<LockHandle> {
        if let Some(parent) = self.marker.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&self.marker)?;
        let pid = self.probe.current();
        if let Err(e) = fs::write(self.marker.join(PID_FILE), format!("{pid}\n")) {
            let _ = fs::remove_dir_all(&self.marker);
            return Err(e);
        }
        tracing::debug!("acquired lock {} (pid {pid})", self.marker.display());
        Ok(LockHandle {
            marker: self.marker.clone(),
            pid,
            released: AtomicBool::new(false),
        })
    }

    fn recorded_pid(&self) -> Option<u32> {
        read_pid(&self.marker)
    }

    /// Time since the marker was last modified. `None` if it vanished or
    /// its timestamp lies in the future.
    fn marker_age(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.marker).and_then(|m| m.modified()).ok()?;
        SystemTime::now().duration_since(modified).ok()
    }

    fn io_error(&self, source: io::Error) -> LockError {
        LockError::Io {
            path: self.marker.clone(),
            source,
        }
    }
}

fn read_pid(marker: &Path) -> Option<u32> {
    fs::read_to_string(marker.join(PID_FILE))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Proof of holding the lock. Released explicitly or on drop.
#[derive(Debug)]
pub struct LockHandle {
    marker: PathBuf,
    pid: u32,
    released: AtomicBool,
}

impl LockHandle {
    /// Remove the marker if it still records our pid.
    ///
    /// Only the first call does anything, so both the normal exit path and
    /// the signal path may call it.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        match read_pid(&self.marker) {
            Some(pid) if pid == self.pid => {
                if let Err(e) = fs::remove_dir_all(&self.marker) {
                    tracing::warn!("cannot remove lock {}: {e}", self.marker.display());
                } else {
                    tracing::debug!("released lock {}", self.marker.display());
                }
            }
            Some(pid) => tracing::warn!(
                "lock {} now belongs to pid {pid}, leaving it",
                self.marker.display()
            ),
            None => tracing::debug!("lock {} already gone", self.marker.display()),
        }
    }

    /// Whether [`release`](Self::release) has run.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Marker directory.
    #[must_use]
    pub fn marker(&self) -> &Path {
        &self.marker
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release();
    }
}
