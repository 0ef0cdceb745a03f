//! Interrupt flag and the single teardown routine shared by the normal exit
//! path and the signal handler.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::lock::LockHandle;
use crate::resources::fs_ops::FileOps;
use crate::sudo::CredentialRefresher;

/// Exit status used after an interrupt.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Cheaply clonable record of received termination signals.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    count: Arc<AtomicUsize>,
}

impl Interrupt {
    /// A flag with no signal recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one signal and return how many have arrived so far.
    pub fn signal(&self) -> usize {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether at least one signal has arrived.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.count.load(Ordering::Acquire) > 0
    }
}

#[derive(Default)]
struct Registry {
    temps: BTreeMap<PathBuf, Arc<dyn FileOps>>,
    sweep_dirs: BTreeMap<PathBuf, Arc<dyn FileOps>>,
    lock: Option<LockHandle>,
    refresher: Option<CredentialRefresher>,
}

/// What a teardown removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    /// Registered temporary files deleted.
    pub temps_removed: usize,
    /// Orphaned temporary files deleted by the directory sweep.
    pub swept: usize,
    /// Whether a held lock was released.
    pub lock_released: bool,
}

/// Resources to release when the run ends, however it ends.
///
/// [`run`](Self::run) does its work at most once; later calls return
/// `None`.
#[derive(Clone, Default)]
pub struct Teardown {
    registry: Arc<Mutex<Registry>>,
    done: Arc<AtomicBool>,
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("done", &self.done.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Teardown {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a temporary file until it is published or deleted.
    pub fn register_temp(&self, path: &Path, ops: &Arc<dyn FileOps>) {
        self.registry()
            .temps
            .insert(path.to_path_buf(), Arc::clone(ops));
    }

    /// Stop tracking a temporary file.
    pub fn unregister_temp(&self, path: &Path) {
        self.registry().temps.remove(path);
    }

    /// Number of temporary files currently tracked.
    #[must_use]
    pub fn pending_temps(&self) -> usize {
        self.registry().temps.len()
    }

    /// Sweep `dir` for orphaned temporary files at teardown.
    pub fn sweep_dir(&self, dir: &Path, ops: &Arc<dyn FileOps>) {
        self.registry()
            .sweep_dirs
            .insert(dir.to_path_buf(), Arc::clone(ops));
    }

    /// Hand over the lock so teardown releases it.
    pub fn hold_lock(&self, lock: LockHandle) {
        self.registry().lock = Some(lock);
    }

    /// Hand over the credential refresher so teardown stops it.
    pub fn hold_refresher(&self, refresher: CredentialRefresher) {
        self.registry().refresher = Some(refresher);
    }

    /// Whether teardown has already run.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Release everything: temporary files, orphan sweep, the credential
    /// refresher, then the lock.
    pub fn run(&self) -> Option<TeardownReport> {
        if self.done.swap(true, Ordering::AcqRel) {
            return None;
        }
        let mut registry = self.registry();
        let mut report = TeardownReport::default();

        for (path, ops) in std::mem::take(&mut registry.temps) {
            match ops.remove(&path) {
                Ok(()) => report.temps_removed += 1,
                Err(e) => tracing::debug!("temp {} not removed: {e}", path.display()),
            }
        }
        for (dir, ops) in std::mem::take(&mut registry.sweep_dirs) {
            report.swept += ops.sweep_temp(&dir);
        }
        if let Some(refresher) = registry.refresher.take() {
            refresher.stop();
        }
        if let Some(lock) = registry.lock.take() {
            lock.release();
            report.lock_released = true;
        }
        drop(registry);

        tracing::debug!(
            "teardown: {} temp file(s) removed, {} orphan(s) swept, lock released: {}",
            report.temps_removed,
            report.swept,
            report.lock_released
        );
        Some(report)
    }
}
