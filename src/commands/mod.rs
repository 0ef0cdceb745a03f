pub mod deploy;
pub mod diff;
pub mod lint;
pub mod uninstall;
pub mod verify;
pub mod version;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Serialize;

use crate::catalog::{Catalog, Layout};
use crate::cleanup::{Interrupt, Teardown};
use crate::cli::GlobalOpts;
use crate::config;
use crate::exec::{Executor, SystemExecutor};
use crate::lock::{DEFAULT_LOCK_DIR, LockManager};
use crate::logging::{Log, Logger};
use crate::platform::{HostProbe, Platform, SystemProbe};
use crate::resources::fs_ops::Access;
use crate::sudo::{self, CredentialRefresher};
use crate::tasks::{self, Context, Task};

/// Process-wide handles shared between `main`, the commands and the signal
/// handler.
#[derive(Debug, Clone)]
pub struct Shared {
    /// Console and file logger for the run.
    pub log: Arc<Logger>,
    /// The single teardown registry.
    pub teardown: Teardown,
    /// Set by the signal handler.
    pub interrupt: Interrupt,
}

/// State produced by the common command setup sequence.
///
/// Encapsulates platform detection, system root resolution and
/// configuration loading so that each command does not have to repeat the
/// boilerplate.
pub struct Session {
    /// Detected host.
    pub platform: Platform,
    /// Where catalog paths land.
    pub layout: Layout,
    /// Whether system paths resolve under a staging root instead of `/`.
    pub staging: bool,
    /// The built-in catalog bound to the effective configuration state.
    pub catalog: Arc<Catalog>,
    /// Runs external commands.
    pub executor: Arc<dyn Executor>,
    /// Package and kernel queries.
    pub probe: Arc<dyn SystemProbe>,
    /// File operations per privilege class.
    pub access: Arc<Access>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("platform", &self.platform)
            .field("layout", &self.layout)
            .field("staging", &self.staging)
            .field("artifacts", &self.catalog.artifacts().len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Detect the platform, resolve the system root, and load the
    /// configuration state.
    ///
    /// # Errors
    ///
    /// Returns an error if the system root does not exist or the overlay
    /// cannot be parsed.
    pub fn init(global: &GlobalOpts, log: &dyn Log) -> Result<Self> {
        Self::with_executor(global, log, Arc::new(SystemExecutor))
    }

    /// [`init`](Self::init) with an explicit executor.
    ///
    /// # Errors
    ///
    /// Same as [`init`](Self::init).
    pub fn with_executor(
        global: &GlobalOpts,
        log: &dyn Log,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        let platform = Platform::detect();
        let (sysroot, staging) = resolve_sysroot(global.sysroot.as_deref())?;
        let mut layout = Layout {
            sysroot,
            home: platform.invoker.home.clone(),
        };
        if staging {
            layout.home = layout.system(&platform.invoker.home);
            log.info(&format!("system root: {}", layout.sysroot.display()));
        }

        log.stage("Loading configuration");
        let overlay = config::overlay_path(global.config.as_deref());
        log.debug(&format!("overlay: {}", overlay.display()));
        let state = config::load(&overlay)?;
        let catalog = Catalog::builtin(&layout, state);
        log.info(&format!(
            "{} configuration files in catalog",
            catalog.artifacts().len()
        ));
        match platform.kernel {
            Some(kernel) => log.debug(&format!("running kernel {kernel}")),
            None => log.warn("running kernel version unknown; kernel-gated files do not apply"),
        }
        if !platform.is_arch {
            log.debug("not an Arch Linux host");
        }

        let probe: Arc<dyn SystemProbe> =
            Arc::new(HostProbe::new(Arc::clone(&executor), platform.kernel));
        let access = Arc::new(Access::for_host(&platform, staging, Arc::clone(&executor)));
        Ok(Self {
            platform,
            layout,
            staging,
            catalog: Arc::new(catalog),
            executor,
            probe,
            access,
        })
    }

    /// A task context for this session, wired to the shared teardown and
    /// interrupt flag.
    #[must_use]
    pub fn context(&self, global: &GlobalOpts, shared: &Shared) -> Context {
        Context::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.probe),
            Arc::clone(&self.access),
            Arc::clone(&self.executor),
            Arc::clone(&shared.log) as Arc<dyn Log>,
        )
        .staging(self.staging)
        .with_cleanup(shared.teardown.clone(), shared.interrupt.clone())
        .with_flags(global.dry_run, global.force, global.unattended)
    }

    /// Directory that holds the lock marker.
    #[must_use]
    pub fn lock_dir(&self, global: &GlobalOpts) -> PathBuf {
        global
            .lock_dir
            .clone()
            .unwrap_or_else(|| self.layout.system(Path::new(DEFAULT_LOCK_DIR)))
    }

    /// Resolve a destination given on the command line: catalog paths are
    /// accepted as-is or as logical paths under the system root.
    #[must_use]
    pub fn destination(&self, path: &Path) -> PathBuf {
        if self.catalog.get(path).is_ok() {
            path.to_path_buf()
        } else {
            self.layout.system(path)
        }
    }
}

fn resolve_sysroot(explicit: Option<&Path>) -> Result<(PathBuf, bool)> {
    let Some(path) = explicit else {
        return Ok((PathBuf::from("/"), false));
    };
    let root = dunce::canonicalize(path)
        .with_context(|| format!("resolving system root {}", path.display()))?;
    let staging = root != Path::new("/");
    Ok((root, staging))
}

/// Prepare a mutating run: take the lock, prime sudo and keep it fresh,
/// and have the teardown sweep orphaned temporary files. A dry run takes
/// none of these.
///
/// # Errors
///
/// Returns an error if another run holds the lock or sudo credentials
/// cannot be obtained.
pub fn prepare_mutation(session: &Session, global: &GlobalOpts, ctx: &Context) -> Result<()> {
    if global.dry_run {
        return Ok(());
    }
    let lock = LockManager::new(&session.lock_dir(global)).acquire()?;
    ctx.teardown.hold_lock(lock);

    if session.access.uses_sudo() {
        ctx.log.debug("system files are written through sudo");
        sudo::prime(session.executor.as_ref())?;
        ctx.teardown
            .hold_refresher(CredentialRefresher::start(Arc::clone(&session.executor))?);
    }

    for (dir, privilege) in session.catalog.directories() {
        ctx.teardown.sweep_dir(&dir, session.access.ops(privilege));
    }
    Ok(())
}

/// Execute every task in order, print the summary, and bail if any task failed.
///
/// A fatal task error or an interrupt stops the run before the next task.
///
/// # Errors
///
/// Returns the fatal error, or an error if one or more tasks recorded a
/// failure.
pub fn run_tasks_to_completion<'a>(
    tasks: impl IntoIterator<Item = &'a dyn Task>,
    ctx: &Context,
    log: &Logger,
) -> Result<()> {
    for task in tasks {
        if let Err(e) = ctx
            .check_interrupt()
            .and_then(|()| tasks::execute(task, ctx))
        {
            log.print_summary();
            return Err(e.into());
        }
    }

    log.print_summary();

    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} task(s) failed");
    }
    Ok(())
}

/// Write `value` as pretty JSON to stdout.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).context("writing JSON report")?;
    writeln!(out).context("writing JSON report")?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::ConfigurationState;
    use crate::error::TaskError;
    use crate::exec::test_helpers::MockExecutor;
    use crate::logging::TaskStatus;
    use crate::platform::FixedProbe;
    use crate::resources::fs_ops::Owner;
    use crate::tasks::TaskResult;

    struct Step {
        name: &'static str,
        fail: Option<fn() -> anyhow::Error>,
    }

    impl Task for Step {
        fn name(&self) -> &str {
            self.name
        }

        fn should_run(&self, _ctx: &Context) -> bool {
            true
        }

        fn run(&self, _ctx: &Context) -> Result<TaskResult> {
            self.fail.map_or(Ok(TaskResult::Ok), |f| Err(f()))
        }
    }

    fn context(log: &Arc<Logger>) -> Context {
        Context::new(
            Arc::new(Catalog::from_artifacts(vec![], ConfigurationState::new())),
            Arc::new(FixedProbe::new()),
            Arc::new(Access::local(Owner::ROOT)),
            Arc::new(MockExecutor::new()),
            Arc::clone(log) as Arc<dyn Log>,
        )
    }

    #[test]
    fn resolve_sysroot_defaults_to_live_root() {
        let (root, staging) = resolve_sysroot(None).unwrap();
        assert_eq!(root, PathBuf::from("/"));
        assert!(!staging);
    }

    #[test]
    fn resolve_sysroot_staging_tree() {
        let dir = tempfile::tempdir().unwrap();
        let (root, staging) = resolve_sysroot(Some(dir.path())).unwrap();
        assert!(staging);
        assert!(root.is_absolute());
        assert!(resolve_sysroot(Some(&dir.path().join("missing"))).is_err());
    }

    #[test]
    fn non_fatal_failure_runs_remaining_tasks() {
        let log = Arc::new(Logger::new(None));
        let ctx = context(&log);
        let steps = [
            Step {
                name: "first",
                fail: Some(|| anyhow::anyhow!("broken")),
            },
            Step {
                name: "second",
                fail: None,
            },
        ];
        let err = run_tasks_to_completion(steps.iter().map(|s| s as &dyn Task), &ctx, &log)
            .unwrap_err();
        assert_eq!(err.to_string(), "1 task(s) failed");
        let entries = log.task_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].status, TaskStatus::Ok);
    }

    #[test]
    fn fatal_failure_stops_the_run() {
        let log = Arc::new(Logger::new(None));
        let ctx = context(&log);
        let steps = [
            Step {
                name: "boot",
                fail: Some(|| TaskError::BootRebuild("mkinitcpio failed".into()).into()),
            },
            Step {
                name: "after",
                fail: None,
            },
        ];
        let err = run_tasks_to_completion(steps.iter().map(|s| s as &dyn Task), &ctx, &log)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::BootRebuild(_))
        ));
        assert_eq!(log.task_entries().len(), 1);
    }

    #[test]
    fn interrupt_stops_before_next_task() {
        let log = Arc::new(Logger::new(None));
        let ctx = context(&log);
        ctx.interrupt.signal();
        let steps = [Step {
            name: "never",
            fail: None,
        }];
        let err = run_tasks_to_completion(steps.iter().map(|s| s as &dyn Task), &ctx, &log)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::Interrupted)
        ));
        assert!(log.task_entries().is_empty());
    }
}
