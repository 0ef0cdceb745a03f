use std::sync::Arc;

use anyhow::Result;

use super::activation::Activations;
use crate::catalog::Catalog;
use crate::cleanup::{Interrupt, Teardown};
use crate::error::TaskError;
use crate::exec::{ExecResult, Executor};
use crate::logging::Log;
use crate::platform::SystemProbe;
use crate::resources::fs_ops::Access;
use crate::resources::installer::Installer;

/// Shared context for task execution.
pub struct Context {
    /// Artifacts and the configuration state they render from.
    pub catalog: Arc<Catalog>,
    /// Package and kernel queries for applicability.
    pub probe: Arc<dyn SystemProbe>,
    /// File operations and owners per privilege class.
    pub access: Arc<Access>,
    /// Command executor (for testing or real system calls).
    pub executor: Arc<dyn Executor>,
    /// Logger for output and task recording.
    pub log: Arc<dyn Log>,
    /// Resources released when the run ends.
    pub teardown: Teardown,
    /// Set once a termination signal arrives.
    pub interrupt: Interrupt,
    /// Activation steps owed by artifacts changed earlier in the run.
    pub activations: Activations,
    /// Whether to perform a dry run (preview changes without applying).
    pub dry_run: bool,
    /// Rewrite files that already match, remove locally modified files.
    pub force: bool,
    /// No operator is present; boot rebuild failures abort the run.
    pub unattended: bool,
    /// The catalog targets the running system rather than a staging root;
    /// package, boot and service steps only run when set.
    pub live: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("catalog", &"<Catalog>")
            .field("probe", &self.probe)
            .field("access", &self.access)
            .field("log", &"<dyn Log>")
            .field("executor", &"<dyn Executor>")
            .field("teardown", &self.teardown)
            .field("interrupt", &self.interrupt)
            .field("activations", &self.activations)
            .field("dry_run", &self.dry_run)
            .field("force", &self.force)
            .field("unattended", &self.unattended)
            .field("live", &self.live)
            .finish()
    }
}

impl Context {
    /// Creates a context with no pending activations and a fresh teardown
    /// registry and interrupt flag.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        probe: Arc<dyn SystemProbe>,
        access: Arc<Access>,
        executor: Arc<dyn Executor>,
        log: Arc<dyn Log>,
    ) -> Self {
        Self {
            catalog,
            probe,
            access,
            executor,
            log,
            teardown: Teardown::new(),
            interrupt: Interrupt::new(),
            activations: Activations::new(),
            dry_run: false,
            force: false,
            unattended: false,
            live: true,
        }
    }

    /// Mark the run as targeting a staging root.
    #[must_use]
    pub const fn staging(mut self, staging: bool) -> Self {
        self.live = !staging;
        self
    }

    /// Use `teardown` and `interrupt` shared with the signal handler.
    #[must_use]
    pub fn with_cleanup(mut self, teardown: Teardown, interrupt: Interrupt) -> Self {
        self.teardown = teardown;
        self.interrupt = interrupt;
        self
    }

    /// Set the run flags.
    #[must_use]
    pub const fn with_flags(mut self, dry_run: bool, force: bool, unattended: bool) -> Self {
        self.dry_run = dry_run;
        self.force = force;
        self.unattended = unattended;
        self
    }

    /// An installer bound to this context's catalog, access and teardown.
    #[must_use]
    pub fn installer(&self) -> Installer<'_> {
        Installer::new(
            &self.catalog,
            self.probe.as_ref(),
            &self.access,
            self.log.as_ref(),
        )
        .force(self.force)
        .with_teardown(&self.teardown)
    }

    /// Run a command that changes system state, through `sudo -n` when
    /// system files are handled through sudo.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    pub fn run_privileged(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        if self.access.uses_sudo() {
            let mut full = vec!["-n", program];
            full.extend_from_slice(args);
            self.executor.run("sudo", &full)
        } else {
            self.executor.run(program, args)
        }
    }

    /// Fail with [`TaskError::Interrupted`] once a signal has arrived.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Interrupted`] when the interrupt flag is set.
    pub fn check_interrupt(&self) -> Result<(), TaskError> {
        if self.interrupt.is_set() {
            Err(TaskError::Interrupted)
        } else {
            Ok(())
        }
    }
}
