//! Named, ordered steps of the deploy and uninstall runs.
pub mod activation;
pub mod artifacts;
pub mod boot;
mod context;
pub mod network;
pub mod packages;
pub mod systemd;

pub use context::Context;

use anyhow::Result;

use crate::error::TaskError;
use crate::logging::TaskStatus;

/// Result of a single task execution.
///
/// # Examples
///
/// ```
/// use syscfg::tasks::TaskResult;
///
/// let ok = TaskResult::Ok;
/// let skipped = TaskResult::Skipped("nothing changed".into());
/// let dry = TaskResult::DryRun;
///
/// assert!(matches!(ok, TaskResult::Ok));
/// assert!(matches!(skipped, TaskResult::Skipped(_)));
/// assert!(matches!(dry, TaskResult::DryRun));
/// ```
#[derive(Debug, Clone)]
pub enum TaskResult {
    /// Task completed successfully.
    Ok,
    /// Task had nothing to do.
    Skipped(String),
    /// Task ran in dry-run mode.
    DryRun,
}

/// Counters for batch tasks that process many items.
///
/// # Examples
///
/// ```
/// use syscfg::tasks::TaskStats;
///
/// let stats = TaskStats { changed: 3, already_ok: 10, skipped: 0, failed: 0 };
/// assert_eq!(stats.summary(false), "3 changed, 10 already ok");
/// assert_eq!(stats.summary(true), "3 would change, 10 already ok");
///
/// let stats = TaskStats { changed: 1, already_ok: 2, skipped: 3, failed: 1 };
/// assert_eq!(stats.summary(false), "1 changed, 2 already ok, 3 skipped, 1 failed");
/// ```
#[derive(Debug, Default)]
pub struct TaskStats {
    /// Number of items changed or applied.
    pub changed: usize,
    /// Number of items already in the correct state.
    pub already_ok: usize,
    /// Number of items skipped as inapplicable or kept.
    pub skipped: usize,
    /// Number of items that failed.
    pub failed: usize,
}

impl TaskStats {
    /// Create a new empty stats counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Format the summary string (e.g. "3 changed, 10 already ok, 1 skipped").
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        let mut line = format!("{} {verb}, {} already ok", self.changed, self.already_ok);
        if self.skipped > 0 {
            line.push_str(&format!(", {} skipped", self.skipped));
        }
        if self.failed > 0 {
            line.push_str(&format!(", {} failed", self.failed));
        }
        line
    }

    /// Log the summary and return the appropriate `TaskResult`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the failure count when any item failed, so
    /// the task is recorded as failed after every item was attempted.
    pub fn finish(self, ctx: &Context) -> Result<TaskResult> {
        ctx.log.info(&self.summary(ctx.dry_run));
        if self.failed > 0 {
            anyhow::bail!("{} item(s) failed", self.failed);
        }
        Ok(if ctx.dry_run {
            TaskResult::DryRun
        } else {
            TaskResult::Ok
        })
    }
}

/// A named, executable task.
pub trait Task: Send + Sync {
    /// Human-readable task name.
    fn name(&self) -> &str;

    /// Whether this task has anything to do in this run.
    fn should_run(&self, ctx: &Context) -> bool;

    /// Execute the task.
    ///
    /// # Errors
    ///
    /// Returns an error if the task fails. A [`TaskError`] stops the whole
    /// run.
    fn run(&self, ctx: &Context) -> Result<TaskResult>;
}

/// The deploy steps, in execution order.
#[must_use]
pub fn all_deploy_tasks() -> Vec<Box<dyn Task>> {
    vec![
        Box::new(packages::InstallPackages),
        Box::new(artifacts::InstallArtifacts),
        Box::new(boot::RebuildBoot),
        Box::new(systemd::ReloadUdev),
        Box::new(systemd::ReloadSystemd),
        Box::new(systemd::EnableUnits),
        Box::new(systemd::RestartServices),
        Box::new(network::WaitForNetworkManager::default()),
    ]
}

/// The uninstall steps, in execution order.
#[must_use]
pub fn all_uninstall_tasks() -> Vec<Box<dyn Task>> {
    vec![
        Box::new(systemd::DisableUnits),
        Box::new(artifacts::RemoveArtifacts),
        Box::new(boot::RebuildBoot),
        Box::new(systemd::ReloadUdev),
        Box::new(systemd::ReloadSystemd),
    ]
}

/// Execute a task, recording the result in the logger.
///
/// # Errors
///
/// Returns the task's [`TaskError`], which is fatal to the run. Every other
/// failure is only recorded.
pub fn execute(task: &dyn Task, ctx: &Context) -> Result<(), TaskError> {
    if !task.should_run(ctx) {
        ctx.log
            .debug(&format!("skipping task: {} (not applicable)", task.name()));
        ctx.log
            .record_task(task.name(), TaskStatus::NotApplicable, None);
        return Ok(());
    }

    ctx.log.stage(task.name());

    match task.run(ctx) {
        Ok(TaskResult::Ok) => {
            ctx.log.record_task(task.name(), TaskStatus::Ok, None);
        }
        Ok(TaskResult::Skipped(reason)) => {
            ctx.log.info(&format!("skipped: {reason}"));
            ctx.log
                .record_task(task.name(), TaskStatus::Skipped, Some(&reason));
        }
        Ok(TaskResult::DryRun) => {
            ctx.log.record_task(task.name(), TaskStatus::DryRun, None);
        }
        Err(e) => {
            ctx.log.error(&format!("{}: {e:#}", task.name()));
            ctx.log
                .record_task(task.name(), TaskStatus::Failed, Some(&format!("{e:#}")));
            if let Ok(err) = e.downcast::<TaskError>() {
                return Err(err);
            }
        }
    }
    Ok(())
}


#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::ConfigurationState;
    use crate::exec::test_helpers::MockExecutor;
    use crate::platform::FixedProbe;
    use std::sync::Arc;
    use test_helpers::make_context;

    /// A mock task for testing `execute()`.
    struct MockTask {
        name: &'static str,
        should_run: bool,
        result: fn() -> Result<TaskResult>,
    }

    impl Task for MockTask {
        fn name(&self) -> &str {
            self.name
        }
        fn should_run(&self, _ctx: &Context) -> bool {
            self.should_run
        }
        fn run(&self, _ctx: &Context) -> Result<TaskResult> {
            (self.result)()
        }
    }

    fn ctx() -> (Context, Arc<crate::logging::MemoryLog>) {
        make_context(
            Catalog::from_artifacts(vec![], ConfigurationState::new()),
            FixedProbe::new(),
            Arc::new(MockExecutor::new()),
        )
    }

    #[test]
    fn execute_skips_non_applicable_task() {
        let (ctx, log) = ctx();
        let task = MockTask {
            name: "test-task",
            should_run: false,
            result: || Ok(TaskResult::Ok),
        };
        execute(&task, &ctx).unwrap();
        assert_eq!(log.task_entries()[0].status, TaskStatus::NotApplicable);
    }

    #[test]
    fn execute_records_ok_and_skipped() {
        let (ctx, log) = ctx();
        let ok = MockTask {
            name: "ok-task",
            should_run: true,
            result: || Ok(TaskResult::Ok),
        };
        let skipped = MockTask {
            name: "skip-task",
            should_run: true,
            result: || Ok(TaskResult::Skipped("not needed".to_string())),
        };
        execute(&ok, &ctx).unwrap();
        execute(&skipped, &ctx).unwrap();
        let entries = log.task_entries();
        assert_eq!(entries[0].status, TaskStatus::Ok);
        assert_eq!(entries[1].status, TaskStatus::Skipped);
        assert_eq!(entries[1].message.as_deref(), Some("not needed"));
    }

    #[test]
    fn execute_records_failed_task_and_continues() {
        let (ctx, log) = ctx();
        let task = MockTask {
            name: "fail-task",
            should_run: true,
            result: || Err(anyhow::anyhow!("kaboom")),
        };
        assert!(execute(&task, &ctx).is_ok());
        assert_eq!(log.failure_count(), 1);
    }

    #[test]
    fn execute_propagates_fatal_errors() {
        let (ctx, log) = ctx();
        let task = MockTask {
            name: "boot",
            should_run: true,
            result: || Err(TaskError::BootRebuild("mkinitcpio exited 1".into()).into()),
        };
        let err = execute(&task, &ctx).unwrap_err();
        assert!(matches!(err, TaskError::BootRebuild(_)));
        assert_eq!(log.failure_count(), 1);
    }

    #[test]
    fn stats_finish_fails_after_counting() {
        let (ctx, log) = ctx();
        let stats = TaskStats {
            changed: 2,
            already_ok: 0,
            skipped: 0,
            failed: 1,
        };
        assert!(stats.finish(&ctx).is_err());
        assert!(log.contains("2 changed, 0 already ok, 1 failed"));
    }

    #[test]
    fn deploy_order_is_fixed() {
        let names: Vec<String> = all_deploy_tasks()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        insta::assert_snapshot!(names.join("\n"), @r"
        Install packages
        Install configuration files
        Rebuild boot configuration
        Reload udev rules
        Reload systemd
        Enable units
        Restart services
        Wait for NetworkManager
        ");
    }
}
