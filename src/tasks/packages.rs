use anyhow::{Context as _, Result};

use super::{Context, Task, TaskResult, TaskStats};

/// Install the required packages with pacman.
///
/// Optional packages are never installed; they only gate artifacts.
#[derive(Debug)]
pub struct InstallPackages;

impl Task for InstallPackages {
    fn name(&self) -> &'static str {
        "Install packages"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.live
            && ctx.catalog.state().scalars("packages").next().is_some()
            && ctx.executor.which("pacman")
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let wanted: Vec<&str> = ctx.catalog.state().scalars("packages").collect();
        ctx.log
            .debug(&format!("batch-checking {} packages", wanted.len()));
        let missing: Vec<&str> = wanted
            .iter()
            .copied()
            .filter(|p| !ctx.probe.package_installed(p))
            .collect();

        let mut stats = TaskStats::new();
        stats.already_ok = wanted.len() - missing.len();
        stats.changed = missing.len();
        if missing.is_empty() {
            return stats.finish(ctx);
        }

        if ctx.dry_run {
            for package in &missing {
                ctx.log.dry_run(&format!("would install {package}"));
            }
            return stats.finish(ctx);
        }

        let mut args = vec!["-S", "--needed", "--noconfirm"];
        args.extend(missing.iter().copied());
        ctx.run_privileged("pacman", &args)
            .with_context(|| format!("installing {}", missing.join(" ")))?;
        ctx.probe.refresh();
        ctx.log.info(&format!("installed {}", missing.join(", ")));
        stats.finish(ctx)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::ConfigurationState;
    use crate::exec::test_helpers::MockExecutor;
    use crate::platform::FixedProbe;
    use crate::tasks::test_helpers::make_context;
    use std::sync::Arc;

    fn catalog() -> Catalog {
        Catalog::from_artifacts(
            vec![],
            ConfigurationState::new().with_scalars("packages", ["iw", "ethtool"]),
        )
    }

    #[test]
    fn should_run_requires_pacman() {
        let (ctx, _) = make_context(catalog(), FixedProbe::new(), Arc::new(MockExecutor::new()));
        assert!(!InstallPackages.should_run(&ctx));
        let exec = Arc::new(MockExecutor::new().with_program("pacman"));
        let (ctx, _) = make_context(catalog(), FixedProbe::new(), exec);
        assert!(InstallPackages.should_run(&ctx));
        assert!(!InstallPackages.should_run(&ctx.staging(true)));
    }

    #[test]
    fn installs_only_missing_packages() {
        let exec = Arc::new(
            MockExecutor::new()
                .with_program("pacman")
                .respond("pacman -S --needed --noconfirm ethtool", true, ""),
        );
        let probe = FixedProbe::new().with_packages(["iw"]);
        let (ctx, log) = make_context(catalog(), probe, exec.clone());
        let result = InstallPackages.run(&ctx).unwrap();
        assert!(matches!(result, TaskResult::Ok));
        assert_eq!(exec.calls(), ["pacman -S --needed --noconfirm ethtool"]);
        assert!(log.contains("1 changed, 1 already ok"));
    }

    #[test]
    fn nothing_missing_runs_nothing() {
        let exec = Arc::new(MockExecutor::new().with_program("pacman"));
        let probe = FixedProbe::new().with_packages(["iw", "ethtool"]);
        let (ctx, _) = make_context(catalog(), probe, exec.clone());
        InstallPackages.run(&ctx).unwrap();
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn dry_run_lists_packages() {
        let exec = Arc::new(MockExecutor::new().with_program("pacman"));
        let (ctx, log) = make_context(catalog(), FixedProbe::new(), exec.clone());
        let ctx = ctx.with_flags(true, false, false);
        let result = InstallPackages.run(&ctx).unwrap();
        assert!(matches!(result, TaskResult::DryRun));
        assert!(exec.calls().is_empty());
        assert!(log.contains("would install ethtool"));
    }

    #[test]
    fn pacman_failure_fails_task() {
        let exec = Arc::new(MockExecutor::new().with_program("pacman"));
        let (ctx, _) = make_context(catalog(), FixedProbe::new(), exec);
        let err = InstallPackages.run(&ctx).unwrap_err();
        assert!(format!("{err:#}").contains("installing iw ethtool"));
    }
}
