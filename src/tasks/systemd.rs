//! Tasks: reload udev and systemd, enable and restart units.
use anyhow::{Context as _, Result};

use super::{Context, Task, TaskResult, TaskStats};
use crate::catalog::Activation;
use crate::exec::command_line;
use crate::verify::runtime::{UnitEnablement, unit_enablement};

/// Run each command in order, or only announce them in a dry run.
fn run_steps(ctx: &Context, steps: &[(&str, &[&str])]) -> Result<TaskResult> {
    for (program, args) in steps {
        ctx.check_interrupt()?;
        let line = command_line(program, args);
        if ctx.dry_run {
            ctx.log.dry_run(&format!("would run {line}"));
        } else {
            ctx.run_privileged(program, args)
                .with_context(|| format!("running {line}"))?;
            ctx.log.debug(&format!("ran {line}"));
        }
    }
    Ok(if ctx.dry_run {
        TaskResult::DryRun
    } else {
        TaskResult::Ok
    })
}

/// Reload udev rules and retrigger devices after the rules changed.
#[derive(Debug)]
pub struct ReloadUdev;

impl Task for ReloadUdev {
    fn name(&self) -> &'static str {
        "Reload udev rules"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.live && ctx.activations.contains(&Activation::Udev) && ctx.executor.which("udevadm")
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        run_steps(
            ctx,
            &[
                ("udevadm", &["control", "--reload"]),
                ("udevadm", &["trigger", "--action=change"]),
            ],
        )
    }
}

/// Make systemd re-read unit files and drop-ins.
#[derive(Debug)]
pub struct ReloadSystemd;

impl Task for ReloadSystemd {
    fn name(&self) -> &'static str {
        "Reload systemd"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.live
            && ctx.executor.which("systemctl")
            && (ctx.activations.contains(&Activation::DaemonReload)
                || !ctx.activations.restarts().is_empty())
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        run_steps(ctx, &[("systemctl", &["daemon-reload"])])
    }
}

/// Enable and start the units syscfg manages.
#[derive(Debug)]
pub struct EnableUnits;

impl Task for EnableUnits {
    fn name(&self) -> &'static str {
        "Enable units"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.live
            && ctx.catalog.state().scalars("units").next().is_some()
            && ctx.executor.which("systemctl")
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let mut stats = TaskStats::new();
        for unit in ctx.catalog.state().scalars("units") {
            ctx.check_interrupt()?;
            match unit_enablement(ctx.executor.as_ref(), unit) {
                UnitEnablement::Enabled => {
                    ctx.log.debug(&format!("ok: {unit} (already enabled)"));
                    stats.already_ok += 1;
                }
                UnitEnablement::Masked => {
                    ctx.log.warn(&format!("{unit} is masked, not enabling"));
                    stats.failed += 1;
                }
                _ if ctx.dry_run => {
                    ctx.log.dry_run(&format!("would enable {unit}"));
                    stats.changed += 1;
                }
                _ => match ctx.run_privileged("systemctl", &["enable", "--now", unit]) {
                    Ok(_) => {
                        ctx.log.info(&format!("enabled {unit}"));
                        stats.changed += 1;
                    }
                    Err(e) => {
                        ctx.log.warn(&format!("failed to enable {unit}: {e:#}"));
                        stats.failed += 1;
                    }
                },
            }
        }
        stats.finish(ctx)
    }
}

/// Disable and stop the units syscfg manages before their files go away.
#[derive(Debug)]
pub struct DisableUnits;

impl Task for DisableUnits {
    fn name(&self) -> &'static str {
        "Disable units"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        EnableUnits.should_run(ctx)
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let mut stats = TaskStats::new();
        for unit in ctx.catalog.state().scalars("units") {
            ctx.check_interrupt()?;
            if unit_enablement(ctx.executor.as_ref(), unit) != UnitEnablement::Enabled {
                stats.already_ok += 1;
                continue;
            }
            if ctx.dry_run {
                ctx.log.dry_run(&format!("would disable {unit}"));
                stats.changed += 1;
                continue;
            }
            match ctx.run_privileged("systemctl", &["disable", "--now", unit]) {
                Ok(_) => {
                    ctx.log.info(&format!("disabled {unit}"));
                    stats.changed += 1;
                }
                Err(e) => {
                    ctx.log.warn(&format!("failed to disable {unit}: {e:#}"));
                    stats.failed += 1;
                }
            }
        }
        stats.finish(ctx)
    }
}

/// Restart services whose configuration changed in this run.
///
/// Uses `try-restart`, so services that are not running stay stopped.
#[derive(Debug)]
pub struct RestartServices;

impl Task for RestartServices {
    fn name(&self) -> &'static str {
        "Restart services"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.live && !ctx.activations.restarts().is_empty() && ctx.executor.which("systemctl")
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let mut stats = TaskStats::new();
        for unit in ctx.activations.restarts() {
            ctx.check_interrupt()?;
            if ctx.dry_run {
                ctx.log.dry_run(&format!("would restart {unit}"));
                stats.changed += 1;
                continue;
            }
            match ctx.run_privileged("systemctl", &["try-restart", &unit]) {
                Ok(_) => {
                    ctx.log.info(&format!("restarted {unit}"));
                    stats.changed += 1;
                }
                Err(e) => {
                    ctx.log.warn(&format!("failed to restart {unit}: {e:#}"));
                    stats.failed += 1;
                }
            }
        }
        stats.finish(ctx)
    }
}
