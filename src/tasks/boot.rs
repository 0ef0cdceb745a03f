//! Task: regenerate the initramfs and boot loader after boot inputs change.
use anyhow::{Context as _, Result};

use super::{Context, Task, TaskResult};
use crate::catalog::Activation;
use crate::error::TaskError;

/// Rebuild boot configuration with `mkinitcpio -P` and `bootctl update`.
///
/// In an unattended run a failure aborts every remaining step, since the
/// next boot would otherwise use half-applied kernel parameters.
#[derive(Debug)]
pub struct RebuildBoot;

impl RebuildBoot {
    fn commands(ctx: &Context) -> Vec<(&'static str, &'static [&'static str])> {
        let mut commands: Vec<(&'static str, &'static [&'static str])> = Vec::new();
        if ctx.executor.which("mkinitcpio") {
            commands.push(("mkinitcpio", &["-P"]));
        }
        if ctx.executor.which("bootctl") {
            commands.push(("bootctl", &["--graceful", "update"]));
        }
        commands
    }
}

impl Task for RebuildBoot {
    fn name(&self) -> &'static str {
        "Rebuild boot configuration"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.live && ctx.activations.contains(&Activation::Boot)
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let commands = Self::commands(ctx);
        if commands.is_empty() {
            return Ok(TaskResult::Skipped(
                "neither mkinitcpio nor bootctl found".to_string(),
            ));
        }

        for (program, args) in commands {
            ctx.check_interrupt()?;
            let line = crate::exec::command_line(program, args);
            if ctx.dry_run {
                ctx.log.dry_run(&format!("would run {line}"));
                continue;
            }
            let result = ctx
                .run_privileged(program, args)
                .with_context(|| format!("running {line}"));
            match result {
                Ok(_) => ctx.log.info(&format!("ran {line}")),
                Err(e) if ctx.unattended => {
                    return Err(TaskError::BootRebuild(format!("{e:#}")).into());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(if ctx.dry_run {
            TaskResult::DryRun
        } else {
            TaskResult::Ok
        })
    }
}
