//! Tasks: install and remove the catalog's configuration files.
use anyhow::Result;

use super::{Context, Task, TaskResult, TaskStats};
use crate::catalog::ConfigArtifact;
use crate::diff::{EntryStatus, diff_path};
use crate::error::TaskError;
use crate::resources::installer::INSTALL_MODE;
use crate::resources::{InstallOutcome, RemoveOutcome};

/// Converge every catalog destination to its rendering.
///
/// One destination's failure does not stop the batch; the task is recorded
/// as failed once every destination was attempted. A security refusal
/// stops the batch and the run.
#[derive(Debug)]
pub struct InstallArtifacts;

impl Task for InstallArtifacts {
    fn name(&self) -> &'static str {
        "Install configuration files"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        !ctx.catalog.artifacts().is_empty()
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let installer = ctx.installer();
        let mut stats = TaskStats::new();

        for artifact in ctx.catalog.artifacts() {
            ctx.check_interrupt()?;
            if ctx.dry_run {
                preview(ctx, artifact, &mut stats)?;
                continue;
            }
            let path = artifact.destination.as_path();
            match installer.install(path, artifact.privilege) {
                Ok(InstallOutcome::Applied { .. }) => {
                    stats.changed += 1;
                    ctx.activations.push(&artifact.activation);
                }
                Ok(InstallOutcome::Repaired { .. }) => stats.changed += 1,
                Ok(InstallOutcome::AlreadyCorrect) => stats.already_ok += 1,
                Ok(InstallOutcome::Skipped { .. }) => stats.skipped += 1,
                Err(e) if e.is_security() => {
                    ctx.log.error(&e.to_string());
                    return Err(TaskError::Security(e.to_string()).into());
                }
                Err(e) => {
                    ctx.log.error(&format!("{}: {e}", path.display()));
                    stats.failed += 1;
                }
            }
        }
        stats.finish(ctx)
    }
}

/// Report what installing `artifact` would do, without writing.
fn preview(ctx: &Context, artifact: &ConfigArtifact, stats: &mut TaskStats) -> Result<()> {
    let path = artifact.destination.as_path();
    if !ctx.catalog.applies(artifact, ctx.probe.as_ref()) {
        let reason = ctx.catalog.requirement(artifact);
        ctx.log
            .dry_run(&format!("would skip {}: {reason}", path.display()));
        stats.skipped += 1;
        return Ok(());
    }
    match diff_path(&ctx.catalog, ctx.probe.as_ref(), &ctx.access, path)? {
        EntryStatus::Match if !ctx.force => {
            let owner = ctx.access.owner(artifact.privilege);
            match ctx.access.ops(artifact.privilege).metadata(path) {
                Ok(meta)
                    if meta.mode != INSTALL_MODE
                        || meta.uid != owner.uid
                        || meta.gid != owner.gid =>
                {
                    ctx.log.dry_run(&format!(
                        "would repair permissions of {} ({:04o} {}:{})",
                        path.display(),
                        meta.mode,
                        meta.uid,
                        meta.gid
                    ));
                    stats.changed += 1;
                }
                _ => stats.already_ok += 1,
            }
        }
        EntryStatus::Match => {
            ctx.log
                .dry_run(&format!("would rewrite {} (forced)", path.display()));
            stats.changed += 1;
        }
        EntryStatus::NotInstalled | EntryStatus::NotApplicable => {
            ctx.log
                .dry_run(&format!("would write {} (new file)", path.display()));
            stats.changed += 1;
            ctx.activations.push(&artifact.activation);
        }
        EntryStatus::Differs { diff } => {
            ctx.log.dry_run(&format!("would write {}", path.display()));
            for line in diff.lines() {
                ctx.log.info(line);
            }
            stats.changed += 1;
            ctx.activations.push(&artifact.activation);
        }
    }
    Ok(())
}

/// Delete installed destinations, last installed first.
///
/// Files modified since they were installed are kept unless `--force`.
#[derive(Debug)]
pub struct RemoveArtifacts;

impl Task for RemoveArtifacts {
    fn name(&self) -> &'static str {
        "Remove configuration files"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        !ctx.catalog.artifacts().is_empty()
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let installer = ctx.installer();
        let mut stats = TaskStats::new();

        for artifact in ctx.catalog.artifacts().iter().rev() {
            ctx.check_interrupt()?;
            let path = artifact.destination.as_path();
            if ctx.dry_run {
                match diff_path(&ctx.catalog, ctx.probe.as_ref(), &ctx.access, path)? {
                    EntryStatus::NotInstalled | EntryStatus::NotApplicable => {
                        stats.already_ok += 1;
                    }
                    EntryStatus::Differs { .. } if !ctx.force => {
                        ctx.log.dry_run(&format!(
                            "would keep {} (modified locally)",
                            path.display()
                        ));
                        stats.skipped += 1;
                    }
                    EntryStatus::Match | EntryStatus::Differs { .. } => {
                        ctx.log.dry_run(&format!("would remove {}", path.display()));
                        stats.changed += 1;
                        ctx.activations.push(&artifact.activation);
                    }
                }
                continue;
            }
            match installer.remove(path, artifact.privilege, ctx.force) {
                Ok(RemoveOutcome::Removed) => {
                    stats.changed += 1;
                    ctx.activations.push(&artifact.activation);
                }
                Ok(RemoveOutcome::NotInstalled) => stats.already_ok += 1,
                Ok(RemoveOutcome::Kept { .. }) => stats.skipped += 1,
                Err(e) => {
                    ctx.log.error(&format!("{}: {e}", path.display()));
                    stats.failed += 1;
                }
            }
        }
        stats.finish(ctx)
    }
}
