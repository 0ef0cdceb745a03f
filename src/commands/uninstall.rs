//! Uninstall command implementation.
use anyhow::Result;

use super::{Session, Shared};
use crate::cli::GlobalOpts;
use crate::tasks;

/// Run the uninstall command.
///
/// Locally modified files are kept unless `--force` is given.
///
/// # Errors
///
/// Returns an error if setup fails, the lock is held elsewhere, or any task
/// fails.
pub fn run(global: &GlobalOpts, shared: &Shared) -> Result<()> {
    let session = Session::init(global, &*shared.log)?;
    let ctx = session.context(global, shared);
    super::prepare_mutation(&session, global, &ctx)?;
    let tasks = tasks::all_uninstall_tasks();
    super::run_tasks_to_completion(tasks.iter().map(Box::as_ref), &ctx, &shared.log)
}
