use anyhow::Result;

use super::{Session, Shared};
use crate::cli::{DeployOpts, GlobalOpts};
use crate::tasks::{self, Task};

/// Run the deploy command.
///
/// # Errors
///
/// Returns an error if setup fails, the lock is held elsewhere, or any task
/// fails.
pub fn run(global: &GlobalOpts, opts: &DeployOpts, shared: &Shared) -> Result<()> {
    shared
        .log
        .info(&format!("syscfg {}", super::version::string()));
    let session = Session::init(global, &*shared.log)?;
    let ctx = session.context(global, shared);
    super::prepare_mutation(&session, global, &ctx)?;

    let all_tasks = tasks::all_deploy_tasks();
    let selected = select(&all_tasks, &opts.skip, &opts.only);
    super::run_tasks_to_completion(selected, &ctx, &shared.log)
}

/// Filter by `--only` (takes precedence) and `--skip`, matching
/// case-insensitive substrings of task names.
fn select<'a>(all: &'a [Box<dyn Task>], skip: &[String], only: &[String]) -> Vec<&'a dyn Task> {
    all.iter()
        .filter(|t| {
            let name = t.name().to_lowercase();
            if !only.is_empty() {
                return only.iter().any(|o| name.contains(&o.to_lowercase()));
            }
            if !skip.is_empty() {
                return !skip.iter().any(|s| name.contains(&s.to_lowercase()));
            }
            true
        })
        .map(AsRef::as_ref)
        .collect()
}
