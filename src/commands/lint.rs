//! Command: check the catalog for internal consistency.
use anyhow::Result;

use super::{Session, Shared};
use crate::catalog::lint;
use crate::cli::GlobalOpts;

/// Run the lint command.
///
/// # Errors
///
/// Returns an error if setup fails or any finding is reported.
pub fn run(global: &GlobalOpts, shared: &Shared) -> Result<()> {
    let log = &shared.log;
    let session = Session::init(global, &**log)?;

    log.stage("Linting catalog");
    let findings = lint(&session.catalog);
    if global.json {
        super::print_json(&findings)?;
    } else {
        for finding in &findings {
            log.error(&format!("{}: {}", finding.path.display(), finding.message));
        }
    }

    if findings.is_empty() {
        log.info(&format!(
            "{} configuration files, no findings",
            session.catalog.artifacts().len()
        ));
        Ok(())
    } else {
        anyhow::bail!("{} lint finding(s)", findings.len())
    }
}
