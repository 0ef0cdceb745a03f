//! Command: show how installed files differ from the catalog.
use std::io::Write as _;

use anyhow::{Context as _, Result};

use super::{Session, Shared};
use crate::cli::{DiffOpts, GlobalOpts};
use crate::diff::{DiffEntry, DiffReport, EntryStatus, diff_catalog, diff_path};
use crate::logging::Log;

/// Run the diff command. Never writes anything.
///
/// # Errors
///
/// Returns an error if setup or rendering fails, the path is not a catalog
/// destination, or any applicable destination is missing or differs.
pub fn run(global: &GlobalOpts, opts: &DiffOpts, shared: &Shared) -> Result<()> {
    let log = &shared.log;
    let session = Session::init(global, &**log)?;
    let probe = session.probe.as_ref();

    log.stage("Comparing installed files");
    let report = match &opts.path {
        Some(path) => {
            let destination = session.destination(path);
            let privilege = session.catalog.get(&destination)?.privilege;
            let status = diff_path(&session.catalog, probe, &session.access, &destination)?;
            DiffReport {
                entries: vec![DiffEntry {
                    path: destination,
                    privilege,
                    status,
                }],
            }
        }
        None => diff_catalog(&session.catalog, probe, &session.access)?,
    };

    if global.json {
        super::print_json(&report)?;
    } else {
        show(&report, &**log)?;
    }

    log.info(&summary(&report));
    if report.all_match() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} file(s) differ from the catalog",
            report.divergent().count()
        )
    }
}

fn show(report: &DiffReport, log: &dyn Log) -> Result<()> {
    let mut out = std::io::stdout().lock();
    for entry in &report.entries {
        let path = entry.path.display();
        match &entry.status {
            EntryStatus::Match => log.debug(&format!("ok: {path}")),
            EntryStatus::NotApplicable => log.debug(&format!("not applicable: {path}")),
            EntryStatus::NotInstalled => log.warn(&format!("not installed: {path}")),
            EntryStatus::Differs { diff } => {
                log.warn(&format!("differs: {path}"));
                out.write_all(diff.as_bytes()).context("writing diff")?;
            }
        }
    }
    Ok(())
}

fn summary(report: &DiffReport) -> String {
    format!(
        "{} match, {} differ, {} not installed, {} not applicable",
        report.count(|s| matches!(s, EntryStatus::Match)),
        report.count(|s| matches!(s, EntryStatus::Differs { .. })),
        report.count(|s| matches!(s, EntryStatus::NotInstalled)),
        report.count(|s| matches!(s, EntryStatus::NotApplicable)),
    )
}
