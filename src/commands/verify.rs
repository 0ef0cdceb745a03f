//! Commands: static and runtime verification.
use anyhow::Result;

use super::{Session, Shared};
use crate::cli::GlobalOpts;
use crate::logging::Log;
use crate::verify::runtime::{RuntimeEnv, verify_runtime};
use crate::verify::static_checks::{StaticEnv, verify_static};
use crate::verify::{Status, VerificationReport};

/// Check installed files against the catalog.
///
/// # Errors
///
/// Returns an error if setup fails or any check reports FAIL.
pub fn run_static(global: &GlobalOpts, shared: &Shared) -> Result<()> {
    let log = &shared.log;
    let session = Session::init(global, &**log)?;
    log.stage("Verifying installed files");
    let report = verify_static(&StaticEnv {
        catalog: &session.catalog,
        probe: session.probe.as_ref(),
        access: &session.access,
        executor: session.executor.as_ref(),
        live: !session.staging,
    });
    present(global, &report, &**log)
}

/// Check that the running kernel and services reflect the installed
/// configuration.
///
/// # Errors
///
/// Returns an error if setup fails or any check reports FAIL.
pub fn run_runtime(global: &GlobalOpts, shared: &Shared) -> Result<()> {
    let log = &shared.log;
    let session = Session::init(global, &**log)?;
    if session.staging {
        log.warn("runtime checks read the running system, not the system root");
    }
    log.stage("Verifying running system");
    let report = verify_runtime(&RuntimeEnv::live(
        &session.catalog,
        session.probe.as_ref(),
        session.executor.as_ref(),
    ));
    present(global, &report, &**log)
}

fn present(global: &GlobalOpts, report: &VerificationReport, log: &dyn Log) -> Result<()> {
    if global.json {
        super::print_json(report)?;
    } else {
        show(report, log);
    }
    if report.summary.passed() {
        Ok(())
    } else {
        anyhow::bail!("{} check(s) failed", report.summary.fail)
    }
}

fn show(report: &VerificationReport, log: &dyn Log) {
    let mut group = "";
    for result in &report.results {
        if result.group != group {
            group = &result.group;
            log.info(&format!("[{group}]"));
        }
        let line = if result.message.is_empty() {
            format!("{:<4} {}", result.status, result.description)
        } else {
            format!(
                "{:<4} {}: {}",
                result.status, result.description, result.message
            )
        };
        match result.status {
            Status::Fail => log.error(&line),
            Status::Warn => log.warn(&line),
            Status::Ok | Status::Info => log.info(&line),
        }
    }
    let s = &report.summary;
    log.info(&format!(
        "{} ok, {} warn, {} fail, {} info: {}",
        s.ok, s.warn, s.fail, s.info, report.overall
    ));
}
