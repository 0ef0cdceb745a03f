//! Self-consistency checks over a catalog and its configuration state.
use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use super::{Applicability, Catalog};
use crate::platform::KernelVersion;

/// A problem found by [`lint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintFinding {
    /// Destination the finding is about.
    pub path: PathBuf,
    /// What is wrong.
    pub message: String,
}

impl LintFinding {
    fn new(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Check every artifact of `catalog`. An empty result means the catalog is
/// safe to deploy.
///
/// Checked: destinations are absolute and unique, every artifact renders
/// deterministically to non-empty content without unresolved placeholders,
/// no key repeats within one `[section]`, no line has trailing whitespace,
/// and kernel gates name a parseable version.
#[must_use]
pub fn lint(catalog: &Catalog) -> Vec<LintFinding> {
    let mut findings = Vec::new();
    let mut seen = HashSet::new();

    for artifact in catalog.artifacts() {
        let path = artifact.destination.as_path();
        if !path.is_absolute() {
            findings.push(LintFinding::new(path, "destination is not absolute"));
        }
        if !seen.insert(path) {
            findings.push(LintFinding::new(path, "duplicate destination"));
        }
        if let Applicability::MinKernel { group, key } = &artifact.applicability
            && catalog
                .state()
                .value(group, key)
                .and_then(|v| v.parse::<KernelVersion>().ok())
                .is_none()
        {
            findings.push(LintFinding::new(
                path,
                format!("{group}.{key} is not a kernel version"),
            ));
        }

        let lines = match catalog.render(path) {
            Ok(lines) => lines,
            Err(e) => {
                findings.push(LintFinding::new(path, e.to_string()));
                continue;
            }
        };
        if lines.is_empty() {
            findings.push(LintFinding::new(path, "renders no content"));
        }
        if catalog.render(path).ok().as_ref() != Some(&lines) {
            findings.push(LintFinding::new(path, "rendering is not deterministic"));
        }
        for (n, line) in lines.iter().enumerate() {
            if line.ends_with(char::is_whitespace) {
                findings.push(LintFinding::new(
                    path,
                    format!("line {} has trailing whitespace", n + 1),
                ));
            }
        }
        for key in duplicate_section_keys(&lines) {
            findings.push(LintFinding::new(path, format!("duplicate key {key}")));
        }
    }
    findings
}

/// Keys repeated within one `[section]`, reported as `section.key`.
/// Lines before the first section header are not checked.
fn duplicate_section_keys(lines: &[String]) -> Vec<String> {
    let mut duplicates = Vec::new();
    let mut section: Option<&str> = None;
    let mut keys = HashSet::new();
    for line in lines {
        let trimmed = line.trim();
        if let Some(name) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            section = Some(name);
            keys.clear();
            continue;
        }
        let Some(current) = section else {
            continue;
        };
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if let Some((key, _)) = trimmed.split_once('=')
            && !keys.insert(key.trim())
        {
            duplicates.push(format!("{current}.{}", key.trim()));
        }
    }
    duplicates
}
