//! Read-only comparison of rendered catalog content against installed files.
//!
//! A failed read is the only existence signal: the engine never checks for
//! a file before reading it.
use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;

use crate::catalog::{Catalog, ConfigArtifact, Privilege};
use crate::error::CatalogError;
use crate::platform::SystemProbe;
use crate::resources::fs_ops::Access;

/// How one destination compares with its rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    /// Installed bytes equal the rendering.
    Match,
    /// The destination could not be read.
    NotInstalled,
    /// Installed content differs.
    Differs {
        /// Unified diff from installed to desired.
        diff: String,
    },
    /// The artifact does not apply here and nothing is installed.
    NotApplicable,
}

impl EntryStatus {
    /// Whether this entry counts as converged.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Match | Self::NotApplicable)
    }
}

/// Comparison result for one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    /// Destination path.
    pub path: PathBuf,
    /// Privilege class used to read it.
    pub privilege: Privilege,
    /// Outcome.
    #[serde(flatten)]
    pub status: EntryStatus,
}

/// Comparison of every catalog destination, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    /// Per-destination results.
    pub entries: Vec<DiffEntry>,
}

impl DiffReport {
    /// Whether every applicable destination matches.
    #[must_use]
    pub fn all_match(&self) -> bool {
        self.entries.iter().all(|e| e.status.is_ok())
    }

    /// Entries that are missing or differ.
    pub fn divergent(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| !e.status.is_ok())
    }

    /// Count of entries with the given status kind.
    #[must_use]
    pub fn count(&self, matches: impl Fn(&EntryStatus) -> bool) -> usize {
        self.entries.iter().filter(|e| matches(&e.status)).count()
    }
}

/// Compare every destination of `catalog`.
///
/// # Errors
///
/// Returns a [`CatalogError`] if any artifact fails to render.
pub fn diff_catalog(
    catalog: &Catalog,
    probe: &dyn SystemProbe,
    access: &Access,
) -> Result<DiffReport, CatalogError> {
    let entries = catalog
        .artifacts()
        .iter()
        .map(|artifact| {
            Ok(DiffEntry {
                path: artifact.destination.clone(),
                privilege: artifact.privilege,
                status: compare(catalog, artifact, probe, access)?,
            })
        })
        .collect::<Result<_, CatalogError>>()?;
    Ok(DiffReport { entries })
}

/// Compare a single destination.
///
/// # Errors
///
/// Returns [`CatalogError::NotDefined`] for unknown paths and any rendering
/// error.
pub fn diff_path(
    catalog: &Catalog,
    probe: &dyn SystemProbe,
    access: &Access,
    path: &Path,
) -> Result<EntryStatus, CatalogError> {
    compare(catalog, catalog.get(path)?, probe, access)
}

fn compare(
    catalog: &Catalog,
    artifact: &ConfigArtifact,
    probe: &dyn SystemProbe,
    access: &Access,
) -> Result<EntryStatus, CatalogError> {
    let path = artifact.destination.as_path();
    let desired = catalog.content(path)?;
    let Ok(actual) = access.ops(artifact.privilege).read(path) else {
        return Ok(if catalog.applies(artifact, probe) {
            EntryStatus::NotInstalled
        } else {
            EntryStatus::NotApplicable
        });
    };
    if actual == desired {
        return Ok(EntryStatus::Match);
    }
    Ok(EntryStatus::Differs {
        diff: unified(path, &actual, &desired),
    })
}

/// Unified line diff turning `actual` into `desired`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use syscfg::diff::unified;
///
/// let diff = unified(Path::new("/etc/a.conf"), b"KEY=2\n", b"KEY=1\n");
/// assert!(diff.contains("-KEY=2"));
/// assert!(diff.contains("+KEY=1"));
/// ```
#[must_use]
pub fn unified(path: &Path, actual: &[u8], desired: &[u8]) -> String {
    let actual = String::from_utf8_lossy(actual);
    let desired = String::from_utf8_lossy(desired);
    let installed = format!("{} (installed)", path.display());
    let wanted = format!("{} (desired)", path.display());
    TextDiff::from_lines(actual.as_ref(), desired.as_ref())
        .unified_diff()
        .context_radius(3)
        .header(&installed, &wanted)
        .to_string()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::catalog::{Applicability, Renderer};
    use crate::config::ConfigurationState;
    use crate::platform::FixedProbe;
    use crate::resources::fs_ops::Owner;
    use std::fs;

    fn setup() -> (tempfile::TempDir, Catalog, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let example = tmp.path().join("example.conf");
        let gated = tmp.path().join("gated.conf");
        let catalog = Catalog::from_artifacts(
            vec![
                crate::catalog::ConfigArtifact::new(
                    &example,
                    Privilege::System,
                    Renderer::fixed(&["KEY=1"]),
                ),
                crate::catalog::ConfigArtifact::new(
                    &gated,
                    Privilege::System,
                    Renderer::fixed(&["x"]),
                )
                .when(Applicability::Packages(vec!["iwd".into()])),
            ],
            ConfigurationState::new(),
        );
        (tmp, catalog, example, gated)
    }

    #[test]
    fn missing_file_is_not_installed() {
        let (_tmp, catalog, example, gated) = setup();
        let access = Access::local(Owner::ROOT);
        let report = diff_catalog(&catalog, &FixedProbe::new(), &access).unwrap();
        assert_eq!(report.entries[0].status, EntryStatus::NotInstalled);
        assert_eq!(report.entries[1].status, EntryStatus::NotApplicable);
        assert!(!report.all_match());
        assert_eq!(report.divergent().count(), 1);
        assert_eq!(report.entries[0].path, example);
        assert_eq!(report.entries[1].path, gated);
    }

    #[test]
    fn identical_file_matches() {
        let (_tmp, catalog, example, _) = setup();
        fs::write(&example, "KEY=1\n").unwrap();
        let access = Access::local(Owner::ROOT);
        let report = diff_catalog(&catalog, &FixedProbe::new(), &access).unwrap();
        assert!(report.all_match());
    }

    #[test]
    fn changed_file_reports_diff() {
        let (_tmp, catalog, example, _) = setup();
        fs::write(&example, "KEY=2\n").unwrap();
        let access = Access::local(Owner::ROOT);
        let status = diff_path(&catalog, &FixedProbe::new(), &access, &example).unwrap();
        assert!(matches!(status, EntryStatus::Differs { .. }), "{status:?}");
        if let EntryStatus::Differs { diff } = status {
            assert!(diff.contains("-KEY=2"));
            assert!(diff.contains("+KEY=1"));
            assert!(diff.contains("(installed)"));
        }
    }

    #[test]
    fn report_serializes_with_status_tag() {
        let report = DiffReport {
            entries: vec![DiffEntry {
                path: PathBuf::from("/etc/a.conf"),
                privilege: Privilege::System,
                status: EntryStatus::NotInstalled,
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        insta::assert_snapshot!(json, @r#"{"entries":[{"path":"/etc/a.conf","privilege":"system","status":"not_installed"}]}"#);
    }
}
