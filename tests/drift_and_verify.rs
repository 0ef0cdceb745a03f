#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for drift detection, static verification and the
//! symlink-safe install path against a temporary system root.

mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use common::{StagingRoot, current_owner};
use syscfg::catalog::Privilege;
use syscfg::diff::{EntryStatus, diff_path};
use syscfg::exec::SystemExecutor;
use syscfg::logging::MemoryLog;
use syscfg::platform::FixedProbe;
use syscfg::resources::InstallOutcome;
use syscfg::resources::installer::Installer;
use syscfg::verify::Status;
use syscfg::verify::static_checks::{StaticEnv, verify_static};

fn status_of(report: &syscfg::verify::VerificationReport, suffix: &str) -> Status {
    report
        .results
        .iter()
        .find(|r| r.description.ends_with(suffix))
        .expect("result with this description")
        .status
}

// ---------------------------------------------------------------------------
// The /etc/example.conf scenario
// ---------------------------------------------------------------------------

/// Catalog says `KEY=1`, the installed file says `KEY=2`: the diff shows the
/// change, static verification fails the checksum, deploying converges, and
/// verification then passes.
#[test]
fn example_conf_drift_is_detected_and_repaired() {
    let root = StagingRoot::new();
    let path = root.system("/etc/example.conf");
    let catalog = root.single("/etc/example.conf", &["KEY=1"]);
    let access = root.access();
    let probe = FixedProbe::new();
    let log = MemoryLog::new();

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "KEY=2\n").unwrap();

    let status = diff_path(&catalog, &probe, &access, &path).unwrap();
    assert!(matches!(&status, EntryStatus::Differs { .. }), "{status:?}");
    if let EntryStatus::Differs { diff } = status {
        assert!(diff.contains("-KEY=2"), "{diff}");
        assert!(diff.contains("+KEY=1"), "{diff}");
    }

    let env = StaticEnv {
        catalog: &catalog,
        probe: &probe,
        access: &access,
        executor: &SystemExecutor,
        live: false,
    };
    let report = verify_static(&env);
    assert_eq!(status_of(&report, "checksum"), Status::Fail);
    assert_eq!(status_of(&report, "contains KEY=1"), Status::Fail);
    assert_eq!(report.overall, Status::Fail);
    assert!(!report.summary.passed());

    let installer = Installer::new(&catalog, &probe, &access, &log);
    let outcome = installer.install(&path, Privilege::System).unwrap();
    assert!(outcome.changed());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "KEY=1\n");

    assert_eq!(
        diff_path(&catalog, &probe, &access, &path).unwrap(),
        EntryStatus::Match
    );
    let report = verify_static(&env);
    assert_eq!(status_of(&report, "checksum"), Status::Ok);
    assert!(report.summary.passed(), "{report:#?}");
}

/// A missing destination is reported as not installed and fails the
/// existence check without further file checks.
#[test]
fn missing_destination_fails_existence_only() {
    let root = StagingRoot::new();
    let path = root.system("/etc/example.conf");
    let catalog = root.single("/etc/example.conf", &["KEY=1"]);
    let access = root.access();
    let probe = FixedProbe::new();

    assert_eq!(
        diff_path(&catalog, &probe, &access, &path).unwrap(),
        EntryStatus::NotInstalled
    );
    let report = verify_static(&StaticEnv {
        catalog: &catalog,
        probe: &probe,
        access: &access,
        executor: &SystemExecutor,
        live: false,
    });
    assert_eq!(status_of(&report, "exists"), Status::Fail);
    assert!(!report.results.iter().any(|r| r.description.ends_with("checksum")));
}

// ---------------------------------------------------------------------------
// Symlink safety
// ---------------------------------------------------------------------------

/// A symlink planted at the temporary path is refused; neither its target
/// nor the destination is touched.
#[test]
fn planted_symlink_at_temp_path_is_refused() {
    let root = StagingRoot::new();
    let path = root.system("/etc/example.conf");
    let catalog = root.single("/etc/example.conf", &["KEY=1"]);
    let access = root.access();
    let probe = FixedProbe::new();
    let log = MemoryLog::new();

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "KEY=2\n").unwrap();
    let victim = root.path().join("victim");
    std::fs::write(&victim, "precious\n").unwrap();
    let temp: PathBuf = path.with_file_name(".example.conf.planted");
    std::os::unix::fs::symlink(&victim, &temp).unwrap();

    let fixed = temp.clone();
    let installer = Installer::new(&catalog, &probe, &access, &log)
        .with_temp_namer(move |_: &Path| fixed.clone());
    let err = installer.install(&path, Privilege::System).unwrap_err();

    assert!(err.is_security(), "{err}");
    assert_eq!(std::fs::read_to_string(&victim).unwrap(), "precious\n");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "KEY=2\n");
}

/// A symlink at the destination itself is replaced by a regular file, and
/// the file it pointed to keeps its content.
#[test]
fn destination_symlink_is_replaced_not_followed() {
    let root = StagingRoot::new();
    let path = root.system("/etc/example.conf");
    let catalog = root.single("/etc/example.conf", &["KEY=1"]);
    let access = root.access();
    let probe = FixedProbe::new();
    let log = MemoryLog::new();

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let victim = root.path().join("victim");
    std::fs::write(&victim, "precious\n").unwrap();
    std::os::unix::fs::symlink(&victim, &path).unwrap();

    let outcome = Installer::new(&catalog, &probe, &access, &log)
        .install(&path, Privilege::System)
        .unwrap();
    assert!(matches!(outcome, InstallOutcome::Applied { .. }));
    assert!(!std::fs::symlink_metadata(&path).unwrap().file_type().is_symlink());
    assert_eq!(std::fs::read_to_string(&victim).unwrap(), "precious\n");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "KEY=1\n");
}

/// A file with the right content but a drifted mode is repaired by the next
/// deploy, and the permission check passes again.
#[test]
fn redeploy_repairs_drifted_mode() {
    use std::os::unix::fs::{MetadataExt as _, PermissionsExt as _};

    let root = StagingRoot::new();
    let path = root.system("/etc/example.conf");
    let catalog = root.single("/etc/example.conf", &["KEY=1"]);
    let access = root.access();
    let probe = FixedProbe::new();
    let log = MemoryLog::new();
    let installer = Installer::new(&catalog, &probe, &access, &log);
    let env = StaticEnv {
        catalog: &catalog,
        probe: &probe,
        access: &access,
        executor: &SystemExecutor,
        live: false,
    };

    installer.install(&path, Privilege::System).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
    assert_eq!(status_of(&verify_static(&env), "permissions"), Status::Fail);

    let outcome = installer.install(&path, Privilege::System).unwrap();
    assert!(matches!(outcome, InstallOutcome::Repaired { .. }), "{outcome:?}");
    assert_eq!(std::fs::metadata(&path).unwrap().mode() & 0o7777, 0o644);

    let report = verify_static(&env);
    assert_eq!(status_of(&report, "permissions"), Status::Ok);
    assert!(report.summary.passed(), "{report:#?}");
}

/// Installed files carry mode 0644 and the configured owner.
#[test]
fn installed_file_has_expected_permissions() {
    use std::os::unix::fs::MetadataExt as _;

    let root = StagingRoot::new();
    let path = root.system("/etc/example.conf");
    let catalog = root.single("/etc/example.conf", &["KEY=1"]);
    let access = root.access();
    let probe = FixedProbe::new();
    let log = MemoryLog::new();

    Installer::new(&catalog, &probe, &access, &log)
        .install(&path, Privilege::System)
        .unwrap();
    let meta = std::fs::metadata(&path).unwrap();
    assert_eq!(meta.mode() & 0o7777, 0o644);
    assert_eq!(meta.uid(), current_owner().uid);
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

fn numbered(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{i:06}")).collect()
}

/// A reader polling the destination while it is replaced over and over
/// only ever sees one complete version or the other.
#[test]
fn concurrent_reader_never_sees_partial_content() {
    let root = StagingRoot::new();
    let path = root.system("/etc/example.conf");
    let first = numbered("first-", 20_000);
    let second = numbered("second-", 5_000);
    let first_refs: Vec<&str> = first.iter().map(String::as_str).collect();
    let second_refs: Vec<&str> = second.iter().map(String::as_str).collect();
    let catalogs = [
        root.single("/etc/example.conf", &first_refs),
        root.single("/etc/example.conf", &second_refs),
    ];
    let versions: Vec<Vec<u8>> = catalogs
        .iter()
        .map(|c| c.content(&path).unwrap())
        .collect();
    let access = root.access();
    let probe = FixedProbe::new();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let log = MemoryLog::new();
            for round in 0..40 {
                let catalog = &catalogs[round % 2];
                Installer::new(catalog, &probe, &access, &log)
                    .install(&path, Privilege::System)
                    .unwrap();
            }
            done.store(true, Ordering::Release);
        });

        while !done.load(Ordering::Acquire) {
            if let Ok(bytes) = std::fs::read(&path) {
                assert!(
                    versions.contains(&bytes),
                    "read {} bytes matching neither version",
                    bytes.len()
                );
            }
        }
    });

    assert_eq!(std::fs::read(&path).unwrap(), versions[1]);
}
