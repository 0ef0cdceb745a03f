//! Checks of persisted configuration: file presence, content, permissions
//! and checksums, plus package presence and unit enablement.
//!
//! The checksum is authoritative. Line checks are diagnostic detail: a line
//! FAIL on a destination whose checksum matches is reported as WARN, and a
//! checksum FAIL stands even when every line was found.
use std::fmt;
use std::path::{Path, PathBuf};

use super::checksum::sha256;
use super::normalize::values_equal;
use super::runtime::{UnitEnablement, unit_enablement};
use super::{ReportKind, Status, VerificationReport, VerificationResult, VerifyContext};
use crate::catalog::{Catalog, ConfigArtifact, Privilege, content_bytes, paths};
use crate::exec::Executor;
use crate::platform::SystemProbe;
use crate::resources::fs_ops::{Access, EntryKind};
use crate::resources::installer::INSTALL_MODE;

const GROUP_PACKAGES: &str = "package presence";
const GROUP_SERVICES: &str = "service state";
const GROUP_PERMISSIONS: &str = "file permissions";
const GROUP_CHECKSUMS: &str = "checksums";
const GROUP_MODULES: &str = "kernel modules";

/// Everything the static checks read from.
pub struct StaticEnv<'a> {
    /// Desired content.
    pub catalog: &'a Catalog,
    /// Package and kernel queries.
    pub probe: &'a dyn SystemProbe,
    /// Privilege-appropriate file access.
    pub access: &'a Access,
    /// Runs `systemctl`.
    pub executor: &'a dyn Executor,
    /// Whether the catalog targets the running system (not a staging root).
    pub live: bool,
}

impl fmt::Debug for StaticEnv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticEnv")
            .field("artifacts", &self.catalog.artifacts().len())
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

/// Result of evaluating one assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Status.
    pub status: Status,
    /// Detail.
    pub message: String,
}

impl Outcome {
    fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// OK with no detail.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(Status::Ok, "")
    }

    /// FAIL with a reason.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(Status::Fail, message)
    }

    /// INFO with a reason.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Status::Info, message)
    }
}

/// Predicate evaluated by [`Assertion::Custom`].
pub type Predicate = Box<dyn Fn(&StaticEnv<'_>) -> Outcome + Send + Sync>;

/// A single statement about persisted state.
pub enum Assertion {
    /// A regular file exists at `path`.
    FileExists {
        /// Destination.
        path: PathBuf,
        /// Privilege used to inspect it.
        privilege: Privilege,
    },
    /// `path` contains a line equal to `line`.
    ContainsLine {
        /// Destination.
        path: PathBuf,
        /// Privilege used to read it.
        privilege: Privilege,
        /// Expected line, without the newline.
        line: String,
    },
    /// Anything else.
    Custom(Predicate),
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileExists { path, .. } => write!(f, "FileExists({})", path.display()),
            Self::ContainsLine { path, line, .. } => {
                write!(f, "ContainsLine({}, {line:?})", path.display())
            }
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Assertion {
    /// Evaluate against `env`.
    #[must_use]
    pub fn evaluate(&self, env: &StaticEnv<'_>) -> Outcome {
        match self {
            Self::FileExists { path, privilege } => match env.access.ops(*privilege).kind(path) {
                Ok(EntryKind::Regular) => Outcome::ok(),
                Ok(EntryKind::Missing) => Outcome::fail("missing"),
                Ok(kind) => Outcome::fail(format!("is a {kind}, expected a regular file")),
                Err(e) => Outcome::fail(format!("cannot inspect: {e}")),
            },
            Self::ContainsLine {
                path,
                privilege,
                line,
            } => match env.access.ops(*privilege).read(path) {
                Ok(bytes) if String::from_utf8_lossy(&bytes).lines().any(|l| l == line) => {
                    Outcome::ok()
                }
                Ok(_) => Outcome::fail(format!("line not found: {line}")),
                Err(e) => Outcome::fail(format!("cannot read: {e}")),
            },
            Self::Custom(predicate) => predicate(env),
        }
    }
}

/// A named assertion.
#[derive(Debug)]
pub struct Check {
    /// Subsystem.
    pub group: String,
    /// What is checked.
    pub description: String,
    /// The assertion.
    pub assertion: Assertion,
}

impl Check {
    fn custom(
        group: &str,
        description: String,
        predicate: impl Fn(&StaticEnv<'_>) -> Outcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            group: group.to_string(),
            description,
            assertion: Assertion::Custom(Box::new(predicate)),
        }
    }

    fn run(&self, env: &StaticEnv<'_>) -> VerificationResult {
        let outcome = self.assertion.evaluate(env);
        VerificationResult {
            group: self.group.clone(),
            description: self.description.clone(),
            status: outcome.status,
            message: outcome.message,
        }
    }
}

/// Subsystem an artifact is reported under.
#[must_use]
pub fn subsystem(artifact: &ConfigArtifact) -> &'static str {
    if artifact.privilege == Privilege::User {
        return "user files";
    }
    let path = artifact.destination.to_string_lossy();
    if path.contains("/boot/") || path.contains("/etc/kernel/") || path.contains("mkinitcpio") {
        "boot loader"
    } else if path.contains("modprobe.d") || path.contains("modules-load.d") || path.contains("udev")
    {
        GROUP_MODULES
    } else if path.contains("/iwd/")
        || path.contains("NetworkManager")
        || path.contains("wireless-regdom")
    {
        "network backend"
    } else {
        "systemd drop-ins"
    }
}

/// Find a built-in artifact by its logical path (`/etc/...`), wherever the
/// system root put it.
#[must_use]
pub fn find_artifact<'c>(catalog: &'c Catalog, logical: &str) -> Option<&'c ConfigArtifact> {
    let relative = Path::new(logical.trim_start_matches('/'));
    catalog
        .artifacts()
        .iter()
        .find(|a| a.destination.ends_with(relative))
}

/// Run every static check.
#[must_use]
pub fn verify_static(env: &StaticEnv<'_>) -> VerificationReport {
    let mut ctx = VerifyContext::new();
    for artifact in env.catalog.artifacts() {
        check_artifact(env, artifact, &mut ctx);
    }
    check_module_consistency(env, &mut ctx);
    for check in package_checks(env.catalog).into_iter().chain(service_checks(env.catalog)) {
        ctx.extend([check.run(env)]);
    }
    ctx.finish(ReportKind::Static)
}

fn check_artifact(env: &StaticEnv<'_>, artifact: &ConfigArtifact, ctx: &mut VerifyContext) {
    let group = subsystem(artifact);
    let path = artifact.destination.as_path();
    let shown = path.display().to_string();

    if !env.catalog.applies(artifact, env.probe) {
        ctx.record(
            group,
            shown,
            Status::Info,
            format!("not applicable: {}", env.catalog.requirement(artifact)),
        );
        return;
    }

    let exists = Check {
        group: group.to_string(),
        description: format!("{shown} exists"),
        assertion: Assertion::FileExists {
            path: path.to_path_buf(),
            privilege: artifact.privilege,
        },
    }
    .run(env);
    let present = exists.status == Status::Ok;
    ctx.extend([exists]);
    if !present {
        return;
    }

    let desired_lines = match env.catalog.render(path) {
        Ok(lines) => lines,
        Err(e) => {
            ctx.record(group, format!("{shown} renders"), Status::Fail, e.to_string());
            return;
        }
    };

    let mut line_results: Vec<VerificationResult> = desired_lines
        .iter()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| {
            Check {
                group: group.to_string(),
                description: format!("{shown} contains {line}"),
                assertion: Assertion::ContainsLine {
                    path: path.to_path_buf(),
                    privilege: artifact.privilege,
                    line: line.clone(),
                },
            }
            .run(env)
        })
        .collect();

    let ops = env.access.ops(artifact.privilege);
    let desired = sha256(&content_bytes(&desired_lines));
    let checksum = match ops.read(path) {
        Ok(actual) => {
            let installed = sha256(&actual);
            if installed == desired {
                Outcome::ok()
            } else {
                Outcome::fail(format!("installed {installed} differs from rendered {desired}"))
            }
        }
        Err(e) => Outcome::fail(format!("cannot read: {e}")),
    };

    if checksum.status == Status::Ok {
        for result in line_results.iter_mut().filter(|r| r.status == Status::Fail) {
            result.status = Status::Warn;
            result.message = format!("{}; checksum matches, line check is advisory", result.message);
        }
    }
    ctx.extend(line_results);
    ctx.record(
        GROUP_CHECKSUMS,
        format!("{shown} checksum"),
        checksum.status,
        checksum.message,
    );

    check_permissions(env, artifact, &shown, ctx);
}

fn check_permissions(
    env: &StaticEnv<'_>,
    artifact: &ConfigArtifact,
    shown: &str,
    ctx: &mut VerifyContext,
) {
    let ops = env.access.ops(artifact.privilege);
    let path = artifact.destination.as_path();
    let owner = env.access.owner(artifact.privilege);
    match ops.metadata(path) {
        Ok(meta) => {
            let mut problems = Vec::new();
            if meta.mode != INSTALL_MODE {
                problems.push(format!("mode {:04o}, expected {INSTALL_MODE:04o}", meta.mode));
            }
            if meta.uid != owner.uid || meta.gid != owner.gid {
                problems.push(format!("owner {}:{}, expected {owner}", meta.uid, meta.gid));
            }
            let status = if problems.is_empty() {
                Status::Ok
            } else {
                Status::Fail
            };
            ctx.record(
                GROUP_PERMISSIONS,
                format!("{shown} permissions"),
                status,
                problems.join(", "),
            );
        }
        Err(e) => ctx.record(
            GROUP_PERMISSIONS,
            format!("{shown} permissions"),
            Status::Fail,
            format!("cannot stat: {e}"),
        ),
    }
}

/// `module.param=value` tokens of a kernel command line.
fn cmdline_module_params(cmdline: &str) -> Vec<(String, String, String)> {
    cmdline
        .split_whitespace()
        .filter_map(|token| {
            let (name, value) = token.split_once('=')?;
            let (module, param) = name.split_once('.')?;
            Some((module.replace('-', "_"), param.to_string(), value.to_string()))
        })
        .collect()
}

/// `(module, param, value)` triples from `options` lines.
#[must_use]
pub fn modprobe_options(content: &str) -> Vec<(String, String, String)> {
    content
        .lines()
        .filter_map(|line| line.trim().strip_prefix("options "))
        .flat_map(|rest| {
            let mut words = rest.split_whitespace();
            let module = words.next().unwrap_or_default().replace('-', "_");
            words
                .filter_map(|w| w.split_once('='))
                .map(|(k, v)| (module.clone(), k.to_string(), v.to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// A parameter set both on the kernel command line and in modprobe options
/// must agree, whatever base each spells it in.
fn check_module_consistency(env: &StaticEnv<'_>, ctx: &mut VerifyContext) {
    let read = |logical: &str| {
        let artifact = find_artifact(env.catalog, logical)?;
        let bytes = env.access.ops(artifact.privilege).read(&artifact.destination).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    };
    let (Some(cmdline), Some(options)) = (read(paths::KERNEL_CMDLINE), read(paths::MODPROBE_OPTIONS))
    else {
        return;
    };
    let options = modprobe_options(&options);
    for (module, param, value) in cmdline_module_params(&cmdline) {
        let Some((_, _, option)) = options
            .iter()
            .find(|(m, p, _)| *m == module && *p == param)
        else {
            continue;
        };
        let description = format!("{module}.{param} agrees between cmdline and modprobe");
        if values_equal(&value, option) {
            ctx.record(GROUP_MODULES, description, Status::Ok, "");
        } else {
            ctx.record(
                GROUP_MODULES,
                description,
                Status::Fail,
                format!("cmdline {value}, modprobe {option}"),
            );
        }
    }
}

fn package_checks(catalog: &Catalog) -> Vec<Check> {
    let state = catalog.state();
    let required = state.scalars("packages").map(|p| (p.to_string(), true));
    let optional = state
        .scalars("optional_packages")
        .map(|p| (p.to_string(), false));
    required
        .chain(optional)
        .map(|(package, needed)| {
            let description = format!("package {package} installed");
            Check::custom(GROUP_PACKAGES, description, move |env| {
                if env.probe.package_installed(&package) {
                    Outcome::ok()
                } else if needed {
                    Outcome::fail("not installed")
                } else {
                    Outcome::info("optional package not installed")
                }
            })
        })
        .collect()
}

fn service_checks(catalog: &Catalog) -> Vec<Check> {
    let state = catalog.state();
    let ours = state.scalars("units").map(|u| (u.to_string(), true));
    let system = state
        .scalars("system_services")
        .map(|u| (u.to_string(), false));
    ours.chain(system)
        .map(|(unit, managed)| {
            let description = format!("{unit} enabled");
            Check::custom(GROUP_SERVICES, description, move |env| {
                if !env.live {
                    return Outcome::info("not checked against a staging root");
                }
                match unit_enablement(env.executor, &unit) {
                    UnitEnablement::Unavailable => Outcome::info("systemctl not available"),
                    UnitEnablement::Enabled => Outcome::ok(),
                    UnitEnablement::Masked => Outcome::fail("masked"),
                    UnitEnablement::Disabled => Outcome::fail("not enabled"),
                    UnitEnablement::NotFound if managed => Outcome::fail("unit not installed"),
                    UnitEnablement::NotFound => Outcome::info("not installed"),
                }
            })
        })
        .collect()
}
