//! Host facts: running kernel, distribution, effective and invoking user.
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use nix::unistd::{Uid, User};

use crate::exec::Executor;

/// Kernel release reduced to its numeric `major.minor.patch` prefix.
///
/// # Examples
///
/// ```
/// use syscfg::platform::KernelVersion;
///
/// let running: KernelVersion = "6.14.2-arch1-1".parse().unwrap();
/// let minimum: KernelVersion = "6.14".parse().unwrap();
/// assert!(running >= minimum);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KernelVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch level, 0 when absent.
    pub patch: u32,
}

impl KernelVersion {
    /// Construct a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for KernelVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let numeric = s
            .trim()
            .split(|c: char| !c.is_ascii_digit() && c != '.')
            .next()
            .unwrap_or_default();
        let mut parts = numeric.split('.').filter(|p| !p.is_empty());
        let mut next = |required: bool| -> Result<u32, String> {
            match parts.next() {
                Some(p) => p
                    .parse()
                    .map_err(|e| format!("invalid kernel version '{s}': {e}")),
                None if required => Err(format!("invalid kernel version '{s}'")),
                None => Ok(0),
            }
        };
        Ok(Self {
            major: next(true)?,
            minor: next(true)?,
            patch: next(false)?,
        })
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The user on whose behalf syscfg runs (the `sudo` caller when elevated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    /// Numeric user id.
    pub uid: u32,
    /// Numeric primary group id.
    pub gid: u32,
    /// Home directory; user-scope artifacts resolve under it.
    pub home: PathBuf,
}

/// Platform information for the current system.
#[derive(Debug, Clone)]
pub struct Platform {
    /// Running kernel, `None` if it could not be read.
    pub kernel: Option<KernelVersion>,
    /// Whether the host is Arch Linux.
    pub is_arch: bool,
    /// Effective user id of this process.
    pub euid: u32,
    /// The invoking user.
    pub invoker: Invoker,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub fn detect() -> Self {
        let euid = nix::unistd::geteuid().as_raw();
        Self {
            kernel: running_kernel(),
            is_arch: std::path::Path::new("/etc/arch-release").exists(),
            euid,
            invoker: detect_invoker(euid),
        }
    }

    /// Whether the process runs with root privileges.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.euid == 0
    }
}

/// Read the running kernel release from procfs.
fn running_kernel() -> Option<KernelVersion> {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .ok()?
        .parse()
        .ok()
}

fn detect_invoker(euid: u32) -> Invoker {
    let env_id = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u32>().ok());
    let (uid, gid) = match (env_id("SUDO_UID"), env_id("SUDO_GID")) {
        (Some(uid), Some(gid)) if euid == 0 => (uid, gid),
        _ => (
            nix::unistd::getuid().as_raw(),
            nix::unistd::getgid().as_raw(),
        ),
    };
    let home = User::from_uid(Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|user| user.dir)
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("/root"));
    Invoker { uid, gid, home }
}

/// Queries about the host used to evaluate artifact applicability.
pub trait SystemProbe: Send + Sync + fmt::Debug {
    /// Whether `package` is installed.
    fn package_installed(&self, package: &str) -> bool;
    /// The running kernel version, if known.
    fn kernel_version(&self) -> Option<KernelVersion>;
    /// Forget cached answers after packages were installed.
    fn refresh(&self) {}
}

/// [`SystemProbe`] for the real host: pacman for packages, procfs for the
/// kernel. Package answers are cached for the life of the probe.
#[derive(Debug)]
pub struct HostProbe {
    executor: Arc<dyn Executor>,
    kernel: Option<KernelVersion>,
    cache: Mutex<HashMap<String, bool>>,
}

impl HostProbe {
    /// Create a probe that queries packages through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, kernel: Option<KernelVersion>) -> Self {
        Self {
            executor,
            kernel,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn query(&self, package: &str) -> bool {
        if !self.executor.which("pacman") {
            return false;
        }
        self.executor
            .run_unchecked("pacman", &["-Qq", package])
            .is_ok_and(|r| r.success)
    }
}

impl SystemProbe for HostProbe {
    fn package_installed(&self, package: &str) -> bool {
        if let Ok(cache) = self.cache.lock()
            && let Some(&hit) = cache.get(package)
        {
            return hit;
        }
        let installed = self.query(package);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(package.to_string(), installed);
        }
        installed
    }

    fn kernel_version(&self) -> Option<KernelVersion> {
        self.kernel
    }

    fn refresh(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

/// [`SystemProbe`] with fixed answers, for staging trees and tests.
#[derive(Debug, Clone, Default)]
pub struct FixedProbe {
    packages: Vec<String>,
    kernel: Option<KernelVersion>,
}

impl FixedProbe {
    /// A probe that reports no packages and no kernel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `packages` as installed.
    #[must_use]
    pub fn with_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages.extend(packages.into_iter().map(Into::into));
        self
    }

    /// Report `kernel` as the running kernel.
    #[must_use]
    pub const fn with_kernel(mut self, kernel: KernelVersion) -> Self {
        self.kernel = Some(kernel);
        self
    }
}

impl SystemProbe for FixedProbe {
    fn package_installed(&self, package: &str) -> bool {
        self.packages.iter().any(|p| p == package)
    }

    fn kernel_version(&self) -> Option<KernelVersion> {
        self.kernel
    }
}
