//! The catalog of managed configuration artifacts.
//!
//! A [`Catalog`] maps each destination path to a [`Renderer`] and knows
//! whether the artifact applies to the current host. Rendering never looks
//! at the filesystem, so the installer, the diff engine and the verifiers
//! all agree on the same desired bytes.
mod builtin;
mod lint;
mod render;

pub use builtin::{builtin_artifacts, paths};
pub use lint::{LintFinding, lint};
pub use render::{Block, Renderer, content_bytes};

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ConfigurationState;
use crate::error::CatalogError;
use crate::platform::{KernelVersion, SystemProbe};

/// Who owns an artifact and with which rights it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// Root-owned file under the system root.
    System,
    /// File in the invoking user's home, owned by that user.
    User,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
        }
    }
}

/// When an artifact should be deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability {
    /// Always deployed.
    Always,
    /// Deployed only when every listed package is installed.
    Packages(Vec<String>),
    /// Deployed only when the running kernel is at least the version stored
    /// at `group.key` in the configuration state.
    MinKernel {
        /// State group holding the minimum version.
        group: String,
        /// Key within the group.
        key: String,
    },
}

/// What has to happen after an artifact changes for it to take effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Activation {
    /// Picked up on next use or next boot with no action.
    None,
    /// Initramfs and boot loader entries must be regenerated.
    Boot,
    /// udev rules must be reloaded and retriggered.
    Udev,
    /// systemd must re-read unit files and drop-ins.
    DaemonReload,
    /// The named unit must be restarted.
    Restart(String),
}

/// One managed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArtifact {
    /// Absolute, resolved destination path.
    pub destination: PathBuf,
    /// Privilege class.
    pub privilege: Privilege,
    /// How content is produced.
    pub renderer: Renderer,
    /// When the artifact is deployed.
    pub applicability: Applicability,
    /// What to reload after it changes.
    pub activation: Activation,
}

impl ConfigArtifact {
    /// An always-applicable artifact with no activation step.
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>, privilege: Privilege, renderer: Renderer) -> Self {
        Self {
            destination: destination.into(),
            privilege,
            renderer,
            applicability: Applicability::Always,
            activation: Activation::None,
        }
    }

    /// Set the applicability predicate.
    #[must_use]
    pub fn when(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    /// Set the activation trigger.
    #[must_use]
    pub fn activates(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }
}

/// Where logical catalog paths land on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Root under which system paths are resolved (`/` on a live system).
    pub sysroot: PathBuf,
    /// Home directory of the invoking user.
    pub home: PathBuf,
}

impl Layout {
    /// Resolve an absolute system path under the system root.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::{Path, PathBuf};
    /// use syscfg::catalog::Layout;
    ///
    /// let layout = Layout { sysroot: "/mnt".into(), home: "/home/u".into() };
    /// assert_eq!(layout.system(Path::new("/etc/kernel/cmdline")), PathBuf::from("/mnt/etc/kernel/cmdline"));
    /// assert_eq!(layout.user(Path::new(".config/x")), PathBuf::from("/home/u/.config/x"));
    /// ```
    #[must_use]
    pub fn system(&self, path: &Path) -> PathBuf {
        self.sysroot.join(path.strip_prefix("/").unwrap_or(path))
    }

    /// Resolve a home-relative path.
    #[must_use]
    pub fn user(&self, path: &Path) -> PathBuf {
        self.home.join(path)
    }
}

/// Ordered, immutable set of artifacts bound to one configuration state.
#[derive(Debug, Clone)]
pub struct Catalog {
    artifacts: Vec<ConfigArtifact>,
    state: ConfigurationState,
}

impl Catalog {
    /// The built-in catalog resolved against `layout`.
    #[must_use]
    pub fn builtin(layout: &Layout, state: ConfigurationState) -> Self {
        Self::from_artifacts(builtin_artifacts(layout), state)
    }

    /// A catalog over explicit artifacts, kept in the given order.
    #[must_use]
    pub const fn from_artifacts(artifacts: Vec<ConfigArtifact>, state: ConfigurationState) -> Self {
        Self { artifacts, state }
    }

    /// Artifacts in install order.
    #[must_use]
    pub fn artifacts(&self) -> &[ConfigArtifact] {
        &self.artifacts
    }

    /// The configuration state renderers read from.
    #[must_use]
    pub const fn state(&self) -> &ConfigurationState {
        &self.state
    }

    /// Look up the artifact for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotDefined`] if `path` is not a destination.
    pub fn get(&self, path: &Path) -> Result<&ConfigArtifact, CatalogError> {
        self.artifacts
            .iter()
            .find(|a| a.destination == path)
            .ok_or_else(|| CatalogError::NotDefined(path.to_path_buf()))
    }

    /// Render the desired lines for `path`, regardless of applicability.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotDefined`] for unknown paths and
    /// [`CatalogError::Unresolved`] for template placeholders without a value.
    pub fn render(&self, path: &Path) -> Result<Vec<String>, CatalogError> {
        self.get(path)?.renderer.render(path, &self.state)
    }

    /// Render the desired file content for `path`.
    ///
    /// # Errors
    ///
    /// Same as [`render`](Self::render).
    pub fn content(&self, path: &Path) -> Result<Vec<u8>, CatalogError> {
        self.render(path).map(|lines| content_bytes(&lines))
    }

    /// Whether the artifact at `path` should be deployed on this host.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotDefined`] for unknown paths.
    pub fn is_applicable(&self, path: &Path, probe: &dyn SystemProbe) -> Result<bool, CatalogError> {
        Ok(self.applies(self.get(path)?, probe))
    }

    /// Evaluate an artifact's applicability predicate.
    #[must_use]
    pub fn applies(&self, artifact: &ConfigArtifact, probe: &dyn SystemProbe) -> bool {
        match &artifact.applicability {
            Applicability::Always => true,
            Applicability::Packages(packages) => {
                packages.iter().all(|p| probe.package_installed(p))
            }
            Applicability::MinKernel { group, key } => {
                match (self.min_kernel(group, key), probe.kernel_version()) {
                    (Some(min), Some(running)) => running >= min,
                    _ => false,
                }
            }
        }
    }

    /// Human-readable reason an artifact may be skipped.
    #[must_use]
    pub fn requirement(&self, artifact: &ConfigArtifact) -> String {
        match &artifact.applicability {
            Applicability::Always => "always applicable".to_string(),
            Applicability::Packages(packages) => {
                format!("requires package(s) {}", packages.join(", "))
            }
            Applicability::MinKernel { group, key } => self.min_kernel(group, key).map_or_else(
                || format!("requires a kernel version at {group}.{key}"),
                |v| format!("requires kernel >= {v}"),
            ),
        }
    }

    fn min_kernel(&self, group: &str, key: &str) -> Option<KernelVersion> {
        self.state.value(group, key)?.parse().ok()
    }

    /// Distinct parent directories of all destinations, sorted.
    #[must_use]
    pub fn directories(&self) -> Vec<(PathBuf, Privilege)> {
        let set: BTreeSet<(PathBuf, Privilege)> = self
            .artifacts
            .iter()
            .filter_map(|a| {
                a.destination
                    .parent()
                    .map(|p| (p.to_path_buf(), a.privilege))
            })
            .collect();
        set.into_iter().collect()
    }
}
