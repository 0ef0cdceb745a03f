//! Atomic file installation and the filesystem primitives behind it.
pub mod error;
pub mod fs_ops;
pub mod installer;

/// Result of installing one destination.
///
/// # Examples
///
/// ```
/// use syscfg::resources::InstallOutcome;
///
/// let applied = InstallOutcome::Applied { ownership_warning: None };
/// assert!(applied.changed());
/// assert!(!InstallOutcome::AlreadyCorrect.changed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// New content was published.
    Applied {
        /// Set when the content is in place but the final owner could not be
        /// applied.
        ownership_warning: Option<String>,
    },
    /// The content already matched; mode or owner had drifted and were
    /// reset.
    Repaired {
        /// Set when the final owner could not be applied.
        ownership_warning: Option<String>,
    },
    /// The destination already held the desired bytes, mode and owner.
    AlreadyCorrect,
    /// The artifact does not apply to this host.
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
}

impl InstallOutcome {
    /// Whether the destination was written or its metadata repaired.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::Repaired { .. })
    }
}

/// Result of removing one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The file was deleted.
    Removed,
    /// Nothing was installed.
    NotInstalled,
    /// The file was left in place.
    Kept {
        /// Why it was kept.
        reason: String,
    },
}
