//! Typed error variants for installer operations.
//!
//! This module provides [`InstallError`], returned by
//! [`Installer`](super::installer::Installer) for a single destination.
//! Batch callers record the failure and move on; command handlers convert
//! to [`anyhow::Error`] via `?`.
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::error::CatalogError;

/// Installer step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    /// Creating the destination's parent directory.
    CreateDir,
    /// Exclusively creating the temporary file.
    CreateTemp,
    /// Inspecting the temporary file.
    VerifyTemp,
    /// Writing and syncing content.
    Write,
    /// Setting the final mode.
    SetMode,
    /// Publishing the temporary file over the destination.
    Rename,
    /// Reading or deleting an installed file.
    Remove,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateDir => "create directory",
            Self::CreateTemp => "create temporary file",
            Self::VerifyTemp => "verify temporary file",
            Self::Write => "write",
            Self::SetMode => "set mode",
            Self::Rename => "rename",
            Self::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Errors that arise from installing or removing one destination.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The path is not in the catalog or does not render.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The catalog renders nothing for this path.
    #[error("catalog renders no content for {}", .0.display())]
    NoContent(PathBuf),

    /// A symlink or other unexpected entry sits where a fresh temporary
    /// file should be. Never retried.
    #[error("security: refusing to use {}: {reason}", .path.display())]
    Security {
        /// The offending temporary path.
        path: PathBuf,
        /// What was found there.
        reason: String,
    },

    /// A filesystem step failed.
    #[error("{stage} failed for {}: {source}", .path.display())]
    Stage {
        /// The failing step.
        stage: InstallStage,
        /// Destination being installed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl InstallError {
    /// Whether this is a security refusal.
    #[must_use]
    pub const fn is_security(&self) -> bool {
        matches!(self, Self::Security { .. })
    }

    /// The failing stage, if this is a stage failure.
    #[must_use]
    pub const fn stage(&self) -> Option<InstallStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
