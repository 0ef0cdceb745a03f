//! Domain-specific error types for the configuration engine.
//!
//! Internal modules return typed errors (e.g. [`CatalogError`],
//! [`LockError`]) while command handlers at the CLI boundary convert them to
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! SyscfgError
//! ├── Config(ConfigError)    — state overlay parsing
//! ├── Catalog(CatalogError)  — unknown destinations, unresolved placeholders
//! ├── Install(InstallError)  — atomic publish failures (resources::error)
//! ├── Lock(LockError)        — busy or unusable lock marker
//! └── Task(TaskError)        — deploy/uninstall step failures
//! ```
//!
//! [`InstallError`]: crate::resources::error::InstallError

use std::path::PathBuf;

use thiserror::Error;

use crate::resources::error::InstallError;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum SyscfgError {
    /// Configuration overlay error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Catalog lookup or rendering error.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Installer error for a single destination.
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    /// Lock acquisition error.
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Task execution error.
    #[error("Task execution error: {0}")]
    Task(#[from] TaskError),
}

/// Errors that arise from loading the configuration state overlay.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A top-level group is neither an array of strings nor a table of scalars.
    #[error("Invalid group [{group}] in {file}: {message}")]
    InvalidGroup {
        /// File the group was read from.
        file: String,
        /// Group name.
        group: String,
        /// What was wrong with it.
        message: String,
    },

    /// The overlay is not valid TOML.
    #[error("Invalid TOML syntax in {file}: {message}")]
    InvalidSyntax {
        /// File that failed to parse.
        file: String,
        /// Parser message.
        message: String,
    },

    /// An I/O error occurred while reading the overlay.
    #[error("IO error reading config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors that arise from catalog lookups and rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The path is not one of the catalog's destinations.
    #[error("no catalog entry for {}", .0.display())]
    NotDefined(PathBuf),

    /// A template placeholder has no value in the configuration state.
    #[error("unresolved placeholder {{{placeholder}}} in {}", .path.display())]
    Unresolved {
        /// Destination being rendered.
        path: PathBuf,
        /// Placeholder name without braces.
        placeholder: String,
    },
}

/// Errors that arise from lock acquisition.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another live process holds the lock.
    #[error("another syscfg run is in progress (pid {0})")]
    Busy(u32),

    /// Another run created the marker moments ago and has not recorded its
    /// pid yet.
    #[error("another syscfg run is acquiring the lock")]
    Pending,

    /// The marker could not be created, inspected or reclaimed.
    #[error("lock marker {}: {source}", .path.display())]
    Io {
        /// Marker directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Task failures that stop every remaining step of the run. Any other
/// task error is recorded and the run continues.
#[derive(Error, Debug)]
pub enum TaskError {
    /// A boot-configuration rebuild failed during an unattended run.
    #[error("boot configuration rebuild failed, aborting remaining steps: {0}")]
    BootRebuild(String),

    /// An install hit a symlink or foreign entry where its temporary file
    /// belongs.
    #[error("security violation, aborting remaining steps: {0}")]
    Security(String),

    /// The run was interrupted by a signal.
    #[error("interrupted")]
    Interrupted,
}
