// Shared helpers for integration tests.
//
// Provides a temporary system root so each integration test can install,
// diff and verify real files without touching the host.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use syscfg::catalog::{Catalog, ConfigArtifact, Layout, Privilege, Renderer};
use syscfg::config::{ConfigurationState, defaults};
use syscfg::exec::SystemExecutor;
use syscfg::logging::{Log, MemoryLog};
use syscfg::platform::FixedProbe;
use syscfg::resources::fs_ops::{Access, Owner};
use syscfg::tasks::Context;

/// The uid/gid of the test process, attainable without privileges.
pub fn current_owner() -> Owner {
    Owner {
        uid: nix::unistd::getuid().as_raw(),
        gid: nix::unistd::getgid().as_raw(),
    }
}

/// A temporary system root backed by a [`tempfile::TempDir`].
///
/// The directory is automatically deleted when dropped.
pub struct StagingRoot {
    /// Temporary directory standing in for `/`.
    pub dir: tempfile::TempDir,
}

impl StagingRoot {
    /// Create an empty root.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// The root directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Layout with system paths and the home directory under the root.
    pub fn layout(&self) -> Layout {
        Layout {
            sysroot: self.path().to_path_buf(),
            home: self.path().join("home/user"),
        }
    }

    /// Resolve a logical system path under the root.
    pub fn system(&self, logical: &str) -> PathBuf {
        self.layout().system(Path::new(logical))
    }

    /// The built-in catalog with the compiled profile.
    pub fn builtin(&self) -> Catalog {
        Catalog::builtin(&self.layout(), defaults::profile())
    }

    /// A catalog with a single system file at `logical` rendering `lines`.
    pub fn single(&self, logical: &str, lines: &[&str]) -> Catalog {
        Catalog::from_artifacts(
            vec![ConfigArtifact::new(
                self.system(logical),
                Privilege::System,
                Renderer::fixed(lines),
            )],
            ConfigurationState::new(),
        )
    }

    /// Local file operations owned by the test user.
    pub fn access(&self) -> Access {
        Access::local(current_owner())
    }

    /// A staging task context over `catalog`, plus its log.
    pub fn context(&self, catalog: Catalog) -> (Context, Arc<MemoryLog>) {
        let log = Arc::new(MemoryLog::new());
        let ctx = Context::new(
            Arc::new(catalog),
            Arc::new(FixedProbe::new()),
            Arc::new(self.access()),
            Arc::new(SystemExecutor),
            Arc::clone(&log) as Arc<dyn Log>,
        )
        .staging(true);
        (ctx, log)
    }

    /// Every regular file below the root, relative to it, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        collect(self.path(), self.path(), &mut out);
        out.sort();
        out
    }
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(root, &path, out);
        } else {
            out.push(path.strip_prefix(root).expect("under root").to_path_buf());
        }
    }
}
