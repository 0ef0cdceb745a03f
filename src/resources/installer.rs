//! Atomic convergence of one destination to its rendered content.
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{InstallError, InstallStage};
use super::fs_ops::{Access, EntryKind, FileOps, Owner, temp_path};
use super::{InstallOutcome, RemoveOutcome};
use crate::catalog::{Catalog, Privilege};
use crate::cleanup::Teardown;
use crate::logging::Log;
use crate::platform::SystemProbe;

/// Final mode of every installed file.
pub const INSTALL_MODE: u32 = 0o644;

type TempNamer = Box<dyn Fn(&Path) -> PathBuf + Send + Sync>;

/// Writes catalog renderings to disk through a temporary sibling and an
/// atomic rename.
pub struct Installer<'a> {
    catalog: &'a Catalog,
    probe: &'a dyn SystemProbe,
    access: &'a Access,
    log: &'a dyn Log,
    force: bool,
    teardown: Option<&'a Teardown>,
    temp_namer: TempNamer,
}

impl fmt::Debug for Installer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("artifacts", &self.catalog.artifacts().len())
            .field("force", &self.force)
            .field("teardown", &self.teardown.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Installer<'a> {
    /// Create an installer over `catalog`.
    #[must_use]
    pub fn new(
        catalog: &'a Catalog,
        probe: &'a dyn SystemProbe,
        access: &'a Access,
        log: &'a dyn Log,
    ) -> Self {
        Self {
            catalog,
            probe,
            access,
            log,
            force: false,
            teardown: None,
            temp_namer: Box::new(temp_path),
        }
    }

    /// Rewrite destinations even when their content already matches.
    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Register temporary files with `teardown` while they exist.
    #[must_use]
    pub const fn with_teardown(mut self, teardown: &'a Teardown) -> Self {
        self.teardown = Some(teardown);
        self
    }

    /// Replace the temporary-name generator.
    #[must_use]
    pub fn with_temp_namer(mut self, namer: impl Fn(&Path) -> PathBuf + Send + Sync + 'static) -> Self {
        self.temp_namer = Box::new(namer);
        self
    }

    /// Converge `path` to its rendering using `privilege`'s file operations.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Catalog`] for unknown or unrenderable paths,
    /// [`InstallError::NoContent`] for an empty rendering,
    /// [`InstallError::Security`] when a symlink or foreign entry occupies
    /// the temporary path, and [`InstallError::Stage`] when a filesystem
    /// step fails. On error the destination keeps its previous content.
    pub fn install(&self, path: &Path, privilege: Privilege) -> Result<InstallOutcome, InstallError> {
        let artifact = self.catalog.get(path)?;
        if !self.catalog.applies(artifact, self.probe) {
            let reason = self.catalog.requirement(artifact);
            self.log
                .warn(&format!("skipping {}: {reason}", path.display()));
            return Ok(InstallOutcome::Skipped { reason });
        }

        let content = self.catalog.content(path)?;
        if content.is_empty() {
            return Err(InstallError::NoContent(path.to_path_buf()));
        }

        let ops = self.access.ops(privilege);
        let owner = self.access.owner(privilege);
        if !self.force
            && ops.kind(path).is_ok_and(|k| k == EntryKind::Regular)
            && let Ok(current) = ops.read(path)
            && current == content
        {
            return self.converge_metadata(ops.as_ref(), path, owner);
        }

        self.ensure_parent(ops.as_ref(), path, owner)?;

        let temp = (self.temp_namer)(path);
        create_temp(ops.as_ref(), path, &temp)?;
        if let Some(teardown) = self.teardown {
            teardown.register_temp(&temp, ops);
        }

        let published = publish(ops.as_ref(), path, &temp, &content);
        if let Err(ref e) = published {
            if let Err(rm) = ops.remove(&temp) {
                self.log
                    .debug(&format!("cannot remove {}: {rm}", temp.display()));
            }
            self.log.debug(&format!("install {} aborted: {e}", path.display()));
        }
        if let Some(teardown) = self.teardown {
            teardown.unregister_temp(&temp);
        }
        published?;

        let ownership_warning = self.set_owner(ops.as_ref(), path, owner);
        self.log.info(&format!("wrote {}", path.display()));
        Ok(InstallOutcome::Applied { ownership_warning })
    }

    /// Content already matches: fix mode and owner if they drifted.
    fn converge_metadata(
        &self,
        ops: &dyn FileOps,
        path: &Path,
        owner: Owner,
    ) -> Result<InstallOutcome, InstallError> {
        let meta = ops
            .metadata(path)
            .map_err(|e| stage_error(InstallStage::SetMode, path, e))?;
        let wrong_mode = meta.mode != INSTALL_MODE;
        let wrong_owner = meta.uid != owner.uid || meta.gid != owner.gid;
        if !wrong_mode && !wrong_owner {
            self.log
                .debug(&format!("ok: {} (already correct)", path.display()));
            return Ok(InstallOutcome::AlreadyCorrect);
        }

        if wrong_mode {
            ops.set_mode(path, INSTALL_MODE)
                .map_err(|e| stage_error(InstallStage::SetMode, path, e))?;
        }
        let ownership_warning = if wrong_owner {
            self.set_owner(ops, path, owner)
        } else {
            None
        };
        self.log.info(&format!(
            "repaired permissions of {} (was {:04o} {}:{})",
            path.display(),
            meta.mode,
            meta.uid,
            meta.gid
        ));
        Ok(InstallOutcome::Repaired { ownership_warning })
    }

    /// Create the missing ancestors of `path` and hand each one to `owner`.
    fn ensure_parent(
        &self,
        ops: &dyn FileOps,
        path: &Path,
        owner: Owner,
    ) -> Result<(), InstallError> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let missing: Vec<&Path> = parent
            .ancestors()
            .take_while(|dir| ops.kind(dir).is_ok_and(|k| k == EntryKind::Missing))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        ops.create_dir_all(parent)
            .map_err(|e| stage_error(InstallStage::CreateDir, path, e))?;
        for dir in missing.iter().rev() {
            self.set_owner(ops, dir, owner);
        }
        Ok(())
    }

    /// Apply `owner`; a failure is logged and returned as a warning.
    fn set_owner(&self, ops: &dyn FileOps, path: &Path, owner: Owner) -> Option<String> {
        ops.chown(path, owner).err().map(|e| {
            let msg = format!("cannot set owner {owner} on {}: {e}", path.display());
            self.log.warn(&msg);
            msg
        })
    }

    /// Delete an installed destination.
    ///
    /// A file whose content no longer matches the rendering is kept unless
    /// `force` is set.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Catalog`] for unknown paths and a
    /// [`InstallStage::Remove`] stage error if deletion fails.
    pub fn remove(
        &self,
        path: &Path,
        privilege: Privilege,
        force: bool,
    ) -> Result<RemoveOutcome, InstallError> {
        self.catalog.get(path)?;
        let ops = self.access.ops(privilege);
        let current = match ops.read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RemoveOutcome::NotInstalled),
            Err(_) if ops.kind(path).is_ok_and(|k| k == EntryKind::Missing) => {
                return Ok(RemoveOutcome::NotInstalled);
            }
            Err(e) => return Err(stage_error(InstallStage::Remove, path, e)),
        };

        let modified = !self
            .catalog
            .content(path)
            .is_ok_and(|desired| desired == current);
        if modified && !force {
            let reason = "content was modified locally (use --force to remove)".to_string();
            self.log
                .warn(&format!("keeping {}: {reason}", path.display()));
            return Ok(RemoveOutcome::Kept { reason });
        }

        ops.remove(path)
            .map_err(|e| stage_error(InstallStage::Remove, path, e))?;
        self.log.info(&format!("removed {}", path.display()));
        Ok(RemoveOutcome::Removed)
    }

    /// The file operations used for `privilege`.
    #[must_use]
    pub fn ops(&self, privilege: Privilege) -> &Arc<dyn FileOps> {
        self.access.ops(privilege)
    }
}

fn create_temp(ops: &dyn FileOps, path: &Path, temp: &Path) -> Result<(), InstallError> {
    match ops.create_exclusive(temp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let found = ops.kind(temp).unwrap_or(EntryKind::Other);
            return Err(if found == EntryKind::Symlink {
                security(temp, "temporary path is a symbolic link")
            } else {
                stage_error(InstallStage::CreateTemp, path, e)
            });
        }
        Err(e) => return Err(stage_error(InstallStage::CreateTemp, path, e)),
    }
    match ops.kind(temp) {
        Ok(EntryKind::Regular) => Ok(()),
        Ok(found) => Err(security(temp, &format!("temporary path is a {found}"))),
        Err(e) => Err(stage_error(InstallStage::VerifyTemp, path, e)),
    }
}

fn publish(
    ops: &dyn FileOps,
    path: &Path,
    temp: &Path,
    content: &[u8],
) -> Result<(), InstallError> {
    ops.write_existing(temp, content)
        .map_err(|e| stage_error(InstallStage::Write, path, e))?;
    ops.set_mode(temp, INSTALL_MODE)
        .map_err(|e| stage_error(InstallStage::SetMode, path, e))?;
    ops.rename(temp, path)
        .map_err(|e| stage_error(InstallStage::Rename, path, e))
}

fn stage_error(stage: InstallStage, path: &Path, source: io::Error) -> InstallError {
    InstallError::Stage {
        stage,
        path: path.to_path_buf(),
        source,
    }
}

fn security(temp: &Path, reason: &str) -> InstallError {
    InstallError::Security {
        path: temp.to_path_buf(),
        reason: reason.to_string(),
    }
}
