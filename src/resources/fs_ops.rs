//! Privilege-aware filesystem primitives used by the installer, the diff
//! engine and the verifiers.
//!
//! [`LocalFileOps`] works in-process; [`SudoFileOps`] performs every step
//! through `sudo -n` so an unprivileged run can manage root-owned files.
use std::fmt;
use std::fs;
use std::io::{self, Write as _};
use std::os::unix::fs::{MetadataExt as _, OpenOptionsExt as _, PermissionsExt as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::fcntl::OFlag;

use crate::catalog::Privilege;
use crate::exec::{ExecResult, Executor};
use crate::platform::Platform;

/// Suffix marker embedded in every temporary file name.
pub const TEMP_MARKER: &str = ".syscfg-tmp.";

/// Type of a directory entry, without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Nothing at the path.
    Missing,
    /// A regular file.
    Regular,
    /// A symbolic link (dangling or not).
    Symlink,
    /// A directory, device, socket or fifo.
    Other,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Missing => "missing entry",
            Self::Regular => "regular file",
            Self::Symlink => "symbolic link",
            Self::Other => "special file or directory",
        };
        f.write_str(name)
    }
}

/// Ownership and permission bits of an installed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
}

/// Target owner of installed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    /// User id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
}

impl Owner {
    /// uid 0, gid 0.
    pub const ROOT: Self = Self { uid: 0, gid: 0 };
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// Filesystem primitives with a fixed privilege level.
///
/// None of the mutating operations follow a symlink at the final path
/// component, except [`create_dir_all`](Self::create_dir_all) for
/// pre-existing parents.
pub trait FileOps: Send + Sync + fmt::Debug {
    /// Read a file's bytes. A failed read is how absence is detected.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Classify the entry at `path` without following symlinks.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be inspected.
    fn kind(&self, path: &Path) -> io::Result<EntryKind>;

    /// Mode and ownership of the entry at `path` (not following symlinks).
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is missing or cannot be inspected.
    fn metadata(&self, path: &Path) -> io::Result<FileMeta>;

    /// Create `dir` and any missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns an error if a component cannot be created.
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    /// Create an empty file at `path`, failing with
    /// [`io::ErrorKind::AlreadyExists`] if anything (including a dangling
    /// symlink) is already there.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created exclusively.
    fn create_exclusive(&self, path: &Path) -> io::Result<()>;

    /// Replace the content of an existing regular file, refusing to follow
    /// a symlink, and flush it to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened without following
    /// links, written or synced.
    fn write_existing(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    /// Set permission bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the mode cannot be changed.
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Atomically rename `from` onto `to` (same directory).
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails; `to` is then unchanged.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Change ownership without following symlinks.
    ///
    /// # Errors
    ///
    /// Returns an error if ownership cannot be changed.
    fn chown(&self, path: &Path, owner: Owner) -> io::Result<()>;

    /// Remove a file or symlink.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be removed.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Names of the entries in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>>;

    /// Delete every orphaned temporary file in `dir`. Returns how many
    /// were removed; a missing directory removes nothing.
    fn sweep_temp(&self, dir: &Path) -> usize {
        let Ok(names) = self.list_dir(dir) else {
            return 0;
        };
        names
            .iter()
            .filter(|name| is_temp_name(name))
            .filter(|name| self.remove(&dir.join(name)).is_ok())
            .count()
    }
}

/// Whether `name` follows the temporary naming convention
/// `.<file>.syscfg-tmp.<random>`.
///
/// # Examples
///
/// ```
/// use syscfg::resources::fs_ops::is_temp_name;
///
/// assert!(is_temp_name(".main.conf.syscfg-tmp.3f2a"));
/// assert!(!is_temp_name("main.conf"));
/// ```
#[must_use]
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.')
        && name
            .split_once(TEMP_MARKER)
            .is_some_and(|(file, random)| file.len() > 1 && !random.is_empty())
}

/// Default temporary path for `destination`: a hidden sibling with a random
/// suffix.
#[must_use]
pub fn temp_path(destination: &Path) -> PathBuf {
    let file = destination
        .file_name()
        .map_or_else(|| "syscfg".into(), |n| n.to_string_lossy());
    let name = format!(".{file}{TEMP_MARKER}{}", uuid::Uuid::new_v4().simple());
    destination.with_file_name(name)
}

/// In-process [`FileOps`] using the caller's own privileges.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileOps;

impl LocalFileOps {
    fn open_nofollow(path: &Path, write: bool) -> io::Result<fs::File> {
        fs::OpenOptions::new()
            .read(!write)
            .write(write)
            .truncate(write)
            .custom_flags(OFlag::O_NOFOLLOW.bits())
            .open(path)
    }
}

impl FileOps for LocalFileOps {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn kind(&self, path: &Path) -> io::Result<EntryKind> {
        match fs::symlink_metadata(path) {
            Ok(meta) => {
                let ft = meta.file_type();
                Ok(if ft.is_symlink() {
                    EntryKind::Symlink
                } else if ft.is_file() {
                    EntryKind::Regular
                } else {
                    EntryKind::Other
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(EntryKind::Missing),
            Err(e) => Err(e),
        }
    }

    fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        let meta = fs::symlink_metadata(path)?;
        Ok(FileMeta {
            mode: meta.mode() & 0o7777,
            uid: meta.uid(),
            gid: meta.gid(),
        })
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn create_exclusive(&self, path: &Path) -> io::Result<()> {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .custom_flags(OFlag::O_NOFOLLOW.bits())
            .open(path)
            .map(drop)
    }

    fn write_existing(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let mut file = Self::open_nofollow(path, true)?;
        file.write_all(content)?;
        file.sync_all()
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        Self::open_nofollow(path, false)?.set_permissions(fs::Permissions::from_mode(mode))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn chown(&self, path: &Path, owner: Owner) -> io::Result<()> {
        std::os::unix::fs::lchown(path, Some(owner.uid), Some(owner.gid))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect()
    }
}

/// [`FileOps`] that runs each primitive as root through `sudo -n`.
///
/// Requires cached credentials (see [`CredentialRefresher`](crate::sudo::CredentialRefresher));
/// a prompt would fail rather than block.
#[derive(Debug, Clone)]
pub struct SudoFileOps {
    executor: Arc<dyn Executor>,
}

impl SudoFileOps {
    /// Create sudo-backed operations running through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn sudo(&self, args: &[&str]) -> io::Result<ExecResult> {
        let mut full = vec!["-n"];
        full.extend_from_slice(args);
        let result = self
            .executor
            .run_unchecked("sudo", &full)
            .map_err(|e| io::Error::other(format!("{e:#}")))?;
        if result.success {
            Ok(result)
        } else {
            Err(command_error(&result))
        }
    }

    fn sudo_stdin(&self, args: &[&str], input: &[u8]) -> io::Result<ExecResult> {
        let mut full = vec!["-n"];
        full.extend_from_slice(args);
        self.executor
            .run_with_stdin("sudo", &full, input)
            .map_err(|e| io::Error::other(format!("{e:#}")))
    }
}

/// Map a failed command's stderr to an [`io::Error`] with a matching kind.
fn command_error(result: &ExecResult) -> io::Error {
    let stderr = result.stderr.trim();
    let kind = if stderr.contains("No such file or directory") {
        io::ErrorKind::NotFound
    } else if stderr.contains("File exists") || stderr.contains("cannot overwrite existing file")
    {
        io::ErrorKind::AlreadyExists
    } else if stderr.contains("Permission denied") || stderr.contains("a password is required") {
        io::ErrorKind::PermissionDenied
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, stderr.to_string())
}

fn arg(path: &Path) -> io::Result<&str> {
    path.to_str()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path is not valid UTF-8"))
}

impl FileOps for SudoFileOps {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.sudo(&["cat", "--", arg(path)?])
            .map(|r| r.stdout_bytes)
    }

    fn kind(&self, path: &Path) -> io::Result<EntryKind> {
        match self.sudo(&["stat", "-c", "%F", "--", arg(path)?]) {
            Ok(r) => Ok(match r.stdout.trim() {
                "regular file" | "regular empty file" => EntryKind::Regular,
                "symbolic link" => EntryKind::Symlink,
                _ => EntryKind::Other,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(EntryKind::Missing),
            Err(e) => Err(e),
        }
    }

    fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        let out = self.sudo(&["stat", "-c", "%a %u %g", "--", arg(path)?])?;
        let mut fields = out.stdout.split_whitespace();
        let bad = || io::Error::other(format!("unexpected stat output: {}", out.stdout.trim()));
        let mode = fields
            .next()
            .and_then(|m| u32::from_str_radix(m, 8).ok())
            .ok_or_else(bad)?;
        let uid = fields.next().and_then(|u| u.parse().ok()).ok_or_else(bad)?;
        let gid = fields.next().and_then(|g| g.parse().ok()).ok_or_else(bad)?;
        Ok(FileMeta { mode, uid, gid })
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        self.sudo(&["mkdir", "-p", "--", arg(dir)?]).map(drop)
    }

    fn create_exclusive(&self, path: &Path) -> io::Result<()> {
        // noclobber makes the redirection use O_EXCL
        self.sudo(&[
            "sh",
            "-c",
            "set -C; umask 077; : > \"$1\"",
            "syscfg-create",
            arg(path)?,
        ])
        .map(drop)
    }

    fn write_existing(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let of = format!("of={}", arg(path)?);
        let result = self.sudo_stdin(
            &["dd", &of, "oflag=nofollow", "conv=fsync", "status=none"],
            content,
        )?;
        if result.success {
            Ok(())
        } else {
            Err(command_error(&result))
        }
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.sudo(&["chmod", &format!("{mode:04o}"), "--", arg(path)?])
            .map(drop)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.sudo(&["mv", "-fT", "--", arg(from)?, arg(to)?])
            .map(drop)
    }

    fn chown(&self, path: &Path, owner: Owner) -> io::Result<()> {
        self.sudo(&["chown", "-h", &owner.to_string(), "--", arg(path)?])
            .map(drop)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.sudo(&["rm", "-f", "--", arg(path)?]).map(drop)
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let out = self.sudo(&["ls", "-A1", "--", arg(dir)?])?;
        Ok(out.stdout.lines().map(ToString::to_string).collect())
    }
}

/// The file operations and target owner for each privilege class.
#[derive(Debug, Clone)]
pub struct Access {
    system: Arc<dyn FileOps>,
    system_owner: Owner,
    user: Arc<dyn FileOps>,
    user_owner: Owner,
    sudo: bool,
}

impl Access {
    /// Explicit operations and owners per class.
    #[must_use]
    pub fn new(
        system: Arc<dyn FileOps>,
        system_owner: Owner,
        user: Arc<dyn FileOps>,
        user_owner: Owner,
    ) -> Self {
        Self {
            system,
            system_owner,
            user,
            user_owner,
            sudo: false,
        }
    }

    /// In-process operations for both classes with a single owner. Used for
    /// staging trees and tests.
    #[must_use]
    pub fn local(owner: Owner) -> Self {
        let ops: Arc<dyn FileOps> = Arc::new(LocalFileOps);
        Self::new(Arc::clone(&ops), owner, ops, owner)
    }

    /// Pick operations for this host.
    ///
    /// System files go through `sudo` unless the process is already root or
    /// works on a staging root. On a staging root without root privileges
    /// system files are owned by the invoking user, since nothing else is
    /// attainable.
    #[must_use]
    pub fn for_host(platform: &Platform, staging: bool, executor: Arc<dyn Executor>) -> Self {
        let invoker = Owner {
            uid: platform.invoker.uid,
            gid: platform.invoker.gid,
        };
        let local: Arc<dyn FileOps> = Arc::new(LocalFileOps);
        if platform.is_root() {
            Self::new(Arc::clone(&local), Owner::ROOT, local, invoker)
        } else if staging {
            Self::new(Arc::clone(&local), invoker, local, invoker)
        } else {
            let mut access = Self::new(
                Arc::new(SudoFileOps::new(executor)),
                Owner::ROOT,
                local,
                invoker,
            );
            access.sudo = true;
            access
        }
    }

    /// Operations for `privilege`.
    #[must_use]
    pub fn ops(&self, privilege: Privilege) -> &Arc<dyn FileOps> {
        match privilege {
            Privilege::System => &self.system,
            Privilege::User => &self.user,
        }
    }

    /// Final owner for `privilege`.
    #[must_use]
    pub const fn owner(&self, privilege: Privilege) -> Owner {
        match privilege {
            Privilege::System => self.system_owner,
            Privilege::User => self.user_owner,
        }
    }

    /// Whether system files are handled through `sudo`.
    #[must_use]
    pub const fn uses_sudo(&self) -> bool {
        self.sudo
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::test_helpers::MockExecutor;

    // ------------------------------------------------------------------
    // naming
    // ------------------------------------------------------------------

    #[test]
    fn temp_path_is_hidden_sibling() {
        let temp = temp_path(Path::new("/etc/iwd/main.conf"));
        assert_eq!(temp.parent(), Some(Path::new("/etc/iwd")));
        let name = temp.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".main.conf.syscfg-tmp."), "{name}");
        assert!(is_temp_name(name));
    }

    #[test]
    fn temp_paths_are_unique() {
        let p = Path::new("/etc/x.conf");
        assert_ne!(temp_path(p), temp_path(p));
    }

    #[test]
    fn temp_name_convention() {
        assert!(!is_temp_name(".syscfg-tmp.abc"));
        assert!(!is_temp_name(".x.syscfg-tmp."));
        assert!(!is_temp_name("x.syscfg-tmp.abc"));
    }

    // ------------------------------------------------------------------
    // LocalFileOps
    // ------------------------------------------------------------------

    #[test]
    fn local_create_exclusive_refuses_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f");
        LocalFileOps.create_exclusive(&path).unwrap();
        let err = LocalFileOps.create_exclusive(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn local_create_exclusive_refuses_dangling_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(tmp.path().join("target"), &link).unwrap();
        let err = LocalFileOps.create_exclusive(&link).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(
            !tmp.path().join("target").exists(),
            "symlink target must not be created"
        );
    }

    #[test]
    fn local_write_refuses_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("target");
        fs::write(&target, "original").unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        assert!(LocalFileOps.write_existing(&link, b"evil").is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
    }

    #[test]
    fn local_kind_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f");
        LocalFileOps.create_exclusive(&file).unwrap();
        LocalFileOps.write_existing(&file, b"data").unwrap();
        LocalFileOps.set_mode(&file, 0o644).unwrap();
        assert_eq!(LocalFileOps.kind(&file).unwrap(), EntryKind::Regular);
        assert_eq!(LocalFileOps.metadata(&file).unwrap().mode, 0o644);
        assert_eq!(LocalFileOps.read(&file).unwrap(), b"data");
        assert_eq!(
            LocalFileOps.kind(&tmp.path().join("none")).unwrap(),
            EntryKind::Missing
        );
        assert_eq!(LocalFileOps.kind(tmp.path()).unwrap(), EntryKind::Other);
    }

    #[test]
    fn local_sweep_removes_only_temp_names() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main.conf"), "keep").unwrap();
        fs::write(tmp.path().join(".main.conf.syscfg-tmp.abc"), "orphan").unwrap();
        fs::write(tmp.path().join(".other.syscfg-tmp.def"), "orphan").unwrap();
        assert_eq!(LocalFileOps.sweep_temp(tmp.path()), 2);
        assert!(tmp.path().join("main.conf").exists());
        assert_eq!(LocalFileOps.sweep_temp(&tmp.path().join("absent")), 0);
    }

    // ------------------------------------------------------------------
    // SudoFileOps
    // ------------------------------------------------------------------

    #[test]
    fn sudo_read_goes_through_cat() {
        let exec = Arc::new(MockExecutor::new().respond("sudo -n cat -- /etc/a", true, "x=1\n"));
        let ops = SudoFileOps::new(exec.clone());
        assert_eq!(ops.read(Path::new("/etc/a")).unwrap(), b"x=1\n");
        assert!(ops.read(Path::new("/etc/x")).is_err());
        assert_eq!(exec.calls(), ["sudo -n cat -- /etc/a", "sudo -n cat -- /etc/x"]);
    }

    #[test]
    fn sudo_read_returns_exact_bytes() {
        let exec = Arc::new(MockExecutor::new().respond_bytes(
            "sudo -n cat -- /etc/vconsole.conf",
            true,
            b"FONT=lat\xe9\n",
        ));
        let ops = SudoFileOps::new(exec);
        assert_eq!(
            ops.read(Path::new("/etc/vconsole.conf")).unwrap(),
            b"FONT=lat\xe9\n"
        );
    }

    #[test]
    fn sudo_kind_parses_stat() {
        let exec = Arc::new(
            MockExecutor::new()
                .respond("sudo -n stat -c %F -- /etc/a", true, "regular empty file\n")
                .respond("sudo -n stat -c %F -- /etc/b", true, "symbolic link\n"),
        );
        let ops = SudoFileOps::new(exec);
        assert_eq!(ops.kind(Path::new("/etc/a")).unwrap(), EntryKind::Regular);
        assert_eq!(ops.kind(Path::new("/etc/b")).unwrap(), EntryKind::Symlink);
    }

    #[test]
    fn sudo_metadata_parses_octal_mode() {
        let exec = Arc::new(MockExecutor::new().respond(
            "sudo -n stat -c %a %u %g -- /etc/a",
            true,
            "644 0 0\n",
        ));
        let ops = SudoFileOps::new(exec);
        assert_eq!(
            ops.metadata(Path::new("/etc/a")).unwrap(),
            FileMeta {
                mode: 0o644,
                uid: 0,
                gid: 0
            }
        );
    }

    #[test]
    fn sudo_chown_and_mode_commands() {
        let exec = Arc::new(
            MockExecutor::new()
                .respond("sudo -n chmod 0644 -- /etc/a", true, "")
                .respond("sudo -n chown -h 0:0 -- /etc/a", true, ""),
        );
        let ops = SudoFileOps::new(exec.clone());
        ops.set_mode(Path::new("/etc/a"), 0o644).unwrap();
        ops.chown(Path::new("/etc/a"), Owner::ROOT).unwrap();
        assert_eq!(exec.calls().len(), 2);
    }

    #[test]
    fn command_error_kinds() {
        let result = |stderr: &str| ExecResult {
            stdout: String::new(),
            stdout_bytes: Vec::new(),
            stderr: stderr.to_string(),
            success: false,
            code: Some(1),
        };
        assert_eq!(
            command_error(&result("cat: /x: No such file or directory")).kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            command_error(&result("sh: 1: cannot create /x: File exists")).kind(),
            io::ErrorKind::AlreadyExists
        );
        assert_eq!(
            command_error(&result("sudo: a password is required")).kind(),
            io::ErrorKind::PermissionDenied
        );
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    #[test]
    fn local_access_uses_one_owner() {
        let owner = Owner { uid: 1000, gid: 1000 };
        let access = Access::local(owner);
        assert_eq!(access.owner(Privilege::System), owner);
        assert!(!access.uses_sudo());
    }

    #[test]
    fn unprivileged_host_uses_sudo_for_system() {
        let platform = Platform {
            kernel: None,
            is_arch: true,
            euid: 1000,
            invoker: crate::platform::Invoker {
                uid: 1000,
                gid: 1000,
                home: PathBuf::from("/home/me"),
            },
        };
        let exec: Arc<dyn Executor> = Arc::new(MockExecutor::new());
        let access = Access::for_host(&platform, false, Arc::clone(&exec));
        assert!(access.uses_sudo());
        assert_eq!(access.owner(Privilege::System), Owner::ROOT);
        assert_eq!(access.owner(Privilege::User).uid, 1000);

        let staged = Access::for_host(&platform, true, exec);
        assert!(!staged.uses_sudo());
        assert_eq!(staged.owner(Privilege::System).uid, 1000);
    }
}
