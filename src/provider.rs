/*!
 * Filesystem provider interface
 *
 * The archiver and extractor never touch the filesystem directly; they go
 * through this narrow provider trait. `LocalFs` is the real implementation
 * on top of std, nix and filetime.
 */

use std::ffi::OsString;
use std::fs::{self, File, Permissions};
use std::io::{Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use nix::sys::stat::{major, makedev, minor, mknod, Mode, SFlag};
use nix::unistd::{chown, mkfifo, Gid, Group, Uid, User};

use crate::error::Result;
use crate::types::{FileKind, FileStat};

/// Narrow filesystem interface consumed by the archiver and extractor
pub trait FsProvider {
    /// lstat: metadata of the node itself, never following symlinks
    fn stat(&self, path: &Path) -> Result<FileStat>;

    /// Names of a directory's children, excluding `.` and `..`
    fn list_children(&self, path: &Path) -> Result<Vec<OsString>>;

    /// Target of a symbolic link
    fn read_link(&self, path: &Path) -> Result<PathBuf>;

    /// Open a regular file for byte-for-byte reading
    fn open_for_read(&self, path: &Path) -> Result<Box<dyn Read>>;

    /// Create a directory and any missing parents; idempotent
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Create a symbolic link at `path` pointing at `target`
    fn create_symlink(&self, target: &Path, path: &Path) -> Result<()>;

    /// Create a hard link at `path` referencing `target`
    fn create_hardlink(&self, target: &Path, path: &Path) -> Result<()>;

    /// Create a FIFO with the given permission bits
    fn create_fifo(&self, path: &Path, mode: u32) -> Result<()>;

    /// Create a character or block special file
    fn create_device(&self, path: &Path, kind: FileKind, mode: u32, dev_major: u64, dev_minor: u64)
        -> Result<()>;

    /// Create (truncate) a regular file for writing
    fn create_file(&self, path: &Path) -> Result<Box<dyn Write>>;

    /// Remove whatever node exists at `path`; missing nodes are fine
    fn remove(&self, path: &Path) -> Result<()>;

    /// Restore permission bits
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;

    /// Restore numeric owner and group
    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> Result<()>;

    /// Restore access and modification time to `mtime` seconds since epoch
    fn set_times(&self, path: &Path, mtime: i64) -> Result<()>;

    /// Display name for a numeric user id, falling back to the id itself
    fn lookup_user_name(&self, uid: u32) -> String;

    /// Display name for a numeric group id, falling back to the id itself
    fn lookup_group_name(&self, gid: u32) -> String;
}

/// Provider backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FsProvider for LocalFs {
    fn stat(&self, path: &Path) -> Result<FileStat> {
        let md = fs::symlink_metadata(path)?;
        let ft = md.file_type();

        let kind = if ft.is_dir() {
            FileKind::Directory
        } else if ft.is_symlink() {
            FileKind::Symlink
        } else if ft.is_char_device() {
            FileKind::CharDevice
        } else if ft.is_block_device() {
            FileKind::BlockDevice
        } else if ft.is_fifo() {
            FileKind::Fifo
        } else if ft.is_socket() {
            FileKind::Socket
        } else {
            FileKind::Regular
        };

        Ok(FileStat {
            kind,
            mode: md.mode() & 0o7777,
            uid: md.uid(),
            gid: md.gid(),
            size: if kind == FileKind::Regular { md.len() } else { 0 },
            mtime: md.mtime(),
            nlink: md.nlink(),
            ino: md.ino(),
            dev: md.dev(),
            dev_major: major(md.rdev()),
            dev_minor: minor(md.rdev()),
        })
    }

    fn list_children(&self, path: &Path) -> Result<Vec<OsString>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name());
        }
        Ok(names)
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        Ok(fs::read_link(path)?)
    }

    fn open_for_read(&self, path: &Path) -> Result<Box<dyn Read>> {
        Ok(Box::new(File::open(path)?))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path)?)
    }

    fn create_symlink(&self, target: &Path, path: &Path) -> Result<()> {
        Ok(std::os::unix::fs::symlink(target, path)?)
    }

    fn create_hardlink(&self, target: &Path, path: &Path) -> Result<()> {
        Ok(fs::hard_link(target, path)?)
    }

    fn create_fifo(&self, path: &Path, mode: u32) -> Result<()> {
        mkfifo(path, Mode::from_bits_truncate(mode))?;
        Ok(())
    }

    fn create_device(
        &self,
        path: &Path,
        kind: FileKind,
        mode: u32,
        dev_major: u64,
        dev_minor: u64,
    ) -> Result<()> {
        let flag = match kind {
            FileKind::BlockDevice => SFlag::S_IFBLK,
            _ => SFlag::S_IFCHR,
        };
        mknod(
            path,
            flag,
            Mode::from_bits_truncate(mode),
            makedev(dev_major, dev_minor),
        )?;
        Ok(())
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn Write>> {
        Ok(Box::new(File::create(path)?))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let md = match fs::symlink_metadata(path) {
            Ok(md) => md,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if md.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        Ok(fs::set_permissions(path, Permissions::from_mode(mode))?)
    }

    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))?;
        Ok(())
    }

    fn set_times(&self, path: &Path, mtime: i64) -> Result<()> {
        let time = FileTime::from_unix_time(mtime, 0);
        Ok(filetime::set_file_times(path, time, time)?)
    }

    fn lookup_user_name(&self, uid: u32) -> String {
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(Some(user)) => user.name,
            _ => uid.to_string(),
        }
    }

    fn lookup_group_name(&self, gid: u32) -> String {
        match Group::from_gid(Gid::from_raw(gid)) {
            Ok(Some(group)) => group.name,
            _ => gid.to_string(),
        }
    }
}
