/*!
 * Tree archiver
 *
 * Walks a filesystem subtree depth-first and emits one or more 512-byte
 * records per entry into a byte sink. Hardlinked files are deduplicated
 * through the `HardlinkTracker`; names and link targets longer than the
 * fixed 100-byte fields are carried in long-name continuation blocks.
 */

use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::ProgressBar;

use crate::bail;
use crate::error::Result;
use crate::hardlink::HardlinkTracker;
use crate::provider::FsProvider;
use crate::record::{blocks_for, long_name_header, EntryHeader, BLOCK_LEN, NAME_LEN};
use crate::types::{EntryType, FileKind, FileStat};

/// Archiver statistics for one run
#[derive(Debug, Clone, Default)]
pub struct ArchiveStatistics {
    /// Number of entries emitted
    pub entries: usize,
    /// Regular files with content
    pub files: usize,
    /// Directories
    pub directories: usize,
    /// Symbolic links
    pub symlinks: usize,
    /// Hardlink records emitted instead of duplicate content
    pub hardlinks: usize,
    /// FIFO and device nodes
    pub special: usize,
    /// Bytes of file content read
    pub content_bytes: u64,
    /// Bytes written to the archive stream, terminator included
    pub written_bytes: u64,
}

/// Archiver for directory trees
pub struct Archiver<P: FsProvider> {
    /// Filesystem provider
    provider: P,
    /// Progress bar
    pub progress: Arc<ProgressBar>,
    /// Inode dedup state, one per run
    tracker: HardlinkTracker,
    /// Run statistics
    statistics: ArchiveStatistics,
}

impl<P: FsProvider> Archiver<P> {
    /// Create a new archiver
    pub fn new(provider: P, progress: Arc<ProgressBar>) -> Self {
        Self {
            provider,
            progress,
            tracker: HardlinkTracker::new(),
            statistics: ArchiveStatistics::default(),
        }
    }

    /// Get archiver statistics
    pub fn statistics(&self) -> ArchiveStatistics {
        self.statistics.clone()
    }

    /// Archive the subtree rooted at `root` into `out`, terminated by two
    /// all-zero blocks. Traversal is an explicit work-stack, so depth is
    /// not bounded by the call stack.
    pub fn archive<W: Write>(&mut self, root: &Path, out: &mut W) -> Result<()> {
        let root = strip_trailing_separator(root);

        let mut stack = vec![root];
        while let Some(path) = stack.pop() {
            let stat = self.provider.stat(&path)?;

            if stat.kind == FileKind::Directory {
                self.write_directory(&path, &stat, out)?;

                let mut children = self.provider.list_children(&path)?;
                // Popped in listing order.
                children.reverse();
                for child in children {
                    stack.push(path.join(child));
                }
            } else {
                self.write_entry(&path, &stat, out)?;
            }
        }

        // End-of-archive: two all-zero blocks.
        out.write_all(&[0u8; BLOCK_LEN])?;
        out.write_all(&[0u8; BLOCK_LEN])?;
        self.statistics.written_bytes += 2 * BLOCK_LEN as u64;

        Ok(())
    }

    /// Emit a directory record. The filesystem root itself has no record
    /// but its children are still walked.
    fn write_directory<W: Write>(&mut self, path: &Path, stat: &FileStat, out: &mut W) -> Result<()> {
        self.tick(path);

        let mut name = archive_name(path);
        if name.is_empty() {
            return Ok(());
        }
        name.push(b'/');

        if name.len() > NAME_LEN {
            self.write_long_name(&name, EntryType::LongName, out)?;
        }

        let header = self.header_for(name, EntryType::Directory, stat, Vec::new(), 0);
        self.write_header(&header, out)?;
        self.statistics.directories += 1;

        Ok(())
    }

    /// Emit the record(s) for one non-directory entry
    fn write_entry<W: Write>(&mut self, path: &Path, stat: &FileStat, out: &mut W) -> Result<()> {
        self.tick(path);

        let name = archive_name(path);

        match stat.kind {
            FileKind::Symlink => {
                let target = self.provider.read_link(path)?;
                let target = target.as_os_str().as_bytes().to_vec();
                if target.len() > NAME_LEN {
                    self.write_long_name(&target, EntryType::LongLinkName, out)?;
                }
                if name.len() > NAME_LEN {
                    self.write_long_name(&name, EntryType::LongName, out)?;
                }
                let header = self.header_for(name, EntryType::Symlink, stat, target, 0);
                self.write_header(&header, out)?;
                self.statistics.symlinks += 1;
            }
            FileKind::Regular => {
                if stat.nlink > 1 {
                    if let Some(prior) = self.tracker.resolve(stat.dev, stat.ino, &name) {
                        if prior.len() > NAME_LEN {
                            self.write_long_name(&prior, EntryType::LongLinkName, out)?;
                        }
                        if name.len() > NAME_LEN {
                            self.write_long_name(&name, EntryType::LongName, out)?;
                        }
                        let header = self.header_for(name, EntryType::Hardlink, stat, prior, 0);
                        self.write_header(&header, out)?;
                        self.statistics.hardlinks += 1;
                        return Ok(());
                    }
                }

                if name.len() > NAME_LEN {
                    self.write_long_name(&name, EntryType::LongName, out)?;
                }
                let header = self.header_for(name, EntryType::Normal, stat, Vec::new(), stat.size);
                self.write_header(&header, out)?;
                self.write_content(path, stat.size, out)?;
                self.statistics.files += 1;
            }
            FileKind::Fifo => {
                if name.len() > NAME_LEN {
                    self.write_long_name(&name, EntryType::LongName, out)?;
                }
                let header = self.header_for(name, EntryType::Fifo, stat, Vec::new(), 0);
                self.write_header(&header, out)?;
                self.statistics.special += 1;
            }
            FileKind::CharDevice | FileKind::BlockDevice => {
                let entry_type = if stat.kind == FileKind::CharDevice {
                    EntryType::CharDevice
                } else {
                    EntryType::BlockDevice
                };
                if name.len() > NAME_LEN {
                    self.write_long_name(&name, EntryType::LongName, out)?;
                }
                let header = self.header_for(name, entry_type, stat, Vec::new(), 0);
                self.write_header(&header, out)?;
                self.statistics.special += 1;
            }
            FileKind::Socket | FileKind::Directory => {
                bail!(
                    Unsupported,
                    "cannot archive {} as {:?}",
                    path.display(),
                    stat.kind
                );
            }
        }

        Ok(())
    }

    /// Build a header from stat metadata, resolving owner/group display
    /// names with numeric fallback
    fn header_for(
        &self,
        name: Vec<u8>,
        entry_type: EntryType,
        stat: &FileStat,
        link_name: Vec<u8>,
        size: u64,
    ) -> EntryHeader {
        EntryHeader {
            name,
            entry_type,
            mode: stat.mode,
            uid: u64::from(stat.uid),
            gid: u64::from(stat.gid),
            size,
            mtime: stat.mtime,
            link_name,
            owner: self.provider.lookup_user_name(stat.uid),
            group: self.provider.lookup_group_name(stat.gid),
            dev_major: stat.dev_major,
            dev_minor: stat.dev_minor,
        }
    }

    fn write_header<W: Write>(&mut self, header: &EntryHeader, out: &mut W) -> Result<()> {
        out.write_all(header.encode()?.as_bytes())?;
        self.statistics.entries += 1;
        self.statistics.written_bytes += BLOCK_LEN as u64;
        Ok(())
    }

    /// Emit a long-name marker record followed by continuation blocks
    /// holding the literal path bytes plus a terminating NUL
    fn write_long_name<W: Write>(
        &mut self,
        path: &[u8],
        entry_type: EntryType,
        out: &mut W,
    ) -> Result<()> {
        let header = long_name_header(entry_type, path.len());
        self.write_header(&header, out)?;

        let blocks = blocks_for(header.size) as usize;
        let mut payload = vec![0u8; blocks * BLOCK_LEN];
        payload[..path.len()].copy_from_slice(path);
        out.write_all(&payload)?;
        self.statistics.written_bytes += payload.len() as u64;

        Ok(())
    }

    /// Stream `size` bytes of file content, zero-padded to a block boundary
    fn write_content<W: Write>(&mut self, path: &Path, size: u64, out: &mut W) -> Result<()> {
        let mut reader = self.provider.open_for_read(path)?;
        let mut remaining = size;
        let mut block = [0u8; BLOCK_LEN];

        while remaining > 0 {
            block.fill(0);
            let want = remaining.min(BLOCK_LEN as u64) as usize;
            let mut filled = 0;
            while filled < want {
                let n = reader.read(&mut block[filled..want])?;
                if n == 0 {
                    bail!(
                        Integrity,
                        "{} shrank while being archived ({} bytes short)",
                        path.display(),
                        remaining - filled as u64
                    );
                }
                filled += n;
            }
            out.write_all(&block)?;
            remaining -= want as u64;
            self.statistics.content_bytes += want as u64;
            self.statistics.written_bytes += BLOCK_LEN as u64;
        }

        Ok(())
    }

    fn tick(&self, path: &Path) {
        self.progress.inc(1);
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        self.progress
            .set_message(format!("Current entry: {}", file_name));
    }
}

/// Archive names are relative: the leading separator is stripped
fn archive_name(path: &Path) -> Vec<u8> {
    let bytes = path.as_os_str().as_bytes();
    match bytes.strip_prefix(b"/") {
        Some(stripped) => stripped.to_vec(),
        None => bytes.to_vec(),
    }
}

/// Drop trailing separators from the scan root, keeping `/` itself intact
fn strip_trailing_separator(root: &Path) -> PathBuf {
    let mut bytes = root.as_os_str().as_bytes();
    while bytes.len() > 1 && bytes.ends_with(b"/") {
        bytes = &bytes[..bytes.len() - 1];
    }
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes).to_os_string())
}
