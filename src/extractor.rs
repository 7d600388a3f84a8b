/*!
 * Tree extractor
 *
 * Consumes an archive record stream sequentially and rebuilds the
 * filesystem tree underneath a destination directory: one stateful pass,
 * long-name continuations resolved before the entry they belong to,
 * stopping at the all-zero terminator block.
 */

use std::ffi::OsStr;
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use indicatif::ProgressBar;

use crate::error::Result;
use crate::provider::FsProvider;
use crate::record::{blocks_for, check_marker, EntryHeader, Record, BLOCK_LEN};
use crate::types::{EntryType, FileKind};
use crate::{bail, ensure};

/// Extractor statistics for one run
#[derive(Debug, Clone, Default)]
pub struct ExtractStatistics {
    /// Number of entries reconstructed
    pub entries: usize,
    /// Regular files
    pub files: usize,
    /// Directories
    pub directories: usize,
    /// Symbolic links
    pub symlinks: usize,
    /// Hard links
    pub hardlinks: usize,
    /// FIFO and device nodes
    pub special: usize,
    /// Bytes of file content written
    pub content_bytes: u64,
    /// Header blocks whose stored checksum did not match (reported, not fatal)
    pub checksum_mismatches: usize,
}

/// Extractor for archive streams
pub struct Extractor<P: FsProvider> {
    /// Filesystem provider
    provider: P,
    /// Progress bar
    pub progress: Arc<ProgressBar>,
    /// Run statistics
    statistics: ExtractStatistics,
    /// Directory modes held back until all children exist
    pending_dir_modes: Vec<(PathBuf, u32)>,
}

impl<P: FsProvider> Extractor<P> {
    /// Create a new extractor
    pub fn new(provider: P, progress: Arc<ProgressBar>) -> Self {
        Self {
            provider,
            progress,
            statistics: ExtractStatistics::default(),
            pending_dir_modes: Vec::new(),
        }
    }

    /// Get extractor statistics
    pub fn statistics(&self) -> ExtractStatistics {
        self.statistics.clone()
    }

    /// Rebuild the archived tree underneath `dest`
    pub fn extract<R: Read>(&mut self, input: &mut R, dest: &Path) -> Result<()> {
        let mut pending_name: Option<Vec<u8>> = None;
        let mut pending_link: Option<Vec<u8>> = None;

        loop {
            let record = read_block(input)?;
            if record.is_terminator() {
                break;
            }

            if !record.verify_checksum() {
                self.statistics.checksum_mismatches += 1;
                eprintln!(
                    "Warning: checksum mismatch for entry {:?}",
                    String::from_utf8_lossy(record.name())
                );
            }

            let header = EntryHeader::decode(&record)?;

            match header.entry_type {
                EntryType::LongName => {
                    check_marker(&record)?;
                    pending_name = Some(read_long_payload(input, header.size)?);
                    continue;
                }
                EntryType::LongLinkName => {
                    check_marker(&record)?;
                    pending_link = Some(read_long_payload(input, header.size)?);
                    continue;
                }
                _ => {}
            }

            let name = resolve_pending(pending_name.take(), &header.name)?;
            let link_name = resolve_pending(pending_link.take(), &header.link_name)?;

            self.apply_entry(&header, &name, &link_name, input, dest)?;
        }

        // Directory records precede their children in the stream, so a
        // read-only mode applied immediately would block creating the
        // children. Modes are restored after the loop, deepest first.
        for (path, mode) in std::mem::take(&mut self.pending_dir_modes).into_iter().rev() {
            self.provider.set_mode(&path, mode)?;
        }

        Ok(())
    }

    /// Reconstruct one entry and consume its content blocks
    fn apply_entry<R: Read>(
        &mut self,
        header: &EntryHeader,
        name: &[u8],
        link_name: &[u8],
        input: &mut R,
        dest: &Path,
    ) -> Result<()> {
        let path = safe_join(dest, name)?;
        self.tick(&path);
        self.statistics.entries += 1;

        match header.entry_type {
            EntryType::Directory => {
                self.provider.create_dir_all(&path)?;
                self.pending_dir_modes.push((path, header.mode));
                self.statistics.directories += 1;
            }
            EntryType::Symlink => {
                self.ensure_parent(&path)?;
                self.provider.remove(&path)?;
                // Symlink targets are stored verbatim, not archive-relative.
                let target = PathBuf::from(OsStr::from_bytes(link_name).to_os_string());
                self.provider.create_symlink(&target, &path)?;
                self.statistics.symlinks += 1;
            }
            EntryType::Hardlink => {
                self.ensure_parent(&path)?;
                self.provider.remove(&path)?;
                let target = safe_join(dest, link_name)?;
                self.provider.create_hardlink(&target, &path)?;
                self.statistics.hardlinks += 1;
            }
            EntryType::Fifo => {
                self.ensure_parent(&path)?;
                self.provider.remove(&path)?;
                self.provider.create_fifo(&path, header.mode)?;
                self.provider.set_mode(&path, header.mode)?;
                self.statistics.special += 1;
            }
            EntryType::CharDevice | EntryType::BlockDevice => {
                let kind = if header.entry_type == EntryType::CharDevice {
                    FileKind::CharDevice
                } else {
                    FileKind::BlockDevice
                };
                self.ensure_parent(&path)?;
                self.provider.remove(&path)?;
                self.provider
                    .create_device(&path, kind, header.mode, header.dev_major, header.dev_minor)?;
                self.provider.set_mode(&path, header.mode)?;
                self.statistics.special += 1;
            }
            EntryType::Normal => {
                self.ensure_parent(&path)?;
                self.provider.remove(&path)?;
                self.write_file(&path, header.size, input)?;
                self.provider.set_mode(&path, header.mode)?;
                self.provider
                    .set_owner(&path, header.uid as u32, header.gid as u32)?;
                self.provider.set_times(&path, header.mtime)?;
                self.statistics.files += 1;
            }
            EntryType::LongName | EntryType::LongLinkName => {
                // Handled before dispatch; a marker reaching here means two
                // markers of the same kind in a row.
                bail!(
                    Integrity,
                    "unexpected long-name marker in entry position for {:?}",
                    String::from_utf8_lossy(name)
                );
            }
        }

        Ok(())
    }

    /// Stream exactly `size` content bytes, discarding the zero padding of
    /// the final block
    fn write_file<R: Read>(&mut self, path: &Path, size: u64, input: &mut R) -> Result<()> {
        let mut writer = self.provider.create_file(path)?;
        let mut remaining = size;

        while remaining > 0 {
            let record = read_block(input)?;
            let take = remaining.min(BLOCK_LEN as u64) as usize;
            writer.write_all(&record.as_bytes()[..take])?;
            remaining -= take as u64;
        }

        writer.flush()?;
        self.statistics.content_bytes += size;
        Ok(())
    }

    fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.provider.create_dir_all(parent)?;
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

/// Read one 512-byte block; a short read is a truncated archive
fn read_block<R: Read>(input: &mut R) -> Result<Record> {
    let mut buf = [0u8; BLOCK_LEN];
    input.read_exact(&mut buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            crate::error!(Integrity, "unexpected end of archive stream")
        } else {
            e.into()
        }
    })?;
    Ok(Record::from_bytes(buf))
}

/// Read the continuation blocks of a long-name marker. `size` counts the
/// path bytes plus the terminating NUL.
fn read_long_payload<R: Read>(input: &mut R, size: u64) -> Result<Vec<u8>> {
    ensure!(size > 0, Integrity, "long-name marker with zero size");

    let mut payload = Vec::with_capacity(size as usize);
    let mut remaining = blocks_for(size);
    while remaining > 0 {
        let record = read_block(input)?;
        payload.extend_from_slice(record.as_bytes());
        remaining -= 1;
    }

    payload.truncate(size as usize);
    if let Some(nul) = payload.iter().position(|&b| b == 0) {
        payload.truncate(nul);
    }
    Ok(payload)
}

/// Effective name of an entry: the pending long name when present, the
/// record's truncated field otherwise. A pending name must agree with the
/// truncated field on the overlapping prefix.
fn resolve_pending(pending: Option<Vec<u8>>, short: &[u8]) -> Result<Vec<u8>> {
    match pending {
        Some(long) => {
            ensure!(
                long.starts_with(short),
                Integrity,
                "long name {:?} disagrees with entry field {:?}",
                String::from_utf8_lossy(&long),
                String::from_utf8_lossy(short)
            );
            Ok(long)
        }
        None => Ok(short.to_vec()),
    }
}

/// Join an archived name onto the destination, refusing components that
/// would escape it
fn safe_join(dest: &Path, name: &[u8]) -> Result<PathBuf> {
    let rel = PathBuf::from(OsStr::from_bytes(name).to_os_string());
    let mut path = dest.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir | Component::RootDir => {}
            _ => bail!(
                Integrity,
                "entry name {:?} escapes the extraction root",
                String::from_utf8_lossy(name)
            ),
        }
    }
    Ok(path)
}
