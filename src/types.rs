/*!
 * Core types and data structures for the PackFS application
 */

/// Record type flag stored in an archive header block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// Regular file with content blocks
    Normal,
    /// Hard link to a previously archived file
    Hardlink,
    /// Symbolic link
    Symlink,
    /// Character device node
    CharDevice,
    /// Block device node
    BlockDevice,
    /// Directory
    Directory,
    /// Named pipe
    Fifo,
    /// Marker: the following continuation blocks hold a long entry name
    LongName,
    /// Marker: the following continuation blocks hold a long link target
    LongLinkName,
}

impl EntryType {
    /// The one-byte type flag written at offset 156 of a record
    pub fn flag(self) -> u8 {
        match self {
            EntryType::Normal => b'0',
            EntryType::Hardlink => b'1',
            EntryType::Symlink => b'2',
            EntryType::CharDevice => b'3',
            EntryType::BlockDevice => b'4',
            EntryType::Directory => b'5',
            EntryType::Fifo => b'6',
            EntryType::LongName => b'L',
            EntryType::LongLinkName => b'K',
        }
    }

    /// Decode a type flag. Pre-POSIX archives use NUL for regular files.
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 | b'0' => Some(EntryType::Normal),
            b'1' => Some(EntryType::Hardlink),
            b'2' => Some(EntryType::Symlink),
            b'3' => Some(EntryType::CharDevice),
            b'4' => Some(EntryType::BlockDevice),
            b'5' => Some(EntryType::Directory),
            b'6' => Some(EntryType::Fifo),
            b'L' => Some(EntryType::LongName),
            b'K' => Some(EntryType::LongLinkName),
            _ => None,
        }
    }
}

/// Kind of a filesystem node as reported by `FsProvider::stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Character device
    CharDevice,
    /// Block device
    BlockDevice,
    /// Named pipe
    Fifo,
    /// Socket (not representable in the archive format)
    Socket,
}

/// Metadata for one filesystem node, as returned by the provider's lstat
#[derive(Debug, Clone)]
pub struct FileStat {
    /// Node kind
    pub kind: FileKind,
    /// Permission and special-mode bits
    pub mode: u32,
    /// Numeric owner id
    pub uid: u32,
    /// Numeric group id
    pub gid: u32,
    /// Content size in bytes (0 for non-regular nodes)
    pub size: u64,
    /// Modification time, seconds since the epoch
    pub mtime: i64,
    /// Hard link count
    pub nlink: u64,
    /// Inode number
    pub ino: u64,
    /// Device the node lives on
    pub dev: u64,
    /// Device major number (device nodes only)
    pub dev_major: u64,
    /// Device minor number (device nodes only)
    pub dev_minor: u64,
}
