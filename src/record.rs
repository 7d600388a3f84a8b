/*!
 * Archive record codec
 *
 * One archive record is a fixed 512-byte block. Header blocks follow the
 * legacy tar layout for the first 156 bytes and the UStar extension after
 * that; content blocks are raw bytes. The layout is bit-exact with the
 * legacy/UStar hybrid this tool reads and writes, so all field offsets are
 * spelled out here instead of relying on a packed struct.
 */

use crate::types::EntryType;
use crate::{ensure, error::Result};

/// Length of one archive block
pub const BLOCK_LEN: usize = 512;

/// Capacity of the name and link-name fields
pub const NAME_LEN: usize = 100;

/// Name carried by long-name and long-linkname marker records
pub const LONG_NAME_MARKER: &[u8] = b"././@LongLink";

/// Magic written at offset 257
pub const MAGIC: &[u8; 8] = b"ustar  \0";

// Field offsets within a header block.
const NAME: usize = 0; // len 100
const MODE: usize = 100; // len 8
const UID: usize = 108; // len 8
const GID: usize = 116; // len 8
const SIZE: usize = 124; // len 12
const MTIME: usize = 136; // len 12
const CHECKSUM: usize = 148; // len 8
const TYPEFLAG: usize = 156; // len 1
const LINK_NAME: usize = 157; // len 100
const MAGIC_OFF: usize = 257; // len 8
const OWNER: usize = 265; // len 32
const GROUP: usize = 297; // len 32
const DEV_MAJOR: usize = 329; // len 8
const DEV_MINOR: usize = 337; // len 8

/// A single 512-byte archive block
#[derive(Debug, Clone)]
pub struct Record {
    bytes: [u8; BLOCK_LEN],
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// Create an all-zero record
    pub fn new() -> Self {
        Self {
            bytes: [0; BLOCK_LEN],
        }
    }

    /// Wrap a raw block
    pub fn from_bytes(bytes: [u8; BLOCK_LEN]) -> Self {
        Self { bytes }
    }

    /// Raw block bytes
    pub fn as_bytes(&self) -> &[u8; BLOCK_LEN] {
        &self.bytes
    }

    /// Mutable raw block bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8; BLOCK_LEN] {
        &mut self.bytes
    }

    /// An entirely empty name field signals the end of the archive
    pub fn is_terminator(&self) -> bool {
        self.bytes[NAME..NAME + NAME_LEN].iter().all(|&b| b == 0)
    }

    /// Name field bytes up to the first NUL, truncated at 100 bytes
    pub fn name(&self) -> &[u8] {
        field_str(&self.bytes[NAME..NAME + NAME_LEN])
    }

    /// Link-name field bytes up to the first NUL
    pub fn link_name(&self) -> &[u8] {
        field_str(&self.bytes[LINK_NAME..LINK_NAME + NAME_LEN])
    }

    /// Copy up to 100 bytes of `name` into the name field
    pub fn set_name(&mut self, name: &[u8]) {
        copy_field(&mut self.bytes[NAME..NAME + NAME_LEN], name);
    }

    /// Copy up to 100 bytes of `target` into the link-name field
    pub fn set_link_name(&mut self, target: &[u8]) {
        copy_field(&mut self.bytes[LINK_NAME..LINK_NAME + NAME_LEN], target);
    }

    /// Type flag byte
    pub fn typeflag(&self) -> u8 {
        self.bytes[TYPEFLAG]
    }

    /// Set the type flag byte
    pub fn set_typeflag(&mut self, flag: u8) {
        self.bytes[TYPEFLAG] = flag;
    }

    /// Owner display name
    pub fn owner(&self) -> String {
        String::from_utf8_lossy(field_str(&self.bytes[OWNER..OWNER + 32])).into_owned()
    }

    /// Group display name
    pub fn group(&self) -> String {
        String::from_utf8_lossy(field_str(&self.bytes[GROUP..GROUP + 32])).into_owned()
    }

    /// Write the owner display name, truncated to keep a terminating NUL
    pub fn set_owner(&mut self, name: &str) {
        copy_name_field(&mut self.bytes[OWNER..OWNER + 32], name);
    }

    /// Write the group display name, truncated to keep a terminating NUL
    pub fn set_group(&mut self, name: &str) {
        copy_name_field(&mut self.bytes[GROUP..GROUP + 32], name);
    }

    /// Write the UStar magic
    pub fn set_magic(&mut self) {
        self.bytes[MAGIC_OFF..MAGIC_OFF + 8].copy_from_slice(MAGIC);
    }

    /// Read a numeric field as octal ASCII
    pub fn octal(&self, offset: usize, width: usize) -> u64 {
        parse_octal(&self.bytes[offset..offset + width])
    }

    /// Write a numeric field as zero-padded octal ASCII with a trailing
    /// NUL. Errors when the value needs more digits than the field holds.
    pub fn set_octal(&mut self, offset: usize, width: usize, value: u64) -> Result<()> {
        write_octal(&mut self.bytes[offset..offset + width], value)
    }

    /// Permission and special-mode bits
    pub fn mode(&self) -> u32 {
        self.octal(MODE, 8) as u32
    }

    /// Numeric owner id
    pub fn uid(&self) -> u64 {
        self.octal(UID, 8)
    }

    /// Numeric group id
    pub fn gid(&self) -> u64 {
        self.octal(GID, 8)
    }

    /// Content size in bytes
    pub fn size(&self) -> u64 {
        self.octal(SIZE, 12)
    }

    /// Modification time, seconds since the epoch
    pub fn mtime(&self) -> u64 {
        self.octal(MTIME, 12)
    }

    /// Device major number
    pub fn dev_major(&self) -> u64 {
        self.octal(DEV_MAJOR, 8)
    }

    /// Device minor number
    pub fn dev_minor(&self) -> u64 {
        self.octal(DEV_MINOR, 8)
    }

    /// Unsigned sum of all 512 bytes with the checksum field read as spaces
    pub fn checksum(&self) -> u32 {
        self.bytes
            .iter()
            .enumerate()
            .map(|(i, &b)| {
                if (CHECKSUM..CHECKSUM + 8).contains(&i) {
                    u32::from(b' ')
                } else {
                    u32::from(b)
                }
            })
            .sum()
    }

    /// Compute the checksum and store it as 6 octal digits + NUL + space.
    /// The sum of 512 bytes always fits 6 octal digits.
    pub fn write_checksum(&mut self) -> Result<()> {
        let sum = self.checksum();
        self.bytes[CHECKSUM..CHECKSUM + 8].fill(b' ');
        write_octal(&mut self.bytes[CHECKSUM..CHECKSUM + 7], u64::from(sum))
    }

    /// Check the stored checksum against a fresh computation
    pub fn verify_checksum(&self) -> bool {
        parse_octal(&self.bytes[CHECKSUM..CHECKSUM + 8]) == u64::from(self.checksum())
    }
}

/// Structured view of one header block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Archive-relative entry name (truncated to 100 bytes in the record)
    pub name: Vec<u8>,
    /// Record type
    pub entry_type: EntryType,
    /// Permission and special-mode bits
    pub mode: u32,
    /// Numeric owner id
    pub uid: u64,
    /// Numeric group id
    pub gid: u64,
    /// Content size in bytes
    pub size: u64,
    /// Modification time, seconds since the epoch
    pub mtime: i64,
    /// Link target for symlink/hardlink records
    pub link_name: Vec<u8>,
    /// Owner display name
    pub owner: String,
    /// Group display name
    pub group: String,
    /// Device major number (device records only)
    pub dev_major: u64,
    /// Device minor number (device records only)
    pub dev_minor: u64,
}

impl EntryHeader {
    /// Serialize into a 512-byte record with a valid checksum. Errors when
    /// a numeric value is too wide for its octal field, rather than
    /// emitting a wrapped value that would mis-frame the stream.
    pub fn encode(&self) -> Result<Record> {
        let mut record = Record::new();
        record.set_name(&self.name);
        record.set_octal(MODE, 8, u64::from(self.mode & 0o7777))?;
        record.set_octal(UID, 8, self.uid)?;
        record.set_octal(GID, 8, self.gid)?;
        record.set_octal(SIZE, 12, self.size)?;
        record.set_octal(MTIME, 12, self.mtime.max(0) as u64)?;
        record.set_typeflag(self.entry_type.flag());
        record.set_link_name(&self.link_name);
        record.set_magic();
        record.set_owner(&self.owner);
        record.set_group(&self.group);
        if matches!(
            self.entry_type,
            EntryType::CharDevice | EntryType::BlockDevice
        ) {
            record.set_octal(DEV_MAJOR, 8, self.dev_major)?;
            record.set_octal(DEV_MINOR, 8, self.dev_minor)?;
        }
        record.write_checksum()?;
        Ok(record)
    }

    /// Parse a header block back into its structured form
    pub fn decode(record: &Record) -> Result<Self> {
        let flag = record.typeflag();
        let entry_type = match EntryType::from_flag(flag) {
            Some(t) => t,
            None => {
                return Err(crate::error!(
                    Integrity,
                    "unknown record type flag {:#04x} for entry {:?}",
                    flag,
                    String::from_utf8_lossy(record.name())
                ))
            }
        };

        Ok(Self {
            name: record.name().to_vec(),
            entry_type,
            mode: record.mode() & 0o7777,
            uid: record.uid(),
            gid: record.gid(),
            size: record.size(),
            mtime: record.mtime() as i64,
            link_name: record.link_name().to_vec(),
            owner: record.owner(),
            group: record.group(),
            dev_major: record.dev_major(),
            dev_minor: record.dev_minor(),
        })
    }
}

/// Build a long-name or long-linkname marker header for a path of the
/// given length. `size` is the path length plus its terminating NUL.
pub fn long_name_header(entry_type: EntryType, path_len: usize) -> EntryHeader {
    EntryHeader {
        name: LONG_NAME_MARKER.to_vec(),
        entry_type,
        mode: 0o644,
        uid: 0,
        gid: 0,
        size: (path_len + 1) as u64,
        mtime: 0,
        link_name: Vec::new(),
        owner: "root".to_string(),
        group: "root".to_string(),
        dev_major: 0,
        dev_minor: 0,
    }
}

/// Number of 512-byte blocks needed to hold `size` bytes of content
pub fn blocks_for(size: u64) -> u64 {
    (size + BLOCK_LEN as u64 - 1) / BLOCK_LEN as u64
}

/// Validate that a marker record really is named `././@LongLink`
pub fn check_marker(record: &Record) -> Result<()> {
    ensure!(
        record.name() == LONG_NAME_MARKER,
        Integrity,
        "long-name marker has unexpected name {:?}",
        String::from_utf8_lossy(record.name())
    );
    Ok(())
}

fn field_str(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

fn copy_field(field: &mut [u8], value: &[u8]) {
    let len = value.len().min(field.len());
    field[..len].copy_from_slice(&value[..len]);
}

fn copy_name_field(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len() - 1);
    field[..len].copy_from_slice(&bytes[..len]);
}

/// Parse an octal ASCII field. Leading NUL/space padding is skipped and
/// parsing stops at the first non-digit, which tolerates the legacy
/// format's mixed terminators.
fn parse_octal(field: &[u8]) -> u64 {
    let mut value = 0u64;
    let mut seen_digit = false;
    for &b in field {
        match b {
            b'0'..=b'7' => {
                value = (value << 3) | u64::from(b - b'0');
                seen_digit = true;
            }
            b' ' | 0 if !seen_digit => continue,
            _ => break,
        }
    }
    value
}

/// Write `value` as zero-padded octal digits filling all but the last
/// byte of the field, which is left NUL. Errors when the value needs more
/// digits than the field holds.
fn write_octal(field: &mut [u8], mut value: u64) -> Result<()> {
    let digits = field.len() - 1;
    ensure!(
        value >> (3 * digits as u32) == 0,
        Integrity,
        "value {} does not fit a {}-digit octal field",
        value,
        digits
    );
    field[digits] = 0;
    for i in (0..digits).rev() {
        field[i] = b'0' + (value & 0x7) as u8;
        value >>= 3;
    }
    Ok(())
}
