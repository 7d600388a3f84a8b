/*!
 * PackFS - Tar-compatible directory archiver with order-0 Huffman compression
 *
 * This library walks a directory tree into a USTAR-compatible archive
 * stream, reconstructs a filesystem tree from such a stream, and
 * compresses/decompresses arbitrary byte streams with a canonical
 * Huffman code carried in a self-describing header.
 */

pub mod archiver;
pub mod config;
pub mod error;
pub mod extractor;
pub mod hardlink;
pub mod huffman;
pub mod provider;
pub mod record;
pub mod report;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export main components for easier access
pub use archiver::{ArchiveStatistics, Archiver};
pub use config::{Command, Config};
pub use error::{PackFsError, Result};
pub use extractor::{ExtractStatistics, Extractor};
pub use hardlink::HardlinkTracker;
pub use provider::{FsProvider, LocalFs};
pub use record::{EntryHeader, Record, BLOCK_LEN};
pub use report::{OperationReport, Reporter};
pub use types::{EntryType, FileKind, FileStat};
pub use utils::{count_entries, format_file_size};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
