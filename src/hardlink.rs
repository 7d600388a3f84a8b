/*!
 * Hardlink deduplication for the tree archiver
 *
 * Maps a device-scoped inode identity to the first archive name that
 * referenced it, so repeated links are emitted as hardlink records
 * instead of duplicated content. One tracker lives for exactly one
 * archiver run.
 */

use std::collections::HashMap;

/// Tracks which inodes have already been archived
#[derive(Debug, Default)]
pub struct HardlinkTracker {
    seen: HashMap<(u64, u64), Vec<u8>>,
}

impl HardlinkTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a (device, inode) identity. The first call for an identity
    /// records `name` as canonical and returns `None` (emit full content);
    /// every later call returns the recorded name and the caller must emit
    /// a hardlink record referencing it.
    pub fn resolve(&mut self, dev: u64, ino: u64, name: &[u8]) -> Option<Vec<u8>> {
        use std::collections::hash_map::Entry;

        match self.seen.entry((dev, ino)) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(name.to_vec());
                None
            }
        }
    }

    /// Number of distinct inodes recorded so far
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True if no inode has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
