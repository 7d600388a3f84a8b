/*!
 * Utility functions for PackFS
 */

use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Count the entries below (and including) a directory, for progress
/// tracking before an archive run
pub fn count_entries(dir: &Path) -> io::Result<u64> {
    let mut count = 0;
    for entry in WalkDir::new(dir).follow_links(false).into_iter() {
        match entry {
            Ok(_) => count += 1,
            Err(e) => {
                eprintln!("Warning: failed to count entry: {}", e);
            }
        }
    }
    Ok(count)
}

/// Format a human-readable file size
pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
