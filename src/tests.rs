/*!
 * Tests for PackFS functionality
 */

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use indicatif::ProgressBar;
use tempfile::tempdir;

use crate::archiver::Archiver;
use crate::error::{PackFsError, Result};
use crate::extractor::Extractor;
use crate::huffman::{self, code_table, FrequencyTable, HEADER_LEN};
use crate::provider::LocalFs;
use crate::record::{blocks_for, EntryHeader, Record, BLOCK_LEN, LONG_NAME_MARKER};
use crate::types::EntryType;

// Helper function to create the directory structure of the worked example:
// a.txt (12 bytes), dir/, dir/b.txt (1000 bytes), dir/link hardlinked to
// dir/b.txt, plus a symlink.
fn setup_test_directory() -> std::io::Result<tempfile::TempDir> {
    let temp_dir = tempdir()?;

    let mut a = File::create(temp_dir.path().join("a.txt"))?;
    a.write_all(b"hello world\n")?;

    fs::create_dir(temp_dir.path().join("dir"))?;
    let mut b = File::create(temp_dir.path().join("dir").join("b.txt"))?;
    b.write_all(&vec![b'b'; 1000])?;

    fs::hard_link(
        temp_dir.path().join("dir").join("b.txt"),
        temp_dir.path().join("dir").join("link"),
    )?;

    std::os::unix::fs::symlink("a.txt", temp_dir.path().join("sym"))?;

    // Pin mode and mtime so the round-trip can assert on them
    fs::set_permissions(
        temp_dir.path().join("a.txt"),
        fs::Permissions::from_mode(0o640),
    )?;
    let mtime = FileTime::from_unix_time(1_500_000_000, 0);
    filetime::set_file_times(temp_dir.path().join("a.txt"), mtime, mtime)?;

    Ok(temp_dir)
}

fn hidden_progress() -> Arc<ProgressBar> {
    Arc::new(ProgressBar::hidden())
}

fn archive_to_vec(root: &Path) -> Result<Vec<u8>> {
    let mut archiver = Archiver::new(LocalFs, hidden_progress());
    let mut stream = Vec::new();
    archiver.archive(root, &mut stream)?;
    Ok(stream)
}

fn extract_from_slice(stream: &[u8], dest: &Path) -> Result<()> {
    let mut extractor = Extractor::new(LocalFs, hidden_progress());
    extractor.extract(&mut &stream[..], dest)
}

// Where an entry archived from `src_root` lands after extraction into
// `dest`: archive names keep the full path minus the leading separator.
fn extracted_root(dest: &Path, src_root: &Path) -> PathBuf {
    let rel = src_root.strip_prefix("/").unwrap_or(src_root);
    dest.join(rel)
}

// Walk the archive stream and collect the decoded headers, skipping
// content and continuation blocks.
fn scan_headers(stream: &[u8]) -> Vec<EntryHeader> {
    let mut headers = Vec::new();
    let mut offset = 0;
    while offset + BLOCK_LEN <= stream.len() {
        let mut block = [0u8; BLOCK_LEN];
        block.copy_from_slice(&stream[offset..offset + BLOCK_LEN]);
        offset += BLOCK_LEN;

        let record = Record::from_bytes(block);
        if record.is_terminator() {
            break;
        }
        let header = EntryHeader::decode(&record).expect("valid header");
        let skip = match header.entry_type {
            EntryType::Normal | EntryType::LongName | EntryType::LongLinkName => {
                blocks_for(header.size) as usize
            }
            _ => 0,
        };
        offset += skip * BLOCK_LEN;
        headers.push(header);
    }
    headers
}

fn sample_header() -> EntryHeader {
    EntryHeader {
        name: b"some/path/file.txt".to_vec(),
        entry_type: EntryType::Normal,
        mode: 0o644,
        uid: 1000,
        gid: 1000,
        size: 1234,
        mtime: 1_500_000_000,
        link_name: Vec::new(),
        owner: "user".to_string(),
        group: "user".to_string(),
        dev_major: 0,
        dev_minor: 0,
    }
}

// ---------------------------------------------------------------------------
// Record codec

#[test]
fn test_header_encode_decode_roundtrip() {
    let header = sample_header();
    let record = header.encode().unwrap();
    let decoded = EntryHeader::decode(&record).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_checksum_valid_after_encode() {
    let record = sample_header().encode().unwrap();
    assert!(record.verify_checksum());
}

#[test]
fn test_checksum_detects_any_single_byte_flip() {
    let record = sample_header().encode().unwrap();
    for i in 0..BLOCK_LEN {
        // The checksum field itself is excluded from the property
        if (148..156).contains(&i) {
            continue;
        }
        let mut bytes = *record.as_bytes();
        bytes[i] ^= 0x01;
        let tampered = Record::from_bytes(bytes);
        assert!(
            !tampered.verify_checksum(),
            "flip at offset {} went undetected",
            i
        );
    }
}

#[test]
fn test_octal_parse_tolerates_mixed_padding() {
    let mut record = Record::new();
    // Space-padded, space-terminated variant of 0o755 in the mode field
    record.as_bytes_mut()[100..108].copy_from_slice(b"   755 \0");
    assert_eq!(record.mode(), 0o755);

    // Zero-padded, NUL-terminated variant in the size field
    record.as_bytes_mut()[124..136].copy_from_slice(b"00000001750\0");
    assert_eq!(record.size(), 0o1750);
}

#[test]
fn test_octal_field_layout_matches_legacy_format() {
    let mut record = Record::new();
    record.set_octal(100, 8, 0o644).unwrap();
    assert_eq!(&record.as_bytes()[100..108], b"0000644\0");
}

#[test]
fn test_terminator_detection() {
    assert!(Record::new().is_terminator());
    assert!(!sample_header().encode().unwrap().is_terminator());
}

#[test]
fn test_encode_rejects_values_too_wide_for_their_field() {
    // 8 GiB needs 12 octal digits; the size field holds 11. A wrapped
    // value would mis-frame every block after this one.
    let mut header = sample_header();
    header.size = 8 * 1024 * 1024 * 1024;
    assert!(matches!(header.encode(), Err(PackFsError::Integrity(_))));

    // The widest value the field can hold still encodes
    header.size = 0o77777777777;
    let decoded = EntryHeader::decode(&header.encode().unwrap()).unwrap();
    assert_eq!(decoded.size, 0o77777777777);

    let mut header = sample_header();
    header.uid = 0o10000000;
    assert!(matches!(header.encode(), Err(PackFsError::Integrity(_))));
}

#[test]
fn test_device_header_roundtrip() {
    // ttyS0-style device numbers
    let mut header = sample_header();
    header.entry_type = EntryType::CharDevice;
    header.size = 0;
    header.dev_major = 4;
    header.dev_minor = 64;

    let record = header.encode().unwrap();
    assert_eq!(&record.as_bytes()[329..337], b"0000004\0");
    assert_eq!(&record.as_bytes()[337..345], b"0000100\0");

    let decoded = EntryHeader::decode(&record).unwrap();
    assert_eq!(decoded.dev_major, 4);
    assert_eq!(decoded.dev_minor, 64);
    assert_eq!(decoded, header);
}

#[test]
fn test_blocks_for_long_name_payload() {
    // A 150-byte path needs ceil(151/512) = 1 continuation block
    assert_eq!(blocks_for(151), 1);
    assert_eq!(blocks_for(512), 1);
    assert_eq!(blocks_for(513), 2);
    assert_eq!(blocks_for(0), 0);
}

// ---------------------------------------------------------------------------
// Archiver / extractor

#[test]
fn test_archive_extract_roundtrip() -> Result<()> {
    let src = setup_test_directory()?;
    let dest = tempdir()?;

    let stream = archive_to_vec(src.path())?;
    extract_from_slice(&stream, dest.path())?;

    let root = extracted_root(dest.path(), src.path());

    // Content
    assert_eq!(fs::read(root.join("a.txt"))?, b"hello world\n");
    assert_eq!(fs::read(root.join("dir").join("b.txt"))?, vec![b'b'; 1000]);

    // Permission bits
    let mode = fs::metadata(root.join("a.txt"))?.permissions().mode() & 0o7777;
    assert_eq!(mode, 0o640);

    // Modification time
    assert_eq!(fs::metadata(root.join("a.txt"))?.mtime(), 1_500_000_000);

    // Symlink target, not followed
    let target = fs::read_link(root.join("sym"))?;
    assert_eq!(target, PathBuf::from("a.txt"));

    // Hardlink shares the inode with its target
    let b_ino = fs::metadata(root.join("dir").join("b.txt"))?.ino();
    let link_ino = fs::metadata(root.join("dir").join("link"))?.ino();
    assert_eq!(b_ino, link_ino);

    Ok(())
}

#[test]
fn test_worked_example_with_compression() -> Result<()> {
    let src = setup_test_directory()?;
    let stream = archive_to_vec(src.path())?;

    // Compressing the archive bytes and decompressing returns the
    // identical archive bytes
    let compressed = huffman::compress(&stream);
    let restored = huffman::decompress(&compressed)?;
    assert_eq!(restored, stream);

    // The restored stream still extracts
    let dest = tempdir()?;
    extract_from_slice(&restored, dest.path())?;
    let root = extracted_root(dest.path(), src.path());
    assert!(root.join("a.txt").is_file());
    assert!(root.join("dir").is_dir());
    assert!(root.join("dir").join("b.txt").is_file());
    assert!(root.join("dir").join("link").is_file());

    Ok(())
}

#[test]
fn test_hardlink_dedup_emits_one_content_record() -> Result<()> {
    let src = tempdir()?;
    fs::write(src.path().join("first"), b"shared content")?;
    fs::hard_link(src.path().join("first"), src.path().join("second"))?;

    let stream = archive_to_vec(src.path())?;
    let headers = scan_headers(&stream);

    let normals: Vec<_> = headers
        .iter()
        .filter(|h| h.entry_type == EntryType::Normal)
        .collect();
    let hardlinks: Vec<_> = headers
        .iter()
        .filter(|h| h.entry_type == EntryType::Hardlink)
        .collect();

    assert_eq!(normals.len(), 1);
    assert_eq!(normals[0].size, 14);
    assert_eq!(hardlinks.len(), 1);
    assert_eq!(hardlinks[0].size, 0);
    // Enumeration order is not guaranteed, but the hardlink must point at
    // whichever name carried the content
    assert_eq!(hardlinks[0].link_name, normals[0].name);

    Ok(())
}

#[test]
fn test_long_name_marker_and_continuation() -> Result<()> {
    let src = tempdir()?;
    let long_name: String = "x".repeat(120);
    fs::write(src.path().join(&long_name), b"content")?;

    let stream = archive_to_vec(src.path())?;
    let headers = scan_headers(&stream);

    let marker = headers
        .iter()
        .find(|h| h.entry_type == EntryType::LongName)
        .expect("long-name marker present");
    assert_eq!(marker.name, LONG_NAME_MARKER);

    // The full archived name: source path minus leading '/', plus the file
    let mut full_name = src
        .path()
        .strip_prefix("/")
        .unwrap()
        .join(&long_name)
        .into_os_string()
        .into_string()
        .unwrap()
        .into_bytes();
    assert!(full_name.len() > 100);
    assert_eq!(marker.size, full_name.len() as u64 + 1);

    // Find the marker block in the raw stream and check the continuation
    // payload is the literal path bytes plus a terminating NUL
    let marker_offset = stream
        .chunks_exact(BLOCK_LEN)
        .position(|block| block[156] == b'L')
        .unwrap()
        * BLOCK_LEN;
    let payload = &stream[marker_offset + BLOCK_LEN..marker_offset + 2 * BLOCK_LEN];
    full_name.push(0);
    assert_eq!(&payload[..full_name.len()], &full_name[..]);
    assert!(payload[full_name.len()..].iter().all(|&b| b == 0));

    // The real entry follows with the advisory truncated name
    let entry = headers
        .iter()
        .find(|h| h.entry_type == EntryType::Normal)
        .expect("entry record present");
    full_name.pop();
    assert_eq!(entry.name, &full_name[..100]);

    // Round-trip through extraction restores the full name
    let dest = tempdir()?;
    extract_from_slice(&stream, dest.path())?;
    let root = extracted_root(dest.path(), src.path());
    assert_eq!(fs::read(root.join(&long_name))?, b"content");

    Ok(())
}

#[test]
fn test_fifo_roundtrip() -> Result<()> {
    use std::os::unix::fs::FileTypeExt;

    let src = tempdir()?;
    nix::unistd::mkfifo(
        &src.path().join("pipe"),
        nix::sys::stat::Mode::from_bits_truncate(0o600),
    )?;

    let stream = archive_to_vec(src.path())?;
    let headers = scan_headers(&stream);
    let fifo = headers
        .iter()
        .find(|h| h.entry_type == EntryType::Fifo)
        .expect("fifo record present");
    assert_eq!(fifo.size, 0);

    let dest = tempdir()?;
    extract_from_slice(&stream, dest.path())?;
    let root = extracted_root(dest.path(), src.path());
    assert!(fs::symlink_metadata(root.join("pipe"))?
        .file_type()
        .is_fifo());

    Ok(())
}

#[test]
fn test_readonly_directory_mode_restored_after_children() -> Result<()> {
    let src = tempdir()?;
    fs::create_dir(src.path().join("ro"))?;
    fs::write(src.path().join("ro").join("inner.txt"), b"inside")?;
    fs::set_permissions(src.path().join("ro"), fs::Permissions::from_mode(0o555))?;

    let stream = archive_to_vec(src.path())?;
    fs::set_permissions(src.path().join("ro"), fs::Permissions::from_mode(0o755))?;

    // The directory record precedes its child in the stream; extraction
    // must still be able to create the child and end with the directory
    // read-only.
    let dest = tempdir()?;
    extract_from_slice(&stream, dest.path())?;
    let root = extracted_root(dest.path(), src.path());

    assert_eq!(fs::read(root.join("ro").join("inner.txt"))?, b"inside");
    let mode = fs::metadata(root.join("ro"))?.permissions().mode() & 0o7777;
    assert_eq!(mode, 0o555);

    fs::set_permissions(root.join("ro"), fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[test]
fn test_trailing_separators_do_not_leak_into_names() -> Result<()> {
    let src = tempdir()?;
    fs::write(src.path().join("f"), b"x")?;

    let plain = archive_to_vec(src.path())?;
    let slashed = archive_to_vec(Path::new(&format!("{}//", src.path().display())))?;

    let names = |stream: &[u8]| -> Vec<Vec<u8>> {
        scan_headers(stream).into_iter().map(|h| h.name).collect()
    };
    assert_eq!(names(&plain), names(&slashed));
    assert!(names(&plain)
        .iter()
        .all(|name| !name.windows(2).any(|w| w == b"//")));
    Ok(())
}

#[test]
fn test_truncated_stream_is_fatal() -> Result<()> {
    let src = setup_test_directory()?;
    let stream = archive_to_vec(src.path())?;

    // Cut into the middle of a block
    let truncated = &stream[..stream.len() - 2 * BLOCK_LEN - 100];
    let dest = tempdir()?;
    let result = extract_from_slice(truncated, dest.path());
    assert!(matches!(result, Err(PackFsError::Integrity(_))));

    Ok(())
}

#[test]
fn test_long_name_disagreeing_with_entry_is_fatal() {
    // Hand-build a marker whose payload disagrees with the entry record
    let mut stream = Vec::new();

    let long_name = b"agreed/upon/path".to_vec();
    let marker = crate::record::long_name_header(EntryType::LongName, long_name.len());
    stream.extend_from_slice(marker.encode().unwrap().as_bytes());
    let mut payload = vec![0u8; BLOCK_LEN];
    payload[..long_name.len()].copy_from_slice(&long_name);
    stream.extend_from_slice(&payload);

    let mut entry = sample_header();
    entry.name = b"different/path".to_vec();
    entry.size = 0;
    stream.extend_from_slice(entry.encode().unwrap().as_bytes());
    stream.extend_from_slice(&[0u8; BLOCK_LEN]);
    stream.extend_from_slice(&[0u8; BLOCK_LEN]);

    let dest = tempdir().unwrap();
    let result = extract_from_slice(&stream, dest.path());
    assert!(matches!(result, Err(PackFsError::Integrity(_))));
}

#[test]
fn test_entry_escaping_extraction_root_is_fatal() {
    let mut entry = sample_header();
    entry.name = b"../evil".to_vec();
    entry.size = 0;

    let mut stream = Vec::new();
    stream.extend_from_slice(entry.encode().unwrap().as_bytes());
    stream.extend_from_slice(&[0u8; BLOCK_LEN]);
    stream.extend_from_slice(&[0u8; BLOCK_LEN]);

    let dest = tempdir().unwrap();
    let result = extract_from_slice(&stream, dest.path());
    assert!(matches!(result, Err(PackFsError::Integrity(_))));
}

#[test]
fn test_checksum_mismatch_is_reported_not_fatal() -> Result<()> {
    let src = tempdir()?;
    fs::write(src.path().join("f"), b"data")?;

    let mut stream = archive_to_vec(src.path())?;
    // Corrupt the owner name of the first header; checksum no longer
    // matches but the entry still extracts
    stream[265] ^= 0x01;

    let dest = tempdir()?;
    let mut extractor = Extractor::new(LocalFs, hidden_progress());
    extractor.extract(&mut &stream[..], dest.path())?;
    assert_eq!(extractor.statistics().checksum_mismatches, 1);

    Ok(())
}

// ---------------------------------------------------------------------------
// Huffman engine

#[test]
fn test_huffman_empty_roundtrip() -> Result<()> {
    let compressed = huffman::compress(&[]);
    assert_eq!(compressed.len(), HEADER_LEN);
    assert_eq!(huffman::decompress(&compressed)?, Vec::<u8>::new());
    Ok(())
}

#[test]
fn test_huffman_single_symbol_roundtrip() -> Result<()> {
    let input = vec![b'a'; 37];
    let compressed = huffman::compress(&input);
    // Degenerate table: the lone symbol still gets a 1-bit code
    assert_eq!(compressed.len(), HEADER_LEN + 5);
    assert_eq!(huffman::decompress(&compressed)?, input);
    Ok(())
}

#[test]
fn test_huffman_skewed_distribution_roundtrip() -> Result<()> {
    let mut input = Vec::new();
    for byte in 0u16..=255 {
        let repeats = 1 + (usize::from(byte) * 7) % 31;
        input.extend(std::iter::repeat(byte as u8).take(repeats));
    }
    let compressed = huffman::compress(&input);
    assert_eq!(huffman::decompress(&compressed)?, input);
    Ok(())
}

#[test]
fn test_huffman_two_symbol_stream_layout() {
    // Tie-break: b is inserted before the equal-frequency a, so the merge
    // gives b the 0 branch and a the 1 branch
    let compressed = huffman::compress(b"ab");
    assert_eq!(compressed.len(), HEADER_LEN + 1);
    assert_eq!(compressed[0], 2, "two meaningful bits in the final byte");
    assert_eq!(compressed[HEADER_LEN], 0b1000_0000);
}

#[test]
fn test_huffman_code_table_is_deterministic() {
    let freq = FrequencyTable::scan(b"the quick brown fox jumps over the lazy dog");
    let first = code_table(&freq).unwrap();
    let second = code_table(&freq).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_huffman_rejects_short_header() {
    let result = huffman::decompress(&[0u8; 100]);
    assert!(matches!(result, Err(PackFsError::Integrity(_))));
}

#[test]
fn test_huffman_rejects_payload_without_symbols() {
    let mut stream = huffman::compress(&[]);
    stream.push(0xff);
    let result = huffman::decompress(&stream);
    assert!(matches!(result, Err(PackFsError::Integrity(_))));
}

#[test]
fn test_huffman_rejects_stream_ending_mid_symbol() {
    // Three symbols force a 2-bit code; a payload of a single 1-bit
    // fragment of that code cannot reach a leaf
    let mut stream = huffman::compress(b"aabbc");
    let payload_len = stream.len() - HEADER_LEN;
    stream.truncate(HEADER_LEN + 1);
    stream[0] = 1; // one meaningful bit in the only payload byte
    assert!(payload_len >= 1);

    // Force the single bit to descend into an internal node: bit 1 walks
    // toward the two-leaf side of the three-symbol tree
    stream[HEADER_LEN] = 0b1000_0000;
    let result = huffman::decompress(&stream);
    assert!(matches!(result, Err(PackFsError::Integrity(_))));
}

#[test]
fn test_archiver_statistics_match_extractor() -> Result<()> {
    let src = setup_test_directory()?;

    let mut archiver = Archiver::new(LocalFs, hidden_progress());
    let mut stream = Vec::new();
    archiver.archive(src.path(), &mut stream)?;
    let archived = archiver.statistics();

    let dest = tempdir()?;
    let mut extractor = Extractor::new(LocalFs, hidden_progress());
    extractor.extract(&mut &stream[..], dest.path())?;
    let extracted = extractor.statistics();

    assert_eq!(archived.entries, extracted.entries);
    assert_eq!(archived.files, extracted.files);
    assert_eq!(archived.directories, extracted.directories);
    assert_eq!(archived.symlinks, extracted.symlinks);
    assert_eq!(archived.hardlinks, extracted.hardlinks);
    assert_eq!(archived.content_bytes, extracted.content_bytes);
    assert_eq!(extracted.checksum_mismatches, 0);

    Ok(())
}
