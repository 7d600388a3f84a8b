/*!
 * Order-0 Huffman compression engine
 *
 * The compressed stream is self-describing: one byte giving the number of
 * meaningful bits in the final payload byte, 256 little-endian u64 byte
 * frequencies, then the MSB-first bit-packed payload. Compressor and
 * decompressor build the same tree from the same frequency table; the
 * queue's tie-break rule below is what keeps the two bit-compatible.
 */

use crate::error::Result;
use crate::{bail, ensure};

/// Number of frequency counters in the stream header
pub const FREQ_ENTRIES: usize = 256;

/// Total header length: padding-count byte plus the counters
pub const HEADER_LEN: usize = 1 + FREQ_ENTRIES * 8;

/// Per-byte frequency counters accumulated over the literal input bytes
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    counts: [u64; FREQ_ENTRIES],
}

impl FrequencyTable {
    /// Count every byte of `input`
    pub fn scan(input: &[u8]) -> Self {
        let mut counts = [0u64; FREQ_ENTRIES];
        for &b in input {
            counts[usize::from(b)] += 1;
        }
        Self { counts }
    }

    /// Parse the 2048 counter bytes of a stream header
    pub fn from_header(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() == FREQ_ENTRIES * 8,
            Integrity,
            "frequency table header is {} bytes, expected {}",
            bytes.len(),
            FREQ_ENTRIES * 8
        );
        let mut counts = [0u64; FREQ_ENTRIES];
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            counts[i] = u64::from_le_bytes(chunk.try_into().unwrap());
        }
        Ok(Self { counts })
    }

    /// Append the counters to a stream header
    pub fn write_header(&self, out: &mut Vec<u8>) {
        for count in &self.counts {
            out.extend_from_slice(&count.to_le_bytes());
        }
    }

    /// Total number of counted symbols
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Huffman tree node: a leaf holds a byte value, an internal node owns two
/// children and nothing else
#[derive(Debug)]
enum Node {
    Leaf(u8),
    Internal(Box<Node>, Box<Node>),
}

struct QueueItem {
    frequency: u64,
    node: Node,
}

/// Insert preserving the tie-break contract: after all items of strictly
/// lesser frequency, before the first of equal-or-greater frequency.
fn queue_insert(queue: &mut Vec<QueueItem>, item: QueueItem) {
    let position = queue
        .iter()
        .position(|existing| existing.frequency >= item.frequency)
        .unwrap_or(queue.len());
    queue.insert(position, item);
}

/// Build the tree for a frequency table, or `None` when the table counts
/// no symbols at all. Leaves are seeded in ascending byte order; the two
/// front (lowest-frequency) items are merged until one remains.
fn build_tree(freq: &FrequencyTable) -> Option<Node> {
    let mut queue: Vec<QueueItem> = Vec::new();

    for (byte, &count) in freq.counts.iter().enumerate() {
        if count > 0 {
            queue_insert(
                &mut queue,
                QueueItem {
                    frequency: count,
                    node: Node::Leaf(byte as u8),
                },
            );
        }
    }

    if queue.is_empty() {
        return None;
    }

    // A single distinct symbol would get a zero-length code. Synthesize a
    // zero-frequency sibling so the symbol gets a 1-bit code instead; the
    // decoder derives the same sibling from the same table.
    if queue.len() == 1 {
        let only = match queue[0].node {
            Node::Leaf(byte) => byte,
            Node::Internal(..) => unreachable!(),
        };
        queue_insert(
            &mut queue,
            QueueItem {
                frequency: 0,
                node: Node::Leaf(only.wrapping_add(1)),
            },
        );
    }

    while queue.len() > 1 {
        let left = queue.remove(0);
        let right = queue.remove(0);
        queue_insert(
            &mut queue,
            QueueItem {
                frequency: left.frequency + right.frequency,
                node: Node::Internal(Box::new(left.node), Box::new(right.node)),
            },
        );
    }

    Some(queue.pop().expect("queue holds the root").node)
}

/// One prefix code: bit pattern and length. Tree depth stays far below
/// 128 because reaching depth d needs Fibonacci-scale frequency totals,
/// which u64 counters cannot supply past d ~ 100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Code {
    /// Code bits, most significant bit first
    pub bits: u128,
    /// Code length in bits
    pub len: u8,
}

/// Codes for all byte values; entries for unseen bytes stay zero-length
/// and are never queried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    codes: [Code; FREQ_ENTRIES],
}

impl CodeTable {
    fn from_tree(root: &Node) -> Self {
        let mut codes = [Code::default(); FREQ_ENTRIES];
        assign(root, 0, 0, &mut codes);
        Self { codes }
    }

    /// Code for one byte value
    pub fn code(&self, byte: u8) -> Code {
        self.codes[usize::from(byte)]
    }
}

/// Build the code table for a frequency table; `None` for an empty table
pub fn code_table(freq: &FrequencyTable) -> Option<CodeTable> {
    build_tree(freq).map(|root| CodeTable::from_tree(&root))
}

/// Left branches append 0, right branches append 1
fn assign(node: &Node, len: u8, bits: u128, codes: &mut [Code; FREQ_ENTRIES]) {
    match node {
        Node::Leaf(byte) => {
            codes[usize::from(*byte)] = Code { bits, len };
        }
        Node::Internal(left, right) => {
            assign(left, len + 1, bits << 1, codes);
            assign(right, len + 1, (bits << 1) | 1, codes);
        }
    }
}

/// Compress a byte stream. The output carries the full header even for
/// empty input, whose payload is simply empty.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let freq = FrequencyTable::scan(input);

    let mut out = Vec::with_capacity(HEADER_LEN + input.len() / 2);
    out.push(0);
    freq.write_header(&mut out);

    let table = match code_table(&freq) {
        Some(table) => table,
        None => return out,
    };

    let mut acc = 0u8;
    let mut filled = 0u8;
    for &byte in input {
        let code = table.code(byte);
        for i in (0..code.len).rev() {
            acc = (acc << 1) | ((code.bits >> i) & 1) as u8;
            filled += 1;
            if filled == 8 {
                out.push(acc);
                acc = 0;
                filled = 0;
            }
        }
    }

    // Left-justify the final partial byte and record how many of its bits
    // are meaningful (0 means the payload ended on a byte boundary).
    if filled > 0 {
        out.push(acc << (8 - filled));
    }
    out[0] = filled;

    out
}

/// Decompress a stream produced by [`compress`]
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    ensure!(
        input.len() >= HEADER_LEN,
        Integrity,
        "compressed stream is {} bytes, shorter than its {}-byte header",
        input.len(),
        HEADER_LEN
    );

    let padding = input[0];
    ensure!(
        padding <= 8,
        Integrity,
        "invalid padding bit count {}",
        padding
    );

    let freq = FrequencyTable::from_header(&input[1..HEADER_LEN])?;
    let payload = &input[HEADER_LEN..];

    let root = match build_tree(&freq) {
        Some(root) => root,
        None => {
            ensure!(
                payload.is_empty(),
                Integrity,
                "payload present but frequency table counts no symbols"
            );
            return Ok(Vec::new());
        }
    };

    let mut out = Vec::with_capacity(freq.total() as usize);
    let mut node = &root;

    for (i, &byte) in payload.iter().enumerate() {
        let last = i + 1 == payload.len();
        let bits = if last && padding != 0 { padding } else { 8 };

        for bit in 0..bits {
            let go_right = (byte >> (7 - bit)) & 1 == 1;
            node = match node {
                Node::Internal(left, right) => {
                    if go_right {
                        right.as_ref()
                    } else {
                        left.as_ref()
                    }
                }
                // The root of a nonempty table is always internal; a leaf
                // is only ever reached below and reset immediately.
                Node::Leaf(_) => unreachable!(),
            };
            if let Node::Leaf(value) = node {
                out.push(*value);
                node = &root;
            }
        }
    }

    if !std::ptr::eq(node, &root) {
        bail!(Integrity, "compressed bitstream ends in the middle of a symbol");
    }

    Ok(out)
}
