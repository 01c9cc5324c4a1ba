//! On-disk record layout for the snip index.
//!
//! The index is a flat array of fixed-size records: one header record
//! followed by `nr_snips_alloc` snip records. Byte order is the host's
//! native order; the format is not portable across machines with
//! differing endianness.

/// Size in bytes of every record in the index, header included.
pub const RECORD_SIZE: usize = 256;

/// Number of bytes available for the first-line preview, including its
/// NUL terminator.
pub const PREVIEW_CAPACITY: usize = 232;

/// Largest preview we'll copy in, leaving room for the terminator.
pub const MAX_PREVIEW_LEN: usize = PREVIEW_CAPACITY - 1;

/// Number of slots the index grows by when it needs to grow at all.
pub const GROWTH_BATCH: u64 = 1024;

#[repr(C)]
pub struct Header {
    pub nr_snips: u64,
    pub nr_snips_alloc: u64,
    _reserved: [u8; RECORD_SIZE - 16],
}

const _: () = assert!(std::mem::size_of::<Header>() == RECORD_SIZE);

// `#[repr(C)]` naturally pads `doomed` out to an 8-byte boundary before
// `nr_lines`; the original's `_packed_` struct has no such padding and
// so fits a 239-byte `line[]` in the same 256 bytes. The explicit
// `_reserved` field spends those bytes instead, leaving 232 here
// (231 usable plus the NUL terminator).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Snip {
    pub hash: u64,
    pub doomed: u8,
    _reserved: [u8; 7],
    pub nr_lines: u64,
    pub preview: [u8; PREVIEW_CAPACITY],
}

const _: () = assert!(std::mem::size_of::<Snip>() == RECORD_SIZE);

/// DJB2 hash seeded with 5381, as used for both content addressing and
/// deduplication keying. Not cryptographic.
pub fn hash_payload(payload: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &byte in payload {
        hash = hash.wrapping_mul(33).wrapping_add(u64::from(byte));
    }
    hash
}

/// Round `n` up to the next multiple of [`GROWTH_BATCH`], except that 0
/// stays 0.
pub fn round_up_batch(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    ((n + GROWTH_BATCH - 1) / GROWTH_BATCH) * GROWTH_BATCH
}

/// Extract the line count and a first-line preview from a payload.
///
/// The preview is the first non-empty line, truncated to
/// [`MAX_PREVIEW_LEN`] bytes. The line count is the number of newlines in
/// the payload, plus one more if the payload doesn't end in a newline and
/// at least one non-empty line was seen.
pub fn first_line_preview(payload: &[u8]) -> (u64, [u8; PREVIEW_CAPACITY]) {
    let mut preview = [0u8; PREVIEW_CAPACITY];
    let mut copied = false;
    let mut saw_nonempty = false;
    let mut newlines: u64 = 0;
    let mut line_start = 0usize;

    for (i, &byte) in payload.iter().enumerate() {
        if byte != b'\n' {
            continue;
        }
        newlines += 1;
        let line = &payload[line_start..i];
        if !line.is_empty() {
            saw_nonempty = true;
            if !copied {
                copy_preview(&mut preview, line);
                copied = true;
            }
        }
        line_start = i + 1;
    }

    let trailing = &payload[line_start..];
    if !trailing.is_empty() {
        saw_nonempty = true;
        if !copied {
            copy_preview(&mut preview, trailing);
        }
    }

    let ends_with_newline = payload.last() == Some(&b'\n');
    let nr_lines = if !ends_with_newline && saw_nonempty {
        newlines + 1
    } else {
        newlines
    };

    (nr_lines, preview)
}

fn copy_preview(preview: &mut [u8; PREVIEW_CAPACITY], line: &[u8]) {
    let n = line.len().min(MAX_PREVIEW_LEN);
    preview[..n].copy_from_slice(&line[..n]);
}

/// Decode a preview byte array back into a UTF-8 string, stopping at the
/// first NUL.
pub fn preview_to_string(preview: &[u8; PREVIEW_CAPACITY]) -> String {
    let end = preview.iter().position(|&b| b == 0).unwrap_or(preview.len());
    String::from_utf8_lossy(&preview[..end]).into_owned()
}
