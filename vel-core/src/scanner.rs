//! Scanner for enhancement payloads embedded in an elementary stream
//!
//! Enhancement data rides in SEI units: a `00 00 01 06` start-code prefix,
//! a payload type byte, a variable-length size field, and an identifier
//! naming the payload owner. Two signatures are recognized, one keyed by a
//! 16-byte UUID and one by a 4-byte ITU-T T.35 code. Payload bytes are
//! copied out with emulation-prevention bytes removed.

use crate::PayloadStore;
use log::{debug, warn};

/// Start-code prefix plus the SEI unit type shared by both signatures
const SEI_PREFIX: [u8; 4] = [0x00, 0x00, 0x01, 0x06];

/// SEI payload type carrying a UUID-keyed payload
const PAYLOAD_TYPE_UNREGISTERED: u8 = 0x05;

/// SEI payload type carrying an ITU-T T.35 keyed payload
const PAYLOAD_TYPE_REGISTERED: u8 = 0x04;

/// UUID identifying unregistered enhancement payloads
const UUID_IDENTIFIER: [u8; 16] = [
    0xa7, 0xc4, 0x6d, 0xed, 0x49, 0xd8, 0x38, 0xeb, 0x9a, 0xad, 0x6d, 0xa6, 0x84, 0x97, 0xa7, 0x54,
];

/// ITU-T T.35 code identifying registered enhancement payloads
const ITU_IDENTIFIER: [u8; 4] = [0xb4, 0x00, 0x50, 0x00];

/// Scans a raw elementary stream and collects every embedded enhancement
/// payload, in stream order, into a fresh [`PayloadStore`].
///
/// Units whose identifier does not match are skipped by their declared
/// size so they never consume a frame slot. A unit that would overrun the
/// end of the input ends the scan with the payloads collected so far.
pub fn scan(stream: &[u8]) -> PayloadStore {
    let mut store = PayloadStore::new();
    let mut i = 0;

    'scan: while i < stream.len() {
        let Some(signature) = stream.get(i..i + 5) else {
            break;
        };
        if signature[..4] != SEI_PREFIX {
            i += 1;
            continue;
        }
        let identifier: &[u8] = match signature[4] {
            PAYLOAD_TYPE_UNREGISTERED => &UUID_IDENTIFIER,
            PAYLOAD_TYPE_REGISTERED => &ITU_IDENTIFIER,
            _ => {
                i += 1;
                continue;
            }
        };
        i += 5;

        // Size field: every byte's value is added, and the first byte that
        // is not 0xFF (its value included) terminates the field.
        let mut size = 0usize;
        loop {
            match stream.get(i) {
                Some(&byte) => {
                    size += byte as usize;
                    i += 1;
                    if byte != 0xff {
                        break;
                    }
                }
                None => break 'scan,
            }
        }

        // The declared size covers the identifier, so anything smaller
        // cannot hold a payload.
        if size > identifier.len() {
            match stream.get(i..i + identifier.len()) {
                Some(candidate) if candidate == identifier => {
                    i += identifier.len();
                    store.push(unescape(stream, i, size - identifier.len()));
                }
                Some(_) => {
                    // A foreign unit of a known shape: skipped by the
                    // computed size, never stored.
                }
                None => break 'scan,
            }
        }

        // Advance by the declared size plus one, whether or not a payload
        // was taken. Escape bytes and the identifier step are not
        // compensated, so the cursor can land either side of the true unit
        // end; frame-to-payload indexing depends on exactly this stride.
        i += size + 1;
    }

    if store.is_empty() {
        warn!("no enhancement payloads found in {} byte stream", stream.len());
    } else {
        debug!(
            "extracted {} enhancement payloads ({} bytes)",
            store.payload_count(),
            store.payload_bytes()
        );
    }
    store
}

/// Copies `count` payload bytes starting at `start`, dropping each 0x03
/// emulation-prevention byte that follows two zero bytes. The look-back
/// window is the raw input, so it spans the identifier boundary.
fn unescape(stream: &[u8], start: usize, count: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(count);
    let mut pos = start;
    for _ in 0..count {
        if pos >= 2
            && stream.get(pos) == Some(&0x03)
            && stream[pos - 2] == 0x00
            && stream[pos - 1] == 0x00
        {
            pos += 1;
        }
        match stream.get(pos) {
            Some(&byte) => payload.push(byte),
            // Truncated unit: keep what was read.
            None => break,
        }
        pos += 1;
    }
    payload
}
