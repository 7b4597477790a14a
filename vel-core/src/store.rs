//! Frame-indexed storage for enhancement payloads

/// Ordered collection of per-frame enhancement payloads.
///
/// Slot 0 is a reserved sentinel (an empty payload), so frame numbers map
/// to slots directly: the payload for frame `i` lives in slot `i`, starting
/// at frame 1. Once built by one of the ingestion paths the store is not
/// modified again for the rest of the playback session.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PayloadStore {
    payloads: Vec<Vec<u8>>,
}

impl PayloadStore {
    /// Creates an empty store holding only the sentinel slot.
    pub fn new() -> Self {
        Self {
            payloads: vec![Vec::new()],
        }
    }

    /// Builds a store from payloads already in decode order.
    pub fn from_payloads(payloads: Vec<Vec<u8>>) -> Self {
        let mut store = Self::new();
        for payload in payloads {
            store.push(payload);
        }
        store
    }

    /// Appends the payload for the next frame.
    pub fn push(&mut self, payload: Vec<u8>) {
        self.payloads.push(payload);
    }

    /// Returns the payload bytes for `frame`, or `None` once the frame
    /// number runs past the stored data.
    pub fn get(&self, frame: usize) -> Option<&[u8]> {
        self.payloads.get(frame).map(Vec::as_slice)
    }

    /// Number of slots, sentinel included.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Number of stored payloads; the sentinel does not count.
    pub fn payload_count(&self) -> usize {
        self.payloads.len() - 1
    }

    /// Returns `true` when no payloads were ingested.
    pub fn is_empty(&self) -> bool {
        self.payload_count() == 0
    }

    /// Iterates over the payloads in frame order, skipping the sentinel.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.payloads.iter().skip(1).map(Vec::as_slice)
    }

    /// Total payload bytes across all frames.
    pub fn payload_bytes(&self) -> usize {
        self.payloads.iter().map(Vec::len).sum()
    }
}

impl Default for PayloadStore {
    fn default() -> Self {
        Self::new()
    }
}
