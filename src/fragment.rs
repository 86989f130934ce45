//! Splitting outgoing frames into link-sized writes and reassembling
//! fragmented incoming notifications.
//!
//! The ZeTime link carries at most [`MAX_CHUNK`] bytes per characteristic
//! write or notification. Frames larger than that arrive in two pieces:
//! the watch sends the first [`MAX_CHUNK`] bytes, then the remainder in the
//! following notification. Fragments are never interleaved; the protocol
//! assumes in-order delivery with at most one partial message in flight
//! per characteristic.

use tracing::debug;

use crate::protocol::Message;

/// Maximum bytes per characteristic write or notification
pub const MAX_CHUNK: usize = 20;

/// Shortest notification that can be the first fragment of a larger frame.
///
/// Complete frames shorter than this always fit one notification, so a
/// non-well-formed chunk at or below this size is corruption rather than a
/// fragment.
pub const FIRST_FRAGMENT_MIN: usize = 14;

/// Split an encoded frame into sequential link-sized chunks.
///
/// Chunks must be written strictly in order with no interleaving of two
/// in-flight messages; [`crate::session::Transaction`] preserves that
/// ordering.
#[must_use]
pub fn chunk_frame(frame: &[u8]) -> Vec<Vec<u8>> {
    frame.chunks(MAX_CHUNK).map(<[u8]>::to_vec).collect()
}

/// Single-slot reassembly buffer for one inbound characteristic.
///
/// Holds at most one in-flight partial message. The first fragment is
/// stored verbatim; the next notification on the same characteristic is
/// concatenated to it and the result handed back as one logical frame.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    pending: Option<Vec<u8>>,
}

impl ReassemblyBuffer {
    /// Create an empty buffer
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Feed one notification's bytes, returning a complete raw frame when
    /// one is available.
    ///
    /// The returned buffer still has to pass [`Message::from_bytes`]; a
    /// concatenated result that fails the codec check is malformed and the
    /// caller discards it without touching this buffer again.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        if let Some(mut first) = self.pending.take() {
            debug!(
                "joining continuation fragment: {} + {} bytes",
                first.len(),
                chunk.len()
            );
            first.extend_from_slice(chunk);
            return Some(first);
        }

        if Message::is_well_formed(chunk) {
            return Some(chunk.to_vec());
        }

        if chunk.len() > FIRST_FRAGMENT_MIN {
            debug!("buffering first fragment: {} bytes", chunk.len());
            self.pending = Some(chunk.to_vec());
            return None;
        }

        // Too short to be a fragment and not a complete frame; hand it to
        // the codec so the caller logs it as malformed.
        Some(chunk.to_vec())
    }

    /// Whether a partial message is buffered
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any buffered partial message (called on disconnect)
    pub fn reset(&mut self) {
        self.pending = None;
    }
}
