//! Message fragmentation and reassembly.
//!
//! Application messages may exceed the negotiated `max_packet_size`, so the
//! sender splits each message into ordered chunks and the receiver glues
//! them back together.  The fixed frame header has no fragment flag, so
//! each DATA payload carries a one-byte marker prefix:
//!
//! ```text
//! DATA payload = marker(1) | fragment bytes (0..=max_packet_size)
//! marker: 0 = more fragments follow, 1 = last fragment of this message
//! ```
//!
//! Ordering and exactly-once delivery are the reliability engine's job; by
//! the time a chunk reaches [`Reassembler::push`] it is guaranteed to be the
//! next one in send order.  This module only concatenates.

use thiserror::Error;

const MARKER_MORE: u8 = 0;
const MARKER_LAST: u8 = 1;

/// One fragment of an application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Vec<u8>,
    /// Set on the final fragment of the message.
    pub last: bool,
}

impl Chunk {
    /// Serialise this chunk into a DATA frame payload.
    pub fn into_payload(self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(1 + self.data.len());
        payload.push(if self.last { MARKER_LAST } else { MARKER_MORE });
        payload.extend_from_slice(&self.data);
        payload
    }

    /// Parse a chunk back out of a DATA frame payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, FragmentError> {
        let (&marker, data) = payload.split_first().ok_or(FragmentError::MissingMarker)?;
        let last = match marker {
            MARKER_MORE => false,
            MARKER_LAST => true,
            other => return Err(FragmentError::BadMarker(other)),
        };
        Ok(Self {
            data: data.to_vec(),
            last,
        })
    }
}

/// Errors in the fragment framing carried inside DATA payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FragmentError {
    /// DATA payload was empty; even an empty fragment carries its marker.
    #[error("DATA payload missing the fragment marker byte")]
    MissingMarker,
    /// Marker byte was neither "more" nor "last".
    #[error("invalid fragment marker byte {0:#04x}")]
    BadMarker(u8),
}

/// Split `message` into ordered chunks of at most `max_payload` bytes each.
///
/// An empty message yields exactly one empty chunk so that "send a message"
/// always puts at least one frame on the wire.  The final chunk is marked
/// `last`.
///
/// # Panics
///
/// Panics if `max_payload` is zero; the handshake rejects that value before
/// a connection can exist.
pub fn fragment(message: &[u8], max_payload: usize) -> Vec<Chunk> {
    assert!(max_payload >= 1, "max_payload must be at least 1");

    if message.is_empty() {
        return vec![Chunk {
            data: Vec::new(),
            last: true,
        }];
    }

    let mut chunks: Vec<Chunk> = message
        .chunks(max_payload)
        .map(|piece| Chunk {
            data: piece.to_vec(),
            last: false,
        })
        .collect();
    chunks.last_mut().unwrap().last = true;
    chunks
}

/// Accumulates in-order chunks into whole application messages.
#[derive(Debug, Default)]
pub struct Reassembler {
    in_progress: Vec<u8>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next in-order chunk.
    ///
    /// Returns the completed message when `chunk.last` is set, `None` while
    /// more fragments are still owed.
    pub fn push(&mut self, chunk: Chunk) -> Option<Vec<u8>> {
        self.in_progress.extend_from_slice(&chunk.data);
        if chunk.last {
            Some(std::mem::take(&mut self.in_progress))
        } else {
            None
        }
    }

    /// `true` when no partially reassembled message is pending.
    pub fn is_idle(&self) -> bool {
        self.in_progress.is_empty()
    }
}
