//! Selective Repeat receive-side state machine.
//!
//! [`SrReceiver`] accepts any frame inside the receive window
//! `[expected, expected + window_size)`, buffers out-of-order arrivals, and
//! releases payloads to the reassembly layer strictly in sequence order as
//! gaps close.  Every accepted (or already-delivered) frame is answered
//! with a per-frame `ACK(seq)` — never a cumulative one.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::HashMap;

/// Outcome of one inbound DATA frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SrRecv {
    /// Sequence number to ACK, if this frame deserves one.
    pub ack: Option<u16>,
    /// Payloads released in order by this arrival (empty while gaps remain).
    pub delivered: Vec<Vec<u8>>,
}

/// Selective Repeat receive-side state for one session.
#[derive(Debug)]
pub struct SrReceiver {
    /// Lowest sequence number not yet delivered (left window edge).
    expected: u16,
    window_size: u16,
    /// Out-of-order frames held until the gap before them closes.
    buffer: HashMap<u16, Vec<u8>>,
}

impl SrReceiver {
    pub fn new(window_size: u16) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            expected: 0,
            window_size,
            buffer: HashMap::new(),
        }
    }

    /// Process an inbound DATA frame.
    ///
    /// - In-window frames are buffered (or delivered immediately when they
    ///   close the gap at `expected`) and ACKed individually.
    /// - Frames just **below** the window were already delivered; they are
    ///   re-ACKed but never redelivered (the original ACK may have been
    ///   lost).
    /// - Anything else is ignored: a sender honouring the negotiated window
    ///   can never legitimately produce it.
    pub fn on_data(&mut self, seq: u16, payload: Vec<u8>) -> SrRecv {
        let offset = seq.wrapping_sub(self.expected);
        if offset < self.window_size {
            // Duplicate of a buffered frame keeps the first copy.
            self.buffer.entry(seq).or_insert(payload);

            let mut delivered = Vec::new();
            while let Some(data) = self.buffer.remove(&self.expected) {
                delivered.push(data);
                self.expected = self.expected.wrapping_add(1);
            }
            return SrRecv {
                ack: Some(seq),
                delivered,
            };
        }

        // Behind the window: an old frame whose ACK was lost.
        let behind = self.expected.wrapping_sub(seq);
        if behind >= 1 && behind <= self.window_size {
            return SrRecv {
                ack: Some(seq),
                delivered: Vec::new(),
            };
        }

        SrRecv::default()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
