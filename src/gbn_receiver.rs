//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Only the **in-order** frame is accepted (`seq == expected`).
//! - Out-of-order or duplicate frames are discarded without buffering.
//! - After every DATA frame (accepted or not) the caller sends a
//!   **cumulative ACK** carrying the highest in-order sequence number
//!   accepted so far; a re-sent cumulative ACK on a discard acts as an
//!   implicit NACK-by-duplicate-ACK for the sender.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

/// Outcome of one inbound DATA frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GbnRecv {
    /// Frame was the expected one; payload is released in order.
    Accepted(Vec<u8>),
    /// Early, late, or duplicate frame; nothing is released.
    Discarded,
}

/// Go-Back-N receive-side state for one session.
#[derive(Debug)]
pub struct GbnReceiver {
    /// Next expected sequence number.
    expected: u16,
}

impl GbnReceiver {
    /// Create a receiver expecting sequence number 0 on a fresh session.
    pub fn new() -> Self {
        Self { expected: 0 }
    }

    /// Process an inbound DATA frame.
    ///
    /// Accepts exactly the frame whose sequence equals `expected`, advancing
    /// the expectation by one.  Anything else is dropped — GBN never buffers
    /// out-of-order data; the sender will go back and retransmit from the
    /// gap.
    pub fn on_data(&mut self, seq: u16, payload: Vec<u8>) -> GbnRecv {
        if seq == self.expected {
            self.expected = self.expected.wrapping_add(1);
            GbnRecv::Accepted(payload)
        } else {
            GbnRecv::Discarded
        }
    }

    /// Cumulative ACK value for the next outbound ACK frame.
    ///
    /// The sequence number of the highest in-order frame accepted so far.
    /// Before anything has been accepted this wraps to `0xFFFF`, which the
    /// sender rejects as out-of-window.
    pub fn cumulative_ack(&self) -> u16 {
        self.expected.wrapping_sub(1)
    }
}

impl Default for GbnReceiver {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
