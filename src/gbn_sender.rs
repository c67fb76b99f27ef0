//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` in-flight DATA
//! frames, one sequence number per frame.
//!
//! # Protocol contract
//!
//! - At most `window_size` frames may be in flight at once.
//! - ACKs are **cumulative**: `ACK(k)` means the receiver has accepted every
//!   frame up to and including sequence number `k`, so `base` advances to
//!   `k + 1`.
//! - On timeout (or an in-window NACK), the caller retransmits **all**
//!   unacked frames from `base` onwards — the defining Go-Back-N step.
//! - Sequence numbers are u16 and wrap; window membership is decided by
//!   wrapping distance from `base`, which stays unambiguous because the
//!   handshake caps the window far below half the sequence space.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::frame::{Frame, MessageType};

// ---------------------------------------------------------------------------
// InFlight
// ---------------------------------------------------------------------------

/// A single in-flight frame occupying one slot in the retransmit window.
#[derive(Debug, Clone)]
pub struct InFlight {
    /// The frame as last put on the wire.
    pub frame: Frame,
    /// Total number of times this frame has been transmitted.
    pub tx_count: u32,
    /// Wall-clock time of the most recent transmission.
    pub sent_at: Instant,
}

/// Result of processing one ACK frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckOutcome {
    /// Frames newly removed from the window by this ACK.
    pub newly_acked: usize,
    /// RTT sample from a frame that was transmitted exactly once, if any.
    pub rtt_sample: Option<Duration>,
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one session.
///
/// # Sequence-number layout
///
/// ```text
///     base             next_seq
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space (mod 2^16)
///      │ <── in flight ──▶│ <── sendable ───▶
/// ```
#[derive(Debug)]
pub struct GbnSender {
    /// Sequence number of the **oldest** unacked frame (left window edge).
    base: u16,
    /// Sequence number to stamp on the **next** new frame.
    next_seq: u16,
    /// Maximum number of frames in flight simultaneously (N).
    window_size: u16,
    /// In-flight frames ordered by sequence number (front = oldest).
    window: VecDeque<InFlight>,
}

impl GbnSender {
    /// Create a new sender.  Sequence numbers start at 0 on a fresh session.
    pub fn new(window_size: u16) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next_seq: 0,
            window_size,
            window: VecDeque::with_capacity(window_size as usize),
        }
    }

    /// `true` when there is room for at least one more in-flight frame.
    pub fn can_send(&self) -> bool {
        (self.window.len() as u16) < self.window_size
    }

    /// Number of frames currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    /// `true` when at least one frame is awaiting acknowledgement.
    pub fn has_unacked(&self) -> bool {
        !self.window.is_empty()
    }

    /// Highest transmission count across the window (0 when idle).
    pub fn max_tx_count(&self) -> u32 {
        self.window.iter().map(|e| e.tx_count).max().unwrap_or(0)
    }

    /// Sequence number the next new frame will carry.
    pub fn next_sequence(&self) -> u16 {
        self.next_seq
    }

    /// Build the DATA frame for the next payload without sending it.
    ///
    /// Call [`record_sent`](Self::record_sent) immediately after handing the
    /// frame to the wire.
    pub fn next_frame(&self, payload: Vec<u8>) -> Frame {
        Frame::new(MessageType::Data, self.next_seq, payload)
    }

    /// Place a just-transmitted frame into the window and advance `next_seq`.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is already full.  Check
    /// [`can_send`](Self::can_send) before calling.
    pub fn record_sent(&mut self, frame: Frame) {
        debug_assert!(
            self.can_send(),
            "record_sent called on a full GBN window ({} / {})",
            self.window.len(),
            self.window_size
        );
        debug_assert_eq!(frame.sequence, self.next_seq);
        self.window.push_back(InFlight {
            frame,
            tx_count: 1,
            sent_at: Instant::now(),
        });
        self.next_seq = self.next_seq.wrapping_add(1);
    }

    /// Process a cumulative ACK for sequence number `ack`.
    ///
    /// Removes every window entry up to and including `ack` and advances
    /// `base` to `ack + 1`.  A duplicate or out-of-window ACK leaves the
    /// window untouched and reports zero newly-acked frames.
    pub fn on_ack(&mut self, ack: u16) -> AckOutcome {
        let covered = ack.wrapping_sub(self.base) as usize;
        if covered >= self.window.len() {
            return AckOutcome::default();
        }

        let mut outcome = AckOutcome {
            newly_acked: covered + 1,
            rtt_sample: None,
        };
        for _ in 0..=covered {
            let entry = self.window.pop_front().expect("window length checked");
            // Karn's rule: only un-retransmitted frames yield a usable RTT.
            if entry.tx_count == 1 {
                outcome.rtt_sample = Some(entry.sent_at.elapsed());
            }
        }
        self.base = ack.wrapping_add(1);
        outcome
    }

    /// Frames to put back on the wire for a retransmission triggered at
    /// `now` with the given RTO.
    ///
    /// Go-Back-N retransmits the **entire** window once the oldest in-flight
    /// frame is overdue; each returned frame's bookkeeping is refreshed.
    /// Returns an empty list when nothing is overdue.
    pub fn frames_due(&mut self, now: Instant, rto: Duration) -> Vec<Frame> {
        match self.window.front() {
            Some(oldest) if now >= oldest.sent_at + rto => self.retransmit_all(now),
            _ => Vec::new(),
        }
    }

    /// Immediate window-wide retransmission in response to a NACK for an
    /// in-flight sequence number.  Out-of-window NACKs are ignored.
    pub fn on_nack(&mut self, seq: u16, now: Instant) -> Vec<Frame> {
        if (seq.wrapping_sub(self.base) as usize) < self.window.len() {
            self.retransmit_all(now)
        } else {
            Vec::new()
        }
    }

    /// Deadline at which the retransmit timer should fire, if armed.
    ///
    /// One timer per session: it tracks the oldest in-flight frame.
    pub fn next_deadline(&self, rto: Duration) -> Option<Instant> {
        self.window.front().map(|e| e.sent_at + rto)
    }

    fn retransmit_all(&mut self, now: Instant) -> Vec<Frame> {
        for entry in self.window.iter_mut() {
            entry.tx_count += 1;
            entry.sent_at = now;
        }
        self.window.iter().map(|e| e.frame.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(window_size: u16, frames: usize) -> GbnSender {
        let mut s = GbnSender::new(window_size);
        for _ in 0..frames {
            let f = s.next_frame(b"x".to_vec());
            s.record_sent(f);
        }
        s
    }

    #[test]
    fn initial_state() {
        let s = GbnSender::new(4);
        assert!(s.can_send());
        assert!(!s.has_unacked());
        assert_eq!(s.in_flight(), 0);
        assert_eq!(s.next_deadline(Duration::from_secs(1)), None);
    }

    #[test]
    fn record_sent_advances_next_seq() {
        let mut s = GbnSender::new(4);
        let f = s.next_frame(b"a".to_vec());
        assert_eq!(f.sequence, 0);
        s.record_sent(f);
        assert_eq!(s.next_frame(b"b".to_vec()).sequence, 1);
        assert_eq!(s.in_flight(), 1);
    }

    #[test]
    fn window_full_blocks_send() {
        let s = filled(2, 2);
        assert!(!s.can_send());
        assert_eq!(s.in_flight(), 2);
    }

    #[test]
    fn cumulative_ack_slides_multiple() {
        let mut s = filled(4, 3);
        let out = s.on_ack(2);
        assert_eq!(out.newly_acked, 3);
        assert!(!s.has_unacked());
        assert!(s.can_send());
    }

    #[test]
    fn partial_cumulative_ack() {
        let mut s = filled(4, 3);
        let out = s.on_ack(1);
        assert_eq!(out.newly_acked, 2);
        assert_eq!(s.in_flight(), 1);
    }

    #[test]
    fn duplicate_ack_acks_nothing() {
        let mut s = filled(4, 2);
        assert_eq!(s.on_ack(0).newly_acked, 1);
        assert_eq!(s.on_ack(0).newly_acked, 0);
        assert_eq!(s.in_flight(), 1);
    }

    #[test]
    fn initial_cumulative_ack_value_is_out_of_window() {
        // Before anything is accepted the receiver's cumulative ACK is
        // 0u16.wrapping_sub(1); it must ack nothing.
        let mut s = filled(4, 2);
        assert_eq!(s.on_ack(0u16.wrapping_sub(1)).newly_acked, 0);
        assert_eq!(s.in_flight(), 2);
    }

    #[test]
    fn spurious_ack_beyond_next_seq_ignored() {
        let mut s = filled(4, 2);
        assert_eq!(s.on_ack(1000).newly_acked, 0);
        assert_eq!(s.in_flight(), 2);
    }

    #[test]
    fn clean_ack_yields_rtt_sample_retransmit_does_not() {
        let mut s = filled(4, 1);
        let resent = s.frames_due(Instant::now(), Duration::ZERO);
        assert_eq!(resent.len(), 1);
        // The frame has now been sent twice; Karn's rule suppresses the sample.
        assert!(s.on_ack(0).rtt_sample.is_none());

        let mut s2 = filled(4, 1);
        assert!(s2.on_ack(0).rtt_sample.is_some());
    }

    #[test]
    fn timeout_retransmits_entire_window() {
        let mut s = filled(8, 3);
        // Not yet overdue.
        assert!(s.frames_due(Instant::now(), Duration::from_secs(60)).is_empty());
        // Overdue: all three frames come back, oldest first.
        let due = s.frames_due(Instant::now() + Duration::from_secs(1), Duration::ZERO);
        let seqs: Vec<u16> = due.iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(s.max_tx_count(), 2);
    }

    #[test]
    fn nack_in_window_retransmits_everything() {
        let mut s = filled(8, 3);
        let due = s.on_nack(1, Instant::now());
        assert_eq!(due.len(), 3);
        // NACK for a sequence number we never sent does nothing.
        assert!(s.on_nack(9, Instant::now()).is_empty());
    }

    #[test]
    fn seq_wrap_around() {
        let mut s = GbnSender::new(4);
        // Walk next_seq close to the wrap point.
        s.base = u16::MAX - 1;
        s.next_seq = u16::MAX - 1;
        for _ in 0..3 {
            let f = s.next_frame(b"w".to_vec());
            s.record_sent(f);
        }
        // Frames 65534, 65535, 0 are in flight; ack through the wrap.
        let out = s.on_ack(0);
        assert_eq!(out.newly_acked, 3);
        assert!(!s.has_unacked());
        assert_eq!(s.next_frame(Vec::new()).sequence, 1);
    }
}
