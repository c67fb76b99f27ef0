//! Selective Repeat send-side state machine.
//!
//! [`SrSender`] keeps the same sliding window as its Go-Back-N counterpart
//! but acknowledges and retransmits frames **individually**:
//!
//! - Every in-flight frame carries its own deadline (`sent_at + RTO`).
//! - `ACK(seq)` marks exactly that frame; `base` only advances once the
//!   frame at `base` is acked, skipping over any already-acked successors.
//! - On a deadline expiry, only the overdue frame is retransmitted — the
//!   defining Selective Repeat behavior, trading bookkeeping overhead for
//!   fewer redundant retransmissions.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::frame::{Frame, MessageType};
use crate::gbn_sender::AckOutcome;

/// A single in-flight frame with its individual ack/retransmit bookkeeping.
#[derive(Debug, Clone)]
struct SrInFlight {
    frame: Frame,
    acked: bool,
    tx_count: u32,
    sent_at: Instant,
}

/// Selective Repeat send-side state for one session.
#[derive(Debug)]
pub struct SrSender {
    /// Sequence number of the oldest not-yet-acked frame (left window edge).
    base: u16,
    /// Sequence number to stamp on the next new frame.
    next_seq: u16,
    /// Maximum number of frames in flight simultaneously.
    window_size: u16,
    /// Window slots ordered by sequence number; acked slots stay in place
    /// until the frame at `base` is acked and the prefix can be dropped.
    window: VecDeque<SrInFlight>,
}

impl SrSender {
    pub fn new(window_size: u16) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next_seq: 0,
            window_size,
            window: VecDeque::with_capacity(window_size as usize),
        }
    }

    pub fn can_send(&self) -> bool {
        (self.window.len() as u16) < self.window_size
    }

    /// Frames still awaiting their individual acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.window.iter().filter(|e| !e.acked).count()
    }

    pub fn has_unacked(&self) -> bool {
        self.window.iter().any(|e| !e.acked)
    }

    /// Highest transmission count among unacked frames (0 when idle).
    pub fn max_tx_count(&self) -> u32 {
        self.window
            .iter()
            .filter(|e| !e.acked)
            .map(|e| e.tx_count)
            .max()
            .unwrap_or(0)
    }

    /// Sequence number the next new frame will carry.
    pub fn next_sequence(&self) -> u16 {
        self.next_seq
    }

    /// Build the DATA frame for the next payload without sending it.
    pub fn next_frame(&self, payload: Vec<u8>) -> Frame {
        Frame::new(MessageType::Data, self.next_seq, payload)
    }

    /// Place a just-transmitted frame into the window and advance `next_seq`.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is already full.
    pub fn record_sent(&mut self, frame: Frame) {
        debug_assert!(self.can_send(), "record_sent called on a full SR window");
        debug_assert_eq!(frame.sequence, self.next_seq);
        self.window.push_back(SrInFlight {
            frame,
            acked: false,
            tx_count: 1,
            sent_at: Instant::now(),
        });
        self.next_seq = self.next_seq.wrapping_add(1);
    }

    /// Process a per-frame ACK.
    ///
    /// Marks exactly the acked frame; `base` advances past the acked prefix,
    /// freeing window slots.  Duplicate and out-of-window ACKs are ignored.
    pub fn on_ack(&mut self, ack: u16) -> AckOutcome {
        let offset = ack.wrapping_sub(self.base) as usize;
        let Some(entry) = self.window.get_mut(offset) else {
            return AckOutcome::default();
        };
        if entry.acked {
            return AckOutcome::default();
        }
        entry.acked = true;
        let rtt_sample = (entry.tx_count == 1).then(|| entry.sent_at.elapsed());

        // Drop the contiguous acked prefix, sliding the window forward.
        while matches!(self.window.front(), Some(e) if e.acked) {
            self.window.pop_front();
            self.base = self.base.wrapping_add(1);
        }

        AckOutcome {
            newly_acked: 1,
            rtt_sample,
        }
    }

    /// Frames whose individual deadline has expired at `now`.
    ///
    /// Each returned frame is retransmitted alone; its bookkeeping is
    /// refreshed so the next deadline starts from `now`.
    pub fn frames_due(&mut self, now: Instant, rto: Duration) -> Vec<Frame> {
        let mut due = Vec::new();
        for entry in self.window.iter_mut() {
            if !entry.acked && now >= entry.sent_at + rto {
                entry.tx_count += 1;
                entry.sent_at = now;
                due.push(entry.frame.clone());
            }
        }
        due
    }

    /// Immediate single-frame retransmission in response to a NACK.
    ///
    /// Only the named frame is re-sent; acked or out-of-window sequence
    /// numbers are ignored.
    pub fn on_nack(&mut self, seq: u16, now: Instant) -> Vec<Frame> {
        let offset = seq.wrapping_sub(self.base) as usize;
        match self.window.get_mut(offset) {
            Some(entry) if !entry.acked => {
                entry.tx_count += 1;
                entry.sent_at = now;
                vec![entry.frame.clone()]
            }
            _ => Vec::new(),
        }
    }

    /// Earliest per-frame deadline among unacked frames, if any.
    pub fn next_deadline(&self, rto: Duration) -> Option<Instant> {
        self.window
            .iter()
            .filter(|e| !e.acked)
            .map(|e| e.sent_at + rto)
            .min()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(window_size: u16, frames: usize) -> SrSender {
        let mut s = SrSender::new(window_size);
        for _ in 0..frames {
            let f = s.next_frame(b"x".to_vec());
            s.record_sent(f);
        }
        s
    }

    #[test]
    fn ack_out_of_order_keeps_base() {
        let mut s = filled(4, 3);
        // ACK frame 1 while 0 is still outstanding.
        assert_eq!(s.on_ack(1).newly_acked, 1);
        assert_eq!(s.in_flight(), 2);
        // The window cannot slide yet: slot 0 is unacked.
        assert_eq!(s.window.len(), 3);
    }

    #[test]
    fn base_skips_already_acked_frames() {
        let mut s = filled(4, 3);
        s.on_ack(1);
        s.on_ack(2);
        assert_eq!(s.in_flight(), 1);
        // Acking the base frame releases the whole prefix at once.
        s.on_ack(0);
        assert!(!s.has_unacked());
        assert_eq!(s.window.len(), 0);
        assert_eq!(s.next_frame(Vec::new()).sequence, 3);
    }

    #[test]
    fn duplicate_ack_ignored() {
        let mut s = filled(4, 2);
        assert_eq!(s.on_ack(1).newly_acked, 1);
        assert_eq!(s.on_ack(1).newly_acked, 0);
    }

    #[test]
    fn out_of_window_ack_ignored() {
        let mut s = filled(4, 2);
        assert_eq!(s.on_ack(7).newly_acked, 0);
        assert_eq!(s.on_ack(u16::MAX).newly_acked, 0);
        assert_eq!(s.in_flight(), 2);
    }

    #[test]
    fn only_overdue_frames_retransmitted() {
        let mut s = filled(4, 3);
        s.on_ack(1); // middle frame acked
        let due = s.frames_due(Instant::now() + Duration::from_secs(1), Duration::ZERO);
        let seqs: Vec<u16> = due.iter().map(|f| f.sequence).collect();
        // Frame 1 is acked: only 0 and 2 come back.
        assert_eq!(seqs, vec![0, 2]);
    }

    #[test]
    fn retransmission_refreshes_deadline() {
        let mut s = filled(4, 1);
        let due = s.frames_due(Instant::now(), Duration::ZERO);
        assert_eq!(due.len(), 1);
        assert_eq!(s.max_tx_count(), 2);
        // Immediately afterwards the frame is no longer overdue for a real RTO.
        assert!(s
            .frames_due(Instant::now(), Duration::from_secs(60))
            .is_empty());
    }

    #[test]
    fn nack_retransmits_single_frame() {
        let mut s = filled(4, 3);
        let due = s.on_nack(1, Instant::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].sequence, 1);
        // NACK for an acked frame is a no-op.
        s.on_ack(2);
        assert!(s.on_nack(2, Instant::now()).is_empty());
    }

    #[test]
    fn next_deadline_tracks_earliest_unacked() {
        let mut s = filled(4, 2);
        let rto = Duration::from_millis(500);
        let d0 = s.next_deadline(rto).unwrap();
        s.on_ack(0);
        let d1 = s.next_deadline(rto).unwrap();
        assert!(d1 >= d0);
        s.on_ack(1);
        assert!(s.next_deadline(rto).is_none());
    }

    #[test]
    fn karn_rule_on_rtt_samples() {
        let mut s = filled(4, 2);
        // Frame 0 retransmitted once: no sample on its ACK.
        s.on_nack(0, Instant::now());
        assert!(s.on_ack(0).rtt_sample.is_none());
        // Frame 1 sent once: sample present.
        assert!(s.on_ack(1).rtt_sample.is_some());
    }

    #[test]
    fn seq_wrap_around() {
        let mut s = SrSender::new(4);
        s.base = u16::MAX;
        s.next_seq = u16::MAX;
        for _ in 0..3 {
            let f = s.next_frame(b"w".to_vec());
            s.record_sent(f);
        }
        // In flight: 65535, 0, 1.  Ack them out of order across the wrap.
        s.on_ack(0);
        s.on_ack(u16::MAX);
        assert_eq!(s.in_flight(), 1);
        s.on_ack(1);
        assert!(!s.has_unacked());
        assert_eq!(s.next_frame(Vec::new()).sequence, 2);
    }
}
