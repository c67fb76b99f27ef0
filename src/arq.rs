//! Strategy dispatch for the reliability engine.
//!
//! The handshake fixes one of two retransmission strategies for the life of
//! a session.  [`ArqSender`] and [`ArqReceiver`] wrap the per-strategy state
//! machines behind the uniform surface the connection loop drives, so the
//! loop itself never branches on the strategy:
//!
//! | operation        | Go-Back-N                    | Selective Repeat        |
//! |------------------|------------------------------|-------------------------|
//! | `on_ack`         | cumulative, slides prefix    | per-frame, skips acked  |
//! | `frames_due`     | whole window                 | overdue frames only     |
//! | `on_nack`        | whole window                 | the named frame         |
//! | `next_deadline`  | oldest in-flight + RTO       | earliest unacked + RTO  |
//! | `on_data` (rx)   | expected-only, cumulative ACK| windowed, per-frame ACK |

use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::gbn_receiver::{GbnReceiver, GbnRecv};
use crate::gbn_sender::{AckOutcome, GbnSender};
use crate::handshake::ReliabilityStrategy;
use crate::sr_receiver::SrReceiver;
use crate::sr_sender::SrSender;

/// Outcome of one inbound DATA frame, strategy-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataOutcome {
    /// Sequence number to ACK, if the frame deserves one.
    pub ack: Option<u16>,
    /// Payloads released to the reassembly layer, in sequence order.
    pub delivered: Vec<Vec<u8>>,
}

/// Send-side window under the negotiated strategy.
#[derive(Debug)]
pub enum ArqSender {
    Gbn(GbnSender),
    Sr(SrSender),
}

impl ArqSender {
    pub fn new(strategy: ReliabilityStrategy, window_size: u16) -> Self {
        match strategy {
            ReliabilityStrategy::GoBackN => Self::Gbn(GbnSender::new(window_size)),
            ReliabilityStrategy::SelectiveRepeat => Self::Sr(SrSender::new(window_size)),
        }
    }

    pub fn can_send(&self) -> bool {
        match self {
            Self::Gbn(s) => s.can_send(),
            Self::Sr(s) => s.can_send(),
        }
    }

    pub fn has_unacked(&self) -> bool {
        match self {
            Self::Gbn(s) => s.has_unacked(),
            Self::Sr(s) => s.has_unacked(),
        }
    }

    pub fn in_flight(&self) -> usize {
        match self {
            Self::Gbn(s) => s.in_flight(),
            Self::Sr(s) => s.in_flight(),
        }
    }

    pub fn max_tx_count(&self) -> u32 {
        match self {
            Self::Gbn(s) => s.max_tx_count(),
            Self::Sr(s) => s.max_tx_count(),
        }
    }

    pub fn next_sequence(&self) -> u16 {
        match self {
            Self::Gbn(s) => s.next_sequence(),
            Self::Sr(s) => s.next_sequence(),
        }
    }

    pub fn next_frame(&self, payload: Vec<u8>) -> Frame {
        match self {
            Self::Gbn(s) => s.next_frame(payload),
            Self::Sr(s) => s.next_frame(payload),
        }
    }

    pub fn record_sent(&mut self, frame: Frame) {
        match self {
            Self::Gbn(s) => s.record_sent(frame),
            Self::Sr(s) => s.record_sent(frame),
        }
    }

    pub fn on_ack(&mut self, ack: u16) -> AckOutcome {
        match self {
            Self::Gbn(s) => s.on_ack(ack),
            Self::Sr(s) => s.on_ack(ack),
        }
    }

    pub fn frames_due(&mut self, now: Instant, rto: Duration) -> Vec<Frame> {
        match self {
            Self::Gbn(s) => s.frames_due(now, rto),
            Self::Sr(s) => s.frames_due(now, rto),
        }
    }

    pub fn on_nack(&mut self, seq: u16, now: Instant) -> Vec<Frame> {
        match self {
            Self::Gbn(s) => s.on_nack(seq, now),
            Self::Sr(s) => s.on_nack(seq, now),
        }
    }

    pub fn next_deadline(&self, rto: Duration) -> Option<Instant> {
        match self {
            Self::Gbn(s) => s.next_deadline(rto),
            Self::Sr(s) => s.next_deadline(rto),
        }
    }
}

/// Receive-side window under the negotiated strategy.
#[derive(Debug)]
pub enum ArqReceiver {
    Gbn(GbnReceiver),
    Sr(SrReceiver),
}

impl ArqReceiver {
    pub fn new(strategy: ReliabilityStrategy, window_size: u16) -> Self {
        match strategy {
            ReliabilityStrategy::GoBackN => Self::Gbn(GbnReceiver::new()),
            ReliabilityStrategy::SelectiveRepeat => Self::Sr(SrReceiver::new(window_size)),
        }
    }

    /// Apply an inbound DATA frame to the receive window.
    ///
    /// GBN answers every DATA frame with the cumulative ACK — on a discard
    /// that re-sent ACK is the implicit NACK the sender reacts to.  SR acks
    /// accepted and already-delivered frames individually.
    pub fn on_data(&mut self, seq: u16, payload: Vec<u8>) -> DataOutcome {
        match self {
            Self::Gbn(r) => {
                let delivered = match r.on_data(seq, payload) {
                    GbnRecv::Accepted(data) => vec![data],
                    GbnRecv::Discarded => Vec::new(),
                };
                DataOutcome {
                    ack: Some(r.cumulative_ack()),
                    delivered,
                }
            }
            Self::Sr(r) => {
                let out = r.on_data(seq, payload);
                DataOutcome {
                    ack: out.ack,
                    delivered: out.delivered,
                }
            }
        }
    }

    /// ACK value to repeat when a corrupted DATA frame is dropped.
    ///
    /// Only GBN has one (the cumulative ACK); SR stays silent and lets the
    /// per-frame timer cover the loss.
    pub fn reack_on_corruption(&self) -> Option<u16> {
        match self {
            Self::Gbn(r) => Some(r.cumulative_ack()),
            Self::Sr(_) => None,
        }
    }
}
