//! Fault injection for deterministic testing.
//!
//! Real deployments of this protocol run over a clean TCP stream, so loss
//! and corruption have to be manufactured.  [`FaultInjector`] is a transform
//! the stream layer applies to each encoded outbound frame, never the
//! reliability engine itself:
//!
//! | Fault            | Effect on the encoded frame                        |
//! |------------------|----------------------------------------------------|
//! | Loss             | Frame silently never written.                      |
//! | Corruption       | One payload byte flipped; header left intact so    |
//! |                  | the peer sees a checksum mismatch, not a desync.   |
//! | Error marker     | Frame replaced by `CHANNEL_ERROR_MARKER`, which    |
//! |                  | the peer treats as a fatal integrity fault.        |
//! | Delay            | Frame written after a fixed pause.                 |
//!
//! The RNG is seeded so failing scenarios replay byte-for-byte.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::{Frame, MessageType, HEADER_LEN};

/// Configuration for the fault model.
///
/// All rates are probabilities in `[0.0, 1.0]`; the default is a transparent
/// pass-through.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Probability that a frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that one payload byte of a frame is flipped.
    pub corruption_rate: f64,
    /// Probability that a frame is replaced by a channel-error marker.
    pub error_marker_rate: f64,
    /// Probability that a frame is delayed by `delay` before writing.
    pub delay_rate: f64,
    /// Pause applied to delayed frames.
    pub delay: Duration,
    /// RNG seed; equal seeds replay the exact same fault sequence.
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corruption_rate: 0.0,
            error_marker_rate: 0.0,
            delay_rate: 0.0,
            delay: Duration::ZERO,
            seed: 0,
        }
    }
}

/// What the channel decided to do with one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fate {
    /// Write these bytes (possibly corrupted or replaced).
    Deliver(Vec<u8>),
    /// Write these bytes after pausing.
    DeliverAfter(Vec<u8>, Duration),
    /// Never write anything.
    Drop,
}

/// A seeded fault-injecting transform over encoded frames.
#[derive(Debug)]
pub struct FaultInjector {
    config: FaultConfig,
    rng: StdRng,
}

impl FaultInjector {
    pub fn new(config: FaultConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    /// Decide the fate of one encoded frame.
    ///
    /// Draw order: loss, marker replacement, corruption, delay.  The checks
    /// are independent, so a corrupted frame can also be delayed.
    pub fn apply(&mut self, mut bytes: Vec<u8>) -> Fate {
        if self.draw(self.config.loss_rate) {
            log::debug!("[chan] dropping frame ({} bytes)", bytes.len());
            return Fate::Drop;
        }

        if self.draw(self.config.error_marker_rate) {
            let seq = u16::from_be_bytes([bytes[5], bytes[6]]);
            log::debug!("[chan] replacing frame seq={seq} with error marker");
            bytes = Frame::control(MessageType::ChannelErrorMarker, seq).encode();
        } else if self.draw(self.config.corruption_rate) {
            self.corrupt(&mut bytes);
        }

        if self.draw(self.config.delay_rate) {
            log::debug!("[chan] delaying frame by {:?}", self.config.delay);
            return Fate::DeliverAfter(bytes, self.config.delay);
        }
        Fate::Deliver(bytes)
    }

    /// Flip one byte.  Prefer a payload byte so the peer keeps framing and
    /// reports a checksum mismatch; a payload-less frame gets its stored
    /// checksum flipped instead, which the peer detects the same way.
    fn corrupt(&mut self, bytes: &mut [u8]) {
        let index = if bytes.len() > HEADER_LEN {
            self.rng.random_range(HEADER_LEN..bytes.len())
        } else {
            HEADER_LEN - 1 // last checksum byte
        };
        bytes[index] = bytes[index].wrapping_add(1);
        log::debug!("[chan] corrupted byte at offset {index}");
    }

    fn draw(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            false
        } else if rate >= 1.0 {
            true
        } else {
            self.rng.random_bool(rate)
        }
    }
}
