//! Retransmission timeout (RTO) management.
//!
//! Reliable delivery requires that unacknowledged frames are re-sent if no
//! ACK arrives within a bounded time.  [`RetransmitTimer`] owns the RTO
//! estimate for one session; the connection loop asks it for the current
//! value when arming a deadline, feeds it RTT samples from clean ACKs, and
//! backs it off on expiry.
//!
//! RTO is computed using Jacobson's algorithm (RFC 6298):
//!   `RTO = SRTT + 4 × RTTVAR`
//! and doubles on each consecutive timeout (exponential back-off) up to a
//! configurable maximum.
//!
//! Under Selective Repeat the same RTO applies to every in-flight frame;
//! each frame's deadline is `sent_at + current_rto`.

use std::time::Duration;

/// Adjustable timeout parameters for one connection.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Initial RTO before any RTT sample is available.
    pub initial_rto: Duration,
    /// Maximum RTO after repeated back-off.
    pub max_rto: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            initial_rto: Duration::from_millis(1000),
            max_rto: Duration::from_secs(60),
        }
    }
}

/// RTO state for one session.
#[derive(Debug)]
pub struct RetransmitTimer {
    config: TimerConfig,
    /// Current RTO, updated after each RTT sample or back-off.
    current_rto: Duration,
    /// Smoothed RTT estimate (SRTT).
    srtt: Option<Duration>,
    /// RTT variance estimate (RTTVAR).
    rttvar: Option<Duration>,
}

impl Default for RetransmitTimer {
    fn default() -> Self {
        Self::new(TimerConfig::default())
    }
}

impl RetransmitTimer {
    pub fn new(config: TimerConfig) -> Self {
        let rto = config.initial_rto;
        Self {
            config,
            current_rto: rto,
            srtt: None,
            rttvar: None,
        }
    }

    /// The RTO to use for the next armed deadline.
    pub fn current_rto(&self) -> Duration {
        self.current_rto
    }

    /// Record a new RTT sample and update SRTT / RTTVAR / RTO (RFC 6298 §2).
    ///
    /// On the first sample:  SRTT = R,  RTTVAR = R/2,  RTO = SRTT + 4·RTTVAR.
    /// Subsequent samples:   RTTVAR = 3/4·RTTVAR + 1/4·|SRTT − R|
    ///                       SRTT   = 7/8·SRTT   + 1/8·R
    ///
    /// Callers must only feed samples from frames that were transmitted
    /// exactly once (Karn's rule); a retransmitted frame's RTT is ambiguous.
    pub fn record_rtt_sample(&mut self, sample: Duration) {
        match (self.srtt, self.rttvar) {
            (None, _) => {
                self.srtt = Some(sample);
                self.rttvar = Some(sample / 2);
            }
            (Some(srtt), Some(rttvar)) => {
                let diff = sample.abs_diff(srtt);
                self.rttvar = Some(rttvar * 3 / 4 + diff / 4);
                self.srtt = Some(srtt * 7 / 8 + sample / 8);
            }
            _ => unreachable!(),
        }
        self.reset();
    }

    /// Double the RTO on retransmit timeout (exponential back-off, RFC 6298 §5.5).
    ///
    /// Capped at `config.max_rto` to prevent indefinite growth.
    pub fn back_off(&mut self) {
        self.current_rto = (self.current_rto * 2).min(self.config.max_rto);
    }

    /// Restore `current_rto` from the current SRTT / RTTVAR estimates.
    ///
    /// Falls back to `initial_rto` before the first RTT sample is available.
    pub fn reset(&mut self) {
        self.current_rto = match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => (srtt + rttvar * 4).min(self.config.max_rto),
            _ => self.config.initial_rto,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_initial_rto() {
        let t = RetransmitTimer::default();
        assert_eq!(t.current_rto(), Duration::from_millis(1000));
    }

    #[test]
    fn first_sample_sets_srtt_plus_4x_var() {
        let mut t = RetransmitTimer::default();
        t.record_rtt_sample(Duration::from_millis(100));
        // SRTT = 100ms, RTTVAR = 50ms → RTO = 100 + 4*50 = 300ms.
        assert_eq!(t.current_rto(), Duration::from_millis(300));
    }

    #[test]
    fn back_off_doubles_up_to_cap() {
        let mut t = RetransmitTimer::new(TimerConfig {
            initial_rto: Duration::from_millis(500),
            max_rto: Duration::from_millis(1500),
        });
        t.back_off();
        assert_eq!(t.current_rto(), Duration::from_millis(1000));
        t.back_off();
        assert_eq!(t.current_rto(), Duration::from_millis(1500));
        t.back_off();
        assert_eq!(t.current_rto(), Duration::from_millis(1500));
    }

    #[test]
    fn reset_after_back_off_returns_to_estimate() {
        let mut t = RetransmitTimer::default();
        t.record_rtt_sample(Duration::from_millis(200));
        let estimated = t.current_rto();
        t.back_off();
        assert!(t.current_rto() > estimated);
        t.reset();
        assert_eq!(t.current_rto(), estimated);
    }

    #[test]
    fn smoothing_converges_toward_stable_rtt() {
        let mut t = RetransmitTimer::default();
        for _ in 0..20 {
            t.record_rtt_sample(Duration::from_millis(80));
        }
        // With a constant RTT the variance decays and the RTO approaches SRTT.
        assert!(t.current_rto() < Duration::from_millis(160));
    }
}
