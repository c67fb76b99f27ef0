//! Handshake payloads and parameter negotiation.
//!
//! The three-way exchange (SYN → SYN_ACK → ACK_FINAL) carries JSON bodies in
//! the frame payloads.  This module defines those bodies, the negotiated
//! [`ConnectionParameters`] they produce, and the responder-side clamping
//! logic; the wire-driving state machines live in [`crate::connection`].

use serde::{Deserialize, Serialize};

/// How the sender paces itself once established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    /// One frame in flight at a time: the window is forced to 1.
    #[serde(rename = "step-by-step")]
    StepByStep,
    /// Pipelined sends up to the negotiated window size.
    #[serde(rename = "burst")]
    Burst,
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StepByStep => f.write_str("step-by-step"),
            Self::Burst => f.write_str("burst"),
        }
    }
}

/// Which retransmission strategy the session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReliabilityStrategy {
    #[serde(rename = "gbn")]
    GoBackN,
    #[serde(rename = "sr")]
    SelectiveRepeat,
}

impl std::fmt::Display for ReliabilityStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GoBackN => f.write_str("gbn"),
            Self::SelectiveRepeat => f.write_str("sr"),
        }
    }
}

/// SYN body: the initiator's requested parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynPayload {
    pub operation_mode: OperationMode,
    /// Requested maximum message bytes per DATA frame.
    pub max_size: u32,
    pub strategy: ReliabilityStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// SYN_ACK body: the responder's verdict and effective parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynAckPayload {
    pub status: HandshakeStatus,
    pub operation_mode: OperationMode,
    pub max_size: u32,
    pub strategy: ReliabilityStrategy,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "rejected")]
    Rejected,
}

/// ACK_FINAL body: the initiator echoes the session it is confirming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckFinalPayload {
    pub session_id: String,
}

/// Parameters of one established session.  Immutable after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub operation_mode: OperationMode,
    /// Maximum message bytes carried per DATA frame.
    pub max_packet_size: u32,
    /// Negotiated window; only meaningful in burst mode.
    pub window_size: u16,
    pub strategy: ReliabilityStrategy,
    pub session_id: String,
}

impl ConnectionParameters {
    /// Window the reliability engine actually runs with.
    ///
    /// Step-by-step forces stop-and-wait regardless of what was negotiated.
    pub fn effective_window(&self) -> u16 {
        match self.operation_mode {
            OperationMode::StepByStep => 1,
            OperationMode::Burst => self.window_size,
        }
    }
}

/// Responder-side caps applied during negotiation.
#[derive(Debug, Clone)]
pub struct ResponderLimits {
    /// Hard ceiling on `max_size`; requests above it are clamped down.
    pub max_packet_size_cap: u32,
    /// Hard ceiling on the window; also keeps u16 wrap arithmetic sound.
    pub max_window: u16,
    /// Window granted when a burst-mode SYN names none.
    pub default_window: u16,
}

impl Default for ResponderLimits {
    fn default() -> Self {
        Self {
            max_packet_size_cap: 1024,
            max_window: 16,
            default_window: 4,
        }
    }
}

/// Windows above this bound would make u16 wrap-around window membership
/// ambiguous; negotiation never grants more.
pub const WINDOW_HARD_LIMIT: u16 = 256;

/// Compute the effective parameters for a SYN, or a rejection reason.
///
/// The responder clamps rather than refuses where it can (`min()` on sizes);
/// only requests that cannot produce a working session are rejected.
pub fn negotiate(
    syn: &SynPayload,
    limits: &ResponderLimits,
    session_id: String,
) -> Result<ConnectionParameters, String> {
    if syn.max_size == 0 {
        return Err("max_size must be at least 1".into());
    }

    let max_packet_size = syn.max_size.min(limits.max_packet_size_cap);

    let requested_window = syn.window_size.unwrap_or(limits.default_window);
    if syn.operation_mode == OperationMode::Burst && requested_window == 0 {
        return Err("window_size must be at least 1 in burst mode".into());
    }
    let window_size = requested_window
        .max(1)
        .min(limits.max_window)
        .min(WINDOW_HARD_LIMIT);

    Ok(ConnectionParameters {
        operation_mode: syn.operation_mode,
        max_packet_size,
        window_size,
        strategy: syn.strategy,
        session_id,
    })
}

/// Build the SYN_ACK body announcing `params` to the initiator.
pub fn accept_reply(params: &ConnectionParameters) -> SynAckPayload {
    SynAckPayload {
        status: HandshakeStatus::Ok,
        operation_mode: params.operation_mode,
        max_size: params.max_packet_size,
        strategy: params.strategy,
        session_id: params.session_id.clone(),
        window_size: (params.operation_mode == OperationMode::Burst)
            .then_some(params.window_size),
        message: None,
    }
}

/// Build a rejecting SYN_ACK body.
pub fn reject_reply(reason: String) -> SynAckPayload {
    SynAckPayload {
        status: HandshakeStatus::Rejected,
        operation_mode: OperationMode::StepByStep,
        max_size: 0,
        strategy: ReliabilityStrategy::GoBackN,
        session_id: String::new(),
        window_size: None,
        message: Some(reason),
    }
}
