//! Crate-wide error taxonomy.
//!
//! Codec-level problems ([`DecodeError`]) are local and recoverable: the
//! offending frame is dropped and the window logic decides whether to re-ACK
//! or stay silent.  Everything else in [`ProtocolError`] is surfaced to the
//! caller; the fatal variants tear the session down.

use thiserror::Error;

use crate::fragment::FragmentError;
use crate::frame::DecodeError;
use crate::session::ConnectionState;

/// Everything that can go wrong on one connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A frame failed to parse.  Only fatal when it happens mid-handshake.
    #[error("frame decoding failed: {0}")]
    Decode(#[from] DecodeError),

    /// The three-way handshake did not complete; no session was created.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// ACK_FINAL carried a session id that matches no pending session.
    #[error("session id mismatch during handshake")]
    SessionMismatch,

    /// A bounded wait elapsed with no frame from the peer.
    #[error("timed out waiting for the peer")]
    Timeout,

    /// Retransmissions exhausted without an acknowledgement.
    #[error("peer unresponsive after {0} retransmissions")]
    PeerUnresponsive(u32),

    /// The peer (or the channel) reported an unrecoverable integrity fault.
    /// By design this terminates the connection; recovery requires a fresh
    /// handshake.
    #[error("channel reported an integrity fault")]
    ChannelFault,

    /// The peer closed the connection (DISCONNECT or stream EOF).
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The operation is not valid in the connection's current state.
    #[error("operation invalid in state {0:?}")]
    BadState(ConnectionState),

    /// Header declared a payload larger than the stream layer will buffer.
    #[error("frame payload length {0} exceeds the receive limit")]
    OversizedFrame(u32),

    /// A handshake JSON body failed to parse or serialise.
    #[error("malformed handshake payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Fragment marker framing inside a DATA payload was invalid.
    #[error("message fragment framing error: {0}")]
    Fragment(#[from] FragmentError),

    /// Underlying transport I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
