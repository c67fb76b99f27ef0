//! `rdt-over-tcp` — a connection-oriented reliable transfer protocol at the
//! application layer, run over an ordered byte stream (typically TCP).
//!
//! The transport underneath is already reliable; this crate re-solves
//! reliability one layer up so that loss and corruption — injected by the
//! [`channel`] fault simulator — exercise real retransmission machinery:
//! parameter negotiation, sliding windows under Go-Back-N or Selective
//! Repeat, fragmentation, and graceful termination.
//!
//! # Architecture
//!
//! ```text
//!  Application message
//!      │ send                                   receive │
//!      ▼                                                │
//!  ┌──────────────┐  chunks   ┌─────────────────┐  in-order payloads
//!  │  Fragmenter  │──────────▶│ Reliability     │──────────▶ Reassembler
//!  └──────────────┘           │ engine (GBN/SR) │
//!                             └────────┬────────┘
//!                                      │ frames
//!                             ┌────────▼────────┐
//!                             │   Frame codec   │
//!                             └────────┬────────┘
//!                                      │ bytes (faults injectable here)
//!                             ┌────────▼────────┐
//!                             │   byte stream   │
//!                             └─────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]        — wire format (serialise / deserialise / checksum)
//! - [`fragment`]     — message fragmentation and reassembly
//! - [`handshake`]    — SYN / SYN_ACK / ACK_FINAL payloads and negotiation
//! - [`gbn_sender`]   — Go-Back-N outbound window state machine
//! - [`gbn_receiver`] — Go-Back-N inbound cumulative-ACK state machine
//! - [`sr_sender`]    — Selective Repeat outbound per-frame-ACK window
//! - [`sr_receiver`]  — Selective Repeat inbound reorder buffer
//! - [`arq`]          — strategy dispatch over the two window pairs
//! - [`connection`]   — per-connection engine (handshake, transfer, close)
//! - [`session`]      — lifecycle states, event feed, server session table
//! - [`timer`]        — RFC 6298 retransmission-timeout estimation
//! - [`stream`]       — framed I/O over any `AsyncRead + AsyncWrite`
//! - [`channel`]      — lossy/corrupting channel simulator for testing

pub mod arq;
pub mod channel;
pub mod connection;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod handshake;
pub mod session;
pub mod sr_receiver;
pub mod sr_sender;
pub mod stream;
pub mod timer;

pub use connection::{Connection, InitiatorConfig, ResponderConfig};
pub use error::ProtocolError;
pub use handshake::{ConnectionParameters, OperationMode, ReliabilityStrategy};
pub use session::{ConnectionEvent, ConnectionState, SessionTable};
