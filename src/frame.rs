//! Wire-format definitions for protocol frames.
//!
//! Every unit exchanged between peers is a [`Frame`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, payload).
//! - Serialising a [`Frame`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Frame`], returning errors
//!   for malformed or corrupted input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Payload Length                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Message Type |        Sequence Number        |               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+               +
//! |                    Checksum (continued)       |  Payload ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 11 bytes.
//! payload_length(4) + message_type(1) + sequence(2) + checksum(4)
//!
//! The checksum is a 32-bit FNV-1a digest over the **payload only**; the
//! header carries no integrity protection of its own.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 11;

// Byte offsets of each field within the serialised header.
const OFF_LEN: usize = 0;
const OFF_TYPE: usize = 4;
const OFF_SEQ: usize = 5;
const OFF_CHECKSUM: usize = 7;

/// Every kind of frame this protocol can put on the wire.
///
/// Exactly one tag per frame; an unassigned byte is a [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Handshake step 1: connection request with proposed parameters.
    Syn = 1,
    /// Acknowledgement of a data or disconnect frame.
    Ack = 2,
    /// Handshake step 3: the initiator confirms the negotiated session.
    AckFinal = 3,
    /// One fragment of an application message.
    Data = 4,
    /// Graceful termination request.
    Disconnect = 5,
    /// Handshake step 2: the responder's negotiated reply.
    SynAck = 6,
    /// Negative acknowledgement: the peer saw this frame arrive corrupted.
    Nack = 7,
    /// The channel itself reported an integrity fault; fatal by design.
    ChannelErrorMarker = 0x99,
}

impl MessageType {
    /// Map a raw wire byte onto the closed enum.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Syn),
            2 => Some(Self::Ack),
            3 => Some(Self::AckFinal),
            4 => Some(Self::Data),
            5 => Some(Self::Disconnect),
            6 => Some(Self::SynAck),
            7 => Some(Self::Nack),
            0x99 => Some(Self::ChannelErrorMarker),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Syn => "SYN",
            Self::Ack => "ACK",
            Self::AckFinal => "ACK_FINAL",
            Self::Data => "DATA",
            Self::Disconnect => "DISCONNECT",
            Self::SynAck => "SYN_ACK",
            Self::Nack => "NACK",
            Self::ChannelErrorMarker => "CHANNEL_ERROR_MARKER",
        };
        f.write_str(name)
    }
}

/// A complete protocol frame: header fields + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    /// Per-frame sequence number, wrapping in u16 space.
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Convenience constructor.
    pub fn new(message_type: MessageType, sequence: u16, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            sequence,
            payload,
        }
    }

    /// A header-only frame (ACK, NACK, DISCONNECT and friends).
    pub fn control(message_type: MessageType, sequence: u16) -> Self {
        Self::new(message_type, sequence, Vec::new())
    }

    /// Serialise this frame into a newly allocated byte vector.
    ///
    /// `payload_length` and the checksum are computed from the actual
    /// payload; the caller never supplies them.
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = self.payload.len();
        let mut buf = vec![0u8; HEADER_LEN + payload_len];

        buf[OFF_LEN..OFF_LEN + 4].copy_from_slice(&(payload_len as u32).to_be_bytes());
        buf[OFF_TYPE] = self.message_type as u8;
        buf[OFF_SEQ..OFF_SEQ + 2].copy_from_slice(&self.sequence.to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4]
            .copy_from_slice(&checksum32(&self.payload).to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        buf
    }

    /// Parse a [`Frame`] from a raw byte slice.
    ///
    /// The buffer may contain trailing bytes beyond the frame; they are
    /// ignored.  `payload_length` is only ever used after bounds-checking
    /// against the bytes actually present, so a hostile length cannot cause
    /// an out-of-range read.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::IncompleteFrame {
                have: buf.len(),
                need: HEADER_LEN,
            });
        }

        let payload_len =
            u32::from_be_bytes(buf[OFF_LEN..OFF_LEN + 4].try_into().unwrap()) as usize;
        let type_byte = buf[OFF_TYPE];
        let sequence = u16::from_be_bytes(buf[OFF_SEQ..OFF_SEQ + 2].try_into().unwrap());
        let stored =
            u32::from_be_bytes(buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].try_into().unwrap());

        let total = HEADER_LEN
            .checked_add(payload_len)
            .ok_or(DecodeError::IncompleteFrame {
                have: buf.len(),
                need: usize::MAX,
            })?;
        if buf.len() < total {
            return Err(DecodeError::IncompleteFrame {
                have: buf.len(),
                need: total,
            });
        }

        let payload = &buf[HEADER_LEN..total];
        if checksum32(payload) != stored {
            return Err(DecodeError::ChecksumMismatch {
                type_byte,
                sequence,
            });
        }

        let message_type =
            MessageType::from_wire(type_byte).ok_or(DecodeError::UnknownMessageType(type_byte))?;

        Ok(Frame {
            message_type,
            sequence,
            payload: payload.to_vec(),
        })
    }

    /// Read the `payload_length` field out of a raw header.
    ///
    /// Used by the stream layer to learn how many payload bytes to pull off
    /// the socket before a full [`decode`](Self::decode) is possible.
    pub fn payload_len_of(header: &[u8; HEADER_LEN]) -> u32 {
        u32::from_be_bytes(header[OFF_LEN..OFF_LEN + 4].try_into().unwrap())
    }
}

/// Errors that can arise when parsing a raw frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the header (or the header-declared total) requires.
    #[error("incomplete frame: have {have} bytes, need {need}")]
    IncompleteFrame { have: usize, need: usize },
    /// Recomputed payload digest disagrees with the stored checksum.
    ///
    /// The header fields are retained as a best-effort hint so the receiver
    /// can NACK the corrupted sequence number.
    #[error("checksum mismatch on frame seq={sequence} (type byte {type_byte:#04x})")]
    ChecksumMismatch { type_byte: u8, sequence: u16 },
    /// The message-type byte maps to no known frame kind.
    #[error("unknown message type byte {0:#04x}")]
    UnknownMessageType(u8),
}

/// Compute the 32-bit FNV-1a digest of `data`.
///
/// Content-addressed, 4 bytes on the wire.  The contract is accidental-
/// corruption detection, not cryptographic integrity.
pub fn checksum32(data: &[u8]) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut hash = FNV_OFFSET;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
