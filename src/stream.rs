//! Frame-oriented I/O over a byte stream.
//!
//! [`FrameStream`] is a thin wrapper that speaks [`Frame`] instead of raw
//! bytes over any ordered transport (`AsyncRead + AsyncWrite`), typically a
//! `tokio::net::TcpStream`.  All protocol logic lives elsewhere; this module
//! owns only framing I/O and the optional fault-injection hook used by
//! tests.
//!
//! Reads are two-phase: the fixed header first, then exactly the payload
//! the header declares — after capping the declared length, so a hostile or
//! corrupted `payload_length` can neither over-allocate nor over-read.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::channel::{Fate, FaultInjector};
use crate::error::ProtocolError;
use crate::frame::{Frame, HEADER_LEN};

/// Hard ceiling on a single frame's payload, independent of negotiation.
pub const MAX_FRAME_PAYLOAD: u32 = 1 << 20;

/// An async, frame-oriented wrapper around a byte stream.
#[derive(Debug)]
pub struct FrameStream<S> {
    io: S,
    /// Bytes read off the transport but not yet consumed as a frame.
    ///
    /// Reads go through this buffer so that [`recv`](Self::recv) is
    /// cancellation-safe: the connection loop races it against a retransmit
    /// deadline in `select!`, and a partially received frame must survive
    /// the losing branch being dropped.
    rx_buf: Vec<u8>,
    /// Outbound fault transform; `None` outside tests.
    injector: Option<FaultInjector>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FrameStream<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            rx_buf: Vec::new(),
            injector: None,
        }
    }

    /// Interpose a fault injector between the codec and the transport.
    pub fn with_injector(io: S, injector: FaultInjector) -> Self {
        Self {
            io,
            rx_buf: Vec::new(),
            injector: Some(injector),
        }
    }

    /// Install or remove the outbound fault transform.
    ///
    /// Lets tests establish a session over a clean channel and only then
    /// turn the faults on.
    pub fn set_injector(&mut self, injector: Option<FaultInjector>) {
        self.injector = injector;
    }

    /// Encode `frame` and write it, subject to the fault model if one is
    /// installed.  A frame the channel "loses" still returns `Ok(())` — the
    /// sender cannot tell, exactly as on a real lossy path.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let bytes = frame.encode();
        let bytes = match self.injector.as_mut() {
            None => bytes,
            Some(injector) => match injector.apply(bytes) {
                Fate::Deliver(bytes) => bytes,
                Fate::DeliverAfter(bytes, pause) => {
                    tokio::time::sleep(pause).await;
                    bytes
                }
                Fate::Drop => return Ok(()),
            },
        };
        self.io.write_all(&bytes).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Read the next frame off the stream.
    ///
    /// Cancellation-safe: partially received bytes stay in the internal
    /// buffer and the next call resumes where this one stopped.
    ///
    /// Errors:
    /// - [`ProtocolError::ConnectionClosed`] on EOF at a frame boundary,
    /// - [`ProtocolError::OversizedFrame`] when the header declares more
    ///   payload than [`MAX_FRAME_PAYLOAD`],
    /// - [`ProtocolError::Decode`] when the assembled frame fails to parse
    ///   (checksum mismatch, unknown type) — the stream itself stays in
    ///   sync, so the caller may keep reading.
    pub async fn recv(&mut self) -> Result<Frame, ProtocolError> {
        loop {
            if self.rx_buf.len() >= HEADER_LEN {
                let header: [u8; HEADER_LEN] = self.rx_buf[..HEADER_LEN].try_into().unwrap();
                let payload_len = Frame::payload_len_of(&header);
                if payload_len > MAX_FRAME_PAYLOAD {
                    return Err(ProtocolError::OversizedFrame(payload_len));
                }
                let total = HEADER_LEN + payload_len as usize;
                if self.rx_buf.len() >= total {
                    let bytes: Vec<u8> = self.rx_buf.drain(..total).collect();
                    return Ok(Frame::decode(&bytes)?);
                }
            }

            // `read` is cancel-safe: if the caller's select! picks another
            // branch, no bytes have been consumed from the transport.
            let mut chunk = [0u8; 4096];
            let n = self.io.read(&mut chunk).await?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
            self.rx_buf.extend_from_slice(&chunk[..n]);
        }
    }
}
