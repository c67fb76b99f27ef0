//! Per-connection protocol engine: handshake + reliable transfer + close.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(msg) / receive() / close()
//!      ▼
//!  Connection
//!    ├── ArqSender    (send window: GBN or SR, seq numbers, deadlines)
//!    ├── ArqReceiver  (receive window: ordering, dup suppression, ACKs)
//!    ├── Reassembler  (fragments → whole messages)
//!    ├── RetransmitTimer (RFC 6298 RTO estimate)
//!    └── FrameStream  (framed I/O over the byte transport)
//! ```
//!
//! Both peer roles are constructors on the same type: [`Connection::connect`]
//! performs the active open (initiator), [`Connection::accept`] the passive
//! open (responder, registering the session in the shared [`SessionTable`]).
//! Once established the two sides are symmetric.
//!
//! The transfer loop multiplexes inbound frames against the retransmit
//! deadline with `tokio::select!`; every wait is bounded, so a dead peer
//! always surfaces as [`ProtocolError::Timeout`] or
//! [`ProtocolError::PeerUnresponsive`] rather than a hang.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::arq::{ArqReceiver, ArqSender};
use crate::error::ProtocolError;
use crate::fragment::{fragment, Chunk, Reassembler};
use crate::frame::{DecodeError, Frame, MessageType};
use crate::handshake::{
    self, AckFinalPayload, ConnectionParameters, HandshakeStatus, OperationMode,
    ReliabilityStrategy, ResponderLimits, SynAckPayload, SynPayload,
};
use crate::session::{ConnectionEvent, ConnectionState, SessionGuard, SessionTable};
use crate::stream::FrameStream;
use crate::timer::{RetransmitTimer, TimerConfig};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Active-open (client) parameters.
#[derive(Debug, Clone)]
pub struct InitiatorConfig {
    pub operation_mode: OperationMode,
    pub strategy: ReliabilityStrategy,
    /// Requested maximum message bytes per DATA frame.
    pub max_packet_size: u32,
    /// Requested window; only sent in burst mode.
    pub window_size: u16,
    pub client_id: Option<String>,
    pub timers: TimerConfig,
    /// SYN (re)transmissions before giving up on the handshake.
    pub handshake_retries: u32,
    /// Data retransmissions per frame/window before `PeerUnresponsive`.
    pub max_retries: u32,
    /// Bound on waiting for a frame when nothing is in flight.
    pub idle_timeout: Duration,
    /// Optional state-change feed to the application layer.
    pub events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            operation_mode: OperationMode::StepByStep,
            strategy: ReliabilityStrategy::GoBackN,
            max_packet_size: 1024,
            window_size: 4,
            client_id: None,
            timers: TimerConfig::default(),
            handshake_retries: 3,
            max_retries: 6,
            idle_timeout: Duration::from_secs(30),
            events: None,
        }
    }
}

/// Passive-open (server) parameters.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub limits: ResponderLimits,
    pub timers: TimerConfig,
    /// SYN_ACK (re)transmissions while waiting for ACK_FINAL.
    pub handshake_retries: u32,
    pub max_retries: u32,
    pub idle_timeout: Duration,
    pub events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            limits: ResponderLimits::default(),
            timers: TimerConfig::default(),
            handshake_retries: 3,
            max_retries: 6,
            idle_timeout: Duration::from_secs(30),
            events: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One established (or establishing) protocol session over a byte stream.
pub struct Connection<S> {
    stream: FrameStream<S>,
    params: ConnectionParameters,
    state: ConnectionState,
    sender: ArqSender,
    receiver: ArqReceiver,
    reassembler: Reassembler,
    /// Whole reassembled messages awaiting a `receive()` call.
    inbound: VecDeque<Vec<u8>>,
    timer: RetransmitTimer,
    max_retries: u32,
    idle_timeout: Duration,
    events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
    /// Responder only: removes the session-table entry when released.
    guard: Option<SessionGuard>,
    /// Log tag: "gbn" or "sr".
    label: &'static str,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    // -----------------------------------------------------------------------
    // Handshake: initiator
    // -----------------------------------------------------------------------

    /// Active open: drive SYN → SYN_ACK → ACK_FINAL over `io`.
    pub async fn connect(io: S, config: InitiatorConfig) -> Result<Self, ProtocolError> {
        Self::connect_via(FrameStream::new(io), config).await
    }

    /// Active open over a pre-built [`FrameStream`], e.g. one with a fault
    /// injector installed.
    pub async fn connect_via(
        mut stream: FrameStream<S>,
        config: InitiatorConfig,
    ) -> Result<Self, ProtocolError> {
        let body = SynPayload {
            operation_mode: config.operation_mode,
            max_size: config.max_packet_size,
            strategy: config.strategy,
            window_size: (config.operation_mode == OperationMode::Burst)
                .then_some(config.window_size),
            client_id: config.client_id.clone(),
        };
        let syn = Frame::new(MessageType::Syn, 0, serde_json::to_vec(&body)?);
        let mut timer = RetransmitTimer::new(config.timers.clone());

        let syn_ack: SynAckPayload = 'reply: {
            for attempt in 0..=config.handshake_retries {
                stream.send(&syn).await?;
                log::debug!("[hs] → SYN (attempt {})", attempt + 1);

                match timeout(timer.current_rto(), stream.recv()).await {
                    Err(_elapsed) => timer.back_off(),
                    Ok(Err(ProtocolError::Decode(e))) => {
                        log::debug!("[hs] dropped undecodable frame: {e}");
                    }
                    Ok(Err(e)) => return Err(e),
                    Ok(Ok(frame)) if frame.message_type == MessageType::SynAck => {
                        break 'reply serde_json::from_slice(&frame.payload)?;
                    }
                    Ok(Ok(frame)) => {
                        log::debug!("[hs] ignoring {} while waiting for SYN_ACK", frame.message_type);
                    }
                }
            }
            return Err(ProtocolError::HandshakeFailed(
                "no SYN_ACK within the retry budget".into(),
            ));
        };

        if syn_ack.status == HandshakeStatus::Rejected {
            return Err(ProtocolError::HandshakeFailed(
                syn_ack
                    .message
                    .unwrap_or_else(|| "rejected by responder".into()),
            ));
        }
        if syn_ack.session_id.is_empty() || syn_ack.max_size == 0 {
            return Err(ProtocolError::HandshakeFailed(
                "responder announced unusable parameters".into(),
            ));
        }

        let params = ConnectionParameters {
            operation_mode: syn_ack.operation_mode,
            max_packet_size: syn_ack.max_size,
            window_size: syn_ack.window_size.unwrap_or(1).max(1),
            strategy: syn_ack.strategy,
            session_id: syn_ack.session_id,
        };

        let ack = Frame::new(
            MessageType::AckFinal,
            0,
            serde_json::to_vec(&AckFinalPayload {
                session_id: params.session_id.clone(),
            })?,
        );
        stream.send(&ack).await?;
        log::debug!("[hs] → ACK_FINAL session {}", params.session_id);

        Ok(Self::established(
            stream,
            params,
            timer,
            config.max_retries,
            config.idle_timeout,
            config.events,
            None,
        ))
    }

    // -----------------------------------------------------------------------
    // Handshake: responder
    // -----------------------------------------------------------------------

    /// Passive open: await a SYN on `io`, negotiate, register the session
    /// for `peer` in `table`, and confirm via ACK_FINAL.
    pub async fn accept(
        io: S,
        table: Arc<SessionTable>,
        peer: String,
        config: ResponderConfig,
    ) -> Result<Self, ProtocolError> {
        Self::accept_via(FrameStream::new(io), table, peer, config).await
    }

    /// Passive open over a pre-built [`FrameStream`].
    pub async fn accept_via(
        mut stream: FrameStream<S>,
        table: Arc<SessionTable>,
        peer: String,
        config: ResponderConfig,
    ) -> Result<Self, ProtocolError> {
        let deadline = Instant::now() + config.idle_timeout;
        let syn: SynPayload = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProtocolError::HandshakeFailed(
                    "timed out waiting for SYN".into(),
                ));
            }
            match timeout(remaining, stream.recv()).await {
                Err(_elapsed) => {
                    return Err(ProtocolError::HandshakeFailed(
                        "timed out waiting for SYN".into(),
                    ));
                }
                // Corrupted bytes before the SYN: drop them and keep waiting;
                // the initiator will retransmit.
                Ok(Err(ProtocolError::Decode(e))) => {
                    log::debug!("[hs] dropped undecodable frame: {e}");
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(frame)) if frame.message_type == MessageType::Syn => {
                    break serde_json::from_slice(&frame.payload)?;
                }
                Ok(Ok(frame)) => {
                    return Err(ProtocolError::HandshakeFailed(format!(
                        "expected SYN, got {}",
                        frame.message_type
                    )));
                }
            }
        };
        log::debug!(
            "[hs] ← SYN from {peer}{}: mode={} strategy={} max_size={}",
            syn.client_id
                .as_deref()
                .map(|id| format!(" (client id {id})"))
                .unwrap_or_default(),
            syn.operation_mode,
            syn.strategy,
            syn.max_size,
        );

        let session_id = table.fresh_session_id();
        let params = match handshake::negotiate(&syn, &config.limits, session_id) {
            Ok(params) => params,
            Err(reason) => {
                let reply = handshake::reject_reply(reason.clone());
                let frame = Frame::new(MessageType::SynAck, 0, serde_json::to_vec(&reply)?);
                stream.send(&frame).await?;
                return Err(ProtocolError::HandshakeFailed(reason));
            }
        };

        table.create(&peer, params.clone());
        let guard = SessionGuard::new(table.clone(), peer.clone());

        let reply = handshake::accept_reply(&params);
        let syn_ack = Frame::new(MessageType::SynAck, 0, serde_json::to_vec(&reply)?);
        let mut timer = RetransmitTimer::new(config.timers.clone());

        for attempt in 0..=config.handshake_retries {
            stream.send(&syn_ack).await?;
            log::debug!(
                "[hs] → SYN_ACK session {} (attempt {})",
                params.session_id,
                attempt + 1
            );

            match timeout(timer.current_rto(), stream.recv()).await {
                Err(_elapsed) => timer.back_off(),
                Ok(Err(ProtocolError::Decode(e))) => {
                    log::debug!("[hs] dropped undecodable frame: {e}");
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(frame)) => match frame.message_type {
                    MessageType::AckFinal => {
                        let ack: AckFinalPayload = serde_json::from_slice(&frame.payload)?;
                        if ack.session_id != params.session_id {
                            log::warn!(
                                "[hs] ACK_FINAL names session {:?}, expected {} — closing",
                                ack.session_id,
                                params.session_id
                            );
                            return Err(ProtocolError::SessionMismatch);
                        }
                        table.complete(&peer);
                        return Ok(Self::established(
                            stream,
                            params,
                            timer,
                            config.max_retries,
                            config.idle_timeout,
                            config.events,
                            Some(guard),
                        ));
                    }
                    // Our SYN_ACK was lost and the initiator re-sent its SYN;
                    // loop around and answer it again.
                    MessageType::Syn => {}
                    other => {
                        log::debug!("[hs] ignoring {other} while waiting for ACK_FINAL");
                    }
                },
            }
        }
        Err(ProtocolError::HandshakeFailed(
            "no ACK_FINAL within the retry budget".into(),
        ))
    }

    fn established(
        stream: FrameStream<S>,
        params: ConnectionParameters,
        timer: RetransmitTimer,
        max_retries: u32,
        idle_timeout: Duration,
        events: Option<mpsc::UnboundedSender<ConnectionEvent>>,
        guard: Option<SessionGuard>,
    ) -> Self {
        let window = params.effective_window();
        let label = match params.strategy {
            ReliabilityStrategy::GoBackN => "gbn",
            ReliabilityStrategy::SelectiveRepeat => "sr",
        };
        log::info!(
            "[hs] session {} established: mode={} strategy={} max_size={} window={}",
            params.session_id,
            params.operation_mode,
            params.strategy,
            params.max_packet_size,
            window,
        );
        let conn = Self {
            stream,
            sender: ArqSender::new(params.strategy, window),
            receiver: ArqReceiver::new(params.strategy, window),
            reassembler: Reassembler::new(),
            inbound: VecDeque::new(),
            timer,
            max_retries,
            idle_timeout,
            events,
            guard,
            label,
            state: ConnectionState::Established,
            params,
        };
        conn.emit(ConnectionEvent::Established {
            session_id: conn.params.session_id.clone(),
        });
        conn
    }

    // -----------------------------------------------------------------------
    // Data transfer
    // -----------------------------------------------------------------------

    /// Negotiated parameters of this session.
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Install or remove the outbound fault transform (test collaborator).
    ///
    /// Faults live between the codec and the transport, never inside the
    /// reliability engine; this merely forwards to the frame stream.
    pub fn inject_faults(&mut self, injector: Option<crate::channel::FaultInjector>) {
        self.stream.set_injector(injector);
    }

    /// Send one application message reliably.
    ///
    /// The message is fragmented to the negotiated size and pushed through
    /// the send window; in step-by-step mode that degenerates to
    /// stop-and-wait.  Returns once **every** fragment is acknowledged, so
    /// ownership of the pending message never outlives the call.
    pub async fn send(&mut self, message: &[u8]) -> Result<(), ProtocolError> {
        if self.state != ConnectionState::Established {
            return Err(ProtocolError::BadState(self.state));
        }

        for chunk in fragment(message, self.params.max_packet_size as usize) {
            while !self.sender.can_send() {
                self.pump_once().await?;
            }
            let frame = self.sender.next_frame(chunk.into_payload());
            log::debug!(
                "[{}] → DATA seq={} len={} in_flight={}",
                self.label,
                frame.sequence,
                frame.payload.len(),
                self.sender.in_flight() + 1,
            );
            self.stream.send(&frame).await?;
            self.sender.record_sent(frame);
        }

        while self.sender.has_unacked() {
            self.pump_once().await?;
        }
        Ok(())
    }

    /// Receive the next whole application message.
    ///
    /// Blocks (bounded by the idle timeout) until a complete message has
    /// been reassembled.  Retransmissions, duplicates, and out-of-order
    /// arrivals are invisible here.
    pub async fn receive(&mut self) -> Result<Vec<u8>, ProtocolError> {
        loop {
            if let Some(message) = self.inbound.pop_front() {
                return Ok(message);
            }
            if self.state != ConnectionState::Established {
                return Err(match self.state {
                    ConnectionState::Closed => ProtocolError::ConnectionClosed,
                    other => ProtocolError::BadState(other),
                });
            }
            self.pump_once().await?;
        }
    }

    /// Graceful close: flush in-flight data, then run the DISCONNECT/ACK
    /// exchange.  Idempotent.
    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }

        while self.sender.has_unacked() {
            match self.pump_once().await {
                Ok(()) => {}
                Err(ProtocolError::ConnectionClosed) => break,
                Err(e) => return Err(e),
            }
        }
        if self.state == ConnectionState::Closed {
            return Ok(()); // peer disconnected first
        }

        // The DISCONNECT takes the next unused sequence number, so its ACK
        // cannot be confused with any data ACK.
        let disconnect = Frame::control(MessageType::Disconnect, self.sender.next_sequence());
        for attempt in 0..=self.max_retries {
            self.stream.send(&disconnect).await?;
            log::debug!("[{}] → DISCONNECT (attempt {})", self.label, attempt + 1);

            match timeout(self.timer.current_rto(), self.stream.recv()).await {
                Err(_elapsed) => self.timer.back_off(),
                Ok(Err(ProtocolError::ConnectionClosed)) => break,
                Ok(Err(ProtocolError::Decode(_))) => {}
                Ok(Err(e)) => {
                    self.teardown(ConnectionEvent::Closed);
                    return Err(e);
                }
                Ok(Ok(frame))
                    if frame.message_type == MessageType::Ack
                        && frame.sequence == disconnect.sequence =>
                {
                    log::debug!("[{}] ← ACK of DISCONNECT", self.label);
                    break;
                }
                // Simultaneous close: acknowledge the peer's DISCONNECT and
                // stop waiting for ours to be acked.
                Ok(Ok(frame)) if frame.message_type == MessageType::Disconnect => {
                    self.stream
                        .send(&Frame::control(MessageType::Ack, frame.sequence))
                        .await?;
                    break;
                }
                // Stray late data during close is of no further interest.
                Ok(Ok(_)) => {}
            }
        }

        self.teardown(ConnectionEvent::Closed);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Engine internals
    // -----------------------------------------------------------------------

    /// One engine step: wait for either the next inbound frame or the next
    /// retransmit deadline, and process whichever fires first.
    ///
    /// With nothing in flight the deadline degrades to the idle timeout and
    /// its expiry is an error — no wait in this engine is unbounded.
    async fn pump_once(&mut self) -> Result<(), ProtocolError> {
        let rto = self.timer.current_rto();
        let (deadline, retransmit) = match self.sender.next_deadline(rto) {
            Some(deadline) => (deadline, true),
            None => (Instant::now() + self.idle_timeout, false),
        };
        let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline));
        tokio::pin!(sleep);

        tokio::select! {
            result = self.stream.recv() => match result {
                Ok(frame) => self.on_frame(frame).await?,
                Err(ProtocolError::Decode(e)) => self.on_decode_error(e).await?,
                Err(ProtocolError::ConnectionClosed) => {
                    self.teardown(ConnectionEvent::Failed {
                        reason: "transport closed by peer".into(),
                    });
                    return Err(ProtocolError::ConnectionClosed);
                }
                Err(e) => return Err(e),
            },
            _ = &mut sleep => {
                if retransmit {
                    self.on_retransmit_timeout().await?;
                } else {
                    return Err(ProtocolError::Timeout);
                }
            }
        }
        Ok(())
    }

    /// Strategy-specific reaction to an expired retransmit deadline.
    async fn on_retransmit_timeout(&mut self) -> Result<(), ProtocolError> {
        let due = self.sender.frames_due(Instant::now(), self.timer.current_rto());
        if due.is_empty() {
            return Ok(()); // the deadline raced an ACK; nothing is overdue
        }
        if self.sender.max_tx_count() > self.max_retries + 1 {
            self.teardown(ConnectionEvent::Failed {
                reason: "peer unresponsive".into(),
            });
            return Err(ProtocolError::PeerUnresponsive(self.max_retries));
        }
        log::debug!(
            "[{}] timeout — retransmitting {} frame(s)",
            self.label,
            due.len()
        );
        for frame in &due {
            self.stream.send(frame).await?;
        }
        self.timer.back_off();
        Ok(())
    }

    /// Dispatch one inbound frame against the session state.
    async fn on_frame(&mut self, frame: Frame) -> Result<(), ProtocolError> {
        match frame.message_type {
            MessageType::Ack => {
                let out = self.sender.on_ack(frame.sequence);
                if out.newly_acked > 0 {
                    log::debug!(
                        "[{}] ← ACK seq={} ({} newly acked)",
                        self.label,
                        frame.sequence,
                        out.newly_acked
                    );
                    match out.rtt_sample {
                        Some(sample) => self.timer.record_rtt_sample(sample),
                        None => self.timer.reset(),
                    }
                }
            }
            MessageType::Nack => {
                let due = self.sender.on_nack(frame.sequence, Instant::now());
                if !due.is_empty() {
                    // NACKs bypass the timer but not the retry bound, or a
                    // permanently corrupting channel would loop forever.
                    if self.sender.max_tx_count() > self.max_retries + 1 {
                        self.teardown(ConnectionEvent::Failed {
                            reason: "peer unresponsive".into(),
                        });
                        return Err(ProtocolError::PeerUnresponsive(self.max_retries));
                    }
                    log::debug!(
                        "[{}] ← NACK seq={} — fast retransmit of {} frame(s)",
                        self.label,
                        frame.sequence,
                        due.len()
                    );
                    for f in &due {
                        self.stream.send(f).await?;
                    }
                }
            }
            MessageType::Data => {
                let seq = frame.sequence;
                let out = self.receiver.on_data(seq, frame.payload);
                if let Some(ack) = out.ack {
                    self.stream.send(&Frame::control(MessageType::Ack, ack)).await?;
                }
                log::debug!(
                    "[{}] ← DATA seq={} ({} payload(s) released)",
                    self.label,
                    seq,
                    out.delivered.len()
                );
                for payload in out.delivered {
                    let chunk = Chunk::from_payload(&payload)?;
                    if let Some(message) = self.reassembler.push(chunk) {
                        self.inbound.push_back(message);
                    }
                }
            }
            MessageType::Disconnect => {
                log::debug!("[{}] ← DISCONNECT", self.label);
                self.stream
                    .send(&Frame::control(MessageType::Ack, frame.sequence))
                    .await?;
                self.teardown(ConnectionEvent::Closed);
                return Err(ProtocolError::ConnectionClosed);
            }
            MessageType::ChannelErrorMarker => {
                log::warn!(
                    "[{}] ← CHANNEL_ERROR_MARKER — terminating, peer must re-handshake",
                    self.label
                );
                self.teardown(ConnectionEvent::Failed {
                    reason: "channel integrity fault".into(),
                });
                return Err(ProtocolError::ChannelFault);
            }
            MessageType::Syn | MessageType::SynAck | MessageType::AckFinal => {
                log::debug!(
                    "[{}] ignoring stray {} after establishment",
                    self.label,
                    frame.message_type
                );
            }
        }
        Ok(())
    }

    /// A frame arrived but failed to decode.  Local and non-fatal: drop it,
    /// NACK the sender if it was identifiably a DATA frame, and (GBN only)
    /// repeat the cumulative ACK.
    async fn on_decode_error(&mut self, err: DecodeError) -> Result<(), ProtocolError> {
        log::debug!("[{}] dropping undecodable frame: {err}", self.label);
        if let DecodeError::ChecksumMismatch {
            type_byte,
            sequence,
        } = err
        {
            if type_byte == MessageType::Data as u8 {
                self.stream
                    .send(&Frame::control(MessageType::Nack, sequence))
                    .await?;
                if let Some(ack) = self.receiver.reack_on_corruption() {
                    self.stream.send(&Frame::control(MessageType::Ack, ack)).await?;
                }
            }
        }
        Ok(())
    }

    /// Enter `Closed`, notify the application, and release the session-table
    /// entry.  All timer state lives in this task, so nothing can fire for
    /// the session afterwards.
    fn teardown(&mut self, event: ConnectionEvent) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        if let ConnectionEvent::Failed { reason } = &event {
            log::warn!(
                "[{}] session {} failed: {reason}",
                self.label,
                self.params.session_id
            );
        }
        self.emit(event);
        self.guard = None;
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
