//! Session lifecycle types and the server-side session table.
//!
//! A [`SessionEntry`] records what the responder knows about one peer: the
//! negotiated parameters and where in its lifecycle the connection stands.
//! The [`SessionTable`] maps peer identity to entries and is the **only**
//! state shared between connection tasks; everything else (windows, timers,
//! reassembly buffers) is owned by exactly one task and dies with it.
//!
//! Table operations are short and infrequent, so a plain `std::sync::Mutex`
//! guards the map.  [`SessionGuard`] ties an entry's lifetime to its owning
//! connection: dropping the guard removes the entry, which together with
//! task-local timers guarantees no timer ever fires against a destroyed
//! session.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;

use crate::handshake::ConnectionParameters;

/// Lifecycle of one connection, both roles.
///
/// Initiator walks `Idle → SynSent → Established → Closed`;
/// responder walks `Idle → SynReceived → Established → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No handshake traffic yet; initial state.
    #[default]
    Idle,
    /// SYN sent; waiting for SYN_ACK.
    SynSent,
    /// SYN received and SYN_ACK sent; waiting for ACK_FINAL.
    SynReceived,
    /// Handshake complete; data transfer permitted.
    Established,
    /// Torn down, gracefully or not.  Terminal.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// State-change feed handed to the application layer.
///
/// These three events (plus delivered messages) are everything the
/// application ever observes; retransmissions and duplicates stay internal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Established { session_id: String },
    Closed,
    Failed { reason: String },
}

/// What the responder tracks per peer.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub params: ConnectionParameters,
    pub state: ConnectionState,
}

/// Server-side mapping from peer identity to session state.
#[derive(Debug, Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a half-open session for `peer` in `SynReceived`.
    ///
    /// Replaces any stale entry for the same peer — a peer re-running the
    /// handshake abandons its previous session.
    pub fn create(&self, peer: &str, params: ConnectionParameters) {
        let mut inner = self.inner.lock().unwrap();
        inner.insert(
            peer.to_string(),
            SessionEntry {
                params,
                state: ConnectionState::SynReceived,
            },
        );
    }

    /// Snapshot of the entry for `peer`, if one exists.
    pub fn lookup(&self, peer: &str) -> Option<SessionEntry> {
        self.inner.lock().unwrap().get(peer).cloned()
    }

    /// Mark `peer`'s session `Established` once ACK_FINAL verifies.
    ///
    /// Returns `false` when no such session is pending.
    pub fn complete(&self, peer: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.get_mut(peer) {
            Some(entry) => {
                entry.state = ConnectionState::Established;
                true
            }
            None => false,
        }
    }

    /// Drop `peer`'s session.  Returns `false` when it was already gone.
    pub fn remove(&self, peer: &str) -> bool {
        self.inner.lock().unwrap().remove(peer).is_some()
    }

    /// Number of sessions currently tracked (any state).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Issue a session id unique among the active sessions.
    ///
    /// Eight hex characters, drawn at random; regenerated on the (very
    /// unlikely) collision with a live session.
    pub fn fresh_session_id(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut rng = rand::rng();
        loop {
            let candidate = format!("{:08x}", rng.random::<u32>());
            let taken = inner
                .values()
                .any(|entry| entry.params.session_id == candidate);
            if !taken {
                return candidate;
            }
        }
    }
}

/// Removes the owned table entry when dropped.
///
/// The owning connection holds one of these from `accept` onward, so the
/// entry disappears on clean close, on fatal error, and on task panic alike.
#[derive(Debug)]
pub struct SessionGuard {
    table: std::sync::Arc<SessionTable>,
    peer: String,
}

impl SessionGuard {
    pub fn new(table: std::sync::Arc<SessionTable>, peer: String) -> Self {
        Self { table, peer }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.table.remove(&self.peer) {
            log::debug!("[session] removed session for {}", self.peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::handshake::{OperationMode, ReliabilityStrategy};

    fn params(session_id: &str) -> ConnectionParameters {
        ConnectionParameters {
            operation_mode: OperationMode::Burst,
            max_packet_size: 64,
            window_size: 4,
            strategy: ReliabilityStrategy::GoBackN,
            session_id: session_id.to_string(),
        }
    }

    #[test]
    fn create_lookup_complete_remove() {
        let table = SessionTable::new();
        table.create("10.0.0.1:4000", params("abc123"));

        let entry = table.lookup("10.0.0.1:4000").unwrap();
        assert_eq!(entry.state, ConnectionState::SynReceived);
        assert_eq!(entry.params.session_id, "abc123");

        assert!(table.complete("10.0.0.1:4000"));
        assert_eq!(
            table.lookup("10.0.0.1:4000").unwrap().state,
            ConnectionState::Established
        );

        assert!(table.remove("10.0.0.1:4000"));
        assert!(table.lookup("10.0.0.1:4000").is_none());
        assert!(!table.remove("10.0.0.1:4000"));
    }

    #[test]
    fn complete_unknown_peer_fails() {
        let table = SessionTable::new();
        assert!(!table.complete("nobody"));
    }

    #[test]
    fn sessions_are_independent() {
        let table = SessionTable::new();
        table.create("a", params("id-a"));
        table.create("b", params("id-b"));
        assert_eq!(table.len(), 2);
        table.remove("a");
        assert!(table.lookup("b").is_some());
    }

    #[test]
    fn renewed_handshake_replaces_stale_entry() {
        let table = SessionTable::new();
        table.create("a", params("old"));
        table.complete("a");
        table.create("a", params("new"));
        let entry = table.lookup("a").unwrap();
        assert_eq!(entry.params.session_id, "new");
        assert_eq!(entry.state, ConnectionState::SynReceived);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn fresh_session_id_avoids_active_ids() {
        let table = SessionTable::new();
        let id = table.fresh_session_id();
        assert_eq!(id.len(), 8);
        table.create("a", params(&id));
        let other = table.fresh_session_id();
        assert_ne!(id, other);
    }

    #[test]
    fn guard_removes_entry_on_drop() {
        let table = Arc::new(SessionTable::new());
        table.create("a", params("abc"));
        {
            let _guard = SessionGuard::new(table.clone(), "a".to_string());
            assert!(table.lookup("a").is_some());
        }
        assert!(table.lookup("a").is_none());
    }
}
