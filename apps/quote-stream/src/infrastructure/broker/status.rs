//! Connection Status
//!
//! The connection lifecycle state machine, published on a watch channel as a
//! read-only observable for the rendering layer. Transitions are driven
//! exclusively by connection events; nothing downstream may write status.
//!
//! `Disconnected` is never terminal while the process is alive: an explicit
//! `connect()` always leads back to `Connecting`.

use std::sync::Arc;

use tokio::sync::watch;

use crate::infrastructure::metrics;

/// Lifecycle state of the broker connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connect attempt is in flight; no session has been established yet.
    #[default]
    Connecting,
    /// Handshake complete; subscriptions are live.
    Connected,
    /// The session dropped and the manager is retrying.
    Reconnecting,
    /// No transport and no retry pending; eligible for explicit connect.
    Disconnected,
}

impl ConnectionStatus {
    /// Get the status name for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Single owner of the status state machine.
///
/// Wraps the watch sender so that the connection manager is the only writer;
/// consumers hold [`watch::Receiver`]s obtained from [`StatusCell::subscribe`].
/// The watch channel serializes delivery, so no two status values are ever
/// observed "simultaneously."
#[derive(Debug)]
pub struct StatusCell {
    tx: watch::Sender<ConnectionStatus>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCell {
    /// Create a status cell in the `Connecting` state.
    ///
    /// The stream starts life connecting, mirroring a connection manager
    /// brought up at process start.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionStatus::Connecting);
        metrics::set_connection_status(ConnectionStatus::Connecting.as_str());
        Self { tx }
    }

    /// Current status.
    #[must_use]
    pub fn current(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Subscribe to status transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    /// Publish a transition. Idempotent: re-entering the current state does
    /// not wake observers.
    pub fn transition(&self, next: ConnectionStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::info!(from = current.as_str(), to = next.as_str(), "Connection status");
            *current = next;
            true
        });

        if changed {
            metrics::set_connection_status(next.as_str());
        }
    }
}

/// Shared status cell reference.
pub type SharedStatusCell = Arc<StatusCell>;
