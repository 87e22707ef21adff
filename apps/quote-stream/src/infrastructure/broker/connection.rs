//! Broker Connection Manager
//!
//! Owns one authenticated, heart-beating, auto-reconnecting WebSocket
//! session to the quote broker. Commands arrive on an mpsc channel, events
//! leave on another, and status transitions are published through the shared
//! [`StatusCell`]; nothing else touches the socket.
//!
//! # Failure Semantics
//!
//! - Transport failures (socket error, heartbeat timeout, broker protocol
//!   error) retry indefinitely on a fixed delay.
//! - Authentication failures (handshake 401/403, auth-coded error frame, or
//!   the 4401 close code) tear the socket down completely and schedule
//!   exactly one fresh attempt after the auth retry delay. The rejected
//!   credential cannot be reused on the same transport object, and the
//!   credential is re-read from the provider on every attempt, so an
//!   out-of-band refresh is picked up by the retry.
//! - Clean close and `Shutdown` end the session task; reconnection then
//!   requires an explicit connect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;

use super::codec::{BrokerFrame, JsonCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::messages::{CLOSE_CODE_UNAUTHORIZED, QuoteFrame, SubscriptionRequest};
use super::reconnect::FixedBackoff;
use super::status::{ConnectionStatus, SharedStatusCell};
use crate::application::ports::TokenProvider;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the broker connection.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The broker rejected the presented credential.
    #[error("credential rejected: {0}")]
    AuthRejected(String),

    /// The credential provider could not supply a token.
    #[error("credential unavailable: {0}")]
    Credential(String),

    /// The broker reported a protocol-level error.
    #[error("broker error ({code}): {message}")]
    Protocol {
        /// Error code from the broker.
        code: i32,
        /// Error message from the broker.
        message: String,
    },

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,
}

impl BrokerError {
    /// Whether this failure means the credential itself was rejected.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthRejected(_))
    }
}

// =============================================================================
// Commands and Events
// =============================================================================

/// Commands accepted by the connection task.
///
/// Ordering on the command channel is the teardown guarantee: unsubscribe
/// requests queued ahead of `Shutdown` are flushed to the socket before the
/// transport is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCommand {
    /// Open subscriptions on the listed topics.
    Subscribe {
        /// Topics to open.
        topics: Vec<String>,
    },
    /// Close subscriptions on the listed topics.
    Unsubscribe {
        /// Topics to close.
        topics: Vec<String>,
    },
    /// Close the session and end the connection task.
    Shutdown,
}

/// Why a session went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownReason {
    /// Clean close or explicit shutdown.
    Clean,
    /// Transport-level failure; the manager is retrying.
    Transport,
    /// Credential rejected; one delayed fresh attempt is pending.
    Auth,
}

impl DownReason {
    /// Get the reason name for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Transport => "transport",
            Self::Auth => "auth",
        }
    }
}

/// Events emitted by the connection task.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// Session established and acknowledged; subscriptions must be rebuilt
    /// from the desired set (they do not survive the previous socket).
    Up,
    /// Session ended; the live subscription set is gone with the socket.
    Down {
        /// Why the session ended.
        reason: DownReason,
    },
    /// One quote delivery on a subscribed topic.
    Quote(QuoteFrame),
    /// Subscription confirmation from the broker.
    Subscribed {
        /// Active topics on this connection.
        topics: Vec<String>,
    },
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the broker connection.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// WebSocket URL of the broker endpoint.
    pub url: String,
    /// Heartbeat configuration (10 s each way).
    pub heartbeat: HeartbeatConfig,
    /// Fixed delay between transport-failure retries.
    pub reconnect_delay: Duration,
    /// Delay before the single fresh attempt after an auth failure.
    pub auth_retry_delay: Duration,
}

impl BrokerConfig {
    /// Create a configuration for the given endpoint with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat: HeartbeatConfig::default(),
            reconnect_delay: Duration::from_secs(1),
            auth_retry_delay: Duration::from_millis(1000),
        }
    }
}

// =============================================================================
// Connection Task
// =============================================================================

/// How one socket session ended without an error.
enum SessionEnd {
    /// `Shutdown` command or cancellation.
    Shutdown,
    /// The broker closed the connection cleanly.
    CleanClose,
}

/// Broker WebSocket connection task.
///
/// Spawned once per session by the feed engine; runs until shutdown, clean
/// close, or cancellation.
pub struct BrokerConnection {
    config: BrokerConfig,
    tokens: Arc<dyn TokenProvider>,
    codec: JsonCodec,
    events: mpsc::Sender<BrokerEvent>,
    commands: mpsc::Receiver<BrokerCommand>,
    status: SharedStatusCell,
    cancel: CancellationToken,
}

impl BrokerConnection {
    /// Create a new connection task.
    #[must_use]
    pub fn new(
        config: BrokerConfig,
        tokens: Arc<dyn TokenProvider>,
        events: mpsc::Sender<BrokerEvent>,
        commands: mpsc::Receiver<BrokerCommand>,
        status: SharedStatusCell,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            tokens,
            codec: JsonCodec::new(),
            events,
            commands,
            status,
            cancel,
        }
    }

    /// Run the connection loop: connect, process, retry.
    ///
    /// Returns when the session is shut down, the broker closes cleanly, or
    /// the task is cancelled. Transport failures never escape this loop.
    pub async fn run(mut self) {
        let mut backoff = FixedBackoff::new(self.config.reconnect_delay);

        loop {
            if self.cancel.is_cancelled() {
                self.status.transition(ConnectionStatus::Disconnected);
                return;
            }

            match self.connect_and_run(&mut backoff).await {
                Ok(SessionEnd::Shutdown) => {
                    tracing::info!("Broker session shut down");
                    self.finish(DownReason::Clean).await;
                    return;
                }
                Ok(SessionEnd::CleanClose) => {
                    tracing::info!("Broker closed the connection cleanly");
                    self.finish(DownReason::Clean).await;
                    return;
                }
                Err(e) if e.is_auth_failure() => {
                    // The socket is already gone; a rejected credential must
                    // not be re-presented on the same transport object.
                    tracing::warn!(error = %e, "Credential rejected, scheduling one delayed reconnect");
                    metrics::record_reconnect(DownReason::Auth.as_str());
                    let _ = self.events.send(BrokerEvent::Down { reason: DownReason::Auth }).await;
                    self.status.transition(ConnectionStatus::Reconnecting);

                    if self.wait_or_shutdown(self.config.auth_retry_delay).await {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Broker connection error");
                    metrics::record_reconnect(DownReason::Transport.as_str());
                    let _ = self
                        .events
                        .send(BrokerEvent::Down { reason: DownReason::Transport })
                        .await;
                    self.status.transition(ConnectionStatus::Reconnecting);

                    let delay = backoff.next_delay();
                    tracing::info!(
                        attempt = backoff.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to quote broker"
                    );
                    if self.wait_or_shutdown(delay).await {
                        return;
                    }
                }
            }
        }
    }

    /// Sleep through a retry delay while honoring cancellation and shutdown.
    ///
    /// Stale subscription commands arriving while down are discarded; they
    /// are only meaningful for a live socket, and the feed engine rebuilds
    /// the set from scratch on the next `Up`. Returns `true` if the task
    /// should exit.
    async fn wait_or_shutdown(&mut self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.status.transition(ConnectionStatus::Disconnected);
                    let _ = self.events.send(BrokerEvent::Down { reason: DownReason::Clean }).await;
                    return true;
                }
                () = tokio::time::sleep_until(deadline) => return false,
                command = self.commands.recv() => match command {
                    Some(BrokerCommand::Shutdown) | None => {
                        self.status.transition(ConnectionStatus::Disconnected);
                        let _ = self.events.send(BrokerEvent::Down { reason: DownReason::Clean }).await;
                        return true;
                    }
                    Some(other) => {
                        tracing::debug!(?other, "Dropping subscription command while disconnected");
                    }
                },
            }
        }
    }

    /// Publish the terminal status and `Down` event for an ended session.
    async fn finish(&self, reason: DownReason) {
        self.status.transition(ConnectionStatus::Disconnected);
        let _ = self.events.send(BrokerEvent::Down { reason }).await;
    }

    /// Connect one socket session and run it until it ends.
    async fn connect_and_run(
        &mut self,
        backoff: &mut FixedBackoff,
    ) -> Result<SessionEnd, BrokerError> {
        // The credential is read fresh on every attempt, never cached here.
        let token = self
            .tokens
            .bearer_token()
            .await
            .map_err(|e| BrokerError::Credential(e.to_string()))?;

        let mut request = self.config.url.as_str().into_client_request()?;
        let bearer = format!("Bearer {token}")
            .parse()
            .map_err(|_| BrokerError::ConnectionFailed("bearer token is not a valid header value".to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        tracing::info!(url = %self.config.url, "Connecting to quote broker");

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(ok) => ok,
            Err(tokio_tungstenite::tungstenite::Error::Http(response))
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                return Err(BrokerError::AuthRejected(format!(
                    "handshake rejected with {}",
                    response.status()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let (mut write, mut read) = ws_stream.split();

        // Set up heartbeat
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = CancellationToken::new();
        let heartbeat_manager = HeartbeatManager::new(
            self.config.heartbeat.clone(),
            heartbeat_state.clone(),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        let _heartbeat_handle = tokio::spawn(heartbeat_manager.run());

        // Process the session
        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break Ok(SessionEnd::Shutdown);
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::SendPing) => {
                            heartbeat_state.mark_ping_sent();
                            if let Err(e) = write.send(Message::Ping(vec![].into())).await {
                                break Err(e.into());
                            }
                        }
                        Some(HeartbeatEvent::Timeout) => {
                            tracing::warn!("Heartbeat timeout");
                            break Err(BrokerError::ConnectionClosed);
                        }
                        None => {
                            tracing::debug!("Heartbeat channel closed");
                        }
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(BrokerCommand::Subscribe { topics }) => {
                            if let Err(e) = self.send_subscription(
                                &mut write,
                                SubscriptionRequest::subscribe(topics),
                            ).await {
                                break Err(e);
                            }
                        }
                        Some(BrokerCommand::Unsubscribe { topics }) => {
                            if let Err(e) = self.send_subscription(
                                &mut write,
                                SubscriptionRequest::unsubscribe(topics),
                            ).await {
                                break Err(e);
                            }
                        }
                        Some(BrokerCommand::Shutdown) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break Ok(SessionEnd::Shutdown);
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat_state.record_pong();
                            if let Err(e) = self.handle_text_frame(&text, backoff).await {
                                break Err(e);
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_pong();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat_state.record_pong();
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let unauthorized = frame
                                .as_ref()
                                .is_some_and(|f| u16::from(f.code) == CLOSE_CODE_UNAUTHORIZED);
                            if unauthorized {
                                break Err(BrokerError::AuthRejected(
                                    "broker closed the session with the unauthorized code"
                                        .to_string(),
                                ));
                            }
                            tracing::info!("Broker sent close frame");
                            break Ok(SessionEnd::CleanClose);
                        }
                        Some(Ok(_)) => {
                            // Ignore other message types
                        }
                        Some(Err(e)) => break Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            break Err(BrokerError::ConnectionClosed);
                        }
                    }
                }
            }
        };

        heartbeat_cancel.cancel();
        result
    }

    /// Handle a decoded text frame.
    ///
    /// Malformed frames are logged and dropped here; one bad frame must not
    /// take down the session.
    async fn handle_text_frame(
        &self,
        text: &str,
        backoff: &mut FixedBackoff,
    ) -> Result<(), BrokerError> {
        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_malformed_frame();
                tracing::warn!(error = %e, "Dropping malformed broker frame");
                return Ok(());
            }
        };

        match frame {
            BrokerFrame::Connected(_) => {
                tracing::info!("Quote broker session acknowledged");
                backoff.reset();
                self.status.transition(ConnectionStatus::Connected);
                let _ = self.events.send(BrokerEvent::Up).await;
            }
            BrokerFrame::Quote(quote) => {
                metrics::record_quote_received();
                let _ = self.events.send(BrokerEvent::Quote(quote)).await;
            }
            BrokerFrame::Subscribed(subscribed) => {
                tracing::debug!(topics = subscribed.topics.len(), "Subscriptions confirmed");
                metrics::set_active_subscriptions(subscribed.topics.len() as f64);
                let _ = self
                    .events
                    .send(BrokerEvent::Subscribed { topics: subscribed.topics })
                    .await;
            }
            BrokerFrame::Error(error) => {
                tracing::error!(code = error.code, message = %error.message, "Broker error");
                if error.is_auth_error() {
                    return Err(BrokerError::AuthRejected(error.message));
                }
                return Err(BrokerError::Protocol {
                    code: error.code,
                    message: error.message,
                });
            }
        }

        Ok(())
    }

    /// Send a subscription change request.
    async fn send_subscription<W>(
        &self,
        write: &mut W,
        request: SubscriptionRequest,
    ) -> Result<(), BrokerError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let json = self
            .codec
            .encode(&request)
            .map_err(|e| BrokerError::ConnectionFailed(format!("failed to serialize request: {e}")))?;

        tracing::debug!(action = ?request.action, topics = request.topics.len(), "Sending subscription request");

        write.send(Message::Text(json.into())).await.map_err(|e| {
            BrokerError::ConnectionFailed(format!("failed to send subscription request: {e}"))
        })?;

        Ok(())
    }
}
