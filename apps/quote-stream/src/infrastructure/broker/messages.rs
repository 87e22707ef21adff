//! Broker Wire Message Types
//!
//! Frame types for the JSON protocol spoken over the broker WebSocket.
//!
//! # Server → Client
//!
//! - `{"type":"connected"}`: handshake acknowledgment
//! - `{"type":"quote","topic":"quotes/INFY","payload":{...}}`: one tick
//! - `{"type":"subscribed","topics":["quotes/INFY"]}`: confirmation
//! - `{"type":"error","code":401,"message":"unauthorized"}`: error
//!
//! # Client → Server
//!
//! - `{"action":"subscribe","topics":["quotes/INFY"]}`
//! - `{"action":"unsubscribe","topics":["quotes/INFY"]}`

use serde::{Deserialize, Serialize};

use crate::domain::quote::Quote;

// =============================================================================
// Server Frames
// =============================================================================

/// Handshake acknowledgment sent by the broker once the connection is
/// accepted and the credential validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedFrame {
    /// Frame type (always "connected").
    #[serde(rename = "type")]
    pub frame_type: String,
}

/// One quote delivery on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteFrame {
    /// Frame type (always "quote").
    #[serde(rename = "type")]
    pub frame_type: String,

    /// Topic the quote was published on, `quotes/{SYMBOL}`.
    pub topic: String,

    /// The quote payload.
    pub payload: Quote,
}

/// Confirmation of the currently active topics after a subscription change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedFrame {
    /// Frame type (always "subscribed").
    #[serde(rename = "type")]
    pub frame_type: String,

    /// Active topics on this connection.
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Error frame with code and description.
///
/// # Error Codes
/// - 400: Invalid request
/// - 401: Unauthorized (missing or rejected credential)
/// - 403: Forbidden (credential valid but not entitled)
/// - 429: Subscription limit exceeded
/// - 500: Internal broker error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Frame type (always "error").
    #[serde(rename = "type")]
    pub frame_type: String,

    /// Error code.
    pub code: i32,

    /// Error message.
    pub message: String,
}

impl ErrorFrame {
    /// Check if this error means the presented credential was rejected.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self.code, 401 | 403)
    }
}

/// WebSocket close code the broker uses to reject a stale credential
/// mid-session.
pub const CLOSE_CODE_UNAUTHORIZED: u16 = 4401;

// =============================================================================
// Client Frames
// =============================================================================

/// Direction of a subscription change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    /// Open subscriptions on the listed topics.
    Subscribe,
    /// Close subscriptions on the listed topics.
    Unsubscribe,
}

/// Subscription change request sent to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Whether to open or close the listed topics.
    pub action: SubscriptionAction,

    /// Topics affected, `quotes/{SYMBOL}` each.
    pub topics: Vec<String>,
}

impl SubscriptionRequest {
    /// Build a subscribe request.
    #[must_use]
    pub const fn subscribe(topics: Vec<String>) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            topics,
        }
    }

    /// Build an unsubscribe request.
    #[must_use]
    pub const fn unsubscribe(topics: Vec<String>) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            topics,
        }
    }
}
