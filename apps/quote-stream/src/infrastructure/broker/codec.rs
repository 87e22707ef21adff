//! Broker Frame Codec
//!
//! Decodes JSON text frames from the broker WebSocket into typed frames and
//! encodes client requests. Every frame is a single JSON object carrying a
//! `type` discriminator.
//!
//! A frame that fails to decode surfaces as a `CodecError`; the connection
//! loop logs and drops it so one bad frame never takes down the session.

use serde::Serialize;

use super::messages::{ConnectedFrame, ErrorFrame, QuoteFrame, SubscribedFrame};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown frame type.
    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    /// Frame is not a JSON object with a `type` discriminator.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// A decoded frame from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerFrame {
    /// Handshake acknowledgment.
    Connected(ConnectedFrame),
    /// One quote delivery.
    Quote(QuoteFrame),
    /// Subscription confirmation.
    Subscribed(SubscribedFrame),
    /// Error from the broker.
    Error(ErrorFrame),
}

/// JSON codec for the broker stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into a `BrokerFrame`.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails, the `type` discriminator is
    /// missing, or the frame type is unknown.
    pub fn decode(&self, text: &str) -> Result<BrokerFrame, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        let Some(frame_type) = value.get("type").and_then(|v| v.as_str()) else {
            return Err(CodecError::InvalidFormat(format!(
                "missing type discriminator: {}...",
                &text[..text.len().min(50)]
            )));
        };

        match frame_type {
            "connected" => {
                let frame: ConnectedFrame = serde_json::from_value(value)?;
                Ok(BrokerFrame::Connected(frame))
            }
            "quote" => {
                let frame: QuoteFrame = serde_json::from_value(value)?;
                Ok(BrokerFrame::Quote(frame))
            }
            "subscribed" => {
                let frame: SubscribedFrame = serde_json::from_value(value)?;
                Ok(BrokerFrame::Subscribed(frame))
            }
            "error" => {
                let frame: ErrorFrame = serde_json::from_value(value)?;
                Ok(BrokerFrame::Error(frame))
            }
            other => Err(CodecError::UnknownFrameType(other.to_string())),
        }
    }

    /// Encode a client request to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::infrastructure::broker::messages::SubscriptionRequest;

    #[test]
    fn decodes_connected_frame() {
        let codec = JsonCodec::new();
        let frame = codec.decode(r#"{"type":"connected"}"#).unwrap();
        assert!(matches!(frame, BrokerFrame::Connected(_)));
    }

    #[test]
    fn decodes_quote_frame() {
        let codec = JsonCodec::new();
        let frame = codec
            .decode(
                r#"{
                    "type": "quote",
                    "topic": "quotes/INFY",
                    "payload": {
                        "symbol": "INFY",
                        "lastPrice": "1745.65",
                        "open": "1720.00",
                        "change": "25.65",
                        "changePercent": "1.49",
                        "volume": 985000,
                        "timestamp": "2026-08-07T09:15:00Z"
                    }
                }"#,
            )
            .unwrap();

        let BrokerFrame::Quote(quote) = frame else {
            panic!("expected quote frame");
        };
        assert_eq!(quote.payload.symbol, "INFY");
    }

    #[test]
    fn decodes_subscribed_frame() {
        let codec = JsonCodec::new();
        let frame = codec
            .decode(r#"{"type":"subscribed","topics":["quotes/INFY","quotes/TCS"]}"#)
            .unwrap();

        let BrokerFrame::Subscribed(subscribed) = frame else {
            panic!("expected subscribed frame");
        };
        assert_eq!(subscribed.topics.len(), 2);
    }

    #[test]
    fn decodes_error_frame() {
        let codec = JsonCodec::new();
        let frame = codec
            .decode(r#"{"type":"error","code":401,"message":"unauthorized"}"#)
            .unwrap();

        let BrokerFrame::Error(error) = frame else {
            panic!("expected error frame");
        };
        assert_eq!(error.code, 401);
        assert!(error.is_auth_error());
    }

    #[test_case("not json at all" ; "plain text")]
    #[test_case("{\"code\": 401}" ; "missing discriminator")]
    #[test_case("{\"type\":\"trade\"}" ; "unknown frame type")]
    #[test_case("{\"type\":\"quote\",\"topic\":\"quotes/INFY\"}" ; "quote without payload")]
    fn malformed_frames_error_instead_of_panicking(input: &str) {
        let codec = JsonCodec::new();
        assert!(codec.decode(input).is_err());
    }

    #[test]
    fn encodes_subscription_request() {
        let codec = JsonCodec::new();
        let json = codec
            .encode(&SubscriptionRequest::subscribe(vec![
                "quotes/INFY".to_string(),
            ]))
            .unwrap();
        assert!(json.contains("subscribe"));
    }
}
