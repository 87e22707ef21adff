//! Broker WebSocket Adapter
//!
//! Everything that talks to the quote broker endpoint:
//!
//! - **connection**: session lifecycle, retries, auth-failure handling
//! - **status**: connection state machine and its watch channel
//! - **heartbeat**: ping/pong keepalive supervision
//! - **reconnect**: fixed-delay retry policy
//! - **codec** / **messages**: JSON wire frames

pub mod codec;
pub mod connection;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod status;

pub use codec::{BrokerFrame, CodecError, JsonCodec};
pub use connection::{
    BrokerCommand, BrokerConfig, BrokerConnection, BrokerError, BrokerEvent, DownReason,
};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use messages::{
    CLOSE_CODE_UNAUTHORIZED, ConnectedFrame, ErrorFrame, QuoteFrame, SubscribedFrame,
    SubscriptionAction, SubscriptionRequest,
};
pub use reconnect::FixedBackoff;
pub use status::{ConnectionStatus, SharedStatusCell, StatusCell};
