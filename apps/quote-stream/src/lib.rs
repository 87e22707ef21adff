#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Quote Stream - Market Data Subscription Client
//!
//! A long-lived client that maintains a single WebSocket connection to a
//! quote broker and multiplexes per-symbol subscriptions into a throttled,
//! freshness-tracked quote cache with first-delivery SLA monitoring.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core quote types and pure logic
//!   - `quote`: Quote value types
//!   - `store`: Keyed cache with freshness tracking
//!   - `subscription`: Desired-vs-live set diffing, topic mapping
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Credential and watchlist provider interfaces
//!   - `services`: Feed engine and the market stream facade
//!
//! - **Infrastructure**: Adapters and timing machinery
//!   - `broker`: WebSocket connection, status machine, heartbeat, codec
//!   - `throttle`: Per-symbol update-rate limiter
//!   - `sla`: First-quote delivery watchdog
//!   - `config`: Environment configuration
//!   - `metrics` / `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! Broker WS ──► Connection ──► Feed Engine ──► Throttle ──► Quote Store ──► UI reads
//!                  │                │                            ▲
//!                  └── status watch └── SLA monitor ── breaches ─┘ (advisory)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core quote types with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and timing machinery.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{MarketStatus, Quote, Symbol};
pub use domain::store::QuoteStore;
pub use domain::subscription::{SubscriptionChanges, diff, quote_topic, symbol_from_topic};

// Application surface
pub use application::ports::{
    EnvTokenProvider, ProviderError, StaticWatchlistProvider, TokenProvider, WatchlistProvider,
};
pub use application::services::{FeedEngine, MarketStream, WatchSelection};

// Broker connection (for integration tests)
pub use infrastructure::broker::{
    BrokerCommand, BrokerConfig, BrokerError, BrokerEvent, ConnectionStatus, StatusCell,
};

// Configuration
pub use infrastructure::config::{ConfigError, DeliverySettings, StreamConfig, TransportSettings};

// Delivery machinery
pub use infrastructure::sla::{SlaBreach, SlaMonitor};
pub use infrastructure::throttle::{KeyedThrottle, Offer};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
