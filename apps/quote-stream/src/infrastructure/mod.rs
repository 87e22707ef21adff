//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations behind the application
//! layer's ports and the timing machinery the feed engine drives.

/// Broker WebSocket adapter (connection, status, heartbeat, codec).
pub mod broker;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Delivery SLA watchdog timers.
pub mod sla;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// Per-symbol update-rate throttle.
pub mod throttle;
