//! Configuration Module
//!
//! Configuration loading for the stream client.

mod settings;

pub use settings::{ConfigError, DeliverySettings, StreamConfig, TransportSettings};
