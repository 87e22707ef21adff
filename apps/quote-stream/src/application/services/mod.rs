//! Application Services
//!
//! The feed engine (delivery pipeline and connection lifecycle owner) and
//! the market stream facade handed to consumers.

mod feed;
mod stream;

pub use feed::{FeedCommand, FeedEngine, WatchSelection};
pub use stream::MarketStream;
