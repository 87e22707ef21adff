//! Quote Value Types
//!
//! The canonical internal representation of a single price snapshot for one
//! instrument. One `Quote` is produced per (symbol, tick) by the broker and
//! is immutable once decoded.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {
//!   "symbol": "INFY",
//!   "lastPrice": 1745.65,
//!   "open": 1720.00,
//!   "change": 25.65,
//!   "changePercent": 1.49,
//!   "volume": 985000,
//!   "timestamp": "2026-08-07T09:15:00Z",
//!   "marketStatus": "OPEN"
//! }
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A symbol string uniquely identifying an instrument.
pub type Symbol = String;

/// Trading status of the market for a symbol.
///
/// Absent on the wire means the market is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    /// Normal continuous trading.
    #[default]
    Open,
    /// Trading temporarily halted.
    Paused,
    /// Market closed for a holiday.
    Holiday,
}

/// One timestamped price/volume snapshot for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Instrument identifier; the subscription and cache key.
    pub symbol: Symbol,

    /// Last traded price.
    pub last_price: Decimal,

    /// Opening price of the session.
    pub open: Decimal,

    /// Absolute change versus the previous close.
    pub change: Decimal,

    /// Percentage change versus the previous close.
    pub change_percent: Decimal,

    /// Cumulative traded volume.
    pub volume: u64,

    /// Exchange timestamp of the tick.
    pub timestamp: DateTime<Utc>,

    /// Market status; omitted on the wire when the market is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_status: Option<MarketStatus>,
}

impl Quote {
    /// Effective market status, defaulting to open when absent.
    #[must_use]
    pub fn market_status(&self) -> MarketStatus {
        self.market_status.unwrap_or_default()
    }
}
