//! Delivery SLA Monitor
//!
//! Watches for the first quote after a symbol is newly watched and flags a
//! breach if none arrives within the fixed delivery window. The breach is
//! advisory only: it never blocks, retries, or alters subscription state.
//!
//! The monitor is stateless across symbol removal: removing and re-adding a
//! symbol restarts its timer from zero.

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::time::delay_queue::{self, DelayQueue};

use crate::domain::quote::Symbol;

/// Advisory signal that a newly watched symbol produced no quote in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaBreach {
    /// The symbol that missed its delivery window.
    pub symbol: Symbol,
    /// The window that elapsed without a quote.
    pub window: Duration,
}

/// First-quote delivery watchdog with one timer per newly watched symbol.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use quote_stream::infrastructure::sla::SlaMonitor;
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let _guard = rt.enter();
///
/// let mut monitor = SlaMonitor::new(Duration::from_secs(2));
/// monitor.arm("INFY".to_string());
///
/// // First quote arrived in time: the timer is cancelled silently.
/// assert!(monitor.fulfill("INFY"));
/// assert!(!monitor.fulfill("INFY"));
/// ```
#[derive(Debug)]
pub struct SlaMonitor {
    window: Duration,
    timers: HashMap<Symbol, delay_queue::Key>,
    deadlines: DelayQueue<Symbol>,
}

impl SlaMonitor {
    /// Create a monitor with the given delivery window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timers: HashMap::new(),
            deadlines: DelayQueue::new(),
        }
    }

    /// Start (or restart) the delivery timer for a newly watched symbol.
    pub fn arm(&mut self, symbol: Symbol) {
        if let Some(timer) = self.timers.remove(&symbol) {
            let _ = self.deadlines.remove(&timer);
        }
        let timer = self.deadlines.insert(symbol.clone(), self.window);
        self.timers.insert(symbol, timer);
    }

    /// Cancel the timer on first quote arrival.
    ///
    /// Silent: no signal is emitted. Returns whether a timer was pending.
    pub fn fulfill(&mut self, symbol: &str) -> bool {
        match self.timers.remove(symbol) {
            Some(timer) => {
                let _ = self.deadlines.remove(&timer);
                true
            }
            None => false,
        }
    }

    /// Drop the timer for a symbol leaving the desired set.
    pub fn disarm(&mut self, symbol: &str) {
        let _ = self.fulfill(symbol);
    }

    /// Drop every pending timer.
    pub fn clear(&mut self) {
        self.deadlines.clear();
        self.timers.clear();
    }

    /// Whether any timer is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Await the next missed delivery window.
    ///
    /// Returns `None` when no timers are pending; guard the call accordingly
    /// in `select!` loops. Each armed symbol emits at most one breach.
    pub async fn next_breach(&mut self) -> Option<SlaBreach> {
        let expired = std::future::poll_fn(|cx| self.deadlines.poll_expired(cx)).await?;
        let symbol = expired.into_inner();
        self.timers.remove(&symbol);

        Some(SlaBreach {
            symbol,
            window: self.window,
        })
    }
}
