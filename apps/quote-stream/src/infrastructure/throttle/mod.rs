//! Per-Key Update Throttle
//!
//! Caps the rate at which any single key's updates propagate downstream
//! while guaranteeing the first value is delivered immediately and the most
//! recent value is eventually delivered.
//!
//! Each key has an independent window: a burst on one symbol cannot delay
//! delivery for another. Values are dropped inside a window, never
//! reordered; the value forwarded at window close is always the most recent
//! seen.
//!
//! Windows must be disposed when their key leaves the owning context and
//! wholesale on teardown, so no trailing flush fires after unmount or
//! disconnect.

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::time::delay_queue::{self, DelayQueue};

use crate::domain::quote::Symbol;

/// Outcome of offering a value to the throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer<V> {
    /// The key was idle: forward this value now (leading edge).
    Forward(V),
    /// A window is open: the value was retained for the trailing edge.
    Retained,
}

#[derive(Debug)]
struct Window<V> {
    timer: delay_queue::Key,
    pending: Option<V>,
}

/// Leading+trailing-edge throttle with one isolated window per key.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use quote_stream::infrastructure::throttle::{KeyedThrottle, Offer};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let _guard = rt.enter();
///
/// let mut throttle: KeyedThrottle<u64> = KeyedThrottle::new(Duration::from_millis(200));
///
/// // First value for an idle key is forwarded immediately.
/// assert_eq!(throttle.offer("INFY".to_string(), 1), Offer::Forward(1));
/// // Values inside the window are retained for the trailing edge.
/// assert_eq!(throttle.offer("INFY".to_string(), 2), Offer::Retained);
/// ```
#[derive(Debug)]
pub struct KeyedThrottle<V> {
    interval: Duration,
    windows: HashMap<Symbol, Window<V>>,
    timers: DelayQueue<Symbol>,
}

impl<V> KeyedThrottle<V> {
    /// Create a throttle with the given window interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            windows: HashMap::new(),
            timers: DelayQueue::new(),
        }
    }

    /// Offer a value for a key.
    ///
    /// For an idle key the value is handed back for immediate forwarding
    /// and a window opens; inside a window the value replaces any pending
    /// one and waits for the trailing edge.
    pub fn offer(&mut self, key: Symbol, value: V) -> Offer<V> {
        if let Some(window) = self.windows.get_mut(&key) {
            window.pending = Some(value);
            return Offer::Retained;
        }

        let timer = self.timers.insert(key.clone(), self.interval);
        self.windows.insert(
            key,
            Window {
                timer,
                pending: None,
            },
        );
        Offer::Forward(value)
    }

    /// Await the next window close.
    ///
    /// Yields `(key, Some(value))` when a newer value arrived during the
    /// window: the caller forwards it and a fresh window has already been
    /// opened. Yields `(key, None)` when the window closed idle. Returns
    /// `None` when no windows are open; guard the call accordingly in
    /// `select!` loops.
    pub async fn next_flush(&mut self) -> Option<(Symbol, Option<V>)> {
        let expired = std::future::poll_fn(|cx| self.timers.poll_expired(cx)).await?;
        let key = expired.into_inner();

        let Some(window) = self.windows.remove(&key) else {
            return Some((key, None));
        };

        match window.pending {
            Some(value) => {
                // Trailing edge delivered: re-open a fresh window so the
                // per-key rate stays capped.
                let timer = self.timers.insert(key.clone(), self.interval);
                self.windows.insert(
                    key.clone(),
                    Window {
                        timer,
                        pending: None,
                    },
                );
                Some((key, Some(value)))
            }
            None => Some((key, None)),
        }
    }

    /// Dispose one key's window and any pending trailing value.
    pub fn dispose(&mut self, key: &str) {
        if let Some(window) = self.windows.remove(key) {
            let _ = self.timers.remove(&window.timer);
        }
    }

    /// Dispose every window and pending value.
    pub fn clear(&mut self) {
        self.timers.clear();
        self.windows.clear();
    }

    /// Whether any window is currently open.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.windows.is_empty()
    }

    /// Number of open windows.
    #[must_use]
    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{Instant, advance};

    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn first_value_forwards_immediately() {
        let mut throttle: KeyedThrottle<u32> = KeyedThrottle::new(WINDOW);
        assert_eq!(throttle.offer("INFY".to_string(), 1), Offer::Forward(1));
        assert!(!throttle.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn leading_and_trailing_edges() {
        let mut throttle: KeyedThrottle<u32> = KeyedThrottle::new(WINDOW);
        let started = Instant::now();

        assert_eq!(throttle.offer("INFY".to_string(), 1), Offer::Forward(1));

        advance(Duration::from_millis(50)).await;
        assert_eq!(throttle.offer("INFY".to_string(), 2), Offer::Retained);

        // First window closes at t=100ms with v2 pending; v2 is superseded
        // by v3 only after the second window opens, so flush order is
        // v2 @ 100ms then v3 @ 200ms.
        let (key, value) = throttle.next_flush().await.unwrap();
        assert_eq!(key, "INFY");
        assert_eq!(value, Some(2));
        assert_eq!(started.elapsed(), Duration::from_millis(100));

        throttle.offer("INFY".to_string(), 3);
        let (_, value) = throttle.next_flush().await.unwrap();
        assert_eq!(value, Some(3));
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn intermediate_values_are_dropped_never_reordered() {
        let mut throttle: KeyedThrottle<u32> = KeyedThrottle::new(WINDOW);

        assert_eq!(throttle.offer("INFY".to_string(), 1), Offer::Forward(1));
        assert_eq!(throttle.offer("INFY".to_string(), 2), Offer::Retained);
        assert_eq!(throttle.offer("INFY".to_string(), 3), Offer::Retained);
        assert_eq!(throttle.offer("INFY".to_string(), 4), Offer::Retained);

        // Only the most recent value survives the window.
        let (_, value) = throttle.next_flush().await.unwrap();
        assert_eq!(value, Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_window_closes_silently_and_key_becomes_idle() {
        let mut throttle: KeyedThrottle<u32> = KeyedThrottle::new(WINDOW);

        throttle.offer("INFY".to_string(), 1);

        let (key, value) = throttle.next_flush().await.unwrap();
        assert_eq!(key, "INFY");
        assert_eq!(value, None);
        assert!(throttle.is_idle());

        // Next value forwards immediately again (leading edge).
        assert_eq!(throttle.offer("INFY".to_string(), 2), Offer::Forward(2));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_isolated() {
        let mut throttle: KeyedThrottle<u32> = KeyedThrottle::new(WINDOW);

        assert_eq!(throttle.offer("INFY".to_string(), 1), Offer::Forward(1));
        assert_eq!(throttle.offer("INFY".to_string(), 2), Offer::Retained);

        // A burst on INFY does not delay RELIANCE's leading edge.
        assert_eq!(throttle.offer("RELIANCE".to_string(), 10), Offer::Forward(10));
        assert_eq!(throttle.open_windows(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_pending_trailing_flush() {
        let mut throttle: KeyedThrottle<u32> = KeyedThrottle::new(WINDOW);

        throttle.offer("INFY".to_string(), 1);
        throttle.offer("INFY".to_string(), 2);
        throttle.offer("RELIANCE".to_string(), 10);

        throttle.dispose("INFY");

        // Only RELIANCE's idle window remains; INFY's pending v2 never fires.
        let (key, value) = throttle.next_flush().await.unwrap();
        assert_eq!(key, "RELIANCE");
        assert_eq!(value, None);
        assert!(throttle.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_everything() {
        let mut throttle: KeyedThrottle<u32> = KeyedThrottle::new(WINDOW);

        throttle.offer("INFY".to_string(), 1);
        throttle.offer("INFY".to_string(), 2);
        throttle.offer("RELIANCE".to_string(), 10);

        throttle.clear();

        assert!(throttle.is_idle());
        assert!(throttle.next_flush().await.is_none());
    }
}
