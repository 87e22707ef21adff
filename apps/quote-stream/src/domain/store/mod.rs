//! Quote Store
//!
//! The single source of truth for "what is the latest known quote, and when
//! did we last hear about it, for each watched symbol."
//!
//! Both maps live behind one lock: every key present in the freshness map
//! has a corresponding entry in the quote map and vice versa, in every
//! observable state.
//!
//! Writes come exclusively from the feed engine; everything else holds a
//! read-only view by convention.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::quote::{Quote, Symbol};

#[derive(Debug, Default)]
struct StoreInner {
    quotes: HashMap<Symbol, Quote>,
    freshness: HashMap<Symbol, DateTime<Utc>>,
}

/// Keyed cache of the latest quote per symbol plus last-update timestamps.
///
/// # Example
///
/// ```rust
/// use quote_stream::domain::store::QuoteStore;
///
/// let store = QuoteStore::new();
/// assert!(store.is_empty());
/// assert!(store.get("INFY").is_none());
/// ```
#[derive(Debug, Default)]
pub struct QuoteStore {
    inner: RwLock<StoreInner>,
}

impl QuoteStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the latest quote for its symbol and stamp the freshness map.
    ///
    /// Pure overwrite; no merging of partial fields.
    pub fn update(&self, quote: Quote) {
        let mut inner = self.inner.write();
        let now = Utc::now();
        inner.freshness.insert(quote.symbol.clone(), now);
        inner.quotes.insert(quote.symbol.clone(), quote);
    }

    /// Drop one symbol from both maps.
    pub fn remove(&self, symbol: &str) {
        let mut inner = self.inner.write();
        inner.quotes.remove(symbol);
        inner.freshness.remove(symbol);
    }

    /// Empty both maps.
    ///
    /// Invoked when the active watch-context changes so stale quotes from a
    /// previously selected group never leak into a newly selected one.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.quotes.clear();
        inner.freshness.clear();
    }

    /// Latest quote for a symbol, if any.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.inner.read().quotes.get(symbol).cloned()
    }

    /// Wall-clock time the store last heard about a symbol.
    #[must_use]
    pub fn last_update(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.inner.read().freshness.get(symbol).copied()
    }

    /// All cached quotes, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Quote> {
        self.inner.read().quotes.values().cloned().collect()
    }

    /// Symbols currently cached, in no particular order.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.inner.read().quotes.keys().cloned().collect()
    }

    /// Number of cached symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().quotes.len()
    }

    /// Whether the store holds no quotes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().quotes.is_empty()
    }

    /// Check the two-maps-in-lockstep invariant.
    ///
    /// Exposed for tests and debug assertions; always true in practice since
    /// both maps are mutated under the same lock.
    #[must_use]
    pub fn maps_consistent(&self) -> bool {
        let inner = self.inner.read();
        inner.quotes.len() == inner.freshness.len()
            && inner.quotes.keys().all(|k| inner.freshness.contains_key(k))
    }
}
