//! Subscription Diffing and Topic Mapping
//!
//! Pure set arithmetic for the subscription multiplexer: given the desired
//! symbol set and the currently live set, compute the minimal subscribe and
//! unsubscribe operations. Symbols present in both sets generate neither.
//!
//! The live set is derived state: it is reset to empty whenever the
//! transport drops and rebuilt from the desired set on the next connected
//! transition, so the diff is always computed against what the current
//! socket actually knows.

use std::collections::HashSet;

use crate::domain::quote::Symbol;

/// Prefix for per-symbol wire topics.
const TOPIC_PREFIX: &str = "quotes/";

/// Wire topic carrying quotes for one symbol.
#[must_use]
pub fn quote_topic(symbol: &str) -> String {
    format!("{TOPIC_PREFIX}{symbol}")
}

/// Symbol addressed by a quote topic, if the topic has the expected shape.
#[must_use]
pub fn symbol_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TOPIC_PREFIX)
        .filter(|symbol| !symbol.is_empty())
}

/// Changes to the live subscription set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols to subscribe to.
    pub subscribe: HashSet<Symbol>,
    /// Symbols to unsubscribe from.
    pub unsubscribe: HashSet<Symbol>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Topics to subscribe to, one per symbol.
    #[must_use]
    pub fn subscribe_topics(&self) -> Vec<String> {
        self.subscribe.iter().map(|s| quote_topic(s)).collect()
    }

    /// Topics to unsubscribe from, one per symbol.
    #[must_use]
    pub fn unsubscribe_topics(&self) -> Vec<String> {
        self.unsubscribe.iter().map(|s| quote_topic(s)).collect()
    }
}

/// Minimal operations taking `live` to `desired`.
///
/// `subscribe = desired − live`, `unsubscribe = live − desired`. An empty
/// desired set is a valid input meaning "unsubscribe everything."
#[must_use]
pub fn diff(desired: &HashSet<Symbol>, live: &HashSet<Symbol>) -> SubscriptionChanges {
    SubscriptionChanges {
        subscribe: desired.difference(live).cloned().collect(),
        unsubscribe: live.difference(desired).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn set(symbols: &[&str]) -> HashSet<Symbol> {
        symbols.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn topic_round_trip() {
        assert_eq!(quote_topic("INFY"), "quotes/INFY");
        assert_eq!(symbol_from_topic("quotes/INFY"), Some("INFY"));
    }

    #[test]
    fn topic_rejects_foreign_shapes() {
        assert_eq!(symbol_from_topic("trades/INFY"), None);
        assert_eq!(symbol_from_topic("quotes/"), None);
        assert_eq!(symbol_from_topic("INFY"), None);
    }

    #[test]
    fn diff_subscribes_new_symbols_only() {
        let changes = diff(&set(&["INFY", "TCS"]), &set(&["INFY"]));
        assert_eq!(changes.subscribe, set(&["TCS"]));
        assert!(changes.unsubscribe.is_empty());
    }

    #[test]
    fn diff_unsubscribes_departed_symbols_only() {
        let changes = diff(&set(&["INFY"]), &set(&["INFY", "TCS"]));
        assert!(changes.subscribe.is_empty());
        assert_eq!(changes.unsubscribe, set(&["TCS"]));
    }

    #[test]
    fn diff_is_noop_for_unchanged_set() {
        let changes = diff(&set(&["INFY", "TCS"]), &set(&["INFY", "TCS"]));
        assert!(changes.is_empty());
    }

    #[test]
    fn empty_desired_set_unsubscribes_everything() {
        let changes = diff(&HashSet::new(), &set(&["INFY", "TCS"]));
        assert!(changes.subscribe.is_empty());
        assert_eq!(changes.unsubscribe, set(&["INFY", "TCS"]));
    }

    #[test]
    fn rebuild_after_drop_subscribes_full_desired_set() {
        // After a disconnect the live set is reset to empty, so the next
        // diff must re-subscribe every desired symbol.
        let changes = diff(&set(&["INFY", "TCS"]), &HashSet::new());
        assert_eq!(changes.subscribe, set(&["INFY", "TCS"]));
        assert!(changes.unsubscribe.is_empty());
    }

    #[test]
    fn changes_map_to_topics() {
        let changes = diff(&set(&["INFY"]), &HashSet::new());
        assert_eq!(changes.subscribe_topics(), vec!["quotes/INFY".to_string()]);
    }

    proptest! {
        /// For any desired/live pair: |subscribe| = |desired − live|,
        /// |unsubscribe| = |live − desired|, and the intersection appears
        /// in neither.
        #[test]
        fn diff_counts_match_set_arithmetic(
            desired in prop::collection::hash_set("[A-Z]{1,4}", 0..12),
            live in prop::collection::hash_set("[A-Z]{1,4}", 0..12),
        ) {
            let changes = diff(&desired, &live);

            prop_assert_eq!(
                changes.subscribe.len(),
                desired.difference(&live).count()
            );
            prop_assert_eq!(
                changes.unsubscribe.len(),
                live.difference(&desired).count()
            );
            for symbol in desired.intersection(&live) {
                prop_assert!(!changes.subscribe.contains(symbol));
                prop_assert!(!changes.unsubscribe.contains(symbol));
            }
        }

        /// Applying the diff to the live set always lands on the desired set.
        #[test]
        fn applying_diff_reaches_desired(
            desired in prop::collection::hash_set("[A-Z]{1,4}", 0..12),
            live in prop::collection::hash_set("[A-Z]{1,4}", 0..12),
        ) {
            let changes = diff(&desired, &live);
            let mut applied = live;
            for symbol in &changes.unsubscribe {
                applied.remove(symbol);
            }
            for symbol in &changes.subscribe {
                applied.insert(symbol.clone());
            }
            prop_assert_eq!(applied, desired);
        }
    }
}
