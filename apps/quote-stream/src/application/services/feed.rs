//! Feed Engine
//!
//! The single owner of all mutable delivery state: the desired symbol set,
//! the live subscription set, the quote store, the per-symbol throttle
//! windows, and the SLA timers. Every mutation happens inside this task's
//! `select!` dispatch, which serializes callbacks the way a single-threaded
//! event loop would.
//!
//! The live subscription set is derived state: it is reset to empty whenever
//! the transport drops and recomputed from the desired set on every `Up`
//! event, never patched incrementally across sessions.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::application::ports::TokenProvider;
use crate::domain::quote::{Quote, Symbol};
use crate::domain::store::QuoteStore;
use crate::domain::subscription;
use crate::infrastructure::broker::{
    BrokerCommand, BrokerConnection, BrokerEvent, ConnectionStatus, DownReason, QuoteFrame,
    SharedStatusCell,
};
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::metrics;
use crate::infrastructure::sla::{SlaBreach, SlaMonitor};
use crate::infrastructure::throttle::{KeyedThrottle, Offer};

// =============================================================================
// Commands
// =============================================================================

/// The active watch context and its resolved symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSelection {
    /// Identity of the selected watch group. A change of group clears the
    /// quote store wholesale; same-group updates evict incrementally.
    pub group: Option<String>,
    /// Symbols the group currently resolves to.
    pub symbols: Vec<Symbol>,
}

impl WatchSelection {
    /// Selection for a named group.
    #[must_use]
    pub fn group(name: impl Into<String>, symbols: Vec<Symbol>) -> Self {
        Self {
            group: Some(name.into()),
            symbols,
        }
    }
}

/// Commands accepted by the feed engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    /// Activate the transport if no session is active.
    Connect,
    /// Release subscriptions, then the transport. Idempotent.
    Disconnect,
    /// Replace the desired symbol set.
    SetWatchlist(WatchSelection),
}

// =============================================================================
// Engine
// =============================================================================

/// One broker session spawned by the engine.
struct Session {
    commands: mpsc::Sender<BrokerCommand>,
    task: tokio::task::JoinHandle<()>,
}

/// The feed engine task.
///
/// Spawned once per [`super::stream::MarketStream`]; owns the connection
/// lifecycle and the whole quote delivery pipeline.
pub struct FeedEngine {
    config: StreamConfig,
    tokens: Arc<dyn TokenProvider>,
    store: Arc<QuoteStore>,
    status: SharedStatusCell,
    breaches: broadcast::Sender<SlaBreach>,
    commands: mpsc::Receiver<FeedCommand>,
    events_rx: mpsc::Receiver<BrokerEvent>,
    /// Kept so the event channel outlives individual broker sessions.
    events_tx: mpsc::Sender<BrokerEvent>,
    cancel: CancellationToken,

    desired: HashSet<Symbol>,
    live: HashSet<Symbol>,
    group: Option<String>,
    connected: bool,
    throttle: KeyedThrottle<Quote>,
    sla: SlaMonitor,
    session: Option<Session>,
}

impl FeedEngine {
    /// Create an engine wired to the given channels.
    #[must_use]
    pub fn new(
        config: StreamConfig,
        tokens: Arc<dyn TokenProvider>,
        store: Arc<QuoteStore>,
        status: SharedStatusCell,
        breaches: broadcast::Sender<SlaBreach>,
        commands: mpsc::Receiver<FeedCommand>,
        events_tx: mpsc::Sender<BrokerEvent>,
        events_rx: mpsc::Receiver<BrokerEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let throttle = KeyedThrottle::new(config.delivery.throttle_interval);
        let sla = SlaMonitor::new(config.delivery.sla_window);
        Self {
            config,
            tokens,
            store,
            status,
            breaches,
            commands,
            events_rx,
            events_tx,
            cancel,
            desired: HashSet::new(),
            live: HashSet::new(),
            group: None,
            connected: false,
            throttle,
            sla,
            session: None,
        }
    }

    /// Run the engine until cancelled or the command channel closes.
    pub async fn run(mut self) {
        loop {
            let windows_open = !self.throttle.is_idle();
            let sla_armed = self.sla.is_armed();

            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.close_session().await;
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(FeedCommand::Connect) => self.open_session(),
                    Some(FeedCommand::Disconnect) => self.close_session().await,
                    Some(FeedCommand::SetWatchlist(selection)) => {
                        self.apply_selection(selection).await;
                    }
                    None => {
                        // Stream handle dropped; tear everything down.
                        self.close_session().await;
                        break;
                    }
                },
                event = self.events_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    }
                }
                flush = self.throttle.next_flush(), if windows_open => {
                    if let Some((_, Some(quote))) = flush {
                        self.store_quote(quote);
                    }
                }
                breach = self.sla.next_breach(), if sla_armed => {
                    if let Some(breach) = breach {
                        self.emit_breach(&breach);
                    }
                }
            }
        }

        tracing::debug!("Feed engine stopped");
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Activate the transport if no session is active.
    fn open_session(&mut self) {
        if self
            .session
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
        {
            tracing::debug!("Connect requested but a session is already active");
            return;
        }

        self.status.transition(ConnectionStatus::Connecting);

        let (command_tx, command_rx) = mpsc::channel(self.config.delivery.command_capacity);
        let connection = BrokerConnection::new(
            self.config.broker_config(),
            Arc::clone(&self.tokens),
            self.events_tx.clone(),
            command_rx,
            Arc::clone(&self.status),
            self.cancel.child_token(),
        );
        let task = tokio::spawn(connection.run());

        self.session = Some(Session {
            commands: command_tx,
            task,
        });
    }

    /// Release subscriptions, then the transport.
    ///
    /// The unsubscribe request is queued ahead of the shutdown command on
    /// the session's command channel, so the socket flushes it before
    /// closing. Local delivery state is cleared in the same dispatch; no
    /// trailing throttle flush can fire afterwards. Idempotent.
    async fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            if self.connected && !self.live.is_empty() {
                let topics = self
                    .live
                    .iter()
                    .map(|symbol| subscription::quote_topic(symbol))
                    .collect();
                let _ = session
                    .commands
                    .send(BrokerCommand::Unsubscribe { topics })
                    .await;
            }
            let _ = session.commands.send(BrokerCommand::Shutdown).await;
        } else {
            // No transport at all; just publish the terminal status.
            self.status.transition(ConnectionStatus::Disconnected);
        }

        self.connected = false;
        self.live.clear();
        self.throttle.clear();
    }

    // =========================================================================
    // Event handling
    // =========================================================================

    async fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Up => {
                self.connected = true;
                // Subscriptions did not survive the previous socket.
                self.live.clear();
                self.resync().await;
            }
            BrokerEvent::Down { reason } => {
                tracing::debug!(reason = reason.as_str(), "Broker session down");
                self.connected = false;
                self.live.clear();
                self.throttle.clear();
                if reason == DownReason::Clean {
                    self.session = None;
                }
            }
            BrokerEvent::Quote(frame) => self.handle_quote(frame),
            BrokerEvent::Subscribed { topics } => {
                tracing::debug!(topics = topics.len(), "Broker confirmed subscriptions");
            }
        }
    }

    fn handle_quote(&mut self, frame: QuoteFrame) {
        let quote = frame.payload;

        if !self.desired.contains(&quote.symbol) {
            // Stray delivery after an unsubscribe; the store must only ever
            // hold desired symbols.
            tracing::trace!(symbol = %quote.symbol, "Ignoring quote outside the desired set");
            return;
        }

        self.sla.fulfill(&quote.symbol);

        let symbol = quote.symbol.clone();
        match self.throttle.offer(symbol, quote) {
            Offer::Forward(quote) => self.store_quote(quote),
            Offer::Retained => metrics::record_quote_throttled(),
        }
    }

    fn store_quote(&self, quote: Quote) {
        metrics::record_quote_stored();
        self.store.update(quote);
    }

    fn emit_breach(&self, breach: &SlaBreach) {
        tracing::warn!(
            symbol = %breach.symbol,
            window_ms = breach.window.as_millis(),
            "First-quote delivery window missed"
        );
        metrics::record_sla_breach();
        let _ = self.breaches.send(breach.clone());
    }

    // =========================================================================
    // Desired-set handling
    // =========================================================================

    async fn apply_selection(&mut self, selection: WatchSelection) {
        let next: HashSet<Symbol> = selection.symbols.into_iter().collect();

        if selection.group == self.group {
            for removed in self.desired.difference(&next) {
                self.store.remove(removed);
                self.throttle.dispose(removed);
                self.sla.disarm(removed);
            }
            for added in next.difference(&self.desired) {
                self.sla.arm(added.clone());
            }
        } else {
            // Watch-context switch: stale quotes from the previous group
            // must never leak into the new one.
            self.store.clear();
            self.throttle.clear();
            self.sla.clear();
            for symbol in &next {
                self.sla.arm(symbol.clone());
            }
            self.group = selection.group;
        }

        self.desired = next;
        if self.connected {
            self.resync().await;
        }
    }

    /// Bring the live subscription set in line with the desired set.
    async fn resync(&mut self) {
        let changes = subscription::diff(&self.desired, &self.live);
        if changes.is_empty() {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };

        if !changes.unsubscribe.is_empty() {
            let _ = session
                .commands
                .send(BrokerCommand::Unsubscribe {
                    topics: changes.unsubscribe_topics(),
                })
                .await;
        }
        if !changes.subscribe.is_empty() {
            let _ = session
                .commands
                .send(BrokerCommand::Subscribe {
                    topics: changes.subscribe_topics(),
                })
                .await;
        }

        self.live.clone_from(&self.desired);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{ProviderError, TokenProvider};
    use crate::infrastructure::broker::StatusCell;

    struct FixedToken;

    #[async_trait::async_trait]
    impl TokenProvider for FixedToken {
        async fn bearer_token(&self) -> Result<String, ProviderError> {
            Ok("test-token".to_string())
        }
    }

    struct Harness {
        engine: FeedEngine,
        broker_rx: mpsc::Receiver<BrokerCommand>,
        breach_rx: broadcast::Receiver<SlaBreach>,
    }

    /// Engine with a fake broker session attached: commands land in
    /// `broker_rx` without any socket.
    fn harness() -> Harness {
        let config = StreamConfig::default();
        let store = Arc::new(QuoteStore::new());
        let status = Arc::new(StatusCell::new());
        let (breach_tx, breach_rx) = broadcast::channel(16);
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);

        let mut engine = FeedEngine::new(
            config,
            Arc::new(FixedToken),
            store,
            status,
            breach_tx,
            cmd_rx,
            event_tx,
            event_rx,
            CancellationToken::new(),
        );

        let (broker_tx, broker_rx) = mpsc::channel(16);
        engine.session = Some(Session {
            commands: broker_tx,
            task: tokio::spawn(async {}),
        });

        Harness {
            engine,
            broker_rx,
            breach_rx,
        }
    }

    fn quote_frame(symbol: &str, last_price: &str) -> QuoteFrame {
        QuoteFrame {
            frame_type: "quote".to_string(),
            topic: subscription::quote_topic(symbol),
            payload: Quote {
                symbol: symbol.to_string(),
                last_price: last_price.parse::<Decimal>().unwrap(),
                open: Decimal::ZERO,
                change: Decimal::ZERO,
                change_percent: Decimal::ZERO,
                volume: 1000,
                timestamp: Utc::now(),
                market_status: None,
            },
        }
    }

    fn selection(group: &str, symbols: &[&str]) -> WatchSelection {
        WatchSelection::group(group, symbols.iter().map(ToString::to_string).collect())
    }

    #[tokio::test]
    async fn up_resubscribes_full_desired_set() {
        let mut h = harness();
        h.engine.apply_selection(selection("tech", &["INFY"])).await;

        h.engine.handle_event(BrokerEvent::Up).await;

        let command = h.broker_rx.recv().await.unwrap();
        assert_eq!(
            command,
            BrokerCommand::Subscribe {
                topics: vec!["quotes/INFY".to_string()]
            }
        );
        assert!(h.engine.live.contains("INFY"));
    }

    #[tokio::test]
    async fn desired_quote_reaches_store_immediately() {
        let mut h = harness();
        h.engine.apply_selection(selection("tech", &["INFY"])).await;
        h.engine.handle_event(BrokerEvent::Up).await;

        h.engine
            .handle_event(BrokerEvent::Quote(quote_frame("INFY", "1745.65")))
            .await;

        let stored = h.engine.store.get("INFY").unwrap();
        assert_eq!(stored.last_price.to_string(), "1745.65");
    }

    #[tokio::test]
    async fn undesired_quote_is_ignored() {
        let mut h = harness();
        h.engine.apply_selection(selection("tech", &["INFY"])).await;
        h.engine.handle_event(BrokerEvent::Up).await;

        h.engine
            .handle_event(BrokerEvent::Quote(quote_frame("TCS", "4100.00")))
            .await;

        assert!(h.engine.store.get("TCS").is_none());
    }

    #[tokio::test]
    async fn burst_is_throttled_to_latest_pending() {
        let mut h = harness();
        h.engine.apply_selection(selection("tech", &["INFY"])).await;
        h.engine.handle_event(BrokerEvent::Up).await;

        h.engine
            .handle_event(BrokerEvent::Quote(quote_frame("INFY", "1745.65")))
            .await;
        h.engine
            .handle_event(BrokerEvent::Quote(quote_frame("INFY", "1746.00")))
            .await;
        h.engine
            .handle_event(BrokerEvent::Quote(quote_frame("INFY", "1747.00")))
            .await;

        // Leading edge stored; the burst waits for the trailing edge.
        assert_eq!(
            h.engine.store.get("INFY").unwrap().last_price.to_string(),
            "1745.65"
        );

        // Window close delivers only the most recent value.
        let (_, pending) = h.engine.throttle.next_flush().await.unwrap();
        let quote = pending.unwrap();
        assert_eq!(quote.last_price.to_string(), "1747.00");
    }

    #[tokio::test]
    async fn first_quote_fulfills_sla_timer() {
        let mut h = harness();
        h.engine.apply_selection(selection("tech", &["INFY"])).await;
        assert!(h.engine.sla.is_armed());

        h.engine
            .handle_event(BrokerEvent::Quote(quote_frame("INFY", "1745.65")))
            .await;

        assert!(!h.engine.sla.is_armed());
    }

    #[tokio::test]
    async fn incremental_selection_change_diffs_subscriptions() {
        let mut h = harness();
        h.engine
            .apply_selection(selection("tech", &["INFY", "TCS"]))
            .await;
        h.engine.handle_event(BrokerEvent::Up).await;
        let _ = h.broker_rx.recv().await; // initial subscribe

        h.engine
            .handle_event(BrokerEvent::Quote(quote_frame("TCS", "4100.00")))
            .await;

        h.engine
            .apply_selection(selection("tech", &["INFY", "WIPRO"]))
            .await;

        // TCS evicted from the store with its subscription.
        assert!(h.engine.store.get("TCS").is_none());

        let unsubscribe = h.broker_rx.recv().await.unwrap();
        assert_eq!(
            unsubscribe,
            BrokerCommand::Unsubscribe {
                topics: vec!["quotes/TCS".to_string()]
            }
        );
        let subscribe = h.broker_rx.recv().await.unwrap();
        assert_eq!(
            subscribe,
            BrokerCommand::Subscribe {
                topics: vec!["quotes/WIPRO".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn context_switch_clears_store_before_new_quotes() {
        let mut h = harness();
        h.engine.apply_selection(selection("tech", &["INFY"])).await;
        h.engine.handle_event(BrokerEvent::Up).await;
        h.engine
            .handle_event(BrokerEvent::Quote(quote_frame("INFY", "1745.65")))
            .await;
        assert_eq!(h.engine.store.len(), 1);

        h.engine
            .apply_selection(selection("energy", &["RELIANCE"]))
            .await;

        // Store cleared before any RELIANCE quote arrives.
        assert!(h.engine.store.is_empty());

        h.engine
            .handle_event(BrokerEvent::Quote(quote_frame("RELIANCE", "2900.10")))
            .await;
        assert_eq!(h.engine.store.symbols(), vec!["RELIANCE".to_string()]);
    }

    #[tokio::test]
    async fn down_resets_live_set_so_up_resubscribes() {
        let mut h = harness();
        h.engine.apply_selection(selection("tech", &["INFY"])).await;
        h.engine.handle_event(BrokerEvent::Up).await;
        let _ = h.broker_rx.recv().await;
        assert!(!h.engine.live.is_empty());

        h.engine
            .handle_event(BrokerEvent::Down {
                reason: DownReason::Transport,
            })
            .await;
        assert!(h.engine.live.is_empty());
        assert!(h.engine.throttle.is_idle());

        h.engine.handle_event(BrokerEvent::Up).await;
        let command = h.broker_rx.recv().await.unwrap();
        assert_eq!(
            command,
            BrokerCommand::Subscribe {
                topics: vec!["quotes/INFY".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn disconnect_releases_subscriptions_before_transport() {
        let mut h = harness();
        h.engine.apply_selection(selection("tech", &["INFY"])).await;
        h.engine.handle_event(BrokerEvent::Up).await;
        let _ = h.broker_rx.recv().await;

        h.engine.close_session().await;

        let first = h.broker_rx.recv().await.unwrap();
        assert_eq!(
            first,
            BrokerCommand::Unsubscribe {
                topics: vec!["quotes/INFY".to_string()]
            }
        );
        let second = h.broker_rx.recv().await.unwrap();
        assert_eq!(second, BrokerCommand::Shutdown);

        assert!(h.engine.live.is_empty());
        assert!(h.engine.throttle.is_idle());
    }

    #[tokio::test]
    async fn disconnect_without_session_is_noop() {
        let mut h = harness();
        h.engine.session = None;

        h.engine.close_session().await;
        h.engine.close_session().await;

        assert!(!h.engine.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn missed_window_emits_one_breach() {
        let mut h = harness();
        h.engine.apply_selection(selection("tech", &["INFY"])).await;

        let breach = h.engine.sla.next_breach().await.unwrap();
        h.engine.emit_breach(&breach);

        let received = h.breach_rx.recv().await.unwrap();
        assert_eq!(received.symbol, "INFY");
        assert!(!h.engine.sla.is_armed());
    }

    #[tokio::test]
    async fn empty_selection_unsubscribes_everything() {
        let mut h = harness();
        h.engine
            .apply_selection(selection("tech", &["INFY", "TCS"]))
            .await;
        h.engine.handle_event(BrokerEvent::Up).await;
        let _ = h.broker_rx.recv().await;

        h.engine.apply_selection(selection("tech", &[])).await;

        let command = h.broker_rx.recv().await.unwrap();
        let BrokerCommand::Unsubscribe { mut topics } = command else {
            panic!("expected unsubscribe");
        };
        topics.sort();
        assert_eq!(
            topics,
            vec!["quotes/INFY".to_string(), "quotes/TCS".to_string()]
        );
        assert!(h.engine.live.is_empty());
    }
}
