//! Market Stream Facade
//!
//! The single long-lived handle over the whole subsystem. Owns the feed
//! engine task and exposes the three read-only surfaces the rendering layer
//! is allowed to touch: the quote store, the status watch channel, and the
//! SLA-breach broadcast.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::feed::{FeedCommand, FeedEngine, WatchSelection};
use crate::application::ports::TokenProvider;
use crate::domain::store::QuoteStore;
use crate::infrastructure::broker::{BrokerEvent, ConnectionStatus, StatusCell};
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::sla::SlaBreach;

/// Handle over the quote stream subsystem.
///
/// Created once at process start; consumers receive it by reference rather
/// than reaching into ambient state. Connection is initiated immediately on
/// creation (the stream starts life `Connecting`); `connect` and
/// `disconnect` drive the lifecycle explicitly afterwards.
pub struct MarketStream {
    commands: mpsc::Sender<FeedCommand>,
    store: Arc<QuoteStore>,
    status: Arc<StatusCell>,
    breaches: broadcast::Sender<SlaBreach>,
    cancel: CancellationToken,
    engine: tokio::task::JoinHandle<()>,
}

impl MarketStream {
    /// Spawn the feed engine and initiate the first connection.
    #[must_use]
    pub fn spawn(config: StreamConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let store = Arc::new(QuoteStore::new());
        let status = Arc::new(StatusCell::new());
        let (breach_tx, _breach_rx) = broadcast::channel(config.delivery.breach_capacity);
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) =
            mpsc::channel::<BrokerEvent>(config.delivery.event_capacity);
        let cancel = CancellationToken::new();

        let engine = FeedEngine::new(
            config,
            tokens,
            Arc::clone(&store),
            Arc::clone(&status),
            breach_tx.clone(),
            command_rx,
            event_tx,
            event_rx,
            cancel.clone(),
        );
        let engine = tokio::spawn(engine.run());

        // The stream is created `Connecting`, mirroring a client that dials
        // out at process start.
        let _ = command_tx.try_send(FeedCommand::Connect);

        Self {
            commands: command_tx,
            store,
            status,
            breaches: breach_tx,
            cancel,
            engine,
        }
    }

    /// Activate the transport if it is not already active.
    pub async fn connect(&self) {
        let _ = self.commands.send(FeedCommand::Connect).await;
    }

    /// Release all subscriptions, then the transport. Idempotent.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(FeedCommand::Disconnect).await;
    }

    /// Replace the desired symbol set with the given selection.
    pub async fn set_watchlist(&self, selection: WatchSelection) {
        let _ = self
            .commands
            .send(FeedCommand::SetWatchlist(selection))
            .await;
    }

    /// Read-only view of the latest quotes.
    #[must_use]
    pub fn quotes(&self) -> Arc<QuoteStore> {
        Arc::clone(&self.store)
    }

    /// Subscribe to connection status transitions.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Current connection status.
    #[must_use]
    pub fn current_status(&self) -> ConnectionStatus {
        self.status.current()
    }

    /// Subscribe to SLA-breach advisories.
    #[must_use]
    pub fn breaches(&self) -> broadcast::Receiver<SlaBreach> {
        self.breaches.subscribe()
    }

    /// Disconnect and stop the engine.
    pub async fn shutdown(self) {
        self.disconnect().await;
        self.cancel.cancel();
        let _ = self.engine.await;
    }
}
