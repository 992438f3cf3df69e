//! Feed session
//!
//! Owns the transport lifecycle: connect, subscribe, process frames,
//! reconnect with backoff, and cooperative shutdown. Subscriptions are
//! tracked so reconnection is transparent to callers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::FeedClient;
use crate::config::Config;
use crate::error::{FeedError, Result};
use crate::normalizer::FeedNormalizer;
use crate::publisher::Publisher;

/// Lifecycle states, observable through the session handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    Subscribing,
    Live,
    Reconnecting,
    Closed,
}

/// Commands accepted by a running session. Enqueueing never blocks.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Subscribe {
        symbol: String,
        channels: Vec<String>,
    },
    Unsubscribe {
        symbol: String,
    },
    Close,
}

/// Cloneable handle for controlling a session from other tasks
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn subscribe(&self, symbol: &str, channels: &[String]) -> Result<()> {
        self.send(SessionCommand::Subscribe {
            symbol: symbol.to_string(),
            channels: channels.to_vec(),
        })
    }

    pub fn unsubscribe(&self, symbol: &str) -> Result<()> {
        self.send(SessionCommand::Unsubscribe {
            symbol: symbol.to_string(),
        })
    }

    /// Request cooperative shutdown; terminal
    pub fn close(&self) -> Result<()> {
        self.send(SessionCommand::Close)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reports the given state
    pub async fn wait_for(&mut self, state: SessionState) -> Result<()> {
        while *self.state.borrow_and_update() != state {
            self.state
                .changed()
                .await
                .map_err(|_| FeedError::SessionClosed)?;
        }
        Ok(())
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| FeedError::SessionClosed)
    }
}

/// Outcome of a live connection: shutdown requested, or a transport
/// failure that warrants reconnecting
enum LiveExit {
    Shutdown,
    Failed(FeedError),
}

/// Manages the feed connection with automatic reconnection
pub struct FeedSession {
    config: Arc<Config>,
    normalizer: Arc<FeedNormalizer>,
    publisher: Option<Arc<Publisher>>,
    client: FeedClient,
    /// symbol -> channels, retained across reconnects
    subscriptions: HashMap<String, Vec<String>>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    state_tx: watch::Sender<SessionState>,
    reconnect_attempts: u32,
    closing: bool,
}

impl FeedSession {
    pub fn new(
        config: Arc<Config>,
        normalizer: Arc<FeedNormalizer>,
        publisher: Option<Arc<Publisher>>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let client = FeedClient::new(&config.feed_endpoint);
        let session = Self {
            config,
            normalizer,
            publisher,
            client,
            subscriptions: HashMap::new(),
            commands: command_rx,
            state_tx,
            reconnect_attempts: 0,
            closing: false,
        };
        let handle = SessionHandle {
            commands: command_tx,
            state: state_rx,
        };
        (session, handle)
    }

    /// Run until `close()` is requested. Reconnects on every transport
    /// failure or idle timeout.
    pub async fn run(mut self) -> Result<()> {
        loop {
            if self.closing {
                break;
            }

            self.set_state(SessionState::Connecting);
            match self.client.connect().await {
                Ok(()) => {
                    self.set_state(SessionState::Handshaking);
                    self.reconnect_attempts = 0;

                    // Books are wiped before resubscribing so the
                    // incoming snapshot establishes ground truth
                    self.set_state(SessionState::Subscribing);
                    self.normalizer.registry().clear_all();
                    if let Err(e) = self.resubscribe().await {
                        warn!(error = %e, "Failed to resubscribe");
                    } else {
                        self.set_state(SessionState::Live);
                        match self.process_live().await {
                            LiveExit::Shutdown => break,
                            LiveExit::Failed(e) => {
                                warn!(error = %e, "Connection lost");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Connection attempt failed");
                }
            }

            if self.closing {
                break;
            }

            self.set_state(SessionState::Reconnecting);
            let delay = backoff_delay(
                self.reconnect_attempts,
                self.config.reconnect_initial_ms,
                self.config.reconnect_max_ms,
            );
            self.reconnect_attempts += 1;
            warn!(
                attempt = self.reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after backoff"
            );
            if self.wait_backoff(delay).await {
                break;
            }
        }

        self.client.close().await;
        self.set_state(SessionState::Closed);
        info!("Feed session closed");
        Ok(())
    }

    /// Process frames and commands while connected
    async fn process_live(&mut self) -> LiveExit {
        let idle_window = Duration::from_secs(self.config.heartbeat_timeout_secs);

        loop {
            tokio::select! {
                result = timeout(idle_window, self.client.next_frame()) => match result {
                    Ok(Ok(text)) => {
                        if let Some(symbol) = self.normalizer.handle_frame(&text) {
                            self.publish(&symbol).await;
                        }
                    }
                    Ok(Err(e)) => return LiveExit::Failed(e),
                    Err(_) => {
                        warn!(
                            idle_secs = idle_window.as_secs(),
                            "No frame within the idle window, forcing reconnect"
                        );
                        self.client.close().await;
                        return LiveExit::Failed(FeedError::ConnectionTimeout);
                    }
                },
                command = self.commands.recv() => {
                    match command {
                        Some(SessionCommand::Subscribe { symbol, channels }) => {
                            if let Err(e) = self.subscribe_live(&symbol, channels).await {
                                return LiveExit::Failed(e);
                            }
                        }
                        Some(SessionCommand::Unsubscribe { symbol }) => {
                            if let Err(e) = self.unsubscribe_live(&symbol).await {
                                return LiveExit::Failed(e);
                            }
                        }
                        Some(SessionCommand::Close) | None => {
                            self.closing = true;
                            return LiveExit::Shutdown;
                        }
                    }
                }
            }
        }
    }

    async fn subscribe_live(&mut self, symbol: &str, channels: Vec<String>) -> Result<()> {
        self.normalizer.registry().ensure(symbol);
        let frame = subscribe_frame("subscribe", &[symbol.to_string()], &channels);
        self.subscriptions.insert(symbol.to_string(), channels);
        info!(symbol = %symbol, "Subscribing");
        self.client.send(frame).await
    }

    async fn unsubscribe_live(&mut self, symbol: &str) -> Result<()> {
        if let Some(channels) = self.subscriptions.remove(symbol) {
            let frame = subscribe_frame("unsubscribe", &[symbol.to_string()], &channels);
            info!(symbol = %symbol, "Unsubscribing");
            self.client.send(frame).await?;
        }
        self.normalizer.registry().remove(symbol);
        Ok(())
    }

    /// Re-send every tracked subscription after a (re)connect
    async fn resubscribe(&mut self) -> Result<()> {
        for (symbol, channels) in self.subscriptions.clone() {
            let frame = subscribe_frame("subscribe", &[symbol.clone()], &channels);
            info!(symbol = %symbol, "Resubscribing");
            self.client.send(frame).await?;
        }
        Ok(())
    }

    /// Sleep out the backoff while still accepting commands. Returns
    /// true if shutdown was requested.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleeper = sleep(delay);
        tokio::pin!(sleeper);

        loop {
            tokio::select! {
                _ = &mut sleeper => return false,
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Subscribe { symbol, channels }) => {
                        // Tracked now, sent on reconnect
                        self.normalizer.registry().ensure(&symbol);
                        self.subscriptions.insert(symbol, channels);
                    }
                    Some(SessionCommand::Unsubscribe { symbol }) => {
                        self.subscriptions.remove(&symbol);
                        self.normalizer.registry().remove(&symbol);
                    }
                    Some(SessionCommand::Close) | None => {
                        self.closing = true;
                        return true;
                    }
                },
            }
        }
    }

    async fn publish(&self, symbol: &str) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Some(book) = self.normalizer.registry().get(symbol) {
            let snapshot = book.snapshot(self.config.depth_levels);
            if let Err(e) = publisher.publish(&snapshot).await {
                debug!(error = %e, "Publish failed");
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        if *self.state_tx.borrow() != state {
            info!(state = ?state, "Session state change");
            let _ = self.state_tx.send(state);
        }
    }
}

/// Exponential backoff from the initial delay, capped, with +/-20%
/// jitter so reconnecting clients do not stampede
fn backoff_delay(attempts: u32, initial_ms: u64, max_ms: u64) -> Duration {
    let base = initial_ms.saturating_mul(1u64 << attempts.min(16)).min(max_ms);
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    Duration::from_millis((base as f64 * jitter) as u64)
}

/// Build a subscribe/unsubscribe frame
fn subscribe_frame(action: &str, product_ids: &[String], channels: &[String]) -> String {
    serde_json::json!({
        "type": action,
        "product_ids": product_ids,
        "channels": channels,
    })
    .to_string()
}
