//! # Push Channel Client
//!
//! Manages the single long-lived connection that delivers change
//! notifications to a device in real time.
//!
//! ## Behavior
//!
//! - `connect()` is idempotent: calls while connecting or connected are
//!   no-ops. The channel is a shared per-process resource and redundant
//!   connect calls must be safe.
//! - Well-formed frames are parsed into [`ChangeEvent`]s and fanned out on
//!   the [`EventBus`]; malformed frames are logged and dropped and never
//!   bring the channel down.
//! - On unexpected closure the channel emits a `connection: disconnected`
//!   event and reconnects with a linearly growing, capped delay. After
//!   [`ReconnectPolicy::max_attempts`] consecutive failures automatic
//!   reconnection stops and only an explicit `connect()` resumes it.
//! - A successful connection resets the attempt counter and emits
//!   `connection: connected`.
//! - `disconnect()` closes the channel and disables reconnection; the
//!   disable flag is checked before any scheduled retry fires, so a pending
//!   backoff timer cannot resurrect a manually closed channel.

pub mod bus;
pub mod transport;

pub use bus::{EventBus, Subscription};
pub use transport::{TransportFactory, TransportStream, WsTransportFactory};

use crate::shared::config::Config;
use crate::shared::error::SyncError;
use crate::shared::event::{ChangeEvent, ConnectionStatus};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Reconnect backoff policy.
///
/// The delay before attempt `n` is `base_delay * min(n, attempt_cap)`, a
/// non-decreasing sequence that plateaus at the cap.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay unit multiplied by the attempt number
    pub base_delay: Duration,
    /// Attempt number at which the delay stops growing
    pub attempt_cap: u32,
    /// Consecutive failed attempts before automatic reconnection stops
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            attempt_cap: 5,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Derive the policy from the engine configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_delay: config.reconnect_base_delay(),
            attempt_cap: config.reconnect_attempt_cap(),
            max_attempts: config.max_reconnect_attempts(),
        }
    }

    /// Delay to wait before reconnect attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.clamp(1, self.attempt_cap)
    }
}

/// The long-lived push channel to the backend
pub struct PushChannel {
    url: String,
    factory: Arc<dyn TransportFactory>,
    bus: Arc<EventBus>,
    policy: ReconnectPolicy,
    state: Arc<RwLock<ConnectionState>>,
    attempts: Arc<AtomicU32>,
    auto_reconnect: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PushChannel {
    /// Create a channel. No connection is made until `connect()`.
    pub fn new(
        url: String,
        factory: Arc<dyn TransportFactory>,
        bus: Arc<EventBus>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            url,
            factory,
            bus,
            policy,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            attempts: Arc::new(AtomicU32::new(0)),
            auto_reconnect: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Establish the channel. A call while already connecting or connected
    /// is a no-op.
    pub async fn connect(&self) {
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Connecting;
        }
        self.auto_reconnect.store(true, Ordering::SeqCst);
        self.attempts.store(0, Ordering::SeqCst);

        let handle = tokio::spawn(run_channel(
            self.url.clone(),
            Arc::clone(&self.factory),
            Arc::clone(&self.bus),
            self.policy.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.attempts),
            Arc::clone(&self.auto_reconnect),
        ));

        let mut task = self.task.lock().await;
        if let Some(previous) = task.replace(handle) {
            // A finished run loop that gave up; nothing left to do
            previous.abort();
        }
    }

    /// Close the channel and disable automatic reconnection until the next
    /// explicit `connect()`.
    pub async fn disconnect(&self) {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        let was = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };
        if was != ConnectionState::Disconnected {
            tracing::info!("push channel disconnected");
            self.bus
                .publish(ChangeEvent::connection(ConnectionStatus::Disconnected))
                .await;
        }
    }

    /// Current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Whether the channel is currently connected. Safe to poll frequently.
    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    /// Reconnect attempts since the last successful connection
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Register for one kind of event on the channel's bus
    pub async fn subscribe(&self, kind: crate::shared::event::EventKind) -> Subscription {
        self.bus.subscribe(kind).await
    }

    /// The bus this channel publishes to
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }
}

/// Connection loop: connect, pump frames, reconnect with backoff.
async fn run_channel(
    url: String,
    factory: Arc<dyn TransportFactory>,
    bus: Arc<EventBus>,
    policy: ReconnectPolicy,
    state: Arc<RwLock<ConnectionState>>,
    attempts: Arc<AtomicU32>,
    auto_reconnect: Arc<AtomicBool>,
) {
    loop {
        match factory.connect(&url).await {
            Ok(mut frames) => {
                attempts.store(0, Ordering::SeqCst);
                *state.write().await = ConnectionState::Connected;
                tracing::info!(url = %url, "push channel connected");
                bus.publish(ChangeEvent::connection(ConnectionStatus::Connected))
                    .await;

                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(text) => match ChangeEvent::parse(&text) {
                            Ok(event) => bus.publish(event).await,
                            Err(e) => {
                                tracing::warn!("dropping malformed push frame: {e}");
                            }
                        },
                        Err(e) => {
                            tracing::warn!("push channel read error: {e}");
                            break;
                        }
                    }
                }

                *state.write().await = ConnectionState::Disconnected;
                tracing::info!("push channel closed");
                bus.publish(ChangeEvent::connection(ConnectionStatus::Disconnected))
                    .await;
            }
            Err(e) => {
                *state.write().await = ConnectionState::Disconnected;
                tracing::warn!("push channel connect failed: {e}");
            }
        }

        if !auto_reconnect.load(Ordering::SeqCst) {
            return;
        }

        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > policy.max_attempts {
            tracing::error!(
                attempts = policy.max_attempts,
                "push channel giving up on automatic reconnection"
            );
            return;
        }

        let delay = policy.delay_for(attempt);
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        *state.write().await = ConnectionState::Connecting;
        tokio::time::sleep(delay).await;

        // Re-check after the timer: an explicit disconnect() while the
        // backoff was pending cancels the retry.
        if !auto_reconnect.load(Ordering::SeqCst) {
            *state.write().await = ConnectionState::Disconnected;
            return;
        }
    }
}
