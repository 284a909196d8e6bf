//! # Device-Side Sync Engine
//!
//! Wires the engine's components together behind one facade:
//!
//! - **Push channel** receiving change notifications over a long-lived
//!   connection, with reconnect backoff
//! - **Local database** caching read-mostly collections and holding the
//!   durable mutation queue
//! - **Mutation queue** replaying offline writes once connectivity returns
//! - **Connectivity monitor** probing backend health on a fixed tick
//! - **Sync coordinator** materializing the unified state consumers read
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tillsync::client::SyncEngine;
//! use tillsync::shared::config::Config;
//!
//! # async fn example() -> Result<(), tillsync::shared::error::SyncError> {
//! let config = Config::builder()
//!     .server_url("http://192.168.1.20:3000")
//!     .build()?;
//! let engine = SyncEngine::new(config).await?;
//! engine.start().await;
//!
//! let mut state = engine.state();
//! state.changed().await.ok();
//! println!("{} orders", state.borrow().orders.len());
//! # Ok(())
//! # }
//! ```
//!
//! There are no process-wide singletons: the engine instance is constructed
//! at a composition root and passed to whatever presentation layer consumes
//! it, and tests substitute a scripted transport through
//! [`SyncEngine::with_transport`].

pub mod api;
pub mod local_db;
pub mod offline;
pub mod push;
pub mod sync;

pub use api::BackendClient;
pub use local_db::queue::MutationKind;
pub use local_db::LocalDatabase;
pub use offline::{DrainOutcome, EvictedMutation, MutationQueue};
pub use push::{ConnectionState, EventBus, PushChannel, ReconnectPolicy, WsTransportFactory};
pub use sync::{StateSnapshot, SyncCoordinator, SyncPhase};

use crate::client::push::transport::TransportFactory;
use crate::client::sync::{ConnectivityMonitor, SyncCommand};
use crate::shared::config::Config;
use crate::shared::error::SyncError;
use crate::shared::event::{ChangeEvent, ConnectionStatus, EventKind};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// The assembled synchronization engine
pub struct SyncEngine {
    db: Arc<LocalDatabase>,
    api: Arc<BackendClient>,
    bus: Arc<EventBus>,
    push: Arc<PushChannel>,
    queue: Arc<MutationQueue>,
    monitor: ConnectivityMonitor,
    coordinator: SyncCoordinator,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl SyncEngine {
    /// Build the engine with the production WebSocket transport
    pub async fn new(config: Config) -> Result<Self, SyncError> {
        Self::with_transport(config, Arc::new(WsTransportFactory)).await
    }

    /// Build the engine with an injected transport factory
    pub async fn with_transport(
        config: Config,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self, SyncError> {
        let db = Arc::new(match config.database_path() {
            Some(path) => LocalDatabase::open(path).await?,
            None => LocalDatabase::new().await?,
        });
        let api = Arc::new(BackendClient::new(&config)?);
        let bus = Arc::new(EventBus::new());
        let push = Arc::new(PushChannel::new(
            config.push_url(),
            factory,
            Arc::clone(&bus),
            ReconnectPolicy::from_config(&config),
        ));
        let queue = Arc::new(
            MutationQueue::new(
                Arc::clone(&db),
                Arc::clone(&api),
                config.max_replay_attempts(),
            )
            .await?,
        );
        let coordinator = SyncCoordinator::spawn(Arc::clone(&api), Arc::clone(&db));
        let monitor = ConnectivityMonitor::new(
            Arc::clone(&api),
            Arc::clone(&queue),
            coordinator.command_sender(),
            config.sync_interval(),
        );

        Ok(Self {
            db,
            api,
            bus,
            push,
            queue,
            monitor,
            coordinator,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Start the engine: subscribe to notifications, open the push channel,
    /// begin connectivity probing, and kick off the initial load.
    ///
    /// A second call is a no-op.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        // Subscriptions must exist before the channel connects so the first
        // connection event cannot be missed.
        let mut streams = Vec::new();
        for kind in EventKind::collection_kinds() {
            let subscription = self.bus.subscribe(kind).await;
            streams.push(UnboundedReceiverStream::new(subscription.into_receiver()));
        }
        let connection = self.bus.subscribe(EventKind::Connection).await;
        streams.push(UnboundedReceiverStream::new(connection.into_receiver()));

        let pump = spawn_event_pump(
            streams,
            self.coordinator.command_sender(),
            Arc::clone(&self.queue),
        );
        let pending = spawn_pending_forwarder(
            self.queue.pending_watch(),
            self.coordinator.command_sender(),
        );
        self.tasks.lock().await.extend([pump, pending]);

        self.push.connect().await;
        self.monitor.start().await;
        self.coordinator.activate();
    }

    /// Watch the materialized state snapshot
    pub fn state(&self) -> watch::Receiver<StateSnapshot> {
        self.coordinator.state()
    }

    /// Watch the coordinator lifecycle phase
    pub fn phase(&self) -> watch::Receiver<SyncPhase> {
        self.coordinator.phase()
    }

    /// Watch backend reachability
    pub fn online(&self) -> watch::Receiver<bool> {
        self.monitor.online_watch()
    }

    /// Whether the push channel is currently connected
    pub async fn is_connected(&self) -> bool {
        self.push.is_connected().await
    }

    /// Durably enqueue an order write, replaying immediately when online.
    ///
    /// The write is speculative until a backend refresh confirms it; the
    /// confirming refresh replaces the materialized collection rather than
    /// merging into it.
    pub async fn submit_order(&self, payload: serde_json::Value) -> Result<String, SyncError> {
        self.enqueue_and_flush(MutationKind::Order, payload).await
    }

    /// Durably enqueue a waiter-call write, replaying immediately when online
    pub async fn submit_waiter_call(
        &self,
        payload: serde_json::Value,
    ) -> Result<String, SyncError> {
        self.enqueue_and_flush(MutationKind::WaiterCall, payload).await
    }

    async fn enqueue_and_flush(
        &self,
        kind: MutationKind,
        payload: serde_json::Value,
    ) -> Result<String, SyncError> {
        let id = self.queue.enqueue(kind, payload).await?;
        if self.monitor.is_online() {
            let queue = Arc::clone(&self.queue);
            tokio::spawn(async move {
                if let Err(e) = queue.drain().await {
                    tracing::warn!("post-enqueue drain failed: {e}");
                }
            });
        }
        Ok(id)
    }

    /// Replay queued mutations now
    pub async fn drain_now(&self) -> Result<DrainOutcome, SyncError> {
        self.queue.drain().await
    }

    /// Queued mutation count, recomputed from storage
    pub async fn pending_mutations(&self) -> Result<usize, SyncError> {
        self.queue.pending_count().await
    }

    /// Retry after a load failure
    pub fn retry(&self) {
        self.coordinator.retry();
    }

    /// Re-open the push channel after an explicit disconnect
    pub async fn connect(&self) {
        self.push.connect().await;
    }

    /// Close the push channel and disable reconnection
    pub async fn disconnect(&self) {
        self.push.disconnect().await;
    }

    /// Local database handle, for status screens
    pub fn database(&self) -> Arc<LocalDatabase> {
        Arc::clone(&self.db)
    }

    /// Backend client handle
    pub fn backend(&self) -> Arc<BackendClient> {
        Arc::clone(&self.api)
    }

    /// Stop every background task
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
        self.push.disconnect().await;
        self.coordinator.shutdown();
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.started.store(false, Ordering::SeqCst);
    }
}

/// Fan merged bus subscriptions into coordinator commands.
fn spawn_event_pump(
    streams: Vec<UnboundedReceiverStream<ChangeEvent>>,
    commands: tokio::sync::mpsc::UnboundedSender<SyncCommand>,
    queue: Arc<MutationQueue>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut merged = futures_util::stream::select_all(streams);
        while let Some(event) = merged.next().await {
            match event.kind {
                EventKind::Connection => match event.connection_status() {
                    Some(ConnectionStatus::Connected) => {
                        let _ = commands.send(SyncCommand::ConnectionUp);
                        let queue = Arc::clone(&queue);
                        tokio::spawn(async move {
                            if let Err(e) = queue.drain().await {
                                tracing::warn!("reconnect drain failed: {e}");
                            }
                        });
                    }
                    Some(ConnectionStatus::Disconnected) => {
                        let _ = commands.send(SyncCommand::ConnectionDown);
                    }
                    None => {}
                },
                kind => {
                    let _ = commands.send(SyncCommand::Notification(kind));
                }
            }
        }
    })
}

/// Forward pending-count changes into the coordinator snapshot.
fn spawn_pending_forwarder(
    mut pending_rx: watch::Receiver<usize>,
    commands: tokio::sync::mpsc::UnboundedSender<SyncCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while pending_rx.changed().await.is_ok() {
            let count = *pending_rx.borrow();
            let _ = commands.send(SyncCommand::PendingCount(count));
        }
    })
}
