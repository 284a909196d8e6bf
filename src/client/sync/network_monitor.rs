//! # Connectivity Monitor
//!
//! Tracks backend reachability with an active health probe on a fixed tick.
//! Transitions to online trigger a queue drain and a coordinator refresh;
//! every healthy tick also drains, so a missed transition signal cannot
//! strand queued mutations indefinitely.

use crate::client::api::BackendClient;
use crate::client::offline::MutationQueue;
use crate::client::sync::SyncCommand;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Periodic backend reachability monitor
pub struct ConnectivityMonitor {
    api: Arc<BackendClient>,
    queue: Arc<MutationQueue>,
    commands: tokio::sync::mpsc::UnboundedSender<SyncCommand>,
    interval: Duration,
    online_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Create a monitor. Probing starts with `start()`.
    pub fn new(
        api: Arc<BackendClient>,
        queue: Arc<MutationQueue>,
        commands: tokio::sync::mpsc::UnboundedSender<SyncCommand>,
        interval: Duration,
    ) -> Self {
        let (online_tx, _) = watch::channel(false);
        Self {
            api,
            queue,
            commands,
            interval,
            online_tx,
            task: Mutex::new(None),
        }
    }

    /// Start the probe loop. A second call while running is a no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        let api = Arc::clone(&self.api);
        let queue = Arc::clone(&self.queue);
        let commands = self.commands.clone();
        let online_tx = self.online_tx.clone();
        let interval = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let healthy = api.check_health().await;
                let was_online = *online_tx.borrow();

                if healthy != was_online {
                    let _ = online_tx.send(healthy);
                    if healthy {
                        tracing::info!("backend reachable again");
                        let _ = commands.send(SyncCommand::RefreshAll);
                    } else {
                        tracing::warn!("backend became unreachable");
                    }
                }

                // Drain on every healthy tick, not only on transitions, to
                // recover when the transition signal itself was missed.
                if healthy {
                    if let Err(e) = queue.drain().await {
                        tracing::warn!("periodic drain failed: {e}");
                    }
                }
            }
        }));
    }

    /// Stop probing
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    /// Current reachability status
    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    /// Watch online/offline transitions
    pub fn online_watch(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }
}
