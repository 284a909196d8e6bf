//! # Sync Coordinator
//!
//! The orchestrating state machine that keeps a device's materialized state
//! consistent with the backend-of-record.
//!
//! ## Architecture
//!
//! The coordinator is a single owning task: every mutation of the
//! materialized snapshot happens inside the actor loop, and every input --
//! activation, change notifications, connection events, fetch completions,
//! retry requests -- arrives as a [`SyncCommand`] on its channel. Other
//! tasks never touch the snapshot directly, which preserves the
//! no-concurrent-mutation invariant without a global lock.
//!
//! ## Lifecycle
//!
//! `Uninitialized -> Loading -> Ready`, with `Error` reachable from
//! `Loading` when the backend health probe fails. `Error` is recoverable:
//! a manual retry or a later reconnect re-enters `Loading`. On activation
//! the cached read-mostly collections are served immediately, then a full
//! parallel refresh of every collection runs. In `Ready`, notifications
//! trigger targeted refetches and a reconnect triggers a full refresh,
//! treating it like a first load to catch anything missed while offline.
//!
//! ## Ordering
//!
//! Targeted refetches run as spawned tasks stamped with a per-collection
//! generation. The actor applies a completion only if its generation is
//! still current, so a stale fetch that finishes after a newer one is
//! discarded: last-fetch-wins by issue order, not completion order.

pub mod network_monitor;
pub mod sync_state;

pub use network_monitor::ConnectivityMonitor;
pub use sync_state::{StateSnapshot, SyncPhase};

use crate::client::api::BackendClient;
use crate::client::local_db::LocalDatabase;
use crate::shared::error::SyncError;
use crate::shared::event::EventKind;
use crate::shared::models::{
    AppSettings, Bill, Category, Collection, Customer, Expense, MenuItem, Order, Payment,
    StaffMember, WaiterCall,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Inputs to the coordinator actor
#[derive(Debug)]
pub enum SyncCommand {
    /// First activation: probe the backend and perform the initial load
    Activate,
    /// Operator-initiated retry out of the error phase
    Retry,
    /// A change notification arrived on the push channel
    Notification(EventKind),
    /// The push channel (re)connected
    ConnectionUp,
    /// The push channel dropped
    ConnectionDown,
    /// Full refresh requested (connectivity regained, manual refresh)
    RefreshAll,
    /// A targeted collection fetch completed
    FetchDone {
        collection: Collection,
        generation: u64,
        result: Result<FetchedRows, SyncError>,
    },
    /// The mutation queue's pending count changed
    PendingCount(usize),
    /// Stop the actor
    Shutdown,
}

/// Rows fetched for one collection
#[derive(Debug)]
pub enum FetchedRows {
    MenuItems(Vec<MenuItem>),
    Categories(Vec<Category>),
    Orders(Vec<Order>),
    Bills(Vec<Bill>),
    Payments(Vec<Payment>),
    Customers(Vec<Customer>),
    Staff(Vec<StaffMember>),
    Settings(Option<AppSettings>),
    Expenses(Vec<Expense>),
    WaiterCalls(Vec<WaiterCall>),
}

/// Handle to the coordinator actor
pub struct SyncCoordinator {
    cmd_tx: mpsc::UnboundedSender<SyncCommand>,
    state_rx: watch::Receiver<StateSnapshot>,
    phase_rx: watch::Receiver<SyncPhase>,
    task: JoinHandle<()>,
}

impl SyncCoordinator {
    /// Spawn the actor task
    pub fn spawn(api: Arc<BackendClient>, db: Arc<LocalDatabase>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(StateSnapshot::default());
        let (phase_tx, phase_rx) = watch::channel(SyncPhase::Uninitialized);

        let actor = CoordinatorTask {
            api,
            db,
            cmd_tx: cmd_tx.clone(),
            state_tx,
            phase_tx,
            snapshot: StateSnapshot::default(),
            phase: SyncPhase::Uninitialized,
            generations: HashMap::new(),
        };
        let task = tokio::spawn(actor.run(cmd_rx));

        Self {
            cmd_tx,
            state_rx,
            phase_rx,
            task,
        }
    }

    /// Sender other components use to feed the actor
    pub fn command_sender(&self) -> mpsc::UnboundedSender<SyncCommand> {
        self.cmd_tx.clone()
    }

    /// Begin the initial load
    pub fn activate(&self) {
        let _ = self.cmd_tx.send(SyncCommand::Activate);
    }

    /// Retry after an error phase
    pub fn retry(&self) {
        let _ = self.cmd_tx.send(SyncCommand::Retry);
    }

    /// Watch the materialized snapshot
    pub fn state(&self) -> watch::Receiver<StateSnapshot> {
        self.state_rx.clone()
    }

    /// Watch the lifecycle phase
    pub fn phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase_rx.clone()
    }

    /// Stop the actor
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SyncCommand::Shutdown);
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The actor owning the materialized snapshot
struct CoordinatorTask {
    api: Arc<BackendClient>,
    db: Arc<LocalDatabase>,
    cmd_tx: mpsc::UnboundedSender<SyncCommand>,
    state_tx: watch::Sender<StateSnapshot>,
    phase_tx: watch::Sender<SyncPhase>,
    snapshot: StateSnapshot,
    phase: SyncPhase,
    generations: HashMap<Collection, u64>,
}

impl CoordinatorTask {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<SyncCommand>) {
        while let Some(command) = cmd_rx.recv().await {
            match command {
                SyncCommand::Activate | SyncCommand::Retry => match self.phase {
                    SyncPhase::Uninitialized | SyncPhase::Error(_) => self.activate().await,
                    _ => {}
                },
                SyncCommand::Notification(kind) => {
                    if matches!(self.phase, SyncPhase::Ready | SyncPhase::Loading) {
                        for &collection in kind.targets() {
                            self.start_refresh(collection);
                        }
                    }
                }
                SyncCommand::ConnectionUp | SyncCommand::RefreshAll => match self.phase {
                    SyncPhase::Ready => {
                        // A reconnect is treated like a first load so changes
                        // missed while disconnected are picked up.
                        self.full_refresh().await;
                    }
                    SyncPhase::Error(_) => self.activate().await,
                    _ => {}
                },
                SyncCommand::ConnectionDown => {
                    tracing::info!("push channel offline, serving materialized state");
                }
                SyncCommand::FetchDone {
                    collection,
                    generation,
                    result,
                } => self.finish_refresh(collection, generation, result).await,
                SyncCommand::PendingCount(count) => {
                    self.snapshot.pending_mutations = count;
                    self.publish_state();
                }
                SyncCommand::Shutdown => break,
            }
        }
    }

    async fn activate(&mut self) {
        self.set_phase(SyncPhase::Loading);
        self.load_cached().await;
        self.publish_state();

        if !self.api.check_health().await {
            let reason = format!("backend unreachable at {}", self.api.base_url());
            tracing::error!("{reason}");
            self.set_phase(SyncPhase::Error(reason));
            return;
        }

        self.full_refresh().await;
        self.set_phase(SyncPhase::Ready);
        tracing::info!("sync coordinator ready");
    }

    /// Serve cached read-mostly collections while loading
    async fn load_cached(&mut self) {
        match self.db.cached_menu_items().await {
            Ok(items) if !items.is_empty() => self.snapshot.menu_items = items,
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to read cached menu items: {e}"),
        }
        match self.db.cached_categories().await {
            Ok(categories) if !categories.is_empty() => self.snapshot.categories = categories,
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to read cached categories: {e}"),
        }
        match self.db.cached_settings().await {
            Ok(Some(settings)) => self.snapshot.settings = Some(settings),
            Ok(None) => {}
            Err(e) => tracing::warn!("failed to read cached settings: {e}"),
        }
        match self.db.last_sync_time().await {
            Ok(at) => self.snapshot.last_sync = at,
            Err(e) => tracing::warn!("failed to read sync cursor: {e}"),
        }
        match self.db.pending_mutation_count().await {
            Ok(count) => self.snapshot.pending_mutations = count,
            Err(e) => tracing::warn!("failed to count pending mutations: {e}"),
        }
    }

    /// Fetch every collection in parallel and replace the snapshot.
    ///
    /// Individual collection failures are tolerated: the previous (possibly
    /// cached) value stays in place so one failing endpoint does not block
    /// the rest of the application.
    async fn full_refresh(&mut self) {
        for collection in Collection::ALL {
            self.bump_generation(collection);
        }

        let api = &self.api;
        let (
            menu_items,
            categories,
            orders,
            bills,
            payments,
            customers,
            staff,
            settings,
            expenses,
            waiter_calls,
        ) = tokio::join!(
            api.menu_items(),
            api.categories(),
            api.orders(),
            api.bills(),
            api.payments(),
            api.customers(),
            api.staff(),
            api.settings(),
            api.expenses(),
            api.waiter_calls(),
        );

        let menu_items = self.apply_seed_rule(menu_items).await;

        self.adopt(Collection::MenuItems, menu_items.map(FetchedRows::MenuItems))
            .await;
        self.adopt(Collection::Categories, categories.map(FetchedRows::Categories))
            .await;
        self.adopt(Collection::Orders, orders.map(FetchedRows::Orders))
            .await;
        self.adopt(Collection::Bills, bills.map(FetchedRows::Bills))
            .await;
        self.adopt(Collection::Payments, payments.map(FetchedRows::Payments))
            .await;
        self.adopt(Collection::Customers, customers.map(FetchedRows::Customers))
            .await;
        self.adopt(Collection::Staff, staff.map(FetchedRows::Staff))
            .await;
        self.adopt(Collection::Settings, settings.map(FetchedRows::Settings))
            .await;
        self.adopt(Collection::Expenses, expenses.map(FetchedRows::Expenses))
            .await;
        self.adopt(
            Collection::WaiterCalls,
            waiter_calls.map(FetchedRows::WaiterCalls),
        )
        .await;

        let now = Utc::now();
        if let Err(e) = self.db.set_last_sync_time(now).await {
            tracing::warn!("failed to persist sync cursor: {e}");
        }
        self.snapshot.last_sync = Some(now);

        match self.db.pending_mutation_count().await {
            Ok(count) => self.snapshot.pending_mutations = count,
            Err(e) => tracing::warn!("failed to count pending mutations: {e}"),
        }

        self.publish_state();
    }

    /// First-writer seeding: if the backend menu is empty but this device
    /// has a cached menu, push each cached item so the first device to
    /// connect populates the shared database. Item failures are logged
    /// independently and the refresh proceeds with whatever succeeded.
    ///
    /// Every other collection adopts the backend's value even when empty.
    async fn apply_seed_rule(
        &self,
        fetched: Result<Vec<MenuItem>, SyncError>,
    ) -> Result<Vec<MenuItem>, SyncError> {
        let Ok(items) = &fetched else {
            return fetched;
        };
        if !items.is_empty() {
            return fetched;
        }

        let cached = match self.db.cached_menu_items().await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("failed to read cached menu for seeding: {e}");
                return fetched;
            }
        };
        if cached.is_empty() {
            return fetched;
        }

        tracing::info!(count = cached.len(), "backend menu empty, seeding from local cache");
        let mut seeded = Vec::with_capacity(cached.len());
        for item in cached {
            match self.api.create_menu_item(&item).await {
                Ok(created) => seeded.push(created),
                Err(e) => tracing::warn!(item = %item.name, "menu seed push failed: {e}"),
            }
        }
        Ok(seeded)
    }

    async fn adopt(&mut self, collection: Collection, result: Result<FetchedRows, SyncError>) {
        match result {
            Ok(rows) => self.apply_rows(rows).await,
            Err(e) => tracing::warn!(
                collection = collection.name(),
                "collection refresh failed, keeping previous value: {e}"
            ),
        }
    }

    /// Replace one collection in the snapshot, writing read-mostly
    /// collections through to the cache.
    async fn apply_rows(&mut self, rows: FetchedRows) {
        match rows {
            FetchedRows::MenuItems(items) => {
                if let Err(e) = self.db.replace_cached_menu_items(&items).await {
                    tracing::warn!("failed to cache menu items: {e}");
                }
                self.snapshot.menu_items = items;
            }
            FetchedRows::Categories(categories) => {
                if let Err(e) = self.db.replace_cached_categories(&categories).await {
                    tracing::warn!("failed to cache categories: {e}");
                }
                self.snapshot.categories = categories;
            }
            FetchedRows::Settings(settings) => {
                if let Some(settings) = &settings {
                    if let Err(e) = self.db.save_settings(settings).await {
                        tracing::warn!("failed to cache settings: {e}");
                    }
                }
                self.snapshot.settings = settings;
            }
            FetchedRows::Orders(orders) => self.snapshot.orders = orders,
            FetchedRows::Bills(bills) => self.snapshot.bills = bills,
            FetchedRows::Payments(payments) => self.snapshot.payments = payments,
            FetchedRows::Customers(customers) => self.snapshot.customers = customers,
            FetchedRows::Staff(staff) => self.snapshot.staff = staff,
            FetchedRows::Expenses(expenses) => self.snapshot.expenses = expenses,
            FetchedRows::WaiterCalls(calls) => self.snapshot.waiter_calls = calls,
        }
    }

    /// Issue a targeted refetch of one collection as a spawned task.
    fn start_refresh(&mut self, collection: Collection) {
        let generation = self.bump_generation(collection);
        let api = Arc::clone(&self.api);
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let result = fetch_collection(&api, collection).await;
            let _ = cmd_tx.send(SyncCommand::FetchDone {
                collection,
                generation,
                result,
            });
        });
    }

    /// Apply a targeted fetch completion unless a newer fetch superseded it.
    async fn finish_refresh(
        &mut self,
        collection: Collection,
        generation: u64,
        result: Result<FetchedRows, SyncError>,
    ) {
        if self.generations.get(&collection).copied().unwrap_or(0) != generation {
            tracing::debug!(
                collection = collection.name(),
                "discarding stale fetch result"
            );
            return;
        }
        match result {
            Ok(rows) => {
                self.apply_rows(rows).await;
                self.publish_state();
            }
            Err(e) => tracing::warn!(
                collection = collection.name(),
                "targeted refresh failed, keeping previous value: {e}"
            ),
        }
    }

    fn bump_generation(&mut self, collection: Collection) -> u64 {
        let generation = self.generations.entry(collection).or_insert(0);
        *generation += 1;
        *generation
    }

    fn set_phase(&mut self, phase: SyncPhase) {
        self.phase = phase.clone();
        let _ = self.phase_tx.send(phase);
    }

    fn publish_state(&self) {
        let _ = self.state_tx.send(self.snapshot.clone());
    }
}

/// Fetch the current backend value of one collection
async fn fetch_collection(
    api: &BackendClient,
    collection: Collection,
) -> Result<FetchedRows, SyncError> {
    match collection {
        Collection::MenuItems => api.menu_items().await.map(FetchedRows::MenuItems),
        Collection::Categories => api.categories().await.map(FetchedRows::Categories),
        Collection::Orders => api.orders().await.map(FetchedRows::Orders),
        Collection::Bills => api.bills().await.map(FetchedRows::Bills),
        Collection::Payments => api.payments().await.map(FetchedRows::Payments),
        Collection::Customers => api.customers().await.map(FetchedRows::Customers),
        Collection::Staff => api.staff().await.map(FetchedRows::Staff),
        Collection::Settings => api.settings().await.map(FetchedRows::Settings),
        Collection::Expenses => api.expenses().await.map(FetchedRows::Expenses),
        Collection::WaiterCalls => api.waiter_calls().await.map(FetchedRows::WaiterCalls),
    }
}
