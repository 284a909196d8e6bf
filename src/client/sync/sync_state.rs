//! # Sync State
//!
//! The coordinator's externally visible state: the lifecycle phase and the
//! materialized snapshot of every entity collection. Consumers read these
//! through watch channels and never touch the network or queue directly.

use crate::shared::models::{
    AppSettings, Bill, Category, Customer, Expense, MenuItem, Order, Payment, StaffMember,
    WaiterCall,
};
use chrono::{DateTime, Utc};

/// Coordinator lifecycle phase.
///
/// `Error` is reachable from `Loading` and is recoverable, not terminal; the
/// machine runs for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// Not yet activated
    #[default]
    Uninitialized,
    /// Initial or recovery refresh in progress
    Loading,
    /// Steady state, serving the materialized snapshot
    Ready,
    /// Backend unreachable during load; carries the failure reason
    Error(String),
}

impl SyncPhase {
    /// Whether the engine is serving a fully loaded snapshot
    pub fn is_ready(&self) -> bool {
        matches!(self, SyncPhase::Ready)
    }
}

/// Materialized view of every synchronized collection.
///
/// Each collection is a complete replacement snapshot of the backend's value
/// at the time of its last successful fetch.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub menu_items: Vec<MenuItem>,
    pub categories: Vec<Category>,
    pub orders: Vec<Order>,
    pub bills: Vec<Bill>,
    pub payments: Vec<Payment>,
    pub customers: Vec<Customer>,
    pub staff: Vec<StaffMember>,
    pub settings: Option<AppSettings>,
    pub expenses: Vec<Expense>,
    pub waiter_calls: Vec<WaiterCall>,
    /// When the last full refresh completed, for staleness display only
    pub last_sync: Option<DateTime<Utc>>,
    /// Locally queued mutations not yet replayed
    pub pending_mutations: usize,
}
