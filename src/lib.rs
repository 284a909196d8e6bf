//! tillsync - Real-Time POS State Synchronization
//!
//! tillsync keeps every device in a multi-device point-of-sale deployment
//! (kitchen display, counter terminal, admin dashboard, customer ordering
//! screens) consistent with a shared backend-of-record, and keeps the
//! devices usable when connectivity to that backend is intermittent.
//!
//! # Overview
//!
//! The engine does four things:
//!
//! - Maintains a long-lived push channel that delivers typed change
//!   notifications, reconnecting with bounded backoff when it drops
//! - Materializes a unified snapshot of every entity collection (menu,
//!   orders, bills, customers, staff, settings, expenses, waiter calls,
//!   transactions), refreshed wholesale from the backend on notification
//! - Buffers locally-originated writes in a durable queue while offline and
//!   replays them in order once connectivity returns
//! - Monitors backend reachability and reconciles on every recovery
//!
//! # Module Structure
//!
//! - **`shared`** - Domain records, the change-notification envelope, the
//!   crate error type, and configuration
//! - **`client`** - The engine itself: backend API client, push channel,
//!   local database, mutation queue, connectivity monitor, and the sync
//!   coordinator, assembled by [`client::SyncEngine`]
//!
//! # Consistency Model
//!
//! Reconciliation is last-writer-wins at entity-collection granularity:
//! a change notification triggers a refetch of the named collection and an
//! in-place replacement of the materialized snapshot, never a merge of
//! concurrent edits to the same record. Stale fetches that complete after a
//! newer one are discarded, so the final view always reflects the most
//! recently issued fetch.
//!
//! # Thread Safety
//!
//! All snapshot mutations are serialized through a single coordinator task;
//! other components communicate with it only via message passing. Consumers
//! read through `watch` channels and never lock the engine's internals.

/// Shared types and data structures
pub mod shared;

/// Device-side synchronization engine
pub mod client;

pub use client::SyncEngine;
pub use shared::config::Config;
pub use shared::error::SyncError;
