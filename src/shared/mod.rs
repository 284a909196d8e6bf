//! Shared Module
//!
//! Types shared between the engine internals and its consumers: the domain
//! records for every synchronized collection, the change-notification
//! envelope carried by the push channel, the crate-wide error type, and the
//! engine configuration. Everything here is serializable and free of any
//! networking or storage concerns.

/// Domain records for synchronized collections
pub mod models;

/// Change notification events
pub mod event;

/// Shared error types
pub mod error;

/// Engine configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{Config, ConfigBuilder, ConfigError};
pub use error::SyncError;
pub use event::{ChangeEvent, ConnectionStatus, EventKind};
pub use models::Collection;
