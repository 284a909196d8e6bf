//! # Change Notification Events
//!
//! This module defines the typed change notifications delivered over the
//! push channel, plus the synthetic `connection` status events the channel
//! emits locally on connect and disconnect.
//!
//! # Wire Format
//!
//! The push channel carries a JSON envelope per message:
//!
//! ```json
//! { "type": "ORDER_UPDATE", "data": { ... } }
//! ```
//!
//! `type` identifies which collection was mutated server-side; `data` carries
//! whatever identification the backend attaches. Notifications are idempotent
//! triggers: receiving the same one twice only causes a redundant refetch.
//! Unrecognized types parse into [`EventKind::Unknown`] and are ignored
//! downstream rather than treated as errors.

use crate::shared::error::SyncError;
use crate::shared::models::Collection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of change notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Menu items or categories changed
    MenuUpdate,
    /// Orders changed
    OrderUpdate,
    /// Bills changed (settlement also touches transactions)
    BillUpdate,
    /// Customers changed
    CustomerUpdate,
    /// A waiter call was raised or acknowledged
    WaiterCall,
    /// The settings singleton changed
    SettingsUpdate,
    /// Expenses changed
    ExpenseUpdate,
    /// Staff changed
    StaffUpdate,
    /// Local channel status event, never sent by the backend
    Connection,
    /// Unrecognized message type, ignored without error
    Unknown(String),
}

impl EventKind {
    /// Parse a wire `type` value
    pub fn from_wire(value: &str) -> Self {
        match value {
            "MENU_UPDATE" => EventKind::MenuUpdate,
            "ORDER_UPDATE" => EventKind::OrderUpdate,
            "BILL_UPDATE" => EventKind::BillUpdate,
            "CUSTOMER_UPDATE" => EventKind::CustomerUpdate,
            "WAITER_CALL" => EventKind::WaiterCall,
            "SETTINGS_UPDATE" => EventKind::SettingsUpdate,
            "EXPENSE_UPDATE" => EventKind::ExpenseUpdate,
            "STAFF_UPDATE" => EventKind::StaffUpdate,
            "connection" => EventKind::Connection,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    /// The wire `type` value for this kind
    pub fn as_wire(&self) -> &str {
        match self {
            EventKind::MenuUpdate => "MENU_UPDATE",
            EventKind::OrderUpdate => "ORDER_UPDATE",
            EventKind::BillUpdate => "BILL_UPDATE",
            EventKind::CustomerUpdate => "CUSTOMER_UPDATE",
            EventKind::WaiterCall => "WAITER_CALL",
            EventKind::SettingsUpdate => "SETTINGS_UPDATE",
            EventKind::ExpenseUpdate => "EXPENSE_UPDATE",
            EventKind::StaffUpdate => "STAFF_UPDATE",
            EventKind::Connection => "connection",
            EventKind::Unknown(other) => other,
        }
    }

    /// The collection-mutation kinds a device subscribes to
    pub fn collection_kinds() -> [EventKind; 8] {
        [
            EventKind::MenuUpdate,
            EventKind::OrderUpdate,
            EventKind::BillUpdate,
            EventKind::CustomerUpdate,
            EventKind::WaiterCall,
            EventKind::SettingsUpdate,
            EventKind::ExpenseUpdate,
            EventKind::StaffUpdate,
        ]
    }

    /// The collections a notification of this kind invalidates.
    ///
    /// `BILL_UPDATE` refreshes bills and transactions together because
    /// settling a bill records a payment in the same backend operation;
    /// `MENU_UPDATE` covers both menu items and their categories.
    pub fn targets(&self) -> &'static [Collection] {
        match self {
            EventKind::MenuUpdate => &[Collection::MenuItems, Collection::Categories],
            EventKind::OrderUpdate => &[Collection::Orders],
            EventKind::BillUpdate => &[Collection::Bills, Collection::Payments],
            EventKind::CustomerUpdate => &[Collection::Customers],
            EventKind::WaiterCall => &[Collection::WaiterCalls],
            EventKind::SettingsUpdate => &[Collection::Settings],
            EventKind::ExpenseUpdate => &[Collection::Expenses],
            EventKind::StaffUpdate => &[Collection::Staff],
            EventKind::Connection | EventKind::Unknown(_) => &[],
        }
    }
}

/// Channel connection status carried by `connection` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// A parsed change notification
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// What kind of change this is
    pub kind: EventKind,
    /// Collection-specific payload
    pub payload: serde_json::Value,
    /// When this device received the notification
    pub received_at: DateTime<Utc>,
}

/// Wire envelope for push channel messages
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ChangeEvent {
    /// Create a new event
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Create a local channel status event
    pub fn connection(status: ConnectionStatus) -> Self {
        Self::new(
            EventKind::Connection,
            serde_json::json!({ "status": status }),
        )
    }

    /// Read the status out of a `connection` event
    pub fn connection_status(&self) -> Option<ConnectionStatus> {
        if self.kind != EventKind::Connection {
            return None;
        }
        serde_json::from_value(self.payload.get("status")?.clone()).ok()
    }

    /// Parse a raw push channel frame
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Ok(Self::new(EventKind::from_wire(&envelope.kind), envelope.data))
    }

    /// Encode this event as a wire frame
    pub fn to_wire(&self) -> Result<String, SyncError> {
        let envelope = Envelope {
            kind: self.kind.as_wire().to_string(),
            data: self.payload.clone(),
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_kind() {
        let event = ChangeEvent::parse(r#"{"type":"ORDER_UPDATE","data":{"id":"abc"}}"#).unwrap();
        assert_eq!(event.kind, EventKind::OrderUpdate);
        assert_eq!(event.payload["id"], "abc");
    }

    #[test]
    fn test_parse_unknown_kind_is_not_an_error() {
        let event = ChangeEvent::parse(r#"{"type":"KITCHEN_TIMER","data":{}}"#).unwrap();
        assert_eq!(event.kind, EventKind::Unknown("KITCHEN_TIMER".to_string()));
        assert!(event.kind.targets().is_empty());
    }

    #[test]
    fn test_parse_missing_data_defaults_to_null() {
        let event = ChangeEvent::parse(r#"{"type":"STAFF_UPDATE"}"#).unwrap();
        assert_eq!(event.kind, EventKind::StaffUpdate);
        assert!(event.payload.is_null());
    }

    #[test]
    fn test_parse_malformed_frame_fails() {
        assert!(ChangeEvent::parse("{ not json").is_err());
        assert!(ChangeEvent::parse(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn test_bill_update_targets_bills_and_payments() {
        let targets = EventKind::BillUpdate.targets();
        assert_eq!(targets, &[Collection::Bills, Collection::Payments]);
    }

    #[test]
    fn test_wire_roundtrip() {
        let event = ChangeEvent::new(EventKind::MenuUpdate, serde_json::json!({"n": 1}));
        let wire = event.to_wire().unwrap();
        let back = ChangeEvent::parse(&wire).unwrap();
        assert_eq!(back.kind, EventKind::MenuUpdate);
        assert_eq!(back.payload, event.payload);
    }

    #[test]
    fn test_connection_event_status() {
        let event = ChangeEvent::connection(ConnectionStatus::Connected);
        assert_eq!(event.connection_status(), Some(ConnectionStatus::Connected));

        let other = ChangeEvent::new(EventKind::OrderUpdate, serde_json::Value::Null);
        assert_eq!(other.connection_status(), None);
    }
}
