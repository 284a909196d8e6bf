//! # Domain Records
//!
//! Record types for every entity collection the engine synchronizes. These
//! types cross the wire to and from the backend-of-record and are persisted
//! verbatim in the local cache, so all of them carry serde derives.
//!
//! Each record has a `Uuid` identifier unique within its collection. The
//! materialized local collection is always a complete replacement snapshot
//! after a refresh, never a partial patch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named entity collections synchronized as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    MenuItems,
    Categories,
    Orders,
    Bills,
    Payments,
    Customers,
    Staff,
    Settings,
    Expenses,
    WaiterCalls,
}

impl Collection {
    /// Every collection, in refresh order.
    pub const ALL: [Collection; 10] = [
        Collection::MenuItems,
        Collection::Categories,
        Collection::Orders,
        Collection::Bills,
        Collection::Payments,
        Collection::Customers,
        Collection::Staff,
        Collection::Settings,
        Collection::Expenses,
        Collection::WaiterCalls,
    ];

    /// Stable name used in logs and metadata keys.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::MenuItems => "menu_items",
            Collection::Categories => "categories",
            Collection::Orders => "orders",
            Collection::Bills => "bills",
            Collection::Payments => "payments",
            Collection::Customers => "customers",
            Collection::Staff => "staff",
            Collection::Settings => "settings",
            Collection::Expenses => "expenses",
            Collection::WaiterCalls => "waiter_calls",
        }
    }
}

/// A sellable item on the venue's menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Unique identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Price in minor currency units
    pub price_cents: i64,
    /// Owning category, if any
    #[serde(default)]
    pub category_id: Option<Uuid>,
    /// Whether the item can currently be ordered
    #[serde(default = "default_true")]
    pub available: bool,
    /// Optional menu description
    #[serde(default)]
    pub description: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl MenuItem {
    /// Create a new menu item with a fresh identifier
    pub fn new(name: impl Into<String>, price_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price_cents,
            category_id: None,
            available: true,
            description: None,
            created_at: Utc::now(),
        }
    }
}

/// Menu category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    /// Display ordering, lowest first
    #[serde(default)]
    pub sort_order: i32,
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Served,
    Cancelled,
}

/// A single line within an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub menu_item_id: Uuid,
    /// Item name at the time of ordering
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl OrderLine {
    /// Total for this line in minor currency units
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// A customer order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Table or pickup label
    #[serde(default)]
    pub table_label: Option<String>,
    pub lines: Vec<OrderLine>,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub placed_at: DateTime<Utc>,
}

/// A bill grouping one or more orders for settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub order_ids: Vec<Uuid>,
    #[serde(default)]
    pub table_label: Option<String>,
    pub total_cents: i64,
    /// Whether the bill has been fully paid
    #[serde(default)]
    pub settled: bool,
    pub opened_at: DateTime<Utc>,
}

/// How a payment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mobile,
}

/// A settled payment against a bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
}

/// A known customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Staff role determining which screens a member operates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Manager,
    Waiter,
    Kitchen,
    Cashier,
}

/// A staff member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: Uuid,
    pub name: String,
    pub role: StaffRole,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Venue-wide settings singleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub venue_name: String,
    /// ISO 4217 currency code
    pub currency: String,
    #[serde(default)]
    pub tax_rate_percent: f64,
    #[serde(default)]
    pub service_charge_percent: f64,
    /// Number of tables available for seating
    #[serde(default)]
    pub table_count: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            venue_name: String::new(),
            currency: "USD".to_string(),
            tax_rate_percent: 0.0,
            service_charge_percent: 0.0,
            table_count: 0,
        }
    }
}

/// A recorded business expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub description: String,
    pub amount_cents: i64,
    pub incurred_at: DateTime<Utc>,
}

/// A call-waiter request raised from a customer screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaiterCall {
    pub id: Uuid,
    pub table_label: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub acknowledged: bool,
    pub called_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}
