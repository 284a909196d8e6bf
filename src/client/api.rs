//! # Backend-of-Record Client
//!
//! Thin HTTP wrapper over the backend's per-collection endpoints. The engine
//! consumes exactly three shapes of endpoint: `getAll` per collection, a
//! `create` used while seeding the shared menu and replaying queued
//! mutations, and a fast side-effect-free health probe.
//!
//! Failure semantics are deliberately blunt: an endpoint's absence, a
//! timeout, and an explicit error status are all the same failure. Only a
//! 2xx response counts as success on the replay path.

use crate::shared::config::Config;
use crate::shared::error::SyncError;
use crate::shared::models::{
    AppSettings, Bill, Category, Customer, Expense, MenuItem, Order, Payment, StaffMember,
    WaiterCall,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// HTTP client for the backend-of-record
#[derive(Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
}

impl BackendClient {
    /// Create a new client from the engine configuration
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.server_url().trim_end_matches('/').to_string(),
            health_timeout: config.health_timeout(),
        })
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::http(path, format!("status {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::http(path, format!("invalid response body: {e}")))
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SyncError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::http(path, format!("status {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::http(path, format!("invalid response body: {e}")))
    }

    /// Submit a JSON payload where only the status code matters
    async fn post_accepted<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), SyncError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::http(path, format!("status {status}")));
        }
        Ok(())
    }

    /// Fetch all menu items
    pub async fn menu_items(&self) -> Result<Vec<MenuItem>, SyncError> {
        self.get_json("/api/menu-items").await
    }

    /// Fetch all categories
    pub async fn categories(&self) -> Result<Vec<Category>, SyncError> {
        self.get_json("/api/categories").await
    }

    /// Fetch all orders
    pub async fn orders(&self) -> Result<Vec<Order>, SyncError> {
        self.get_json("/api/orders").await
    }

    /// Fetch all bills
    pub async fn bills(&self) -> Result<Vec<Bill>, SyncError> {
        self.get_json("/api/bills").await
    }

    /// Fetch all recorded payments
    pub async fn payments(&self) -> Result<Vec<Payment>, SyncError> {
        self.get_json("/api/transactions").await
    }

    /// Fetch all customers
    pub async fn customers(&self) -> Result<Vec<Customer>, SyncError> {
        self.get_json("/api/customers").await
    }

    /// Fetch all staff members
    pub async fn staff(&self) -> Result<Vec<StaffMember>, SyncError> {
        self.get_json("/api/staff").await
    }

    /// Fetch all expenses
    pub async fn expenses(&self) -> Result<Vec<Expense>, SyncError> {
        self.get_json("/api/expenses").await
    }

    /// Fetch all open waiter calls
    pub async fn waiter_calls(&self) -> Result<Vec<WaiterCall>, SyncError> {
        self.get_json("/api/waiter-calls").await
    }

    /// Fetch the settings singleton. A 404 means no settings exist yet.
    pub async fn settings(&self) -> Result<Option<AppSettings>, SyncError> {
        let response = self.http.get(self.url("/api/settings")).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SyncError::http("/api/settings", format!("status {status}")));
        }
        let settings = response
            .json::<AppSettings>()
            .await
            .map_err(|e| SyncError::http("/api/settings", format!("invalid response body: {e}")))?;
        Ok(Some(settings))
    }

    /// Push one menu item to the backend, returning the stored record with
    /// any server-assigned fields
    pub async fn create_menu_item(&self, item: &MenuItem) -> Result<MenuItem, SyncError> {
        self.post_json("/api/menu-items", item).await
    }

    /// Replay a queued order mutation
    pub async fn submit_order(&self, payload: &serde_json::Value) -> Result<(), SyncError> {
        self.post_accepted("/api/orders", payload).await
    }

    /// Replay a queued waiter-call mutation
    pub async fn submit_waiter_call(&self, payload: &serde_json::Value) -> Result<(), SyncError> {
        self.post_accepted("/api/waiter-calls", payload).await
    }

    /// Probe backend reachability.
    ///
    /// Uses its own short timeout rather than the general request timeout so
    /// a dead backend is detected quickly. Never errors: any failure mode is
    /// reported as `false`.
    pub async fn check_health(&self) -> bool {
        let request = self
            .http
            .get(self.url("/api/health"))
            .timeout(self.health_timeout);
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
