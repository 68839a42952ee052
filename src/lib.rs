//! Storefront API Library
//!
//! Backend core of an e-commerce storefront: order fulfillment with a typed
//! status lifecycle, item-level partial refunds, and guest-to-account cart
//! reconciliation. Catalog, stock, and payment systems are collaborators
//! behind trait seams; persistence is sea-orm over SQLite or Postgres.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod payments;
pub mod services;

use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use catalog::ProductCatalog;
use payments::PaymentProcessor;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Builds the application state and its full service graph.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<config::AppConfig>,
        event_sender: events::EventSender,
        catalog: Arc<dyn ProductCatalog>,
        payments: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let services = handlers::AppServices::build(
            db.clone(),
            Arc::new(event_sender.clone()),
            config.clone(),
            catalog,
            payments,
        );

        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}
