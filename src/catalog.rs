/*!
 * # Catalog Collaborator
 *
 * Boundary to the product catalog and stock systems. The core never owns
 * product data; it reads stock levels and purchase-time snapshots through
 * this trait and treats outages as retryable failures.
 */

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Catalog collaborator errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Product {0} not found")]
    ProductNotFound(Uuid),
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ProductNotFound(id) => {
                ServiceError::ValidationError(format!("Unknown product {}", id))
            }
            CatalogError::Unavailable(msg) => ServiceError::ServiceUnavailable(msg),
        }
    }
}

/// Denormalized product data captured onto order items at purchase time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: Uuid,
    pub name: String,
    pub model: String,
    pub price: Decimal,
    pub currency: String,
}

/// Catalog trait for different implementations
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Current sellable stock for a product.
    async fn stock_level(&self, product_id: Uuid) -> Result<i32, CatalogError>;

    /// Purchase-time snapshot of a product.
    async fn product_snapshot(&self, product_id: Uuid) -> Result<ProductSnapshot, CatalogError>;
}

/// Runs a collaborator call under a timeout budget. An elapsed timeout is a
/// retryable failure; no state change may have been applied by then.
pub async fn with_timeout<T, E, F>(budget: Duration, what: &str, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<ServiceError>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ServiceError::ServiceUnavailable(format!(
            "{} timed out after {:?}",
            what, budget
        ))),
    }
}

/// In-memory catalog implementation
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: DashMap<Uuid, (ProductSnapshot, i32)>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a product with its snapshot and initial stock.
    pub fn insert(&self, snapshot: ProductSnapshot, stock: i32) {
        self.products
            .insert(snapshot.product_id, (snapshot, stock));
    }

    pub fn set_stock(&self, product_id: Uuid, stock: i32) {
        if let Some(mut entry) = self.products.get_mut(&product_id) {
            entry.1 = stock;
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn stock_level(&self, product_id: Uuid) -> Result<i32, CatalogError> {
        self.products
            .get(&product_id)
            .map(|entry| entry.1)
            .ok_or(CatalogError::ProductNotFound(product_id))
    }

    async fn product_snapshot(&self, product_id: Uuid) -> Result<ProductSnapshot, CatalogError> {
        self.products
            .get(&product_id)
            .map(|entry| entry.0.clone())
            .ok_or(CatalogError::ProductNotFound(product_id))
    }
}
