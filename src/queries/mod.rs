use async_trait::async_trait;
use sea_orm::DatabaseConnection;

use crate::errors::ServiceError;

pub mod products;

pub use products::{ListProductsQuery, ProductOrdering, ProductSortField};

/// Trait representing a generic asynchronous read query.
#[async_trait]
pub trait Query: Send + Sync {
    type Result: Send + Sync;

    /// Executes the query using the provided database connection
    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError>;
}
