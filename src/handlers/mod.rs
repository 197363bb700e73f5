pub mod categories;
pub mod common;
pub mod products;

use crate::auth::ApiKeyService;
use crate::db::DbPool;
use crate::services::{CategoryService, ProductService};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub categories: Arc<CategoryService>,
    pub products: Arc<ProductService>,
    pub api_keys: Arc<ApiKeyService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, api_key_header: &str) -> Self {
        Self {
            categories: Arc::new(CategoryService::new(db_pool.clone())),
            products: Arc::new(ProductService::new(db_pool.clone())),
            api_keys: Arc::new(ApiKeyService::new(db_pool).with_header(api_key_header)),
        }
    }
}
