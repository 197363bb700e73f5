//! Catalog API Library
//!
//! Categories and products over HTTP, with filtered product listings and a
//! stock-checked purchase operation. Reads are open; writes need an API key.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod queries;
pub mod services;
pub mod tracing;

use axum::{routing::get, Extension, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let services = handlers::AppServices::new(db.clone(), &config.api_key_header);
        Self {
            db,
            config,
            services,
        }
    }
}

async fn route_not_found() -> errors::ServiceError {
    errors::ServiceError::NotFound("Not found.".to_string())
}

/// Every catalog route, plus health and the OpenAPI document.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::categories::categories_routes())
        .merge(handlers::products::products_routes())
        .route("/health", get(health::health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .fallback(route_not_found)
}

/// Routes with request ids, HTTP tracing and the API key store wired in.
/// Transport concerns (CORS, compression, timeouts) are left to the binary.
pub fn router(state: AppState) -> Router {
    let api_keys = state.services.api_keys.clone();
    catalog_routes()
        .layer(Extension(api_keys))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

/// Makes `/products/` and `/products` the same route.
pub fn normalize_trailing_slash(router: Router) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(router)
}

/// Fully assembled application as served and as exercised by tests.
pub fn app(state: AppState) -> NormalizePath<Router> {
    normalize_trailing_slash(router(state))
}
