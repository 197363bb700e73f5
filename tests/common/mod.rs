#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use catalog_api::{config::AppConfig, db, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::normalize_path::NormalizePath;

/// Helper harness for spinning up the application against a throwaway SQLite file.
pub struct TestApp {
    app: NormalizePath<Router>,
    pub state: AppState,
    api_key: String,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state and one issued key.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("catalog_test.db");

        let mut cfg = AppConfig::new(format!("sqlite://{}?mode=rwc", db_path.display()), "test");
        cfg.db_max_connections = 4;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let issued = state
            .services
            .api_keys
            .issue("test suite", None)
            .await
            .expect("issue test API key");

        Self {
            app: catalog_api::app(state.clone()),
            state,
            api_key: issued.key,
            _db_dir: db_dir,
        }
    }

    /// Plaintext key accepted by the write routes.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Send a request with an optional `Authorization: Api-Key` credential.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        api_key: Option<&str>,
    ) -> Response {
        let credential = api_key.map(|key| format!("Api-Key {key}"));
        let headers: Vec<(&str, &str)> = credential
            .iter()
            .map(|value| ("authorization", value.as_str()))
            .collect();
        self.request_with_headers(method, uri, body, &headers).await
    }

    /// Convenience helper for requests carrying the suite's API key.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.api_key())).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// POST a category through the API and return its id.
    pub async fn create_category(&self, name: &str) -> i64 {
        let response = self
            .request_authenticated(Method::POST, "/categories/", Some(json!({ "name": name })))
            .await;
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::CREATED, "seed category failed: {body}");
        body["id"].as_i64().expect("category id")
    }

    /// POST a product through the API and return the response body.
    pub async fn create_product(&self, payload: Value) -> Value {
        let response = self
            .request_authenticated(Method::POST, "/products/", Some(payload))
            .await;
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::CREATED, "seed product failed: {body}");
        body
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        read_json(self.request(Method::GET, uri, None, None).await).await
    }
}

/// Split a response into its status and parsed JSON body (`Null` when empty).
pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is JSON")
    };
    (status, body)
}

/// Product names of a listing response, in order.
pub fn names(listing: &Value) -> Vec<String> {
    listing
        .as_array()
        .expect("listing is an array")
        .iter()
        .map(|p| p["name"].as_str().unwrap_or_default().to_string())
        .collect()
}
