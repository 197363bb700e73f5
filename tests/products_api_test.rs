mod common;

use axum::http::{Method, StatusCode};
use common::{read_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn create_product_with_defaults() {
    let app = TestApp::new().await;

    let product = app
        .create_product(json!({ "name": "Desk Lamp", "price": 18 }))
        .await;

    assert_eq!(product["name"], "Desk Lamp");
    assert_eq!(product["price"], "18.00");
    assert_eq!(product["stock_quantity"], 0);
    assert_eq!(product["is_featured"], false);
    assert!(product["category"].is_null());
    assert!(product["description"].is_null());
    assert!(product["image_url"].is_null());
    assert!(product["id"].is_i64());
}

#[tokio::test]
async fn read_only_fields_are_ignored_on_write() {
    let app = TestApp::new().await;

    let product = app
        .create_product(json!({
            "id": 777,
            "name": "Lamp",
            "price": "9.99",
            "created_at": "2000-01-01T00:00:00Z",
        }))
        .await;

    assert_ne!(product["id"], 777);
    assert_ne!(product["created_at"], "2000-01-01T00:00:00Z");
    assert_eq!(product["price"], "9.99");
}

#[tokio::test]
async fn invalid_fields_are_reported_together() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/products/",
            Some(json!({
                "price": "-1",
                "stock_quantity": -3,
                "image_url": "not a url",
            })),
        )
        .await;
    let (status, body) = read_json(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Validation failed");
    assert_eq!(body["errors"]["name"][0], "This field is required.");
    assert_eq!(
        body["errors"]["price"][0],
        "Ensure this value is greater than or equal to 0."
    );
    assert!(body["errors"]["stock_quantity"].is_array());
    assert_eq!(body["errors"]["image_url"][0], "Enter a valid URL.");

    let (_, listing) = app.get_json("/products/").await;
    assert_eq!(listing, json!([]));
}

#[tokio::test]
async fn price_precision_is_enforced() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/products/",
            Some(json!({ "name": "Lamp", "price": "1.005" })),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"]["price"][0],
        "Ensure that there are no more than 2 decimal places."
    );
}

#[tokio::test]
async fn duplicate_product_name_is_rejected() {
    let app = TestApp::new().await;
    app.create_product(json!({ "name": "Lamp", "price": "5.00" }))
        .await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/products/",
            Some(json!({ "name": "Lamp", "price": "6.00" })),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"]["name"][0],
        "product with this name already exists."
    );
}

#[tokio::test]
async fn unknown_category_reference_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/products/",
            Some(json!({ "name": "Lamp", "price": "5.00", "category": 5 })),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"]["category"][0],
        "Invalid pk \"5\" - object does not exist."
    );
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new().await;
    let credential = format!("Api-Key {}", app.api_key());

    let response = app
        .request_with_headers(
            Method::POST,
            "/products/",
            None,
            &[
                ("authorization", credential.as_str()),
                ("content-type", "application/json"),
            ],
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn put_replaces_required_fields_and_keeps_omitted_ones() {
    let app = TestApp::new().await;
    let books = app.create_category("Books").await;
    let product = app
        .create_product(json!({
            "name": "Lamp",
            "price": "5.00",
            "stock_quantity": 3,
            "description": "Bright",
            "category": books,
        }))
        .await;
    let uri = format!("/products/{}/", product["id"]);

    let response = app
        .request_authenticated(Method::PUT, &uri, Some(json!({ "name": "Lamp" })))
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["price"][0], "This field is required.");

    let response = app
        .request_authenticated(
            Method::PUT,
            &uri,
            Some(json!({ "name": "Lamp XL", "price": "7.50" })),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Lamp XL");
    assert_eq!(body["price"], "7.50");
    assert_eq!(body["stock_quantity"], 3);
    assert_eq!(body["description"], "Bright");
    assert_eq!(body["category"], books);
}

#[tokio::test]
async fn patch_can_restock_and_clear_nullable_fields() {
    let app = TestApp::new().await;
    let books = app.create_category("Books").await;
    let product = app
        .create_product(json!({
            "name": "Lamp",
            "price": "5.00",
            "image_url": "https://example.com/lamp.png",
            "category": books,
        }))
        .await;
    let uri = format!("/products/{}/", product["id"]);

    let response = app
        .request_authenticated(
            Method::PATCH,
            &uri,
            Some(json!({ "stock_quantity": 120, "category": null, "is_featured": true })),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stock_quantity"], 120);
    assert!(body["category"].is_null());
    assert_eq!(body["is_featured"], true);
    assert_eq!(body["image_url"], "https://example.com/lamp.png");
    assert_eq!(body["price"], "5.00");
}

#[tokio::test]
async fn delete_then_not_found() {
    let app = TestApp::new().await;
    let product = app
        .create_product(json!({ "name": "Lamp", "price": "5.00" }))
        .await;
    let uri = format!("/products/{}", product["id"]);

    let response = app
        .request_authenticated(Method::DELETE, &uri, None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (status, _) = app.get_json(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = app
        .request_authenticated(Method::DELETE, &uri, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new().await;
    let (status, body) = app.get_json("/warehouses/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());
}
