mod common;

use axum::http::{Method, StatusCode};
use common::{read_json, TestApp};
use rstest::rstest;
use serde_json::{json, Value};

async fn product_with_stock(app: &TestApp, stock: i64) -> String {
    let product = app
        .create_product(json!({ "name": "Lamp", "price": "18.00", "stock_quantity": stock }))
        .await;
    format!("/products/{}/", product["id"])
}

async fn purchase(app: &TestApp, product_uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response = app
        .request_authenticated(Method::POST, &format!("{product_uri}purchase/"), body)
        .await;
    read_json(response).await
}

async fn stock_of(app: &TestApp, product_uri: &str) -> i64 {
    let (_, product) = app.get_json(product_uri).await;
    product["stock_quantity"].as_i64().expect("stock_quantity")
}

#[tokio::test]
async fn purchase_decrements_stock_and_returns_the_product() {
    let app = TestApp::new().await;
    let uri = product_with_stock(&app, 10).await;

    let (status, body) = purchase(&app, &uri, Some(json!({ "quantity": 3 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stock_quantity"], 7);
    assert_eq!(body["name"], "Lamp");
    assert_eq!(body["price"], "18.00");
    assert_eq!(stock_of(&app, &uri).await, 7);

    let (status, body) = purchase(&app, &uri, Some(json!({ "quantity": 8 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Not enough stock. Only 7 available.");
    assert_eq!(stock_of(&app, &uri).await, 7);
}

#[tokio::test]
async fn purchase_from_empty_stock_names_zero() {
    let app = TestApp::new().await;
    let uri = product_with_stock(&app, 0).await;

    let (status, body) = purchase(&app, &uri, Some(json!({ "quantity": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains('0'));
    assert_eq!(stock_of(&app, &uri).await, 0);
}

#[tokio::test]
async fn purchase_may_take_the_last_unit() {
    let app = TestApp::new().await;
    let uri = product_with_stock(&app, 2).await;

    let (status, body) = purchase(&app, &uri, Some(json!({ "quantity": "2" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stock_quantity"], 0);

    let (_, listing) = app.get_json("/products/?available=false").await;
    assert_eq!(listing.as_array().unwrap().len(), 1);
}

#[rstest]
#[case(None, "Quantity is required.")]
#[case(Some(json!({})), "Quantity is required.")]
#[case(Some(json!({ "quantity": null })), "Quantity is required.")]
#[case(Some(json!({ "quantity": "three" })), "Quantity must be an integer.")]
#[case(Some(json!({ "quantity": 2.5 })), "Quantity must be an integer.")]
#[case(Some(json!({ "quantity": 0 })), "Quantity must be a positive integer.")]
#[case(Some(json!({ "quantity": -4 })), "Quantity must be a positive integer.")]
#[tokio::test]
async fn bad_quantities_never_mutate(#[case] body: Option<Value>, #[case] detail: &str) {
    let app = TestApp::new().await;
    let uri = product_with_stock(&app, 5).await;

    let (status, response) = purchase(&app, &uri, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["detail"], detail);
    assert_eq!(stock_of(&app, &uri).await, 5);
}

#[tokio::test]
async fn purchase_of_unknown_product_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = purchase(&app, "/products/404/", Some(json!({ "quantity": 1 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = purchase(&app, "/products/404/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn purchase_route_without_trailing_slash() {
    let app = TestApp::new().await;
    let product = app
        .create_product(json!({ "name": "Lamp", "price": "1.00", "stock_quantity": 1 }))
        .await;

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/products/{}/purchase", product["id"]),
            Some(json!({ "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn restock_via_update_is_unchecked() {
    let app = TestApp::new().await;
    let uri = product_with_stock(&app, 1).await;

    let response = app
        .request_authenticated(Method::PATCH, &uri, Some(json!({ "stock_quantity": 50 })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = purchase(&app, &uri, Some(json!({ "quantity": 50 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stock_quantity"], 0);
}

#[tokio::test]
async fn concurrent_purchases_never_oversell() {
    let app = TestApp::new().await;
    let product = app
        .create_product(json!({ "name": "Lamp", "price": "18.00", "stock_quantity": 10 }))
        .await;
    let id = product["id"].as_i64().unwrap() as i32;
    let products = app.state.services.products.clone();

    // 20 concurrent single-unit purchases against 10 units: exactly 10 may succeed.
    let mut tasks = vec![];
    for _ in 0..20 {
        let products = products.clone();
        tasks.push(tokio::spawn(
            async move { products.purchase(id, 1).await.is_ok() },
        ));
    }

    let mut success = 0;
    for task in futures::future::join_all(tasks).await {
        if task.unwrap_or(false) {
            success += 1;
        }
    }

    assert_eq!(
        success, 10,
        "exactly 10 purchases should succeed; got {}",
        success
    );
    assert_eq!(products.get(id).await.unwrap().stock_quantity, 0);
}
