use crate::auth::AccessRouterExt;
use crate::handlers::common::{
    created_response, deserialize_some, invalid, no_content_response, normalize_optional_string,
    normalize_string, success_response, validate_input, validate_name, ApiJson, IdPath,
};
use crate::{
    entities::ProductModel,
    errors::ServiceError,
    queries::ListProductsQuery,
    services::products::{purchase_quantity, CreateProductInput, UpdateProductInput},
    AppState,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

const PRICE_SCALE: u32 = 2;
const PRICE_MAX_INTEGER_DIGITS: u32 = 8;
const MAX_IMAGE_URL_LEN: usize = 200;

fn validate_price(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(invalid(
            "min_value",
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    if value.normalize().scale() > PRICE_SCALE {
        return Err(invalid(
            "max_decimal_places",
            format!("Ensure that there are no more than {PRICE_SCALE} decimal places."),
        ));
    }
    if value.trunc() >= Decimal::from(10_i64.pow(PRICE_MAX_INTEGER_DIGITS)) {
        return Err(invalid(
            "max_whole_digits",
            format!(
                "Ensure that there are no more than {PRICE_MAX_INTEGER_DIGITS} digits before the decimal point."
            ),
        ));
    }
    Ok(())
}

fn validate_image_url(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > MAX_IMAGE_URL_LEN {
        return Err(invalid(
            "max_length",
            format!("Ensure this field has no more than {MAX_IMAGE_URL_LEN} characters."),
        ));
    }
    if !validator::validate_url(value) {
        return Err(invalid("url", "Enter a valid URL."));
    }
    Ok(())
}

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/products", post(create_product))
        .route(
            "/products/:id",
            put(replace_product)
                .patch(patch_product)
                .delete(delete_product),
        )
        .route("/products/:id/purchase", post(purchase_product))
        .with_access(true);

    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .with_access(false)
        .merge(protected)
}

/// List products, filtered and ordered by query parameters
#[utoipa::path(
    get,
    path = "/products/",
    params(crate::queries::products::ProductListParams),
    responses(
        (status = 200, description = "Matching products", body = [ProductResponse]),
        (status = 400, description = "Malformed filter value", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ServiceError> {
    let query = ListProductsQuery::from_params(&params)?;
    let products = state.services.products.list(&query).await?;
    Ok(success_response(
        products
            .into_iter()
            .map(ProductResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Create a product
#[utoipa::path(
    post,
    path = "/products/",
    request_body = ProductPayload,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Missing or invalid API key", body = crate::errors::ErrorResponse)
    ),
    security(("ApiKey" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ProductPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    let payload = payload.normalized();
    validate_input(&payload, &payload.missing_required())?;

    let ProductPayload {
        name,
        description,
        price,
        stock_quantity,
        image_url,
        is_featured,
        category,
    } = payload;

    let product = state
        .services
        .products
        .create(CreateProductInput {
            name: name.unwrap_or_default(),
            description: description.flatten(),
            price: price.unwrap_or_default(),
            stock_quantity: stock_quantity.unwrap_or(0),
            image_url: image_url.flatten(),
            is_featured: is_featured.unwrap_or(false),
            category_id: category.flatten(),
        })
        .await?;

    Ok(created_response(ProductResponse::from(product)))
}

/// Get a product by ID
#[utoipa::path(
    get,
    path = "/products/{id}/",
    params(("id" = i32, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product", body = ProductResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.get(id).await?;
    Ok(success_response(ProductResponse::from(product)))
}

/// Replace a product; `name` and `price` are required
#[utoipa::path(
    put,
    path = "/products/{id}/",
    params(("id" = i32, Path, description = "Product ID")),
    request_body = ProductPayload,
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Missing or invalid API key", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("ApiKey" = [])),
    tag = "Products"
)]
pub async fn replace_product(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(payload): ApiJson<ProductPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    update_product(state, id, payload, true).await
}

/// Partially update a product
#[utoipa::path(
    patch,
    path = "/products/{id}/",
    params(("id" = i32, Path, description = "Product ID")),
    request_body = ProductPayload,
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Missing or invalid API key", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("ApiKey" = [])),
    tag = "Products"
)]
pub async fn patch_product(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(payload): ApiJson<ProductPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    update_product(state, id, payload, false).await
}

async fn update_product(
    state: AppState,
    id: i32,
    payload: ProductPayload,
    full: bool,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.products.get(id).await?;

    let payload = payload.normalized();
    let missing = if full {
        payload.missing_required()
    } else {
        Vec::new()
    };
    validate_input(&payload, &missing)?;

    let ProductPayload {
        name,
        description,
        price,
        stock_quantity,
        image_url,
        is_featured,
        category,
    } = payload;

    let product = state
        .services
        .products
        .update(
            id,
            UpdateProductInput {
                name,
                description,
                price,
                stock_quantity,
                image_url,
                is_featured,
                category_id: category,
            },
        )
        .await?;

    Ok(success_response(ProductResponse::from(product)))
}

/// Delete a product
#[utoipa::path(
    delete,
    path = "/products/{id}/",
    params(("id" = i32, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 403, description = "Missing or invalid API key", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("ApiKey" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.products.delete(id).await?;
    Ok(no_content_response())
}

/// Buy `quantity` units, decrementing stock atomically
#[utoipa::path(
    post,
    path = "/products/{id}/purchase/",
    params(("id" = i32, Path, description = "Product ID")),
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Stock decremented", body = ProductResponse),
        (status = 400, description = "Bad quantity or not enough stock", body = crate::errors::ErrorResponse),
        (status = 403, description = "Missing or invalid API key", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("ApiKey" = [])),
    tag = "Products"
)]
pub async fn purchase_product(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.products.get(id).await?;

    let body = parse_lenient_json(&body)?;
    let quantity = purchase_quantity(&body)?;
    let product = state.services.products.purchase(id, quantity).await?;

    Ok(success_response(ProductResponse::from(product)))
}

/// An empty body reads as `null` so a bodiless purchase reports the missing quantity.
fn parse_lenient_json(body: &[u8]) -> Result<Value, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::BadRequest(format!("JSON parse error - {e}")))
}

/// Product write body. Every field is optional at the type level; which ones
/// are required depends on the method. `description`, `image_url` and
/// `category` accept `null` to clear.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct ProductPayload {
    #[validate(custom = "validate_name")]
    #[schema(example = "Desk Lamp")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    /// Accepted as a JSON number or string
    #[validate(custom = "validate_price")]
    #[schema(value_type = Option<String>, example = "18.00")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
    #[schema(example = 25)]
    pub stock_quantity: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    #[validate(custom = "validate_image_url")]
    #[schema(value_type = Option<String>, example = "https://example.com/lamp.png")]
    pub image_url: Option<Option<String>>,
    pub is_featured: Option<bool>,
    /// Category id
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<i32>)]
    pub category: Option<Option<i32>>,
}

impl ProductPayload {
    fn normalized(self) -> Self {
        Self {
            name: normalize_string(self.name),
            description: normalize_optional_string(self.description),
            image_url: normalize_optional_string(self.image_url),
            ..self
        }
    }

    fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.price.is_none() {
            missing.push("price");
        }
        missing
    }
}

/// Purchase request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct PurchaseRequest {
    /// Positive integer; a numeric string is also accepted
    #[schema(example = 3)]
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: i32,
    #[schema(example = "Desk Lamp")]
    pub name: String,
    pub description: Option<String>,
    /// Two-place decimal string
    #[schema(example = "18.00")]
    pub price: String,
    pub stock_quantity: i32,
    pub image_url: Option<String>,
    pub is_featured: bool,
    /// Category id, or null
    pub category: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductModel> for ProductResponse {
    fn from(model: ProductModel) -> Self {
        let mut price = model.price;
        price.rescale(PRICE_SCALE);
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: price.to_string(),
            stock_quantity: model.stock_quantity,
            image_url: model.image_url,
            is_featured: model.is_featured,
            category: model.category_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[rstest]
    #[case(dec!(0))]
    #[case(dec!(18.5))]
    #[case(dec!(18.50))]
    #[case(dec!(99999999.99))]
    fn valid_prices(#[case] price: Decimal) {
        assert!(validate_price(&price).is_ok());
    }

    #[rstest]
    #[case(dec!(-0.01), "min_value")]
    #[case(dec!(1.005), "max_decimal_places")]
    #[case(dec!(100000000), "max_whole_digits")]
    fn invalid_prices(#[case] price: Decimal, #[case] code: &str) {
        assert_eq!(validate_price(&price).unwrap_err().code, code);
    }

    #[test]
    fn image_url_must_be_a_short_url() {
        assert!(validate_image_url("https://example.com/a.png").is_ok());
        assert!(validate_image_url("not a url").is_err());
        let long = format!("https://example.com/{}", "a".repeat(MAX_IMAGE_URL_LEN));
        assert!(validate_image_url(&long).is_err());
    }

    #[test]
    fn price_accepts_number_or_string() {
        let number: ProductPayload = serde_json::from_value(json!({"price": 18.5})).unwrap();
        let string: ProductPayload = serde_json::from_value(json!({"price": "18.50"})).unwrap();
        assert_eq!(number.price, Some(dec!(18.5)));
        assert_eq!(string.price, Some(dec!(18.50)));
    }

    #[test]
    fn response_renders_two_place_price() {
        let now = Utc::now();
        let response = ProductResponse::from(ProductModel {
            id: 1,
            name: "Lamp".into(),
            description: None,
            price: dec!(18),
            stock_quantity: 3,
            image_url: None,
            is_featured: false,
            category_id: Some(2),
            created_at: now,
            updated_at: now,
        });
        assert_eq!(response.price, "18.00");
        assert_eq!(response.category, Some(2));
    }

    #[test]
    fn empty_purchase_body_is_null() {
        assert_eq!(parse_lenient_json(b"").unwrap(), Value::Null);
        assert_eq!(parse_lenient_json(b"  \n").unwrap(), Value::Null);
        assert!(matches!(
            parse_lenient_json(b"{quantity"),
            Err(ServiceError::BadRequest(_))
        ));
    }
}
