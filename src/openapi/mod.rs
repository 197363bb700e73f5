use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

/// Registers the `ApiKey` scheme referenced by the mutating endpoints.
struct ApiKeySecurityAddon;

impl Modify for ApiKeySecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "ApiKey".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "X-API-Key",
                    "Key issued with `catalog-cli issue-key`. `Authorization: Api-Key <key>` \
                     and `Authorization: Bearer <key>` are accepted as well.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Catalog API",
        version = "0.1.0",
        description = r#"
Categories and products with filtered listings and stock-checked purchases.

Reads are open. Every write, including `POST /products/{id}/purchase/`,
needs an API key. Trailing slashes are optional on every route.
        "#
    ),
    modifiers(&ApiKeySecurityAddon),
    tags(
        (name = "Categories", description = "Category management"),
        (name = "Products", description = "Product catalog, filtering and purchases"),
        (name = "Health", description = "Liveness and database reachability")
    ),
    paths(
        crate::handlers::categories::list_categories,
        crate::handlers::categories::create_category,
        crate::handlers::categories::get_category,
        crate::handlers::categories::replace_category,
        crate::handlers::categories::patch_category,
        crate::handlers::categories::delete_category,

        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::get_product,
        crate::handlers::products::replace_product,
        crate::handlers::products::patch_product,
        crate::handlers::products::delete_product,
        crate::handlers::products::purchase_product,

        crate::health::health_check,
    ),
    components(
        schemas(
            crate::handlers::categories::CategoryPayload,
            crate::handlers::categories::CategoryResponse,
            crate::handlers::products::ProductPayload,
            crate::handlers::products::ProductResponse,
            crate::handlers::products::PurchaseRequest,
            crate::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

/// Serves the generated document as JSON
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("Catalog API"));
        assert!(json.contains("/products/{id}/purchase/"));
        assert!(json.contains("/categories/{id}/"));
        assert!(json.contains("\"ApiKey\""));
    }
}
