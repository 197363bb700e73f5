use crate::auth::AccessRouterExt;
use crate::handlers::common::{
    created_response, deserialize_some, no_content_response, normalize_optional_string,
    normalize_string, success_response, validate_input, validate_name, ApiJson, IdPath,
};
use crate::{
    entities::CategoryModel,
    errors::ServiceError,
    services::categories::{CreateCategoryInput, UpdateCategoryInput},
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Creates the router for category endpoints
pub fn categories_routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/categories", post(create_category))
        .route(
            "/categories/:id",
            axum::routing::put(replace_category)
                .patch(patch_category)
                .delete(delete_category),
        )
        .with_access(true);

    Router::new()
        .route("/categories", get(list_categories))
        .route("/categories/:id", get(get_category))
        .with_access(false)
        .merge(protected)
}

/// List all categories
#[utoipa::path(
    get,
    path = "/categories/",
    responses(
        (status = 200, description = "Categories", body = [CategoryResponse])
    ),
    tag = "Categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let categories = state.services.categories.list().await?;
    Ok(success_response(
        categories
            .into_iter()
            .map(CategoryResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Create a category
#[utoipa::path(
    post,
    path = "/categories/",
    request_body = CategoryPayload,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Missing or invalid API key", body = crate::errors::ErrorResponse)
    ),
    security(("ApiKey" = [])),
    tag = "Categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CategoryPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    let payload = payload.normalized();
    validate_input(&payload, &payload.missing_required())?;

    let CategoryPayload { name, description } = payload;
    let category = state
        .services
        .categories
        .create(CreateCategoryInput {
            name: name.unwrap_or_default(),
            description: description.flatten(),
        })
        .await?;

    Ok(created_response(CategoryResponse::from(category)))
}

/// Get a category by ID
#[utoipa::path(
    get,
    path = "/categories/{id}/",
    params(("id" = i32, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category", body = CategoryResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Categories"
)]
pub async fn get_category(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<impl IntoResponse, ServiceError> {
    let category = state.services.categories.get(id).await?;
    Ok(success_response(CategoryResponse::from(category)))
}

/// Replace a category; `name` is required
#[utoipa::path(
    put,
    path = "/categories/{id}/",
    params(("id" = i32, Path, description = "Category ID")),
    request_body = CategoryPayload,
    responses(
        (status = 200, description = "Category updated", body = CategoryResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Missing or invalid API key", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse)
    ),
    security(("ApiKey" = [])),
    tag = "Categories"
)]
pub async fn replace_category(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(payload): ApiJson<CategoryPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    update_category(state, id, payload, true).await
}

/// Partially update a category
#[utoipa::path(
    patch,
    path = "/categories/{id}/",
    params(("id" = i32, Path, description = "Category ID")),
    request_body = CategoryPayload,
    responses(
        (status = 200, description = "Category updated", body = CategoryResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Missing or invalid API key", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse)
    ),
    security(("ApiKey" = [])),
    tag = "Categories"
)]
pub async fn patch_category(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(payload): ApiJson<CategoryPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    update_category(state, id, payload, false).await
}

async fn update_category(
    state: AppState,
    id: i32,
    payload: CategoryPayload,
    full: bool,
) -> Result<impl IntoResponse, ServiceError> {
    // Resolve the id before judging the body.
    state.services.categories.get(id).await?;

    let payload = payload.normalized();
    let missing = if full {
        payload.missing_required()
    } else {
        Vec::new()
    };
    validate_input(&payload, &missing)?;

    let CategoryPayload { name, description } = payload;
    let category = state
        .services
        .categories
        .update(id, UpdateCategoryInput { name, description })
        .await?;

    Ok(success_response(CategoryResponse::from(category)))
}

/// Delete a category; its products are kept with no category
#[utoipa::path(
    delete,
    path = "/categories/{id}/",
    params(("id" = i32, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 403, description = "Missing or invalid API key", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse)
    ),
    security(("ApiKey" = [])),
    tag = "Categories"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.categories.delete(id).await?;
    Ok(no_content_response())
}

/// Category write body. Every field is optional at the type level; which ones
/// are required depends on the method.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CategoryPayload {
    #[validate(custom = "validate_name")]
    #[schema(example = "Books")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>, example = "Printed and bound")]
    pub description: Option<Option<String>>,
}

impl CategoryPayload {
    fn normalized(self) -> Self {
        Self {
            name: normalize_string(self.name),
            description: normalize_optional_string(self.description),
        }
    }

    fn missing_required(&self) -> Vec<&'static str> {
        if self.name.is_none() {
            vec!["name"]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CategoryResponse {
    pub id: i32,
    #[schema(example = "Books")]
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CategoryModel> for CategoryResponse {
    fn from(model: CategoryModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
