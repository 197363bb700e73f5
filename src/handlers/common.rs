use crate::errors::{FieldErrors, ServiceError};
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

pub const REQUIRED: &str = "This field is required.";
pub const MAX_NAME_LEN: usize = 255;

/// `ValidationError` carrying a client-facing message
pub fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

/// Names are required to be non-blank and at most 255 characters once trimmed.
pub fn validate_name(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(invalid("blank", "This field may not be blank."));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(invalid(
            "max_length",
            format!("Ensure this field has no more than {MAX_NAME_LEN} characters."),
        ));
    }
    Ok(())
}

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Runs the derived validators and reports any `required` field that is absent,
/// all in one field-error map.
pub fn validate_input<T: Validate>(input: &T, missing: &[&str]) -> Result<(), ServiceError> {
    let mut fields = match input.validate() {
        Ok(()) => FieldErrors::new(),
        Err(errors) => match ServiceError::from(errors) {
            ServiceError::InvalidFields(fields) => fields,
            other => return Err(other),
        },
    };
    for field in missing {
        fields
            .entry(field.to_string())
            .or_default()
            .push(REQUIRED.to_string());
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::InvalidFields(fields))
    }
}

/// Trims a required string; blank becomes empty and is left to validation.
pub fn normalize_string(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// Trims a nullable string; blank collapses to null.
pub fn normalize_optional_string(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(|inner| {
        inner
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
/// Use with `#[serde(default, deserialize_with = "deserialize_some")]`.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// JSON body extractor whose rejections render as the crate's 400 error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ServiceError::BadRequest(rejection.body_text())),
        }
    }
}

/// Integer `:id` path segment. Anything that is not an id cannot name a
/// resource, so it is a 404 rather than a 400.
#[derive(Debug, Clone, Copy)]
pub struct IdPath(pub i32);

#[async_trait]
impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<i32>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| IdPath(id))
            .map_err(|_| ServiceError::NotFound("Not found.".to_string()))
    }
}
