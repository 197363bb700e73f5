/*!
 * # Access Control Module
 *
 * Reads are public. Every route registered with `with_access(true)` requires
 * a valid API key, presented as one of:
 *
 * - `Authorization: Api-Key <key>` (scheme is case-insensitive)
 * - `Authorization: Bearer <key>`
 * - `<api_key_header>: <key>` (defaults to `X-API-Key`)
 *
 * Missing or invalid credentials yield 403 and the handler never runs.
 */

use crate::errors::ServiceError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tracing::{debug, warn};

// Entity modules
pub mod api_key;

// Feature modules
mod api_key_service;

// Re-exports
pub use api_key_service::*;

/// Whether a route changes catalog state and therefore needs a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessPolicy {
    pub mutating: bool,
}

/// Pull the presented key out of the request headers, if any.
pub fn extract_api_key(headers: &HeaderMap, key_header: &str) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let mut parts = value.trim().splitn(2, char::is_whitespace);
        let scheme = parts.next().unwrap_or_default();
        let credential = parts.next().map(str::trim).unwrap_or_default();
        if (scheme.eq_ignore_ascii_case("api-key") || scheme.eq_ignore_ascii_case("bearer"))
            && !credential.is_empty()
        {
            return Some(credential.to_string());
        }
    }

    headers
        .get(key_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Guard middleware; `policy.mutating == false` lets every request through.
pub async fn access_gate(
    State(policy): State<AccessPolicy>,
    request: Request,
    next: Next,
) -> Response {
    if !policy.mutating {
        return next.run(request).await;
    }

    let Some(keys) = request.extensions().get::<Arc<ApiKeyService>>().cloned() else {
        return ServiceError::InternalError("API key service not available".to_string())
            .into_response();
    };

    let Some(presented) = extract_api_key(request.headers(), keys.header_name()) else {
        warn!(
            method = %request.method(),
            uri = %request.uri(),
            "Write rejected: no API key presented"
        );
        return ServiceError::Forbidden(MISSING_CREDENTIALS.to_string()).into_response();
    };

    match keys.authenticate(&presented).await {
        Ok(record) => {
            debug!(prefix = %record.prefix, "API key accepted");
            next.run(request).await
        }
        Err(err) => {
            warn!(
                method = %request.method(),
                uri = %request.uri(),
                "Write rejected: {}",
                err
            );
            err.into_response()
        }
    }
}

/// Extension methods for Router to add the access gate
pub trait AccessRouterExt {
    fn with_access(self, mutating: bool) -> Self;
}

impl<S> AccessRouterExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_access(self, mutating: bool) -> Self {
        self.route_layer(axum::middleware::from_fn_with_state(
            AccessPolicy { mutating },
            access_gate,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[rstest]
    #[case(&[("authorization", "Api-Key abc.def")], Some("abc.def"))]
    #[case(&[("authorization", "api-key   abc.def ")], Some("abc.def"))]
    #[case(&[("authorization", "Bearer abc.def")], Some("abc.def"))]
    #[case(&[("x-api-key", "abc.def")], Some("abc.def"))]
    #[case(&[("authorization", "Basic dXNlcjpwdw=="), ("x-api-key", "abc.def")], Some("abc.def"))]
    #[case(&[("authorization", "Basic dXNlcjpwdw==")], None)]
    #[case(&[("authorization", "Api-Key")], None)]
    #[case(&[("x-api-key", "  ")], None)]
    #[case(&[], None)]
    fn extracts_presented_key(
        #[case] pairs: &[(&'static str, &'static str)],
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            extract_api_key(&headers(pairs), "x-api-key").as_deref(),
            expected
        );
    }

    #[test]
    fn custom_header_name_is_honoured() {
        let map = headers(&[("x-catalog-key", "abc.def")]);
        assert_eq!(
            extract_api_key(&map, "x-catalog-key").as_deref(),
            Some("abc.def")
        );
        assert_eq!(extract_api_key(&map, "x-api-key"), None);
    }
}
