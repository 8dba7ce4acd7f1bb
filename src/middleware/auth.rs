use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::{token_from_header, AuthorizationContext};
use crate::error::ApiError;
use crate::handlers::AppState;

/// Optional bearer authentication: requests without a usable `Authorization`
/// header continue as anonymous, requests with an invalid token are rejected.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = match extract_bearer(&headers) {
        None => AuthorizationContext::anonymous(),
        Some(token) => state.verifier.verify(token).map_err(|e| {
            warn!("Rejected bearer token: {:?}", e);
            ApiError::from(e)
        })?,
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Extract the bearer token, if the header carries one
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(token_from_header)
}
