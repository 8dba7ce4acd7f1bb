// handlers/search.rs - GET / and GET /:dataset/

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension,
};
use std::collections::HashMap;

use super::AppState;
use crate::auth::AuthorizationContext;
use crate::error::ApiError;
use crate::search::{feature_collection_body, SearchRequest};
use crate::types::QueryPoint;

/// GET / - search the datasets named in `datasets` (or the defaults)
pub async fn search(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthorizationContext>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let request = parse_request(&params)?;
    run(&state, request, auth).await
}

/// GET /:dataset/ - search a single lookup key
pub async fn search_dataset(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    Extension(auth): Extension<AuthorizationContext>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let mut request = parse_request(&params)?;
    request.datasets = vec![dataset];
    run(&state, request, auth).await
}

async fn run(state: &AppState, request: SearchRequest, auth: AuthorizationContext) -> Result<Response, ApiError> {
    state.engine.registry().ensure_loaded().await;
    let features = state.engine.search(request, auth)?;
    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(feature_collection_body(features)),
    )
        .into_response())
}

/// Turn query parameters into a [`SearchRequest`].
pub fn parse_request(params: &HashMap<String, String>) -> Result<SearchRequest, ApiError> {
    let point = parse_point(params).ok_or_else(|| ApiError::bad_request("No coordinates found"))?;
    let mut request = SearchRequest::new(point);

    if let Some(radius) = non_empty(params, "radius") {
        request.radius = Some(
            radius
                .parse()
                .map_err(|_| ApiError::bad_request(format!("Invalid radius: {}", radius)))?,
        );
    }
    if let Some(limit) = non_empty(params, "limit") {
        request.limit = Some(
            limit
                .parse()
                .map_err(|_| ApiError::bad_request(format!("Invalid limit: {}", limit)))?,
        );
    }
    request.datasets = non_empty(params, "datasets").map(split_list).unwrap_or_default();
    request.extra_fields = non_empty(params, "_fields").map(split_list).unwrap_or_default();
    request.monumenttype = non_empty(params, "monumenttype").map(str::to_string);
    Ok(request)
}

/// `x`/`y` (projected) take precedence over `lat`/`lon` (geographic).
fn parse_point(params: &HashMap<String, String>) -> Option<QueryPoint> {
    let number = |key: &str| non_empty(params, key).and_then(|v| v.parse::<f64>().ok());
    let point = match (number("x"), number("y")) {
        (Some(x), Some(y)) => QueryPoint::Projected { x, y },
        _ => QueryPoint::Geographic { lat: number("lat")?, lon: number("lon")? },
    };
    point.is_finite().then_some(point)
}

fn non_empty<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
