// handlers/mod.rs - HTTP glue around the search engine
//
// Every route runs behind the optional bearer middleware, so handlers always
// find an AuthorizationContext in the request extensions.

pub mod catalog;
pub mod health;
pub mod search;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use health::HealthCheck;

use crate::auth::TokenVerifier;
use crate::middleware::bearer_auth_middleware;
use crate::search::SearchEngine;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub verifier: Arc<TokenVerifier>,
    pub health: Arc<HealthCheck>,
    pub enable_cors: bool,
}

pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .route("/", get(search::search))
        .route("/catalogus/", get(catalog::catalogus))
        .route("/catalogus/refresh", post(catalog::refresh))
        .route("/status/health", get(health::health))
        .route("/:dataset/", get(search::search_dataset))
        .layer(from_fn_with_state(state.clone(), bearer_auth_middleware));

    let router = if state.enable_cors { router.layer(CorsLayer::permissive()) } else { router };
    router.layer(TraceLayer::new_for_http()).with_state(state)
}
