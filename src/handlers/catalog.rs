// handlers/catalog.rs - GET /catalogus/ and POST /catalogus/refresh

use axum::{extract::State, response::Json, Extension};
use serde_json::{json, Value};
use tracing::info;

use super::AppState;
use crate::auth::AuthorizationContext;
use crate::error::ApiError;

/// GET /catalogus/ - lookup keys the caller may search
pub async fn catalogus(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthorizationContext>,
) -> Json<Value> {
    let registry = state.engine.registry();
    registry.ensure_loaded().await;
    Json(json!({ "datasets": registry.dataset_names(auth.granted()) }))
}

/// POST /catalogus/refresh - reload catalog datasets now
pub async fn refresh(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthorizationContext>,
) -> Result<Json<Value>, ApiError> {
    if !auth.is_authenticated() {
        return Err(ApiError::unauthorized("Authentication required"));
    }

    let registry = state.engine.registry();
    registry.force_refresh().await?;
    let snapshot = registry.snapshot();
    info!("Catalog refresh requested by {}", auth.identity().unwrap_or("unknown"));

    Ok(Json(json!({
        "datasets": snapshot.len(),
        "generation": registry.generation(),
    })))
}
