// handlers/health.rs - GET /status/health

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use super::AppState;
use crate::database::ConnectionManager;

/// Checks every configured database.
pub struct HealthCheck {
    connections: Arc<ConnectionManager>,
    dsns: BTreeMap<String, String>,
}

impl HealthCheck {
    pub fn new(connections: Arc<ConnectionManager>, dsns: BTreeMap<String, String>) -> Self {
        Self { connections, dsns }
    }

    /// Connection keys whose database did not answer `SELECT 1`.
    pub async fn failures(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for (key, dsn) in &self.dsns {
            if let Err(e) = self.connections.get(dsn).health_check().await {
                warn!("Health check failed for {}: {}", key, e);
                failed.push(key.clone());
            }
        }
        failed
    }
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let failed = state.health.failures().await;
    if failed.is_empty() {
        (StatusCode::OK, Json(json!({ "status": "Connectivity OK" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "Connectivity failed", "failed": failed })),
        )
    }
}
