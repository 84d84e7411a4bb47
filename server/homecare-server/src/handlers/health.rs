use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;

use crate::server::HomeCareServer;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime: i64,
    pub checks: HashMap<String, String>,
    pub realtime_connections: usize,
}

/// Liveness plus a store probe; 503 when the store is unreachable
pub async fn health_check(State(server): State<HomeCareServer>) -> (StatusCode, Json<HealthResponse>) {
    let store_healthy = server.store.is_healthy().await;

    let mut checks = HashMap::new();
    checks.insert(
        "store".to_string(),
        if store_healthy { "healthy" } else { "unavailable" }.to_string(),
    );
    checks.insert("event_bus".to_string(), "healthy".to_string());

    let now = Utc::now();
    let response = HealthResponse {
        status: if store_healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: now.to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: (now - server.started_at).num_seconds(),
        checks,
        realtime_connections: server.bus.connection_count(),
    };

    let status = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
