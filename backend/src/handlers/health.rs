//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub currency: String,
    pub database: &'static str,
}

/// Liveness plus a database round trip; 503 when the pool cannot answer
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    if !connected {
        tracing::warn!("health check could not reach the database");
    }

    let code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthResponse {
            status: if connected { "healthy" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            environment: state.config.environment.clone(),
            currency: state.config.ledger.default_currency.clone(),
            database: if connected { "connected" } else { "disconnected" },
        }),
    )
}
