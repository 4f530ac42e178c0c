// src/routes/health.rs
//! Liveness endpoint for the container orchestrator.
//!
//! `GET /health` sits outside the `/api` prefix. It answers 200 while the
//! process is serving requests and reports whether the reading store
//! answered a trivial query, so an operator can tell "server up, database
//! gone" apart from a dead process.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;

use crate::Config;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

/// Handle `GET /health`.
async fn health(
    State((pool, _config)): State<(PgPool, Config)>,
) -> (StatusCode, Json<HealthResponse>) {
    // ---
    let database = match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!("Health check could not reach database: {}", e);
            "unreachable"
        }
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            database,
        }),
    )
}

pub fn router() -> Router<(PgPool, Config)> {
    Router::new().route("/health", get(health))
}
