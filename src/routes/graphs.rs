//! Time series for the dashboard charts.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, error};

use super::parse_date;
use crate::calendar::daywise_window;
use crate::error::ApiError;
use crate::models::MeterReading;
use crate::{store, Config};

// ---

const FAILED: ApiError = ApiError::Text("Error fetching power data");

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/realtime-graph", get(realtime))
        .route("/daywise-graph/{date}", get(daywise))
}

/// `GET /realtime-graph`: today's readings up to now, oldest first.
async fn realtime(
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<Vec<MeterReading>>, ApiError> {
    // ---
    let now = Utc::now();
    let calendar = config.calendar();
    let start = calendar.start_of(calendar.date_of(now)).ok_or(FAILED)?;

    let readings = store::readings_between(&pool, start, now)
        .await
        .map_err(|e| {
            error!("Failed to fetch realtime graph data: {}", e);
            FAILED
        })?;

    debug!("Realtime graph: {} readings since {}", readings.len(), start);
    Ok(Json(readings))
}

/// `GET /daywise-graph/{date}`: readings in the +05:30-shifted UTC day.
async fn daywise(
    Path(raw_date): Path<String>,
    State((pool, _config)): State<(PgPool, Config)>,
) -> Result<Json<Vec<MeterReading>>, ApiError> {
    // ---
    let date = parse_date(&raw_date).map_err(|e| {
        error!("Invalid date '{}': {}", raw_date, e);
        FAILED
    })?;

    let (start, end) = daywise_window(date).ok_or_else(|| {
        error!("Date {} is outside the representable range", date);
        FAILED
    })?;
    let readings = store::readings_between(&pool, start, end)
        .await
        .map_err(|e| {
            error!("Failed to fetch day-wise graph data for {}: {}", date, e);
            FAILED
        })?;

    Ok(Json(readings))
}
