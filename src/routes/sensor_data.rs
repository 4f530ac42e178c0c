//! Raw reading lookups: the latest reading and all readings of one site day.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use sqlx::PgPool;
use tracing::{error, info};

use super::parse_date;
use crate::error::ApiError;
use crate::models::MeterReading;
use crate::{store, Config};

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/sensordata", get(latest))
        .route("/sensordatabydate/{date}", get(by_date))
}

/// `GET /sensordata`: newest stored reading, `null` before the first poll.
async fn latest(
    State((pool, _config)): State<(PgPool, Config)>,
) -> Result<Json<Option<MeterReading>>, ApiError> {
    // ---
    let reading = store::latest(&pool).await.map_err(|e| {
        error!("Failed to fetch latest reading: {}", e);
        ApiError::Json("Error fetching latest sensor data")
    })?;
    Ok(Json(reading))
}

/// `GET /sensordatabydate/{date}`: readings of one site day, oldest first.
async fn by_date(
    Path(raw_date): Path<String>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<Vec<MeterReading>>, ApiError> {
    // ---
    const FAILED: ApiError = ApiError::Json("Error fetching sensor data");

    let date = parse_date(&raw_date).map_err(|e| {
        error!("Invalid date '{}': {}", raw_date, e);
        FAILED
    })?;

    let (start, end) = config.calendar().day_window(date).ok_or_else(|| {
        error!("Date {} is outside the representable range", date);
        FAILED
    })?;
    let readings = store::readings_between(&pool, start, end)
        .await
        .map_err(|e| {
            error!("Failed to fetch readings for {}: {}", date, e);
            FAILED
        })?;

    if readings.is_empty() {
        info!("No readings stored for {}", date);
        return Err(ApiError::NotFound("No data found for the selected date."));
    }

    Ok(Json(readings))
}
