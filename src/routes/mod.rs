//! HTTP gateway: every route is registered here and nowhere else.
//!
//! Query endpoints live under `/api`, `/health` at the root. All handlers
//! share `(PgPool, Config)` as state and only read from storage.

use axum::{extract::Request, Router};
use chrono::NaiveDate;
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Level;

use crate::Config;

mod energy;
mod graphs;
mod health;
mod sensor_data;

// ---

/// Common prefix of the query endpoints.
pub const API_PREFIX: &str = "/api";

pub fn router(pool: PgPool, config: Config) -> Router {
    // ---
    let api = Router::new()
        .merge(sensor_data::router())
        .merge(energy::router())
        .merge(graphs::router());

    Router::new()
        .nest(API_PREFIX, api)
        .merge(health::router())
        .with_state((pool, config))
        // The dashboard is served from a different origin
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
}

/// Parse a `yyyy-MM-dd` path segment.
pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_parse_date() {
        // ---
        assert_eq!(
            parse_date("2099-01-01").unwrap(),
            NaiveDate::from_ymd_opt(2099, 1, 1).unwrap()
        );
        assert!(parse_date("2025-13-01").is_err());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_extreme_path_dates_parse_but_have_no_window() {
        // ---
        use crate::calendar::{daywise_window, Calendar};
        use chrono::FixedOffset;

        let cal = Calendar::new(FixedOffset::east_opt(19800).unwrap());
        let first = parse_date(&NaiveDate::MIN.to_string()).unwrap();
        let last = parse_date(&NaiveDate::MAX.to_string()).unwrap();

        assert_eq!(first, NaiveDate::MIN);
        assert_eq!(last, NaiveDate::MAX);
        assert!(cal.day_window(first).is_none());
        assert!(daywise_window(last).is_none());
    }
}
