//! Energy summaries: day baseline, last-7-days totals and peak demand.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, error};

use crate::baseline::{self, Baseline};
use crate::calendar::Calendar;
use crate::error::ApiError;
use crate::{store, Config};

// ---

/// Meter whose counter is charted in the 7-day view (the site main).
const MAIN_METER_ID: u16 = 70;

/// Number of days, today included, in the 7-day view.
const CONSUMPTION_DAYS: usize = 7;

const FAILED: ApiError = ApiError::Json("Internal Server Error");

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/previousDayEnergy", get(previous_day_energy))
        .route("/energy-consumption", get(energy_consumption))
        .route("/highest-kva", get(highest_kva))
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct InitialEnergyValues {
    meter_70: Option<f64>,
    meter_40: Option<f64>,
    meter_69: Option<f64>,
    meter_41: Option<f64>,
}

impl From<Baseline> for InitialEnergyValues {
    fn from(b: Baseline) -> Self {
        let [m70, m40, m69, m41] = b.kwh;
        InitialEnergyValues {
            meter_70: Some(m70),
            meter_40: Some(m40),
            meter_69: Some(m69),
            meter_41: Some(m41),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousDayEnergyResponse {
    initial_energy_values: InitialEnergyValues,
}

/// `GET /previousDayEnergy`: the baseline storage implies for today.
///
/// Same rule the refresh task uses; the in-memory tracker is not consulted.
async fn previous_day_energy(
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<PreviousDayEnergyResponse>, ApiError> {
    // ---
    let calendar = config.calendar();
    let today = calendar.date_of(Utc::now());

    let resolved = baseline::resolve(&pool, &calendar, today)
        .await
        .map_err(|e| {
            error!("Error fetching previous day's energy values: {}", e);
            FAILED
        })?;

    let initial_energy_values = resolved
        .map(|(b, _)| InitialEnergyValues::from(b))
        .unwrap_or_default();

    Ok(Json(PreviousDayEnergyResponse {
        initial_energy_values,
    }))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailyEnergy {
    date: String,
    energy: f64,
}

/// Keep the newest sample of each site day, newest day first.
///
/// `samples` must be ordered newest first.
fn last_per_day(
    samples: &[(DateTime<Utc>, f64)],
    calendar: &Calendar,
    limit: usize,
) -> Vec<DailyEnergy> {
    // ---
    let mut out: Vec<DailyEnergy> = Vec::with_capacity(limit);
    let mut last_day: Option<NaiveDate> = None;

    for (ts, energy) in samples {
        let day = calendar.date_of(*ts);
        if last_day == Some(day) {
            continue;
        }
        last_day = Some(day);
        out.push(DailyEnergy {
            date: day.format("%Y-%m-%d").to_string(),
            energy: *energy,
        });
        if out.len() == limit {
            break;
        }
    }
    out
}

/// `GET /energy-consumption`: meter 70's counter at the end of each of the
/// last seven site days, most recent first. Days without data are skipped.
async fn energy_consumption(
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<Vec<DailyEnergy>>, ApiError> {
    // ---
    let calendar = config.calendar();
    let today = calendar.date_of(Utc::now());
    let start = today
        .checked_sub_days(Days::new(CONSUMPTION_DAYS as u64 - 1))
        .and_then(|d| calendar.start_of(d))
        .ok_or(FAILED)?;
    let (_, end) = calendar.day_window(today).ok_or(FAILED)?;

    let samples = store::meter_energy_between(&pool, MAIN_METER_ID, start, end)
        .await
        .map_err(|e| {
            error!("Error fetching energy values: {}", e);
            FAILED
        })?;

    let days = last_per_day(&samples, &calendar, CONSUMPTION_DAYS);
    debug!("Energy consumption: {} samples, {} days", samples.len(), days.len());
    Ok(Json(days))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighestKvaResponse {
    highest_kva_today: f64,
    highest_kva_month: f64,
}

/// `GET /highest-kva`: peak combined apparent power today and this month.
async fn highest_kva(
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<HighestKvaResponse>, ApiError> {
    // ---
    let now = Utc::now();
    let calendar = config.calendar();
    let today = calendar.date_of(now);

    let log_err = |e: sqlx::Error| {
        error!("Error fetching highest KVA values: {}", e);
        ApiError::Json("Internal server error")
    };

    let failed = || ApiError::Json("Internal server error");
    let day_start = calendar.start_of(today).ok_or_else(failed)?;
    let month_start = calendar.month_start(today).ok_or_else(failed)?;

    let day_peak = store::peak_demand_between(&pool, day_start, now)
        .await
        .map_err(log_err)?;
    let month_peak = store::peak_demand_between(&pool, month_start, now)
        .await
        .map_err(log_err)?;

    Ok(Json(HighestKvaResponse {
        highest_kva_today: day_peak.unwrap_or(0.0),
        highest_kva_month: month_peak.unwrap_or(0.0),
    }))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    fn ist() -> Calendar {
        Calendar::new(FixedOffset::east_opt(19800).unwrap())
    }

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_last_per_day_keeps_newest_of_each_day() {
        // ---
        let samples = vec![
            (utc(26, 10), 130.0),
            (utc(26, 5), 125.0),
            // 19:00 UTC on the 24th is already the 25th at the site
            (utc(24, 19), 110.0),
            (utc(24, 17), 100.0),
            (utc(22, 9), 80.0),
        ];

        let days = last_per_day(&samples, &ist(), 7);
        assert_eq!(
            days,
            vec![
                DailyEnergy { date: "2025-03-26".into(), energy: 130.0 },
                DailyEnergy { date: "2025-03-25".into(), energy: 110.0 },
                DailyEnergy { date: "2025-03-24".into(), energy: 100.0 },
                DailyEnergy { date: "2025-03-22".into(), energy: 80.0 },
            ]
        );
    }

    #[test]
    fn test_last_per_day_respects_limit() {
        // ---
        let samples: Vec<_> = (1..=10).rev().map(|d| (utc(d, 6), d as f64)).collect();
        let days = last_per_day(&samples, &ist(), 7);

        assert_eq!(days.len(), 7);
        assert_eq!(days[0].date, "2025-03-10");
        assert_eq!(days[6].date, "2025-03-04");
    }

    #[test]
    fn test_initial_energy_values_shape() {
        // ---
        let empty = PreviousDayEnergyResponse {
            initial_energy_values: InitialEnergyValues::default(),
        };
        assert_eq!(
            serde_json::to_value(&empty).unwrap(),
            json!({"initialEnergyValues": {
                "meter_70": null, "meter_40": null, "meter_69": null, "meter_41": null
            }})
        );

        let full = PreviousDayEnergyResponse {
            initial_energy_values: Baseline { kwh: [1.0, 2.0, 3.0, 4.0] }.into(),
        };
        assert_eq!(
            serde_json::to_value(&full).unwrap()["initialEnergyValues"]["meter_69"],
            json!(3.0)
        );
    }

    #[test]
    fn test_highest_kva_shape() {
        // ---
        let body = HighestKvaResponse {
            highest_kva_today: 0.0,
            highest_kva_month: 412.5,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"highestKvaToday": 0.0, "highestKvaMonth": 412.5})
        );
    }
}
