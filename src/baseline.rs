//! Daily consumption baseline.
//!
//! The baseline is the cumulative-energy counter of every meter at the start
//! of the current site day. Consumption of a reading is its counter minus the
//! baseline. It is re-derived from storage on a timer ([`refresh`]) and seeded
//! from the live snapshot by the poller when nothing is known yet.
//!
//! [`BaselineTracker`] is shared between the refresh task and the poll task.
//! The value inside is only ever replaced whole, never patched per meter, so
//! a concurrent reader sees either the old baseline or the new one.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info};

use crate::calendar::Calendar;
use crate::models::{MeterReading, SensorSnapshot, METER_COUNT};
use crate::store::ReadingStore;

// ---

/// Start-of-day cumulative energy per meter, in [`METER_IDS`](crate::models::METER_IDS) order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub kwh: [f64; METER_COUNT],
}

impl Baseline {
    // ---
    pub fn from_snapshot(snapshot: &SensorSnapshot) -> Self {
        Baseline {
            kwh: snapshot.cumulative_energy(),
        }
    }

    pub fn from_reading(reading: &MeterReading) -> Self {
        Baseline {
            kwh: reading.cumulative_energy(),
        }
    }

    /// Energy used since the baseline, meter by meter.
    ///
    /// Not clamped: a counter that reset since the baseline yields a negative value.
    pub fn consumption(&self, snapshot: &SensorSnapshot) -> [f64; METER_COUNT] {
        // ---
        let current = snapshot.cumulative_energy();
        std::array::from_fn(|i| current[i] - self.kwh[i])
    }
}

/// Where a resolved baseline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineSource {
    /// Last reading stored on the previous day.
    PreviousDayLast,
    /// First reading stored today, used when yesterday has none.
    TodayFirst,
}

/// Resolve the baseline for `today` from storage.
///
/// Prefers the last reading of the previous day and falls back to the first
/// reading of `today`. `Ok(None)` means neither exists yet, which is normal
/// right after deployment.
pub async fn resolve<S: ReadingStore + ?Sized>(
    store: &S,
    calendar: &Calendar,
    today: NaiveDate,
) -> Result<Option<(Baseline, BaselineSource)>, sqlx::Error> {
    // ---
    let yesterday = today.pred_opt();

    if let Some((start, end)) = yesterday.and_then(|d| calendar.day_window(d)) {
        if let Some(reading) = store.latest_between(start, end).await? {
            return Ok(Some((
                Baseline::from_reading(&reading),
                BaselineSource::PreviousDayLast,
            )));
        }
    }

    debug!(?yesterday, "no readings for previous day, trying today's first reading");

    let Some(start_of_today) = calendar.start_of(today) else {
        return Ok(None);
    };
    let first_today = store.earliest_since(start_of_today).await?;
    Ok(first_today.map(|r| (Baseline::from_reading(&r), BaselineSource::TodayFirst)))
}

/// Cloneable handle to the process-wide baseline.
#[derive(Debug, Clone, Default)]
pub struct BaselineTracker {
    inner: Arc<RwLock<Option<Baseline>>>,
}

impl BaselineTracker {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Baseline> {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the whole baseline.
    pub fn replace(&self, baseline: Baseline) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(baseline);
    }

    /// Return the baseline, installing `seed` first if none is set.
    ///
    /// Check and install happen under one write lock, so two overlapping polls
    /// agree on the seed.
    pub fn get_or_seed(&self, seed: Baseline) -> (Baseline, bool) {
        // ---
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match *guard {
            Some(existing) => (existing, false),
            None => {
                *guard = Some(seed);
                (seed, true)
            }
        }
    }
}

/// Re-derive the tracker's baseline for the site day containing `now`.
///
/// Leaves the tracker untouched when storage has nothing for yesterday or
/// today, or when the lookup fails.
pub async fn refresh<S: ReadingStore + ?Sized>(
    store: &S,
    tracker: &BaselineTracker,
    calendar: &Calendar,
    now: DateTime<Utc>,
) {
    // ---
    let today = calendar.date_of(now);
    debug!(%today, "refreshing consumption baseline");

    match resolve(store, calendar, today).await {
        Ok(Some((baseline, source))) => {
            let previous = tracker.current().map(|b| b.kwh);
            tracker.replace(baseline);
            info!(?source, kwh = ?baseline.kwh, ?previous, "baseline refreshed");
        }
        Ok(None) => {
            info!(%today, "no readings for yesterday or today yet, baseline left as is");
        }
        Err(e) => {
            error!(error = %e, "failed to refresh baseline");
        }
    }
}
