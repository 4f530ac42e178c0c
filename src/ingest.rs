//! Poll cycle: fetch → compute consumption → persist → mirror to day log.
//!
//! Two timers drive the service: [`run_refresh_loop`] re-derives the baseline
//! from storage and [`run_poll_loop`] performs poll cycles. Both tick every
//! [`POLL_PERIOD`]. Every poll cycle is spawned as its own task so a slow
//! upstream never delays the next tick.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::baseline::{self, Baseline, BaselineTracker};
use crate::calendar::Calendar;
use crate::daylog::DayLog;
use crate::error::IngestError;
use crate::models::{MeterReading, SensorSnapshot, METER_IDS};
use crate::store::ReadingStore;

// ---

/// Fixed period of both the poll and the baseline refresh timers.
pub const POLL_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Where live snapshots come from.
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn fetch(&self) -> Result<SensorSnapshot, IngestError>;
}

/// The site's sensor aggregator, queried over HTTP.
///
/// The endpoint answers with a JSON array; only its first element is used.
pub struct HttpSensorSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSensorSource {
    pub fn new(url: impl Into<String>) -> Self {
        HttpSensorSource {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SensorSource for HttpSensorSource {
    async fn fetch(&self) -> Result<SensorSnapshot, IngestError> {
        // ---
        debug!("Fetching sensor snapshot from: {}", self.url);

        let payload: Vec<Map<String, Value>> = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let first = payload.first().ok_or(IngestError::EmptyPayload)?;
        Ok(SensorSnapshot::from_json(first))
    }
}

/// Owns everything a poll cycle needs.
pub struct Ingestor<Src, St> {
    source: Src,
    store: St,
    tracker: BaselineTracker,
    calendar: Calendar,
    day_log: DayLog,
    /// Site date of the last persisted reading.
    last_stored_day: Mutex<Option<NaiveDate>>,
}

impl<Src, St> Ingestor<Src, St>
where
    Src: SensorSource,
    St: ReadingStore,
{
    // ---
    pub fn new(
        source: Src,
        store: St,
        tracker: BaselineTracker,
        calendar: Calendar,
        day_log: DayLog,
    ) -> Self {
        Ingestor {
            source,
            store,
            tracker,
            calendar,
            day_log,
            last_stored_day: Mutex::new(None),
        }
    }

    /// One poll cycle stamped with the current time.
    pub async fn poll(&self) -> Result<MeterReading, IngestError> {
        self.poll_at(Utc::now()).await
    }

    /// One poll cycle with the reading stamped `now`.
    ///
    /// Fetch and persist failures abort the cycle. The day-log append is best
    /// effort and only logged on failure.
    pub async fn poll_at(&self, now: DateTime<Utc>) -> Result<MeterReading, IngestError> {
        // ---
        let snapshot = self.source.fetch().await?;

        let (baseline, seeded) = self.tracker.get_or_seed(Baseline::from_snapshot(&snapshot));
        if seeded {
            info!(kwh = ?baseline.kwh, "no baseline yet, seeded from live snapshot");
        }

        let consumption = baseline.consumption(&snapshot);
        for (id, value) in METER_IDS.iter().zip(consumption.iter()) {
            if *value < 0.0 {
                warn!(
                    meter = id,
                    consumption = value,
                    "negative consumption, meter counter may have reset"
                );
            }
        }

        let reading = MeterReading::new(now, &snapshot, consumption);
        self.store
            .insert(&reading)
            .await
            .map_err(IngestError::Persist)?;

        debug!(id = %reading.id, consumption = ?consumption, "reading stored");
        self.note_stored(now, &reading);

        let local_time = self.calendar.local(now);
        match self.day_log.append(local_time, &snapshot).await {
            Ok(path) => debug!("Appended reading to {}", path.display()),
            Err(e) => error!(error = %e, dir = %self.day_log.dir().display(), "failed to append day log"),
        }

        Ok(reading)
    }

    fn note_stored(&self, now: DateTime<Utc>, reading: &MeterReading) {
        // ---
        let day = self.calendar.date_of(now);
        let mut last = self
            .last_stored_day
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *last != Some(day) {
            *last = Some(day);
            info!(%day, kwh = ?reading.cumulative_energy(), "first reading stored today");
        }
    }

    /// Poll cycle with errors logged instead of returned.
    pub async fn run_cycle(&self) {
        // ---
        if let Err(e) = self.poll().await {
            error!(error = %e, "poll cycle failed");
        }
    }

    /// Re-derive the baseline from storage.
    pub async fn refresh_baseline(&self) {
        baseline::refresh(&self.store, &self.tracker, &self.calendar, Utc::now()).await;
    }
}

/// Tick forever, spawning a poll cycle on every tick. The first tick is one
/// period after start.
pub async fn run_poll_loop<Src, St>(ingestor: Arc<Ingestor<Src, St>>)
where
    Src: SensorSource + 'static,
    St: ReadingStore + 'static,
{
    // ---
    let mut ticker = interval_at(Instant::now() + POLL_PERIOD, POLL_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let ingestor = Arc::clone(&ingestor);
        tokio::spawn(async move {
            ingestor.run_cycle().await;
        });
    }
}

/// Tick forever, refreshing the baseline on every tick.
pub async fn run_refresh_loop<Src, St>(ingestor: Arc<Ingestor<Src, St>>)
where
    Src: SensorSource + 'static,
    St: ReadingStore + 'static,
{
    // ---
    let mut ticker = interval_at(Instant::now() + POLL_PERIOD, POLL_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        ingestor.refresh_baseline().await;
    }
}
