//! Reading storage on PostgreSQL.
//!
//! The ingestion path and the baseline resolver go through [`ReadingStore`] so
//! they can be exercised without a database. The query surface calls the
//! plain functions below directly on the pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{MeterReading, METER_COUNT};
use crate::schema::meter_columns;

// ---

/// Meters whose apparent power is summed for peak demand (41 is a sub-meter).
pub const PEAK_DEMAND_METERS: [u16; 3] = [70, 40, 69];

/// Storage capability needed by the baseline tracker and the poller.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Insert a new reading. Readings are never updated.
    async fn insert(&self, reading: &MeterReading) -> Result<(), sqlx::Error>;

    /// Most recent reading with `start <= timestamp < end`.
    async fn latest_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<MeterReading>, sqlx::Error>;

    /// Earliest reading with `timestamp >= start`.
    async fn earliest_since(
        &self,
        start: DateTime<Utc>,
    ) -> Result<Option<MeterReading>, sqlx::Error>;
}

fn select_columns() -> String {
    // ---
    let mut cols = vec!["id".to_string(), "recorded_at".to_string()];
    cols.extend(meter_columns());
    cols.join(", ")
}

fn insert_sql() -> String {
    // ---
    let cols = select_columns();
    let placeholders: Vec<String> = (1..=cols.split(", ").count())
        .map(|i| format!("${i}"))
        .collect();
    format!(
        "INSERT INTO meter_readings ({cols}) VALUES ({})",
        placeholders.join(", ")
    )
}

#[async_trait]
impl ReadingStore for PgPool {
    async fn insert(&self, reading: &MeterReading) -> Result<(), sqlx::Error> {
        // ---
        let sql = insert_sql();
        let mut query = sqlx::query(&sql).bind(reading.id).bind(reading.timestamp);

        // Bind order must match `meter_columns()`: meter, then kind
        for i in 0..METER_COUNT {
            let m = &reading.meters[i];
            query = query
                .bind(m.power_kw)
                .bind(m.cumulative_energy_kwh)
                .bind(m.apparent_power_kva)
                .bind(m.avg_power_factor)
                .bind(m.cumulative_apparent_energy_kvah)
                .bind(reading.energy_consumption[i]);
        }

        query.execute(self).await?;
        Ok(())
    }

    async fn latest_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<MeterReading>, sqlx::Error> {
        // ---
        let sql = format!(
            "SELECT {} FROM meter_readings \
             WHERE recorded_at >= $1 AND recorded_at < $2 \
             ORDER BY recorded_at DESC LIMIT 1",
            select_columns()
        );
        sqlx::query_as::<_, MeterReading>(&sql)
            .bind(start)
            .bind(end)
            .fetch_optional(self)
            .await
    }

    async fn earliest_since(
        &self,
        start: DateTime<Utc>,
    ) -> Result<Option<MeterReading>, sqlx::Error> {
        // ---
        let sql = format!(
            "SELECT {} FROM meter_readings \
             WHERE recorded_at >= $1 \
             ORDER BY recorded_at ASC LIMIT 1",
            select_columns()
        );
        sqlx::query_as::<_, MeterReading>(&sql)
            .bind(start)
            .fetch_optional(self)
            .await
    }
}

/// Most recent reading overall.
pub async fn latest(pool: &PgPool) -> Result<Option<MeterReading>, sqlx::Error> {
    // ---
    let sql = format!(
        "SELECT {} FROM meter_readings ORDER BY recorded_at DESC LIMIT 1",
        select_columns()
    );
    sqlx::query_as::<_, MeterReading>(&sql)
        .fetch_optional(pool)
        .await
}

/// All readings with `start <= timestamp < end`, oldest first.
pub async fn readings_between(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<MeterReading>, sqlx::Error> {
    // ---
    let sql = format!(
        "SELECT {} FROM meter_readings \
         WHERE recorded_at >= $1 AND recorded_at < $2 \
         ORDER BY recorded_at ASC",
        select_columns()
    );
    sqlx::query_as::<_, MeterReading>(&sql)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
}

/// `(timestamp, cumulative kWh)` of one meter in a window, newest first.
pub async fn meter_energy_between(
    pool: &PgPool,
    meter_id: u16,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<(DateTime<Utc>, f64)>, sqlx::Error> {
    // ---
    let sql = format!(
        "SELECT recorded_at, kwh_{meter_id} FROM meter_readings \
         WHERE recorded_at >= $1 AND recorded_at < $2 \
         ORDER BY recorded_at DESC"
    );
    sqlx::query_as::<_, (DateTime<Utc>, f64)>(&sql)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
}

/// Highest combined apparent power of [`PEAK_DEMAND_METERS`] in a window.
pub async fn peak_demand_between(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Option<f64>, sqlx::Error> {
    // ---
    let sum: Vec<String> = PEAK_DEMAND_METERS
        .iter()
        .map(|id| format!("kva_{id}"))
        .collect();
    let sql = format!(
        "SELECT MAX({}) FROM meter_readings \
         WHERE recorded_at >= $1 AND recorded_at < $2",
        sum.join(" + ")
    );
    sqlx::query_scalar::<_, Option<f64>>(&sql)
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`ReadingStore`] for unit tests.

    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        pub readings: Mutex<Vec<MeterReading>>,
        pub fail_inserts: bool,
    }

    impl MemoryStore {
        pub fn with(readings: Vec<MeterReading>) -> Self {
            MemoryStore {
                readings: Mutex::new(readings),
                fail_inserts: false,
            }
        }

        pub fn failing() -> Self {
            MemoryStore {
                readings: Mutex::new(Vec::new()),
                fail_inserts: true,
            }
        }

        pub fn stored(&self) -> Vec<MeterReading> {
            self.readings.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReadingStore for MemoryStore {
        async fn insert(&self, reading: &MeterReading) -> Result<(), sqlx::Error> {
            if self.fail_inserts {
                return Err(sqlx::Error::PoolClosed);
            }
            self.readings.lock().unwrap().push(reading.clone());
            Ok(())
        }

        async fn latest_between(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Option<MeterReading>, sqlx::Error> {
            Ok(self
                .readings
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.timestamp >= start && r.timestamp < end)
                .max_by_key(|r| r.timestamp)
                .cloned())
        }

        async fn earliest_since(
            &self,
            start: DateTime<Utc>,
        ) -> Result<Option<MeterReading>, sqlx::Error> {
            Ok(self
                .readings
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.timestamp >= start)
                .min_by_key(|r| r.timestamp)
                .cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_insert_sql_has_one_placeholder_per_column() {
        // ---
        let sql = insert_sql();
        assert!(sql.starts_with("INSERT INTO meter_readings (id, recorded_at, kw_70"));
        assert!(sql.contains("$26"));
        assert!(!sql.contains("$27"));
    }

    #[test]
    fn test_select_columns_order() {
        // ---
        let cols = select_columns();
        assert!(cols.starts_with("id, recorded_at, kw_70, kwh_70"));
        assert!(cols.ends_with("consumption_41"));
    }
}
