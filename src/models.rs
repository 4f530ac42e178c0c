//! Data models for the meter pipeline.
//!
//! A [`SensorSnapshot`] is what the upstream aggregator reports for the four
//! site meters at one instant. A [`MeterReading`] is the persisted row: the
//! snapshot plus the recording time and the per-meter consumption since the
//! start of the day.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

// ---

/// Meter ids at the site, in the order used everywhere (storage, JSON, day log).
pub const METER_IDS: [u16; 4] = [70, 40, 69, 41];

/// Number of meters reported per snapshot.
pub const METER_COUNT: usize = METER_IDS.len();

/// Upstream field prefixes, in day-log column order.
const KW: &str = "Total_KW";
const KWH: &str = "TotalNet_KWH";
const KVA: &str = "Total_KVA";
const PF: &str = "Avg_PF";
const KVAH: &str = "TotalNet_KVAH";
const CONSUMPTION: &str = "energy_consumption";

/// Wire name of a per-meter field, e.g. `TotalNet_KWH_meter_70`.
pub fn field_key(prefix: &str, meter_id: u16) -> String {
    format!("{prefix}_meter_{meter_id}")
}

/// Raw electrical quantities of one meter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterValues {
    // ---
    pub power_kw: f64,
    pub cumulative_energy_kwh: f64,
    pub apparent_power_kva: f64,
    pub avg_power_factor: f64,
    pub cumulative_apparent_energy_kvah: f64,
}

impl MeterValues {
    /// Values in day-log column order.
    pub fn as_columns(&self) -> [f64; 5] {
        [
            self.power_kw,
            self.cumulative_energy_kwh,
            self.apparent_power_kva,
            self.avg_power_factor,
            self.cumulative_apparent_energy_kvah,
        ]
    }
}

/// One live snapshot from the sensor aggregator, meters in [`METER_IDS`] order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    pub meters: [MeterValues; METER_COUNT],
}

impl SensorSnapshot {
    // ---
    /// Build a snapshot from one element of the aggregator's JSON array.
    ///
    /// Missing or non-numeric fields read as `0.0`. Numbers sent as strings are
    /// accepted since some gateway firmware quotes them.
    pub fn from_json(object: &Map<String, Value>) -> Self {
        // ---
        let read = |prefix: &str, id: u16| -> f64 {
            object
                .get(&field_key(prefix, id))
                .and_then(|v| {
                    v.as_f64()
                        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                })
                .unwrap_or(0.0)
        };

        let mut meters = [MeterValues::default(); METER_COUNT];
        for (slot, &id) in meters.iter_mut().zip(METER_IDS.iter()) {
            *slot = MeterValues {
                power_kw: read(KW, id),
                cumulative_energy_kwh: read(KWH, id),
                apparent_power_kva: read(KVA, id),
                avg_power_factor: read(PF, id),
                cumulative_apparent_energy_kvah: read(KVAH, id),
            };
        }

        SensorSnapshot { meters }
    }

    /// Cumulative energy counters, one per meter.
    pub fn cumulative_energy(&self) -> [f64; METER_COUNT] {
        self.meters.map(|m| m.cumulative_energy_kwh)
    }
}

/// A persisted poll result.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterReading {
    // ---
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub meters: [MeterValues; METER_COUNT],
    pub energy_consumption: [f64; METER_COUNT],
}

impl MeterReading {
    // ---
    pub fn new(
        timestamp: DateTime<Utc>,
        snapshot: &SensorSnapshot,
        energy_consumption: [f64; METER_COUNT],
    ) -> Self {
        MeterReading {
            id: Uuid::new_v4(),
            timestamp,
            meters: snapshot.meters,
            energy_consumption,
        }
    }

    pub fn cumulative_energy(&self) -> [f64; METER_COUNT] {
        self.meters.map(|m| m.cumulative_energy_kwh)
    }
}

/// Serialized flat, with the field names the dashboard already consumes.
impl Serialize for MeterReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // ---
        let mut map = serializer.serialize_map(Some(2 + METER_COUNT * 6))?;
        map.serialize_entry("_id", &self.id)?;
        map.serialize_entry("timestamp", &self.timestamp)?;

        for (i, &id) in METER_IDS.iter().enumerate() {
            let m = &self.meters[i];
            map.serialize_entry(&field_key(KW, id), &m.power_kw)?;
            map.serialize_entry(&field_key(KWH, id), &m.cumulative_energy_kwh)?;
            map.serialize_entry(&field_key(KVA, id), &m.apparent_power_kva)?;
            map.serialize_entry(&field_key(PF, id), &m.avg_power_factor)?;
            map.serialize_entry(&field_key(KVAH, id), &m.cumulative_apparent_energy_kvah)?;
            map.serialize_entry(&field_key(CONSUMPTION, id), &self.energy_consumption[i])?;
        }
        map.end()
    }
}

/// Column names are `<kind>_<meter id>`, see `schema.rs`.
impl<'r> FromRow<'r, PgRow> for MeterReading {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        // ---
        let mut meters = [MeterValues::default(); METER_COUNT];
        let mut energy_consumption = [0.0; METER_COUNT];

        for (i, &id) in METER_IDS.iter().enumerate() {
            let col = |kind: &str| format!("{kind}_{id}");
            meters[i] = MeterValues {
                power_kw: row.try_get(col("kw").as_str())?,
                cumulative_energy_kwh: row.try_get(col("kwh").as_str())?,
                apparent_power_kva: row.try_get(col("kva").as_str())?,
                avg_power_factor: row.try_get(col("pf").as_str())?,
                cumulative_apparent_energy_kvah: row.try_get(col("kvah").as_str())?,
            };
            energy_consumption[i] = row.try_get(col("consumption").as_str())?;
        }

        Ok(MeterReading {
            id: row.try_get("id")?,
            timestamp: row.try_get("recorded_at")?,
            meters,
            energy_consumption,
        })
    }
}
