//! Database schema management for `meterwatch`.
//!
//! Ensures the readings table and its time index exist before the poller or
//! the API touch them. Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

use crate::models::METER_IDS;

// ---

/// Per-meter column kinds; the full column name is `<kind>_<meter id>`.
pub const METER_COLUMN_KINDS: [&str; 6] = ["kw", "kwh", "kva", "pf", "kvah", "consumption"];

/// All per-meter column names in meter order, then kind order.
pub fn meter_columns() -> Vec<String> {
    // ---
    METER_IDS
        .iter()
        .flat_map(|id| {
            METER_COLUMN_KINDS
                .iter()
                .map(move |kind| format!("{kind}_{id}"))
        })
        .collect()
}

fn create_table_sql() -> String {
    // ---
    let columns: Vec<String> = meter_columns()
        .into_iter()
        .map(|c| format!("            {c:<16} DOUBLE PRECISION NOT NULL DEFAULT 0"))
        .collect();

    format!(
        r#"
        CREATE TABLE IF NOT EXISTS meter_readings (
            id               UUID        PRIMARY KEY,
            recorded_at      TIMESTAMPTZ NOT NULL,
{}
        );
        "#,
        columns.join(",\n")
    )
}

/// Create the schema (idempotent).
///
/// Safe to call on every startup; no-op if the objects already exist. There is
/// no migration path: column changes need a manual `ALTER TABLE`.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(&create_table_sql()).execute(&mut *tx).await?;

    // Every query is a time-range scan
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_meter_readings_recorded_at
            ON meter_readings (recorded_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_meter_columns_cover_every_meter() {
        // ---
        let cols = meter_columns();
        assert_eq!(cols.len(), 24);
        assert_eq!(cols[0], "kw_70");
        assert_eq!(cols[5], "consumption_70");
        assert_eq!(cols[6], "kw_40");
        assert_eq!(cols[23], "consumption_41");
    }

    #[test]
    fn test_create_table_sql_declares_columns() {
        // ---
        let sql = create_table_sql();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS meter_readings"));
        for col in meter_columns() {
            assert!(sql.contains(&col), "missing column {col}");
        }
    }
}
