use anyhow::Result;
use sqlx::SqlitePool;

use crate::domain::Meter;

/// Insert a meter, ignoring duplicates.
///
/// Returns `true` if a row was inserted, `false` if the identifier was
/// already registered. Repeated form submissions are expected, so duplicates
/// are not an error.
pub async fn insert_meter(pool: &SqlitePool, meter_id: &str, location: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO meters (meter_id, location)
        VALUES (?, ?)
        ON CONFLICT(meter_id) DO NOTHING
        "#,
    )
    .bind(meter_id)
    .bind(location)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// All registered meters in registration order.
///
/// The table has no explicit sort key; rowid reflects insertion order.
pub async fn list_meters(pool: &SqlitePool) -> Result<Vec<Meter>> {
    let meters = sqlx::query_as::<_, Meter>(
        r#"
        SELECT meter_id, location
        FROM meters
        ORDER BY rowid
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(meters)
}

pub async fn meter_exists(pool: &SqlitePool, meter_id: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM meters WHERE meter_id = ?
        "#,
    )
    .bind(meter_id)
    .fetch_optional(pool)
    .await?;

    Ok(found.is_some())
}
