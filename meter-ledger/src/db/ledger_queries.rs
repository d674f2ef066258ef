use anyhow::Result;
use sqlx::SqlitePool;

use crate::domain::{Reading, ReadingWithLocation};

/// Closing value of the most recently inserted reading for a meter, or 0.0
/// when the meter has no readings yet. Ties break on the highest id, so the
/// value is stable even when several rows share a date string.
pub async fn latest_closing(pool: &SqlitePool, meter_id: &str) -> Result<f64> {
    let closing: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT closing
        FROM readings
        WHERE meter_id = ?
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(meter_id)
    .fetch_optional(pool)
    .await?;

    Ok(closing.unwrap_or(0.0))
}

/// Insert a fully derived reading row and return it with its assigned id.
#[allow(clippy::too_many_arguments)]
pub async fn insert_reading(
    pool: &SqlitePool,
    meter_id: &str,
    opening: f64,
    closing: f64,
    consumption: f64,
    user: &str,
    date: &str,
    photo: &str,
) -> Result<Reading> {
    let result = sqlx::query(
        r#"
        INSERT INTO readings (meter_id, opening, closing, consumption, user, date, photo)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(meter_id)
    .bind(opening)
    .bind(closing)
    .bind(consumption)
    .bind(user)
    .bind(date)
    .bind(photo)
    .execute(pool)
    .await?;

    Ok(Reading {
        id: result.last_insert_rowid(),
        meter_id: meter_id.to_string(),
        opening,
        closing,
        consumption,
        user: user.to_string(),
        date: date.to_string(),
        photo: photo.to_string(),
    })
}

/// Joined listing, newest first. Shared by the list and export paths; the
/// export runs it through a cursor instead of `fetch_all`.
pub const WITH_LOCATION_SQL: &str = r#"
    SELECT
        r.id,
        r.meter_id,
        m.location,
        r.opening,
        r.closing,
        r.consumption,
        r.user,
        r.date,
        r.photo
    FROM readings r
    JOIN meters m ON m.meter_id = r.meter_id
    ORDER BY r.id DESC
"#;

/// Readings joined with their meter's location, newest first.
///
/// Inner join: a reading whose meter was never registered is silently
/// excluded. That is the chosen reporting semantics, not an oversight.
pub async fn list_with_location(pool: &SqlitePool) -> Result<Vec<ReadingWithLocation>> {
    let rows = sqlx::query_as::<_, ReadingWithLocation>(WITH_LOCATION_SQL)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn find_reading(pool: &SqlitePool, id: i64) -> Result<Option<Reading>> {
    let reading = sqlx::query_as::<_, Reading>(
        r#"
        SELECT id, meter_id, opening, closing, consumption, user, date, photo
        FROM readings
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(reading)
}

/// Delete one reading row. Returns `true` if a row was removed.
pub async fn delete_reading(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM readings WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn count_readings(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::registry_queries::insert_meter;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn latest_closing_is_zero_for_unknown_meter() {
        let pool = test_pool().await;

        let closing = latest_closing(&pool, "M1").await.unwrap();
        assert_eq!(closing, 0.0);
    }

    #[tokio::test]
    async fn latest_closing_tracks_most_recent_insert() {
        let pool = test_pool().await;

        insert_reading(&pool, "M1", 0.0, 100.0, 100.0, "Alice", "01-01-2024 10:00", "a.jpg")
            .await
            .unwrap();
        insert_reading(&pool, "M1", 100.0, 150.0, 50.0, "Bob", "01-01-2024 10:00", "b.jpg")
            .await
            .unwrap();
        // A different meter must not interfere.
        insert_reading(&pool, "M2", 0.0, 999.0, 999.0, "Carol", "01-01-2024 10:00", "c.jpg")
            .await
            .unwrap();

        let closing = latest_closing(&pool, "M1").await.unwrap();
        assert_eq!(closing, 150.0);
    }

    #[tokio::test]
    async fn insert_reading_assigns_increasing_ids() {
        let pool = test_pool().await;

        let first = insert_reading(&pool, "M1", 0.0, 10.0, 10.0, "Alice", "d", "p.jpg")
            .await
            .unwrap();
        let second = insert_reading(&pool, "M1", 10.0, 20.0, 10.0, "Alice", "d", "p.jpg")
            .await
            .unwrap();

        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn list_with_location_is_newest_first_and_inner_joined() {
        let pool = test_pool().await;

        insert_meter(&pool, "M1", "Warehouse A").await.unwrap();
        insert_reading(&pool, "M1", 0.0, 100.0, 100.0, "Alice", "d1", "a.jpg")
            .await
            .unwrap();
        insert_reading(&pool, "M1", 100.0, 150.0, 50.0, "Bob", "d2", "b.jpg")
            .await
            .unwrap();
        // Never registered: must be invisible in the joined listing.
        insert_reading(&pool, "GHOST", 0.0, 5.0, 5.0, "Eve", "d3", "g.jpg")
            .await
            .unwrap();

        let rows = list_with_location(&pool).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user, "Bob");
        assert_eq!(rows[0].location, "Warehouse A");
        assert_eq!(rows[1].user, "Alice");
    }

    #[tokio::test]
    async fn delete_reading_reports_whether_a_row_was_removed() {
        let pool = test_pool().await;

        let reading = insert_reading(&pool, "M1", 0.0, 10.0, 10.0, "Alice", "d", "p.jpg")
            .await
            .unwrap();

        assert!(delete_reading(&pool, reading.id).await.unwrap());
        assert!(!delete_reading(&pool, reading.id).await.unwrap());
        assert_eq!(count_readings(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_reading_round_trips_stored_values() {
        let pool = test_pool().await;

        let inserted = insert_reading(
            &pool,
            "M1",
            100.0,
            150.0,
            50.0,
            "Bob",
            "02-01-2024 03:04",
            "uploads/M1_20240102_030405.jpg",
        )
        .await
        .unwrap();

        let found = find_reading(&pool, inserted.id).await.unwrap().unwrap();
        assert_eq!(found.meter_id, "M1");
        assert_eq!(found.opening, 100.0);
        assert_eq!(found.closing, 150.0);
        assert_eq!(found.consumption, 50.0);
        assert_eq!(found.user, "Bob");
        assert_eq!(found.date, "02-01-2024 03:04");
        assert_eq!(found.photo, "uploads/M1_20240102_030405.jpg");

        assert!(find_reading(&pool, inserted.id + 1).await.unwrap().is_none());
    }
}
